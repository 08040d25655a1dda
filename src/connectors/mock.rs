//! Mock connector for testing.
//!
//! Provides an in-process [`Connector`] with call recording and error
//! injection, so code built on sessionmux can be tested without a cloud
//! account.

use crate::cache::ServiceClient;
use crate::connector::{ClientConfig, ClientSpec, Connector};
use crate::credentials::CredentialSnapshot;
use crate::session::UserAgent;
use crate::sts::{AssumeRoleRequest, StsApi};
use crate::{Result, SessionmuxError};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use std::any::Any;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// A recorded `build_sts` invocation.
#[derive(Debug, Clone)]
pub struct StsBuild {
    /// Named credentials profile, if any
    pub profile: Option<String>,
    /// Region pin, when a regional endpoint is in play
    pub region: Option<String>,
    /// Resolved regional endpoint, if any
    pub endpoint: Option<String>,
    /// Identification metadata passed for the client
    pub user_agent: UserAgent,
}

/// In-memory identity service.
///
/// Generates snapshots with a configurable lifetime and counter-based access
/// keys (`AKIAMOCK0`, `AKIAMOCK1`, ...) unless scripted responses are queued.
/// Every request is recorded for assertions.
pub struct MockSts {
    calls: AtomicUsize,
    ttl: Mutex<Duration>,
    requests: Mutex<Vec<AssumeRoleRequest>>,
    responses: Mutex<VecDeque<Result<CredentialSnapshot>>>,
}

impl MockSts {
    /// Creates a mock identity service issuing one-hour credentials.
    pub fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            ttl: Mutex::new(Duration::hours(1)),
            requests: Mutex::new(Vec::new()),
            responses: Mutex::new(VecDeque::new()),
        }
    }

    /// Sets the lifetime of generated snapshots.
    pub fn set_ttl(&self, ttl: Duration) {
        *self.ttl.lock().unwrap() = ttl;
    }

    /// Queues a scripted response, consumed before falling back to generation.
    pub fn push_response(&self, response: Result<CredentialSnapshot>) {
        self.responses.lock().unwrap().push_back(response);
    }

    /// Queues a failure.
    pub fn push_error(&self, err: SessionmuxError) {
        self.push_response(Err(err));
    }

    /// Number of assume-role calls received.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// All requests received so far.
    pub fn requests(&self) -> Vec<AssumeRoleRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// The most recent request, if any.
    pub fn last_request(&self) -> Option<AssumeRoleRequest> {
        self.requests.lock().unwrap().last().cloned()
    }
}

impl Default for MockSts {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StsApi for MockSts {
    async fn assume_role(&self, request: AssumeRoleRequest) -> Result<CredentialSnapshot> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request);

        if let Some(scripted) = self.responses.lock().unwrap().pop_front() {
            return scripted;
        }

        let ttl = *self.ttl.lock().unwrap();
        Ok(CredentialSnapshot::new(
            format!("AKIAMOCK{n}"),
            format!("mock-secret-{n}"),
            format!("mock-token-{n}"),
            Utc::now() + ttl,
        ))
    }
}

/// A cached client handle produced by [`MockConnector`].
#[derive(Debug)]
pub struct MockClient {
    service: String,
    region: String,
    credentials: Option<CredentialSnapshot>,
    config: Option<ClientConfig>,
    user_agent: UserAgent,
    closes: AtomicUsize,
}

impl MockClient {
    /// The frozen snapshot the client was built with, if any.
    pub fn credentials(&self) -> Option<&CredentialSnapshot> {
        self.credentials.as_ref()
    }

    /// The configuration override the client was built with, if any.
    pub fn config(&self) -> Option<&ClientConfig> {
        self.config.as_ref()
    }

    /// The identification metadata the client was built with.
    pub fn user_agent(&self) -> &UserAgent {
        &self.user_agent
    }

    /// How many times `close` has been called on this handle.
    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

impl ServiceClient for MockClient {
    fn service(&self) -> &str {
        &self.service
    }

    fn region(&self) -> &str {
        &self.region
    }

    fn close(&self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Mock connector recording every construction.
///
/// # Example
///
/// ```
/// use sessionmux::connectors::mock::MockConnector;
/// use sessionmux::{ClientCache, Session};
/// use std::sync::Arc;
///
/// #[tokio::main]
/// async fn main() -> sessionmux::Result<()> {
///     let connector = Arc::new(MockConnector::new());
///     let cache = Arc::new(ClientCache::new());
///     let session = Session::direct(connector.clone(), cache, None, None, "us-east-1");
///
///     session.client("ec2").await?;
///     session.client("ec2").await?;
///
///     // second call was served from the cache
///     assert_eq!(connector.clients_built(), 1);
///     Ok(())
/// }
/// ```
pub struct MockConnector {
    sts: Arc<MockSts>,
    clients_built: AtomicUsize,
    sts_builds: Mutex<Vec<StsBuild>>,
    client_error: Mutex<Option<SessionmuxError>>,
}

impl MockConnector {
    /// Creates a connector backed by a fresh [`MockSts`].
    pub fn new() -> Self {
        Self {
            sts: Arc::new(MockSts::new()),
            clients_built: AtomicUsize::new(0),
            sts_builds: Mutex::new(Vec::new()),
            client_error: Mutex::new(None),
        }
    }

    /// The shared identity-service mock, for scripting and assertions.
    pub fn sts(&self) -> &Arc<MockSts> {
        &self.sts
    }

    /// Number of service clients constructed (cache misses plus uncached
    /// builds).
    pub fn clients_built(&self) -> usize {
        self.clients_built.load(Ordering::SeqCst)
    }

    /// Recorded `build_sts` invocations.
    pub fn sts_builds(&self) -> Vec<StsBuild> {
        self.sts_builds.lock().unwrap().clone()
    }

    /// Makes the next `build_client` call fail with `err`.
    pub fn fail_next_client(&self, err: SessionmuxError) {
        *self.client_error.lock().unwrap() = Some(err);
    }
}

impl Default for MockConnector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn build_client(&self, spec: ClientSpec<'_>) -> Result<Arc<dyn ServiceClient>> {
        if let Some(err) = self.client_error.lock().unwrap().take() {
            return Err(err);
        }

        self.clients_built.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(MockClient {
            service: spec.service.to_string(),
            region: spec.region.to_string(),
            credentials: spec.credentials.cloned(),
            config: spec.config.cloned(),
            user_agent: spec.user_agent.clone(),
            closes: AtomicUsize::new(0),
        }))
    }

    async fn build_sts(
        &self,
        profile: Option<&str>,
        region: Option<&str>,
        endpoint: Option<&str>,
        user_agent: &UserAgent,
    ) -> Result<Arc<dyn StsApi>> {
        self.sts_builds.lock().unwrap().push(StsBuild {
            profile: profile.map(str::to_string),
            region: region.map(str::to_string),
            endpoint: endpoint.map(str::to_string),
            user_agent: user_agent.clone(),
        });
        Ok(self.sts.clone() as Arc<dyn StsApi>)
    }
}
