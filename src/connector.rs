//! The provider SDK boundary.
//!
//! A [`Connector`] builds the two kinds of provider objects this crate
//! consumes: opaque service client handles and identity-service (STS)
//! clients. The core never signs or transports requests itself.

use crate::cache::ServiceClient;
use crate::credentials::CredentialSnapshot;
use crate::session::UserAgent;
use crate::sts::StsApi;
use crate::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Per-call client configuration override.
///
/// Supplying one of these to `Session::client_with` opts the call out of the
/// shared client cache: callers needing non-default client configuration get
/// a private, freshly constructed client every time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientConfig {
    /// Custom endpoint URL (e.g. a LocalStack endpoint)
    pub endpoint: Option<String>,
    /// Request timeout override
    pub timeout: Option<Duration>,
    /// Connector-specific free-form options
    pub options: HashMap<String, String>,
}

impl ClientConfig {
    /// Creates an empty override. Even an empty override bypasses caching.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a custom endpoint URL.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Sets a request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Adds a connector-specific option.
    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }
}

/// Everything a connector needs to build one service client.
#[derive(Debug, Clone, Copy)]
pub struct ClientSpec<'a> {
    /// Service identifier (e.g. "ec2")
    pub service: &'a str,
    /// Resolved region
    pub region: &'a str,
    /// Named credentials profile for base identities
    pub profile: Option<&'a str>,
    /// Frozen snapshot for assumed identities; `None` delegates credential
    /// resolution to the provider's default chain
    pub credentials: Option<&'a CredentialSnapshot>,
    /// Per-call configuration override, when the caller opted out of caching
    pub config: Option<&'a ClientConfig>,
    /// Identification metadata the built client must stamp on its outgoing
    /// requests
    pub user_agent: &'a UserAgent,
}

/// Builds provider objects. Implemented per provider (or mocked in tests);
/// the core treats it as an external collaborator.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Builds a service client for the given spec.
    ///
    /// # Errors
    ///
    /// Construction failures (invalid region, rejected credentials) surface
    /// here and are never cached.
    async fn build_client(&self, spec: ClientSpec<'_>) -> Result<Arc<dyn ServiceClient>>;

    /// Builds an identity-service client for role assumption.
    ///
    /// `endpoint` is `Some` only when the process-wide regional-endpoint
    /// policy resolved one; `None` means the provider-global endpoint.
    /// Assume-role requests carry `user_agent` like any other outgoing call.
    async fn build_sts(
        &self,
        profile: Option<&str>,
        region: Option<&str>,
        endpoint: Option<&str>,
        user_agent: &UserAgent,
    ) -> Result<Arc<dyn StsApi>>;
}
