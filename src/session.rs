//! Sessions and the assumed-identity session builder.
//!
//! A [`Session`] hands out provider-service clients, routing through the
//! shared [`ClientCache`] keyed by its *current* credential snapshot.
//! [`AssumedSessionBuilder`] derives a session whose credentials are renewed
//! transparently by role assumption.

use crate::cache::{ClientCache, ClientCacheKey, IdentityKey, ServiceClient};
use crate::config::StsOptions;
use crate::connector::{ClientConfig, ClientSpec, Connector};
use crate::credentials::{CredentialSnapshot, RefreshableCredentials};
use crate::retry::RetryPolicy;
use crate::sts::{sts_endpoint, AssumeRoleRefresher};
use crate::validation::validate_service_name;
use crate::{Result, SessionmuxError};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Client-identification metadata attached to a session, so every request it
/// issues is attributable to the product (and optionally to the policy being
/// executed).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserAgent {
    /// Product name
    pub name: String,
    /// Product version
    pub version: String,
    /// Free-form context, e.g. a policy label
    pub extra: Option<String>,
}

impl UserAgent {
    /// Creates metadata for this crate's product name and version.
    pub fn product() -> Self {
        Self {
            name: env!("CARGO_PKG_NAME").to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            extra: None,
        }
    }

    /// Single-token form for SDK app-name identification.
    ///
    /// Provider SDKs restrict app names to a narrow character set; characters
    /// outside it (spaces, `/`, `#`) are mapped to `-`.
    pub fn app_name(&self) -> String {
        let mut token = format!("{}-{}", self.name, self.version);
        if let Some(extra) = &self.extra {
            token.push('-');
            token.push_str(extra);
        }
        token
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || "!$%&'*+-.^_`|~".contains(c) {
                    c
                } else {
                    '-'
                }
            })
            .collect()
    }
}

impl fmt::Display for UserAgent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.name, self.version)?;
        if let Some(extra) = &self.extra {
            write!(f, " {extra}")?;
        }
        Ok(())
    }
}

/// An authenticated scope for acquiring provider-service clients.
///
/// Direct sessions delegate credential resolution to the provider's default
/// chain; assumed sessions carry a [`RefreshableCredentials`] identity whose
/// snapshot is re-checked on every client acquisition.
///
/// Sessions share one [`Connector`] and one [`ClientCache`]; cloning the
/// `Arc`s, not the clients.
pub struct Session {
    connector: Arc<dyn Connector>,
    cache: Arc<ClientCache>,
    region: Option<String>,
    profile: Option<String>,
    fallback_region: String,
    credentials: Option<Arc<RefreshableCredentials>>,
    user_agent: UserAgent,
}

impl Session {
    /// Creates a direct (base-identity) session.
    pub fn direct(
        connector: Arc<dyn Connector>,
        cache: Arc<ClientCache>,
        region: Option<String>,
        profile: Option<String>,
        fallback_region: impl Into<String>,
    ) -> Self {
        Self {
            connector,
            cache,
            region,
            profile,
            fallback_region: fallback_region.into(),
            credentials: None,
            user_agent: UserAgent::product(),
        }
    }

    /// The session's default region, if one is configured.
    pub fn region(&self) -> Option<&str> {
        self.region.as_deref()
    }

    /// The named credentials profile, if any.
    pub fn profile(&self) -> Option<&str> {
        self.profile.as_deref()
    }

    /// The session's identification metadata.
    pub fn user_agent(&self) -> &UserAgent {
        &self.user_agent
    }

    /// Replaces the identification metadata. Used by factory decoration and
    /// subscriber callbacks.
    pub fn set_user_agent(&mut self, user_agent: UserAgent) {
        self.user_agent = user_agent;
    }

    /// The refreshable credential identity, for assumed sessions.
    pub fn credential_identity(&self) -> Option<&Arc<RefreshableCredentials>> {
        self.credentials.as_ref()
    }

    /// Returns the current frozen credential snapshot, refreshing first if it
    /// is stale. `None` for direct sessions (the provider chain owns their
    /// credentials).
    ///
    /// # Errors
    ///
    /// Propagates a refresh failure once the held snapshot has expired.
    pub async fn credentials(&self) -> Result<Option<Arc<CredentialSnapshot>>> {
        match &self.credentials {
            Some(identity) => Ok(Some(identity.current().await?)),
            None => Ok(None),
        }
    }

    /// Acquires a client for `service` in the session's region, through the
    /// shared cache.
    pub async fn client(&self, service: &str) -> Result<Arc<dyn ServiceClient>> {
        self.client_with(service, None, None).await
    }

    /// Acquires a client with an optional region override and optional
    /// configuration override.
    ///
    /// Passing a [`ClientConfig`] bypasses the cache entirely: a fresh client
    /// is constructed for every such call and never shared or stored.
    ///
    /// # Errors
    ///
    /// Returns a construction error naming the service and region when the
    /// connector fails; a stale-credential refresh failure surfaces as the
    /// refresh's own error.
    pub async fn client_with(
        &self,
        service: &str,
        region: Option<&str>,
        config: Option<&ClientConfig>,
    ) -> Result<Arc<dyn ServiceClient>> {
        validate_service_name(service)?;

        let region = region
            .or(self.region.as_deref())
            .unwrap_or(&self.fallback_region)
            .to_string();

        let snapshot = self.credentials().await?;

        if config.is_some() {
            // documented opt-out: non-default configuration is never shared
            let spec = ClientSpec {
                service,
                region: &region,
                profile: self.profile.as_deref(),
                credentials: snapshot.as_deref(),
                config,
                user_agent: &self.user_agent,
            };
            return self
                .connector
                .build_client(spec)
                .await
                .map_err(|err| SessionmuxError::client_construction(service, &region, err));
        }

        let key = ClientCacheKey::new(
            IdentityKey::from_snapshot(snapshot.as_deref(), self.profile.as_deref()),
            service,
            &region,
        );

        self.cache
            .get_or_create(key, || async {
                let spec = ClientSpec {
                    service,
                    region: &region,
                    profile: self.profile.as_deref(),
                    credentials: snapshot.as_deref(),
                    config: None,
                    user_agent: &self.user_agent,
                };
                self.connector
                    .build_client(spec)
                    .await
                    .map_err(|err| SessionmuxError::client_construction(service, &region, err))
            })
            .await
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("region", &self.region)
            .field("profile", &self.profile)
            .field("assumed", &self.credentials.is_some())
            .field("user_agent", &self.user_agent)
            .finish_non_exhaustive()
    }
}

/// Derives a session with an assumed-role credential identity from a base
/// session.
///
/// The identity-service client is built through the base session's connector,
/// so the derived session's refresher keeps the base transport alive. The
/// initial refresh happens eagerly in [`build`](Self::build): invalid role
/// configuration fails session construction instead of the first client call.
///
/// # Example
///
/// ```no_run
/// use sessionmux::{AssumedSessionBuilder, ClientCache, Session, StsOptions};
/// use sessionmux::connectors::mock::MockConnector;
/// use std::sync::Arc;
///
/// #[tokio::main]
/// async fn main() -> sessionmux::Result<()> {
///     let connector = Arc::new(MockConnector::new());
///     let cache = Arc::new(ClientCache::new());
///     let base = Session::direct(connector, cache, None, None, "us-east-1");
///
///     let session = AssumedSessionBuilder::new("arn:aws:iam::123456789012:role/Audit", "auditor")
///         .with_region("eu-west-1")
///         .with_sts_options(StsOptions::from_env())
///         .build(&base)
///         .await?;
///
///     let ec2 = session.client("ec2").await?;
///     println!("{} in {}", ec2.service(), ec2.region());
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone)]
pub struct AssumedSessionBuilder {
    role_arn: String,
    session_name: String,
    session_policy: Option<Value>,
    external_id: Option<String>,
    region: Option<String>,
    sts_options: StsOptions,
    retry: RetryPolicy,
    refresh_margin: Option<chrono::Duration>,
}

impl AssumedSessionBuilder {
    /// Starts a builder for the given role and session name.
    pub fn new(role_arn: impl Into<String>, session_name: impl Into<String>) -> Self {
        Self {
            role_arn: role_arn.into(),
            session_name: session_name.into(),
            session_policy: None,
            external_id: None,
            region: None,
            sts_options: StsOptions::default(),
            retry: RetryPolicy::on_throttling(),
            refresh_margin: None,
        }
    }

    /// Restricts the assumed session with a policy document.
    pub fn with_session_policy(mut self, policy: Value) -> Self {
        self.session_policy = Some(policy);
        self
    }

    /// Sets the external id for cross-account trust policies.
    pub fn with_external_id(mut self, external_id: impl Into<String>) -> Self {
        self.external_id = Some(external_id.into());
        self
    }

    /// Sets the derived session's target region; also selects the regional
    /// identity-service endpoint when the process-wide flag enables it.
    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    /// Sets the identity-service endpoint policy.
    pub fn with_sts_options(mut self, options: StsOptions) -> Self {
        self.sts_options = options;
        self
    }

    /// Overrides the refresh retry policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Overrides the credential refresh margin of the derived identity.
    pub fn with_refresh_margin(mut self, margin: chrono::Duration) -> Self {
        self.refresh_margin = Some(margin);
        self
    }

    /// Builds the derived session, performing the eager initial refresh.
    ///
    /// # Errors
    ///
    /// Fails fast on malformed role configuration or a rejected initial
    /// assume-role request.
    pub async fn build(&self, base: &Session) -> Result<Session> {
        let endpoint = sts_endpoint(self.region.as_deref(), self.sts_options);
        // region pins the STS client only when a regional endpoint is in play
        let sts_region = endpoint.is_some().then_some(self.region.as_deref()).flatten();

        let sts = base
            .connector
            .build_sts(
                base.profile.as_deref(),
                sts_region,
                endpoint.as_deref(),
                &base.user_agent,
            )
            .await?;

        let mut refresher = AssumeRoleRefresher::new(sts, &self.role_arn, &self.session_name)?
            .with_retry(self.retry.clone());
        if let Some(policy) = &self.session_policy {
            refresher = refresher.with_session_policy(policy.clone());
        }
        if let Some(external_id) = &self.external_id {
            refresher = refresher.with_external_id(external_id);
        }

        let mut credentials = RefreshableCredentials::seed(Arc::new(refresher)).await?;
        if let Some(margin) = self.refresh_margin {
            credentials = credentials.with_margin(margin);
        }

        Ok(Session {
            connector: base.connector.clone(),
            cache: base.cache.clone(),
            region: self.region.clone().or_else(|| base.region.clone()),
            profile: base.profile.clone(),
            fallback_region: base.fallback_region.clone(),
            credentials: Some(Arc::new(credentials)),
            user_agent: base.user_agent.clone(),
        })
    }
}
