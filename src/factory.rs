//! The user-facing session factory.

use crate::cache::ClientCache;
use crate::config::SessionConfig;
use crate::connector::Connector;
use crate::session::{AssumedSessionBuilder, Session, UserAgent};
use crate::Result;
use std::sync::Arc;

/// Callback invoked with every freshly constructed session, in registration
/// order, before the factory hands it out. Subscribers may mutate or
/// instrument the session.
pub type Subscriber = Box<dyn Fn(&mut Session) + Send + Sync>;

/// Produces sessions from one immutable [`SessionConfig`].
///
/// When the config carries a role ARN, `create` returns assumed-role sessions
/// with auto-renewing credentials; callers can opt out per call. Every
/// produced session is decorated with product identification metadata and run
/// past the registered subscribers. The factory retains no sessions.
///
/// # Example
///
/// ```no_run
/// use sessionmux::{SessionConfig, SessionFactory};
/// use sessionmux::connectors::mock::MockConnector;
/// use std::sync::Arc;
///
/// #[tokio::main]
/// async fn main() -> sessionmux::Result<()> {
///     let config = SessionConfig::new()
///         .with_region("us-east-1")
///         .with_assume_role("arn:aws:iam::123456789012:role/Audit");
///
///     let factory = SessionFactory::new(config, Arc::new(MockConnector::new()));
///     let session = factory.create().await?;
///     let ec2 = session.client("ec2").await?;
///     println!("{}", ec2.region());
///     Ok(())
/// }
/// ```
pub struct SessionFactory {
    config: SessionConfig,
    connector: Arc<dyn Connector>,
    cache: Arc<ClientCache>,
    subscribers: Vec<Subscriber>,
    policy_name: String,
}

impl SessionFactory {
    /// Creates a factory with its own client cache.
    pub fn new(config: SessionConfig, connector: Arc<dyn Connector>) -> Self {
        Self {
            config,
            connector,
            cache: Arc::new(ClientCache::new()),
            subscribers: Vec::new(),
            policy_name: String::new(),
        }
    }

    /// Uses a shared client cache instead of a private one. Lets several
    /// factories (or tests) govern one cache lifetime.
    pub fn with_cache(mut self, cache: Arc<ClientCache>) -> Self {
        self.cache = cache;
        self
    }

    /// The client cache governing sessions from this factory.
    pub fn cache(&self) -> &Arc<ClientCache> {
        &self.cache
    }

    /// The factory's immutable configuration.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Creates a session with the factory defaults: role assumption when
    /// configured, factory region.
    pub async fn create(&self) -> Result<Session> {
        self.create_with(true, None).await
    }

    /// Creates a session, optionally declining role assumption or overriding
    /// the region for this call only.
    ///
    /// # Errors
    ///
    /// Fails when role assumption is requested and the eager initial refresh
    /// is rejected (invalid trust relationship, bad external id, malformed
    /// policy).
    pub async fn create_with(&self, assume: bool, region: Option<&str>) -> Result<Session> {
        let effective_region = region.map(str::to_string).or_else(|| self.config.region.clone());

        let session = match (&self.config.assume_role, assume) {
            (Some(role_arn), true) => {
                // the base session reaches the identity service under the
                // configured profile; its region is irrelevant
                let base = Session::direct(
                    self.connector.clone(),
                    self.cache.clone(),
                    None,
                    self.config.profile.clone(),
                    &self.config.fallback_region,
                );

                let mut builder = AssumedSessionBuilder::new(role_arn, &self.config.session_name)
                    .with_sts_options(self.config.sts);
                if let Some(region) = &effective_region {
                    builder = builder.with_region(region);
                }
                if let Some(policy) = &self.config.session_policy {
                    builder = builder.with_session_policy(policy.clone());
                }
                if let Some(external_id) = &self.config.external_id {
                    builder = builder.with_external_id(external_id);
                }

                builder.build(&base).await?
            }
            _ => Session::direct(
                self.connector.clone(),
                self.cache.clone(),
                effective_region,
                self.config.profile.clone(),
                &self.config.fallback_region,
            ),
        };

        Ok(self.decorate(session))
    }

    /// Replaces the subscriber list wholesale. Not additive.
    pub fn set_subscribers(&mut self, subscribers: Vec<Subscriber>) {
        self.subscribers = subscribers;
    }

    /// Sets the human-readable policy label appended to the identification
    /// metadata of every session created afterwards. Write-only: the label
    /// exists purely to annotate outgoing requests.
    pub fn set_policy_name(&mut self, name: impl Into<String>) {
        self.policy_name = name.into();
    }

    fn decorate(&self, mut session: Session) -> Session {
        let mut user_agent = UserAgent::product();
        if !self.policy_name.is_empty() {
            user_agent.extra = Some(format!("policy#{}", self.policy_name));
        }
        session.set_user_agent(user_agent);

        for subscriber in &self.subscribers {
            subscriber(&mut session);
        }

        session
    }
}

impl std::fmt::Debug for SessionFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionFactory")
            .field("config", &self.config)
            .field("subscribers", &self.subscribers.len())
            .finish_non_exhaustive()
    }
}
