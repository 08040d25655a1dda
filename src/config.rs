//! Configuration types for session factories.

use serde_json::Value;

/// Environment variable enabling region-specific identity-service endpoints.
///
/// Accepted truthy values are "yes" and "true" (case-insensitive). Regional
/// endpoints stay opt-in; the provider-global endpoint is the default.
pub const USE_STS_REGIONAL_ENV: &str = "SESSIONMUX_USE_STS_REGIONAL";

/// Environment variable whose value is appended to the default session name
/// as `<name>@<suffix>`, disambiguating co-running processes.
pub const SESSION_SUFFIX_ENV: &str = "SESSIONMUX_SESSION_SUFFIX";

/// Default role session name when none is configured.
pub const DEFAULT_SESSION_NAME: &str = "AccountResourceManager";

/// Region used when none is supplied anywhere in the configuration chain.
pub const DEFAULT_FALLBACK_REGION: &str = "us-east-1";

/// Identity-service endpoint policy, fixed at process start.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StsOptions {
    /// When true and a target region is known, role assumption goes through
    /// `https://sts.<region>.amazonaws.com` instead of the global endpoint.
    pub use_regional_endpoints: bool,
}

impl StsOptions {
    /// Reads the endpoint policy from [`USE_STS_REGIONAL_ENV`].
    pub fn from_env() -> Self {
        let enabled = std::env::var(USE_STS_REGIONAL_ENV)
            .map(|v| matches!(v.to_lowercase().as_str(), "yes" | "true"))
            .unwrap_or(false);

        Self {
            use_regional_endpoints: enabled,
        }
    }

    /// Creates a policy with regional endpoints explicitly enabled or disabled.
    pub fn regional(enabled: bool) -> Self {
        Self {
            use_regional_endpoints: enabled,
        }
    }
}

/// Configuration for a [`SessionFactory`](crate::SessionFactory).
///
/// One config produces many sessions; it is immutable once the factory is
/// constructed. Use the builder pattern:
///
/// ```
/// use sessionmux::SessionConfig;
/// use serde_json::json;
///
/// let config = SessionConfig::new()
///     .with_region("us-west-2")
///     .with_profile("audit")
///     .with_assume_role("arn:aws:iam::123456789012:role/Audit")
///     .with_external_id("vendor-42")
///     .with_session_policy(json!({
///         "Version": "2012-10-17",
///         "Statement": [{"Effect": "Allow", "Action": "ec2:Describe*", "Resource": "*"}],
///     }));
/// ```
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Default region for sessions created by the factory.
    pub region: Option<String>,

    /// Named credentials profile for the base identity.
    pub profile: Option<String>,

    /// Role ARN to assume. When set, `create()` returns assumed-role sessions
    /// unless the caller opts out.
    pub assume_role: Option<String>,

    /// External id required by some cross-account trust policies.
    pub external_id: Option<String>,

    /// Session policy document restricting the assumed session's effective
    /// permissions. Serialized to JSON in the assume-role request.
    pub session_policy: Option<Value>,

    /// Role session name sent with every assume-role request.
    pub session_name: String,

    /// Region used when neither the call, the config, nor the base session
    /// supplies one.
    pub fallback_region: String,

    /// Identity-service endpoint policy.
    pub sts: StsOptions,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            region: None,
            profile: None,
            assume_role: None,
            external_id: None,
            session_policy: None,
            session_name: default_session_name(),
            fallback_region: DEFAULT_FALLBACK_REGION.to_string(),
            sts: StsOptions::from_env(),
        }
    }
}

impl SessionConfig {
    /// Creates a configuration with defaults: no region, no profile, no role
    /// assumption, session name from [`DEFAULT_SESSION_NAME`] plus any
    /// [`SESSION_SUFFIX_ENV`] suffix, endpoint policy from the environment.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the default region for created sessions.
    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    /// Sets the named credentials profile used for the base identity.
    pub fn with_profile(mut self, profile: impl Into<String>) -> Self {
        self.profile = Some(profile.into());
        self
    }

    /// Sets the role ARN to assume.
    pub fn with_assume_role(mut self, role_arn: impl Into<String>) -> Self {
        self.assume_role = Some(role_arn.into());
        self
    }

    /// Sets the external id passed with the assume-role request.
    pub fn with_external_id(mut self, external_id: impl Into<String>) -> Self {
        self.external_id = Some(external_id.into());
        self
    }

    /// Sets the session policy document.
    pub fn with_session_policy(mut self, policy: Value) -> Self {
        self.session_policy = Some(policy);
        self
    }

    /// Overrides the role session name.
    pub fn with_session_name(mut self, name: impl Into<String>) -> Self {
        self.session_name = name.into();
        self
    }

    /// Overrides the fallback region.
    pub fn with_fallback_region(mut self, region: impl Into<String>) -> Self {
        self.fallback_region = region.into();
        self
    }

    /// Overrides the identity-service endpoint policy.
    pub fn with_sts_options(mut self, sts: StsOptions) -> Self {
        self.sts = sts;
        self
    }
}

fn default_session_name() -> String {
    match std::env::var(SESSION_SUFFIX_ENV) {
        Ok(suffix) if !suffix.is_empty() => format!("{DEFAULT_SESSION_NAME}@{suffix}"),
        _ => DEFAULT_SESSION_NAME.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_config_builder() {
        let config = SessionConfig::new()
            .with_region("us-west-2")
            .with_profile("audit")
            .with_assume_role("arn:aws:iam::123456789012:role/Audit")
            .with_external_id("vendor-42")
            .with_session_policy(json!({"Version": "2012-10-17"}))
            .with_fallback_region("eu-west-1");

        assert_eq!(config.region.as_deref(), Some("us-west-2"));
        assert_eq!(config.profile.as_deref(), Some("audit"));
        assert_eq!(
            config.assume_role.as_deref(),
            Some("arn:aws:iam::123456789012:role/Audit")
        );
        assert_eq!(config.external_id.as_deref(), Some("vendor-42"));
        assert!(config.session_policy.is_some());
        assert_eq!(config.fallback_region, "eu-west-1");
    }

    #[test]
    fn test_default_config() {
        let config = SessionConfig::default();
        assert!(config.region.is_none());
        assert!(config.assume_role.is_none());
        assert!(config.session_name.starts_with(DEFAULT_SESSION_NAME));
        assert_eq!(config.fallback_region, DEFAULT_FALLBACK_REGION);
    }

    #[test]
    fn test_sts_options_explicit() {
        assert!(StsOptions::regional(true).use_regional_endpoints);
        assert!(!StsOptions::regional(false).use_regional_endpoints);
        assert!(!StsOptions::default().use_regional_endpoints);
    }
}
