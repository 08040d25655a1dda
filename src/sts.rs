//! Role assumption against the provider identity service.
//!
//! [`StsApi`] is the consumed interface to the identity service's AssumeRole
//! operation; [`AssumeRoleRefresher`] drives it to produce credential
//! snapshots, retrying throttling failures only.

use crate::config::StsOptions;
use crate::credentials::{CredentialSnapshot, RefreshCredentials};
use crate::retry::RetryPolicy;
use crate::validation::{validate_role_arn, validate_session_name};
use crate::{Result, SessionmuxError};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

/// An AssumeRole request payload.
///
/// `policy` carries the serialized session policy document; optional fields
/// are omitted from the provider request when `None`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssumeRoleRequest {
    /// Role to assume
    pub role_arn: String,
    /// Client session identifier
    pub role_session_name: String,
    /// Serialized session policy document
    pub policy: Option<String>,
    /// External id for cross-account trust policies
    pub external_id: Option<String>,
}

/// The identity-service role-assumption call, consumed by this crate.
///
/// Implementations map the provider response fields (`AccessKeyId`,
/// `SecretAccessKey`, `SessionToken`, `Expiration`) into a complete
/// [`CredentialSnapshot`], and classify provider errors into the crate's
/// error taxonomy so retry decisions can be made on [`kind`].
///
/// [`kind`]: crate::SessionmuxError::kind
#[async_trait]
pub trait StsApi: Send + Sync {
    /// Performs one AssumeRole round-trip.
    async fn assume_role(&self, request: AssumeRoleRequest) -> Result<CredentialSnapshot>;
}

/// Resolves the identity-service endpoint for a target region.
///
/// Returns a region-specific endpoint only when a region is known and the
/// process-wide regional flag is on; `None` means the provider-global
/// endpoint.
pub fn sts_endpoint(region: Option<&str>, options: StsOptions) -> Option<String> {
    match region {
        Some(region) if options.use_regional_endpoints => {
            Some(format!("https://sts.{region}.amazonaws.com"))
        }
        _ => None,
    }
}

/// Produces credential snapshots by assuming a role.
///
/// Holds everything the refresh needs explicitly: role, session name, policy
/// document, external id, and the identity-service client built from the base
/// session. Keeping the client alive here keeps the base session's transport
/// alive for as long as the derived session refreshes through it.
pub struct AssumeRoleRefresher {
    sts: Arc<dyn StsApi>,
    role_arn: String,
    session_name: String,
    session_policy: Option<Value>,
    external_id: Option<String>,
    retry: RetryPolicy,
}

impl AssumeRoleRefresher {
    /// Creates a refresher for the given role.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the role ARN or session name is
    /// malformed; nothing is sent to the provider in that case.
    pub fn new(
        sts: Arc<dyn StsApi>,
        role_arn: impl Into<String>,
        session_name: impl Into<String>,
    ) -> Result<Self> {
        let role_arn = role_arn.into();
        let session_name = session_name.into();
        validate_role_arn(&role_arn)?;
        validate_session_name(&session_name)?;

        Ok(Self {
            sts,
            role_arn,
            session_name,
            session_policy: None,
            external_id: None,
            retry: RetryPolicy::on_throttling(),
        })
    }

    /// Attaches a session policy document, serialized into each request.
    pub fn with_session_policy(mut self, policy: Value) -> Self {
        self.session_policy = Some(policy);
        self
    }

    /// Attaches an external id.
    pub fn with_external_id(mut self, external_id: impl Into<String>) -> Self {
        self.external_id = Some(external_id.into());
        self
    }

    /// Overrides the retry policy (throttling-only by default).
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// The role this refresher assumes.
    pub fn role_arn(&self) -> &str {
        &self.role_arn
    }

    fn request(&self) -> Result<AssumeRoleRequest> {
        let policy = self
            .session_policy
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        Ok(AssumeRoleRequest {
            role_arn: self.role_arn.clone(),
            role_session_name: self.session_name.clone(),
            policy,
            external_id: self.external_id.clone(),
        })
    }
}

#[async_trait]
impl RefreshCredentials for AssumeRoleRefresher {
    async fn refresh(&self) -> Result<CredentialSnapshot> {
        let request = self.request()?;

        tracing::debug!(role_arn = %self.role_arn, "assuming role");

        self.retry
            .run(|| {
                let request = request.clone();
                let sts = self.sts.clone();
                async move { sts.assume_role(request).await }
            })
            .await
            .map_err(|err| SessionmuxError::assume_role(&self.role_arn, err))
    }
}
