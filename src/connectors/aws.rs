//! AWS connector built on the official SDK.
//!
//! Service clients are represented by [`AwsClientHandle`], a cached, fully
//! resolved [`aws_config::SdkConfig`] plus the frozen credentials that govern
//! it. Callers downcast the handle and construct the typed service client
//! they need from `sdk_config()`; the expensive part (configuration
//! resolution, credential wiring) is what the cache amortizes.
//!
//! # Requirements
//!
//! - Base credentials configured via environment variables, the shared
//!   credentials file, or an instance role
//! - The `aws` cargo feature

use crate::cache::ServiceClient;
use crate::connector::{ClientSpec, Connector};
use crate::session::UserAgent;
use crate::sts::{AssumeRoleRequest, StsApi};
use crate::{CredentialSnapshot, Result, SessionmuxError};
use async_trait::async_trait;
use aws_sdk_sts::config::Credentials;
use aws_sdk_sts::error::ProvideErrorMetadata;
use std::any::Any;
use std::sync::Arc;

/// A cached AWS client handle: the resolved SDK configuration for one
/// (identity, service, region) combination.
#[derive(Debug)]
pub struct AwsClientHandle {
    service: String,
    region: String,
    config: aws_config::SdkConfig,
}

impl AwsClientHandle {
    /// The resolved SDK configuration; construct typed clients from it, e.g.
    /// `aws_sdk_s3::Client::new(handle.sdk_config())`.
    pub fn sdk_config(&self) -> &aws_config::SdkConfig {
        &self.config
    }
}

impl ServiceClient for AwsClientHandle {
    fn service(&self) -> &str {
        &self.service
    }

    fn region(&self) -> &str {
        &self.region
    }

    fn close(&self) {
        // connection pools are released when the last SdkConfig clone drops
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Identity-service client wrapping `aws_sdk_sts::Client`.
pub struct AwsSts {
    client: aws_sdk_sts::Client,
}

#[async_trait]
impl StsApi for AwsSts {
    async fn assume_role(&self, request: AssumeRoleRequest) -> Result<CredentialSnapshot> {
        let mut call = self
            .client
            .assume_role()
            .role_arn(&request.role_arn)
            .role_session_name(&request.role_session_name);
        if let Some(policy) = &request.policy {
            call = call.policy(policy);
        }
        if let Some(external_id) = &request.external_id {
            call = call.external_id(external_id);
        }

        let output = call.send().await.map_err(classify_sts_error)?;

        let credentials = output.credentials().ok_or_else(|| {
            SessionmuxError::Other(anyhow::anyhow!("assume role response carried no credentials"))
        })?;

        let expiration = credentials.expiration();
        let expiry =
            chrono::DateTime::from_timestamp(expiration.secs(), expiration.subsec_nanos())
                .ok_or_else(|| {
                    SessionmuxError::Other(anyhow::anyhow!(
                        "assume role response carried an unrepresentable expiration"
                    ))
                })?;

        Ok(CredentialSnapshot::new(
            credentials.access_key_id(),
            credentials.secret_access_key(),
            credentials.session_token(),
            expiry,
        ))
    }
}

fn classify_sts_error(
    err: aws_sdk_sts::error::SdkError<
        aws_sdk_sts::operation::assume_role::AssumeRoleError,
    >,
) -> SessionmuxError {
    let code = err.code().unwrap_or_default().to_string();
    let message = err
        .message()
        .map(str::to_string)
        .unwrap_or_else(|| code.clone());

    match code.as_str() {
        "Throttling" | "ThrottlingException" | "TooManyRequestsException" => {
            SessionmuxError::Throttling(message)
        }
        "AccessDenied" | "AccessDeniedException" | "ExpiredTokenException" => {
            SessionmuxError::Authorization(message)
        }
        "MalformedPolicyDocument"
        | "MalformedPolicyDocumentException"
        | "PackedPolicyTooLargeException"
        | "ValidationError"
        | "RegionDisabledException" => SessionmuxError::Configuration(message),
        _ => SessionmuxError::Other(anyhow::Error::new(err)),
    }
}

/// AWS implementation of [`Connector`].
#[derive(Debug, Clone, Copy, Default)]
pub struct AwsConnector;

impl AwsConnector {
    /// Creates the connector. Stateless; all state lives in the SDK configs
    /// it produces.
    pub fn new() -> Self {
        Self
    }
}

// The SDK emits the app name in the outgoing User-Agent header; this is how
// requests become attributable to the product and policy.
fn app_name(user_agent: &UserAgent) -> Result<aws_config::AppName> {
    aws_config::AppName::new(user_agent.app_name()).map_err(|err| {
        SessionmuxError::Configuration(format!("invalid client identification metadata: {err}"))
    })
}

#[async_trait]
impl Connector for AwsConnector {
    async fn build_client(&self, spec: ClientSpec<'_>) -> Result<Arc<dyn ServiceClient>> {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_config::Region::new(spec.region.to_string()))
            .app_name(app_name(spec.user_agent)?);

        if let Some(profile) = spec.profile {
            loader = loader.profile_name(profile);
        }

        // frozen assumed-role credentials pin the config; without them the
        // SDK's default chain resolves the base identity
        if let Some(snapshot) = spec.credentials {
            loader = loader.credentials_provider(Credentials::from_keys(
                snapshot.access_key_id.clone(),
                snapshot.secret_access_key.clone(),
                Some(snapshot.session_token.clone()),
            ));
        }

        if let Some(config) = spec.config {
            if let Some(endpoint) = &config.endpoint {
                loader = loader.endpoint_url(endpoint);
            }
            if let Some(timeout) = config.timeout {
                loader = loader.timeout_config(
                    aws_config::timeout::TimeoutConfig::builder()
                        .operation_timeout(timeout)
                        .build(),
                );
            }
        }

        let sdk = loader.load().await;
        Ok(Arc::new(AwsClientHandle {
            service: spec.service.to_string(),
            region: spec.region.to_string(),
            config: sdk,
        }))
    }

    async fn build_sts(
        &self,
        profile: Option<&str>,
        region: Option<&str>,
        endpoint: Option<&str>,
        user_agent: &UserAgent,
    ) -> Result<Arc<dyn StsApi>> {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .app_name(app_name(user_agent)?);

        if let Some(profile) = profile {
            loader = loader.profile_name(profile);
        }
        if let Some(region) = region {
            loader = loader.region(aws_config::Region::new(region.to_string()));
        }
        if let Some(endpoint) = endpoint {
            loader = loader.endpoint_url(endpoint);
        }

        let sdk = loader.load().await;
        Ok(Arc::new(AwsSts {
            client: aws_sdk_sts::Client::new(&sdk),
        }))
    }
}
