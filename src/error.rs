//! Error types for sessionmux operations.

use thiserror::Error;

/// Result type alias using [`SessionmuxError`].
pub type Result<T> = std::result::Result<T, SessionmuxError>;

/// Coarse error classification.
///
/// Retry policies are configured with the set of kinds they consider
/// transient; everything else propagates immediately.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Invalid or missing configuration (role ARN, policy document, region).
    Configuration,
    /// Transient rate limiting by the identity service.
    Throttling,
    /// The identity service rejected the caller (trust policy, external id).
    Authorization,
    /// A service client could not be constructed.
    Construction,
    /// An input failed validation before any network call.
    InvalidName,
    /// Serialization failure (session policy documents).
    Serialization,
    /// Anything else.
    Other,
}

/// Errors that can occur while building sessions, refreshing credentials,
/// or constructing service clients.
///
/// All errors implement `std::error::Error` and can be chained with `source()`.
#[derive(Debug, Error)]
pub enum SessionmuxError {
    /// Invalid or missing configuration, surfaced before or at refresh time.
    /// Never retried.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The identity service throttled the request. Retried with backoff by
    /// the retry policy; exhaustion surfaces this error.
    #[error("throttled by identity service: {0}")]
    Throttling(String),

    /// The identity service refused the request (invalid trust relationship,
    /// wrong external id). Never retried.
    #[error("authorization rejected: {0}")]
    Authorization(String),

    /// A service client could not be constructed for the given service/region.
    #[error("failed to build {service} client in {region}: {source}")]
    ClientConstruction {
        /// Service identifier (e.g. "ec2")
        service: String,
        /// Region the client was requested in
        region: String,
        /// Underlying error
        #[source]
        source: Box<SessionmuxError>,
    },

    /// Role assumption failed for the named role.
    #[error("assume role {role_arn}: {source}")]
    AssumeRole {
        /// Role that was being assumed
        role_arn: String,
        /// Underlying error
        #[source]
        source: Box<SessionmuxError>,
    },

    /// A name (role ARN, session name, service) contains invalid characters.
    #[error("invalid name: {0}")]
    InvalidName(String),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Other error (catch-all).
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl SessionmuxError {
    /// Returns the coarse classification of this error.
    ///
    /// Wrapping variants report the kind of their innermost cause so retry
    /// decisions survive context wrapping.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Configuration(_) => ErrorKind::Configuration,
            Self::Throttling(_) => ErrorKind::Throttling,
            Self::Authorization(_) => ErrorKind::Authorization,
            Self::ClientConstruction { source, .. } => match source.kind() {
                ErrorKind::Other => ErrorKind::Construction,
                kind => kind,
            },
            Self::AssumeRole { source, .. } => source.kind(),
            Self::InvalidName(_) => ErrorKind::InvalidName,
            Self::Json(_) => ErrorKind::Serialization,
            Self::Other(_) => ErrorKind::Other,
        }
    }

    /// Returns true if this error is a transient throttling failure.
    pub fn is_throttling(&self) -> bool {
        self.kind() == ErrorKind::Throttling
    }

    /// Wraps an error with the service/region it was raised for.
    pub fn client_construction(
        service: impl Into<String>,
        region: impl Into<String>,
        err: SessionmuxError,
    ) -> Self {
        Self::ClientConstruction {
            service: service.into(),
            region: region.into(),
            source: Box::new(err),
        }
    }

    /// Wraps an error with the role ARN that was being assumed.
    pub fn assume_role(role_arn: impl Into<String>, err: SessionmuxError) -> Self {
        Self::AssumeRole {
            role_arn: role_arn.into(),
            source: Box::new(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn test_error_display() {
        let err = SessionmuxError::Throttling("Rate exceeded".to_string());
        assert_eq!(err.to_string(), "throttled by identity service: Rate exceeded");
    }

    #[test]
    fn test_client_construction_error() {
        let inner = SessionmuxError::Configuration("bad region".to_string());
        let err = SessionmuxError::client_construction("ec2", "mars-north-1", inner);

        let error_string = err.to_string();
        assert!(error_string.contains("ec2"));
        assert!(error_string.contains("mars-north-1"));
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn test_kind_survives_wrapping() {
        let inner = SessionmuxError::Throttling("Rate exceeded".to_string());
        let err = SessionmuxError::assume_role("arn:aws:iam::1:role/Test", inner);

        assert!(err.is_throttling());
        assert!(err.source().is_some());
    }

    #[test]
    fn test_construction_kind_for_opaque_cause() {
        let inner = SessionmuxError::Other(anyhow::anyhow!("socket closed"));
        let err = SessionmuxError::client_construction("s3", "us-east-1", inner);

        assert_eq!(err.kind(), ErrorKind::Construction);
    }
}
