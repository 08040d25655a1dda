//! Input validation for identifiers that end up in provider API calls.

use crate::{Result, SessionmuxError};

/// Characters permitted in a role session name, per the identity service's
/// `[\w+=,.@-]` rule.
const SESSION_NAME_CHARS: &str = "+=,.@-_";

/// Session names must be between 2 and 64 characters.
const MAX_SESSION_NAME_LENGTH: usize = 64;
const MIN_SESSION_NAME_LENGTH: usize = 2;

/// Validates a role ARN before it is sent to the identity service.
///
/// This is a shape check, not an existence check: the ARN must use the
/// `arn:` prefix and name a role resource. Authorization failures are still
/// possible at assume time.
///
/// # Errors
///
/// Returns [`SessionmuxError::Configuration`] if validation fails.
///
/// # Example
///
/// ```
/// use sessionmux::validation::validate_role_arn;
///
/// assert!(validate_role_arn("arn:aws:iam::123456789012:role/Deploy").is_ok());
///
/// assert!(validate_role_arn("").is_err());
/// assert!(validate_role_arn("arn:aws:iam::123456789012:user/bob").is_err());
/// assert!(validate_role_arn("role/Deploy").is_err());
/// ```
pub fn validate_role_arn(arn: &str) -> Result<()> {
    if arn.is_empty() {
        return Err(SessionmuxError::Configuration(
            "role ARN cannot be empty".to_string(),
        ));
    }

    if !arn.starts_with("arn:") {
        return Err(SessionmuxError::Configuration(format!(
            "role ARN must start with 'arn:': {arn}"
        )));
    }

    if !arn.contains(":role/") {
        return Err(SessionmuxError::Configuration(format!(
            "ARN does not name a role resource: {arn}"
        )));
    }

    Ok(())
}

/// Validates a role session name.
///
/// The identity service enforces 2-64 characters from `[\w+=,.@-]`; rejecting
/// locally keeps the failure attributable to configuration rather than a
/// provider-side parameter error.
///
/// # Errors
///
/// Returns [`SessionmuxError::InvalidName`] if validation fails.
///
/// # Example
///
/// ```
/// use sessionmux::validation::validate_session_name;
///
/// assert!(validate_session_name("AccountResourceManager").is_ok());
/// assert!(validate_session_name("deploy@ci-runner-7").is_ok());
///
/// assert!(validate_session_name("x").is_err());
/// assert!(validate_session_name("name with spaces").is_err());
/// ```
pub fn validate_session_name(name: &str) -> Result<()> {
    if name.len() < MIN_SESSION_NAME_LENGTH {
        return Err(SessionmuxError::InvalidName(format!(
            "session name must be at least {MIN_SESSION_NAME_LENGTH} characters"
        )));
    }

    if name.len() > MAX_SESSION_NAME_LENGTH {
        return Err(SessionmuxError::InvalidName(format!(
            "session name exceeds maximum length of {MAX_SESSION_NAME_LENGTH} characters"
        )));
    }

    if let Some(c) = name
        .chars()
        .find(|c| !c.is_ascii_alphanumeric() && !SESSION_NAME_CHARS.contains(*c))
    {
        return Err(SessionmuxError::InvalidName(format!(
            "session name contains invalid character {c:?}"
        )));
    }

    Ok(())
}

/// Validates a service identifier used as part of a client cache key.
///
/// Service identifiers are the short lowercase names the provider SDK uses
/// ("ec2", "sts", "secretsmanager").
///
/// # Errors
///
/// Returns [`SessionmuxError::InvalidName`] if validation fails.
pub fn validate_service_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(SessionmuxError::InvalidName(
            "service name cannot be empty".to_string(),
        ));
    }

    if let Some(c) = name
        .chars()
        .find(|c| !c.is_ascii_lowercase() && !c.is_ascii_digit() && *c != '-')
    {
        return Err(SessionmuxError::InvalidName(format!(
            "service name contains invalid character {c:?}"
        )));
    }

    Ok(())
}
