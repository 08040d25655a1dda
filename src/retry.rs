//! Retry with backoff for transient provider failures.

use crate::{ErrorKind, Result};
use std::collections::HashSet;
use std::future::Future;
use std::time::Duration;

/// Retries an operation when its error kind is in the configured transient
/// set, sleeping with exponential backoff between attempts.
///
/// Errors outside the set propagate immediately, as does the last error once
/// attempts are exhausted.
///
/// # Example
///
/// ```
/// use sessionmux::{RetryPolicy, SessionmuxError};
///
/// #[tokio::main]
/// async fn main() {
///     let policy = RetryPolicy::on_throttling();
///     let result = policy
///         .run(|| async { Err::<(), _>(SessionmuxError::Authorization("denied".into())) })
///         .await;
///
///     // authorization errors are not transient, no retry happened
///     assert!(result.is_err());
/// }
/// ```
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
    retryable: HashSet<ErrorKind>,
}

impl RetryPolicy {
    /// Creates a policy retrying the given error kinds.
    pub fn new(retryable: impl IntoIterator<Item = ErrorKind>) -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(10),
            retryable: retryable.into_iter().collect(),
        }
    }

    /// The policy used for identity-service calls: throttling only.
    pub fn on_throttling() -> Self {
        Self::new([ErrorKind::Throttling])
    }

    /// Sets the total number of attempts (first try included).
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    /// Sets the initial backoff delay; doubled after each retried failure.
    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    /// Caps the backoff delay.
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Runs `op`, retrying transient failures.
    pub async fn run<T, F, Fut>(&self, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut delay = self.base_delay;
        let mut attempt = 1;

        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if self.retryable.contains(&err.kind()) && attempt < self.max_attempts => {
                    tracing::debug!(
                        attempt,
                        max_attempts = self.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "transient failure, backing off"
                    );
                    tokio::time::sleep(delay).await;
                    delay = (delay * 2).min(self.max_delay);
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}
