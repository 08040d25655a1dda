//! Refreshable credential state for assumed identities.
//!
//! This module provides the [`CredentialSnapshot`] value, the
//! [`RefreshCredentials`] trait implemented by credential producers, and the
//! [`RefreshableCredentials`] wrapper that guarantees readers never observe an
//! expired snapshot: a read that finds the snapshot stale refreshes it inline
//! before returning.

use crate::{Result, SessionmuxError};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use tokio::sync::RwLock;

/// How long before expiry a snapshot is considered stale and refreshed.
///
/// Matches the provider SDKs' advisory refresh window. A refresh failure
/// inside this window is tolerated until the snapshot hard-expires.
const DEFAULT_REFRESH_MARGIN_SECS: i64 = 15 * 60;

/// An immutable set of temporary credentials with an absolute expiry.
///
/// A new snapshot entirely replaces the previous one on refresh; fields are
/// never mutated in place.
///
/// # Security
///
/// The `Debug` representation redacts the secret key and session token.
/// Secrets are never logged.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct CredentialSnapshot {
    /// Access key id
    pub access_key_id: String,
    /// Secret access key
    pub secret_access_key: String,
    /// Session token bound to the assumed identity
    pub session_token: String,
    /// Absolute wall-clock expiry (UTC)
    pub expiry: DateTime<Utc>,
}

impl CredentialSnapshot {
    /// Creates a snapshot from its field values.
    pub fn new(
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
        session_token: impl Into<String>,
        expiry: DateTime<Utc>,
    ) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
            session_token: session_token.into(),
            expiry,
        }
    }

    /// True once the expiry time has passed.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expiry
    }

    /// True when the snapshot is expired or within `margin` of expiry.
    pub fn needs_refresh(&self, now: DateTime<Utc>, margin: Duration) -> bool {
        now + margin >= self.expiry
    }

    /// Expiry in RFC 3339 form, stable across processes.
    pub fn expiry_rfc3339(&self) -> String {
        self.expiry.to_rfc3339()
    }

    /// Value hash over every field, used for client cache keying.
    ///
    /// Two snapshots with identical field values produce the same fingerprint
    /// regardless of object identity; any field difference changes it.
    pub fn fingerprint(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.hash(&mut hasher);
        hasher.finish()
    }
}

impl fmt::Debug for CredentialSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialSnapshot")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("session_token", &"<redacted>")
            .field("expiry", &self.expiry)
            .finish()
    }
}

/// Produces a fresh [`CredentialSnapshot`].
///
/// Implementations perform the provider round-trip (role assumption) and
/// either return a complete snapshot or an error; a partial snapshot is never
/// produced.
#[async_trait]
pub trait RefreshCredentials: Send + Sync {
    /// Fetches a new snapshot from the credential source.
    async fn refresh(&self) -> Result<CredentialSnapshot>;
}

/// A credential identity whose snapshot is renewed transparently on read.
///
/// The snapshot is held behind an `RwLock<Arc<...>>` and replaced by handle
/// swap, so concurrent readers either see the prior complete snapshot or a
/// fully refreshed one, never partial field updates.
///
/// # Refresh semantics
///
/// - [`current`](Self::current) returns the held snapshot unchanged while it
///   is outside the refresh margin.
/// - A stale read refreshes inline under the write lock before returning;
///   concurrent stale readers coalesce into one refresh.
/// - If refresh fails but the old snapshot has not hard-expired yet, the old
///   snapshot is returned and a warning is logged. Once it has expired, the
///   refresh error propagates; nothing is cached about the failure, so the
///   next read retries from scratch.
pub struct RefreshableCredentials {
    snapshot: RwLock<Arc<CredentialSnapshot>>,
    refresher: Arc<dyn RefreshCredentials>,
    method: &'static str,
    margin: Duration,
}

impl RefreshableCredentials {
    /// Seeds the identity with an eager initial refresh.
    ///
    /// Failing here rather than on first use keeps invalid role configuration
    /// attributable to session construction.
    ///
    /// # Errors
    ///
    /// Propagates the refresher's error if the initial fetch fails.
    pub async fn seed(refresher: Arc<dyn RefreshCredentials>) -> Result<Self> {
        let initial = refresher.refresh().await?;
        Ok(Self {
            snapshot: RwLock::new(Arc::new(initial)),
            refresher,
            method: "role-assumption",
            margin: Duration::seconds(DEFAULT_REFRESH_MARGIN_SECS),
        })
    }

    /// Overrides the refresh margin. Mainly for tests that pin staleness.
    pub fn with_margin(mut self, margin: Duration) -> Self {
        self.margin = margin;
        self
    }

    /// The refresh method tag, `"role-assumption"`.
    pub fn method(&self) -> &'static str {
        self.method
    }

    /// Returns the current snapshot, refreshing first if it is stale.
    ///
    /// Readers never observe an expired snapshot as current.
    ///
    /// # Errors
    ///
    /// Propagates the refresh error when the held snapshot has hard-expired
    /// and the refresher fails.
    pub async fn current(&self) -> Result<Arc<CredentialSnapshot>> {
        {
            let snapshot = self.snapshot.read().await;
            if !snapshot.needs_refresh(Utc::now(), self.margin) {
                return Ok(snapshot.clone());
            }
        }

        let mut snapshot = self.snapshot.write().await;

        // another reader may have refreshed while we waited on the lock
        let now = Utc::now();
        if !snapshot.needs_refresh(now, self.margin) {
            return Ok(snapshot.clone());
        }

        match self.refresher.refresh().await {
            Ok(fresh) => {
                tracing::debug!(
                    method = self.method,
                    expiry = %fresh.expiry_rfc3339(),
                    "refreshed credentials"
                );
                *snapshot = Arc::new(fresh);
                Ok(snapshot.clone())
            }
            Err(err) if !snapshot.is_expired_at(now) => {
                tracing::warn!(
                    method = self.method,
                    error = %err,
                    expiry = %snapshot.expiry_rfc3339(),
                    "credential refresh failed, keeping still-valid snapshot"
                );
                Ok(snapshot.clone())
            }
            Err(err) => Err(err),
        }
    }
}

impl fmt::Debug for RefreshableCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RefreshableCredentials")
            .field("method", &self.method)
            .field("margin", &self.margin)
            .finish_non_exhaustive()
    }
}

/// A refresher returning a fixed snapshot. Useful as a stand-in where
/// credentials are known ahead of time (tests, pre-issued credentials).
pub struct StaticRefresher {
    snapshot: CredentialSnapshot,
}

impl StaticRefresher {
    /// Wraps a snapshot so it can seed a [`RefreshableCredentials`].
    pub fn new(snapshot: CredentialSnapshot) -> Self {
        Self { snapshot }
    }
}

#[async_trait]
impl RefreshCredentials for StaticRefresher {
    async fn refresh(&self) -> Result<CredentialSnapshot> {
        if self.snapshot.is_expired_at(Utc::now()) {
            return Err(SessionmuxError::Configuration(
                "static credentials have expired".to_string(),
            ));
        }
        Ok(self.snapshot.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn snapshot(expiry: DateTime<Utc>) -> CredentialSnapshot {
        CredentialSnapshot::new("AKIATEST", "secret", "token", expiry)
    }

    struct CountingRefresher {
        calls: AtomicUsize,
        ttl: Duration,
    }

    #[async_trait]
    impl RefreshCredentials for CountingRefresher {
        async fn refresh(&self) -> Result<CredentialSnapshot> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(CredentialSnapshot::new(
                format!("AKIA{n}"),
                "secret",
                "token",
                Utc::now() + self.ttl,
            ))
        }
    }

    struct FailingRefresher;

    #[async_trait]
    impl RefreshCredentials for FailingRefresher {
        async fn refresh(&self) -> Result<CredentialSnapshot> {
            Err(SessionmuxError::Authorization("access denied".to_string()))
        }
    }

    #[test]
    fn test_fingerprint_tracks_field_values() {
        let expiry = Utc::now() + Duration::hours(1);
        let a = snapshot(expiry);
        let b = snapshot(expiry);
        assert_eq!(a.fingerprint(), b.fingerprint());

        let mut c = snapshot(expiry);
        c.session_token = "other-token".to_string();
        assert_ne!(a.fingerprint(), c.fingerprint());

        let d = snapshot(expiry + Duration::seconds(1));
        assert_ne!(a.fingerprint(), d.fingerprint());
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let s = CredentialSnapshot::new("AKIATEST", "s3cr3t-value", "t0ken-value", Utc::now());
        let rendered = format!("{s:?}");
        assert!(rendered.contains("AKIATEST"));
        assert!(rendered.contains("<redacted>"));
        assert!(!rendered.contains("s3cr3t-value"));
        assert!(!rendered.contains("t0ken-value"));
    }

    #[tokio::test]
    async fn test_valid_snapshot_not_refreshed() {
        let refresher = Arc::new(CountingRefresher {
            calls: AtomicUsize::new(0),
            ttl: Duration::hours(1),
        });
        let creds = RefreshableCredentials::seed(refresher.clone())
            .await
            .unwrap();
        assert_eq!(refresher.calls.load(Ordering::SeqCst), 1);

        let first = creds.current().await.unwrap();
        let second = creds.current().await.unwrap();

        // seed was the only refresh
        assert_eq!(refresher.calls.load(Ordering::SeqCst), 1);
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_stale_snapshot_refreshed_once() {
        let refresher = Arc::new(CountingRefresher {
            calls: AtomicUsize::new(0),
            ttl: Duration::hours(1),
        });
        // margin wider than the first snapshot's ttl forces one refresh
        let creds = RefreshableCredentials::seed(refresher.clone())
            .await
            .unwrap()
            .with_margin(Duration::hours(2));

        let fresh = creds.current().await.unwrap();
        assert_eq!(refresher.calls.load(Ordering::SeqCst), 2);
        assert_eq!(fresh.access_key_id, "AKIA1");
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_unexpired_snapshot() {
        let seed = Arc::new(StaticRefresher::new(snapshot(
            Utc::now() + Duration::minutes(5),
        )));
        let creds = RefreshableCredentials::seed(seed).await.unwrap();

        // swap in a failing refresher by rebuilding around the same snapshot
        let held = creds.current().await.unwrap();
        let creds = RefreshableCredentials {
            snapshot: RwLock::new(Arc::new((*held).clone())),
            refresher: Arc::new(FailingRefresher),
            method: "role-assumption",
            margin: Duration::minutes(10),
        };

        // inside the margin: refresh fails but the snapshot is still valid
        let got = creds.current().await.unwrap();
        assert_eq!(got.access_key_id, "AKIATEST");
    }

    #[tokio::test]
    async fn test_failed_refresh_of_expired_snapshot_propagates() {
        let creds = RefreshableCredentials {
            snapshot: RwLock::new(Arc::new(snapshot(Utc::now() - Duration::minutes(1)))),
            refresher: Arc::new(FailingRefresher),
            method: "role-assumption",
            margin: Duration::minutes(10),
        };

        let err = creds.current().await.unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Authorization);
    }

    #[tokio::test]
    async fn test_method_tag() {
        let seed = Arc::new(StaticRefresher::new(snapshot(Utc::now() + Duration::hours(1))));
        let creds = RefreshableCredentials::seed(seed).await.unwrap();
        assert_eq!(creds.method(), "role-assumption");
    }
}
