//! Process-wide service client cache.
//!
//! Clients are expensive to construct (configuration resolution, connection
//! pools), so they are memoized by the credential identity, service, and
//! region that govern them. When an identity's snapshot rotates, entries keyed
//! to the old snapshot become unreachable and a new entry is built on next
//! access; nothing is evicted eagerly.

use crate::credentials::CredentialSnapshot;
use crate::Result;
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::RwLock;

/// An opaque cached provider-service client handle.
///
/// Connectors return their own concrete handle types; callers that need the
/// concrete type downcast through [`as_any`](Self::as_any).
pub trait ServiceClient: fmt::Debug + Send + Sync {
    /// The service this client talks to (e.g. "ec2").
    fn service(&self) -> &str;

    /// The region the client was built for.
    fn region(&self) -> &str;

    /// Releases the client's resources. Called once per handle by
    /// [`ClientCache::close`].
    fn close(&self);

    /// Upcast for downcasting to the connector's concrete handle type.
    fn as_any(&self) -> &dyn Any;
}

/// The credential identity component of a cache key.
///
/// Base-identity sessions have no snapshot of their own (the provider SDK
/// chain resolves their credentials), so they key by profile; assumed
/// identities key by the frozen snapshot's value hash.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IdentityKey {
    /// Base identity resolved by the provider's default chain.
    Ambient {
        /// Named credentials profile, if any
        profile: Option<String>,
    },
    /// Assumed identity, keyed by [`CredentialSnapshot::fingerprint`].
    Assumed(u64),
}

impl IdentityKey {
    /// Derives the identity key from an optional frozen snapshot.
    pub fn from_snapshot(snapshot: Option<&CredentialSnapshot>, profile: Option<&str>) -> Self {
        match snapshot {
            Some(snapshot) => Self::Assumed(snapshot.fingerprint()),
            None => Self::Ambient {
                profile: profile.map(str::to_string),
            },
        }
    }
}

/// Cache key: (credential identity, service, region).
///
/// Two calls with identical credential values, service, and region always
/// produce equal keys regardless of object identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientCacheKey {
    /// Governing credential identity
    pub identity: IdentityKey,
    /// Service identifier
    pub service: String,
    /// Resolved region
    pub region: String,
}

impl ClientCacheKey {
    /// Builds a key from its parts.
    pub fn new(identity: IdentityKey, service: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            identity,
            service: service.into(),
            region: region.into(),
        }
    }
}

/// Concurrency-safe cache of service clients.
///
/// An explicit, constructible object with an injectable lifetime: the process
/// owns one instance and hands it to whatever constructs sessions, so tests
/// can run against isolated caches.
///
/// # Concurrency
///
/// `get_or_create` takes a read lock for the hit path and upgrades to the
/// write lock on miss, re-checking before constructing, so at most one
/// construction happens per key even under concurrent misses.
#[derive(Default)]
pub struct ClientCache {
    clients: RwLock<HashMap<ClientCacheKey, Arc<dyn ServiceClient>>>,
}

impl ClientCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached client for `key`, constructing and storing it if
    /// absent.
    ///
    /// # Errors
    ///
    /// Propagates the constructor's error; no entry is stored on failure.
    pub async fn get_or_create<F, Fut>(
        &self,
        key: ClientCacheKey,
        construct: F,
    ) -> Result<Arc<dyn ServiceClient>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Arc<dyn ServiceClient>>>,
    {
        if let Some(client) = self.clients.read().await.get(&key) {
            return Ok(client.clone());
        }

        let mut clients = self.clients.write().await;

        // a concurrent miss may have built the client while we waited
        if let Some(client) = clients.get(&key) {
            return Ok(client.clone());
        }

        tracing::debug!(service = %key.service, region = %key.region, "building service client");
        let client = construct().await?;
        clients.insert(key, client.clone());
        Ok(client)
    }

    /// Number of live cache entries.
    pub async fn len(&self) -> usize {
        self.clients.read().await.len()
    }

    /// True when the cache holds no entries.
    pub async fn is_empty(&self) -> bool {
        self.clients.read().await.is_empty()
    }

    /// Releases every cached handle and resets the mapping to empty.
    ///
    /// Safe on an empty cache. Callers must ensure no `get_or_create` caller
    /// still expects a stable handle across this call.
    pub async fn close(&self) {
        let mut clients = self.clients.write().await;
        let count = clients.len();
        for client in clients.values() {
            client.close();
        }
        clients.clear();
        if count > 0 {
            tracing::debug!(released = count, "closed client cache");
        }
    }
}

impl std::fmt::Debug for ClientCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientCache").finish_non_exhaustive()
    }
}
