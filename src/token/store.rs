//! Dual-layer token store
//!
//! Holds the bearer credential in an in-process cache backed by a
//! session-scoped key/value fallback. The cache is the source of truth; the
//! fallback only exists so a token survives a full page reload. Correctness
//! never depends on the fallback being available.

use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::debug;

use super::credential::Credential;
use crate::platform::KeyValueStore;

/// Default seconds-before-expiry at which a token counts as expiring soon
pub const DEFAULT_EXPIRY_BUFFER_SECONDS: i64 = 60;

const ACCESS_TOKEN_KEY: &str = "access_token";
const ACCESS_TOKEN_EXPIRY_KEY: &str = "access_token_expiry";

/// Two-tier holder of a bearer credential and its absolute expiry
///
/// Multiple stores with different key prefixes share one backing storage
/// without interfering.
pub struct TokenStore {
    storage: Arc<dyn KeyValueStore>,
    prefix: String,
    expiry_buffer_seconds: i64,
    cache: RwLock<Option<Credential>>,
}

impl TokenStore {
    /// Create a store namespaced under `prefix` with the default expiry
    /// buffer (60 s)
    #[must_use]
    pub fn new(storage: Arc<dyn KeyValueStore>, prefix: impl Into<String>) -> Self {
        Self::with_expiry_buffer(storage, prefix, DEFAULT_EXPIRY_BUFFER_SECONDS)
    }

    /// Create a store with a custom expiring-soon buffer
    #[must_use]
    pub fn with_expiry_buffer(
        storage: Arc<dyn KeyValueStore>,
        prefix: impl Into<String>,
        expiry_buffer_seconds: i64,
    ) -> Self {
        Self {
            storage,
            prefix: prefix.into(),
            expiry_buffer_seconds,
            cache: RwLock::new(None),
        }
    }

    fn key(&self, suffix: &str) -> String {
        format!("{}.{}", self.prefix, suffix)
    }

    /// Get the current credential if still valid
    ///
    /// Returns the cached credential when unexpired; otherwise attempts to
    /// hydrate from the persistent fallback, re-validates, and promotes it
    /// to cache. Any read failure or malformed persisted data yields
    /// `None`; this method never errors.
    pub async fn get(&self) -> Option<Credential> {
        {
            let cache = self.cache.read().await;
            if let Some(cred) = cache.as_ref() {
                if cred.is_valid() {
                    return Some(cred.clone());
                }
            }
        }

        let hydrated = self.hydrate()?;
        if !hydrated.is_valid() {
            return None;
        }

        *self.cache.write().await = Some(hydrated.clone());
        debug!("promoted persisted credential to cache");
        Some(hydrated)
    }

    /// Read the fallback layer, tolerating every failure mode
    fn hydrate(&self) -> Option<Credential> {
        let token = self.storage.get(&self.key(ACCESS_TOKEN_KEY)).ok()??;
        let expiry_raw = self.storage.get(&self.key(ACCESS_TOKEN_EXPIRY_KEY)).ok()??;
        let expiry_ms: i64 = expiry_raw.parse().ok()?;
        Credential::from_parts(token, expiry_ms)
    }

    /// Store a new credential expiring `ttl_seconds` from now
    ///
    /// The cache write always takes effect; the fallback write is
    /// best-effort and failures (quota, disabled storage) are swallowed.
    pub async fn set(&self, token: impl Into<String>, ttl_seconds: i64) {
        let credential = Credential::new(token, ttl_seconds);

        if let Err(e) = self
            .storage
            .set(&self.key(ACCESS_TOKEN_KEY), &credential.token)
            .and_then(|()| {
                self.storage.set(
                    &self.key(ACCESS_TOKEN_EXPIRY_KEY),
                    &credential.expires_at_ms().to_string(),
                )
            })
        {
            debug!(error = %e, "token fallback write failed, continuing memory-only");
        }

        *self.cache.write().await = Some(credential);
    }

    /// Wipe both layers unconditionally
    pub async fn clear(&self) {
        *self.cache.write().await = None;

        if let Err(e) = self
            .storage
            .remove(&self.key(ACCESS_TOKEN_KEY))
            .and_then(|()| self.storage.remove(&self.key(ACCESS_TOKEN_EXPIRY_KEY)))
        {
            debug!(error = %e, "token fallback clear failed");
        }
    }

    /// True if a credential exists and expires within the configured buffer
    ///
    /// `false` when no credential is held at all.
    pub async fn is_expiring_soon(&self) -> bool {
        match self.get().await {
            Some(cred) => cred.expires_within(self.expiry_buffer_seconds),
            None => false,
        }
    }

    /// Seconds until the current credential expires, if one is held
    pub async fn remaining_ttl(&self) -> Option<i64> {
        self.get().await.map(|cred| cred.remaining_ttl())
    }

    /// The configured expiring-soon buffer in seconds
    #[must_use]
    pub fn expiry_buffer(&self) -> i64 {
        self.expiry_buffer_seconds
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for token::store.
    use super::*;
    use crate::platform::{FailingStore, MemoryStore};

    fn store_on(storage: Arc<dyn KeyValueStore>) -> TokenStore {
        TokenStore::new(storage, "spa_auth")
    }

    #[tokio::test]
    async fn set_then_get_returns_token() {
        let store = store_on(Arc::new(MemoryStore::new()));
        store.set("tok_1", 3600).await;

        let cred = store.get().await.unwrap();
        assert_eq!(cred.token, "tok_1");
        assert!(!store.is_expiring_soon().await);
    }

    #[tokio::test]
    async fn survives_cache_loss_via_fallback() {
        let storage = Arc::new(MemoryStore::new());
        let first = store_on(storage.clone());
        first.set("tok_persist", 3600).await;

        // A fresh store instance simulates a page reload: only the fallback
        // layer survives.
        let second = store_on(storage);
        let cred = second.get().await.unwrap();
        assert_eq!(cred.token, "tok_persist");
    }

    #[tokio::test]
    async fn memory_only_when_storage_disabled() {
        // With persistent storage failing, set/get within one process
        // still works; a fresh instance sees nothing.
        let first = store_on(Arc::new(FailingStore));
        first.set("tok_mem", 3600).await;
        assert_eq!(first.get().await.unwrap().token, "tok_mem");

        let second = store_on(Arc::new(FailingStore));
        assert!(second.get().await.is_none());
    }

    #[tokio::test]
    async fn expired_token_is_absent() {
        let store = store_on(Arc::new(MemoryStore::new()));
        store.set("tok_old", -5).await;
        assert!(store.get().await.is_none());
        assert!(!store.is_expiring_soon().await);
        assert!(store.remaining_ttl().await.is_none());
    }

    #[tokio::test]
    async fn expiring_soon_boundary() {
        // A ttl inside the default 60 s buffer reports expiring soon,
        // ttl comfortably outside does not.
        let store = store_on(Arc::new(MemoryStore::new()));

        store.set("tok_short", 50).await;
        assert!(store.is_expiring_soon().await);

        store.set("tok_long", 120).await;
        assert!(!store.is_expiring_soon().await);
    }

    #[tokio::test]
    async fn clear_wipes_both_layers() {
        let storage = Arc::new(MemoryStore::new());
        let store = store_on(storage.clone());
        store.set("tok", 3600).await;

        store.clear().await;
        assert!(store.get().await.is_none());
        assert!(storage.is_empty());
    }

    #[tokio::test]
    async fn clear_tolerates_unavailable_fallback() {
        let store = store_on(Arc::new(FailingStore));
        store.set("tok", 3600).await;
        store.clear().await;
        assert!(store.get().await.is_none());
    }

    #[tokio::test]
    async fn malformed_persisted_expiry_is_absent() {
        let storage = Arc::new(MemoryStore::new());
        storage.set("spa_auth.access_token", "tok").unwrap();
        storage.set("spa_auth.access_token_expiry", "not-a-number").unwrap();

        let store = store_on(storage);
        assert!(store.get().await.is_none());
    }

    #[tokio::test]
    async fn prefixes_do_not_interfere() {
        let storage: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let a = TokenStore::new(storage.clone(), "app_a");
        let b = TokenStore::new(storage, "app_b");

        a.set("tok_a", 3600).await;
        assert!(b.get().await.is_none());

        b.set("tok_b", 3600).await;
        assert_eq!(a.get().await.unwrap().token, "tok_a");
        assert_eq!(b.get().await.unwrap().token, "tok_b");
    }

    #[tokio::test]
    async fn remaining_ttl_tracks_expiry() {
        let store = store_on(Arc::new(MemoryStore::new()));
        store.set("tok", 3600).await;

        let ttl = store.remaining_ttl().await.unwrap();
        assert!(ttl > 3590 && ttl <= 3600);
    }
}
