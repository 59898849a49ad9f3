//! CSRF state generation and session persistence
//!
//! The state value is round-tripped through the provider redirect to prove
//! the callback corresponds to a login this client initiated. Persisted
//! state is single-use: reading it also deletes it.

use std::sync::Arc;

use rand::RngCore;
use tracing::debug;

use crate::platform::{KeyValueStore, StorageError};

const STATE_KEY: &str = "oauth_state";
const RETURN_PATH_KEY: &str = "oauth_return_path";

/// Generate a fresh CSRF state: 32 random bytes, hex-encoded (256 bits)
#[must_use]
pub fn generate_state() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Session-scoped persistence for OAuth flow state
///
/// Keys live under the same prefix as the token store but use distinct
/// names, so one backing storage serves both without collision.
#[derive(Clone)]
pub struct SessionStateStore {
    storage: Arc<dyn KeyValueStore>,
    prefix: String,
}

impl SessionStateStore {
    #[must_use]
    pub fn new(storage: Arc<dyn KeyValueStore>, prefix: impl Into<String>) -> Self {
        Self { storage, prefix: prefix.into() }
    }

    fn key(&self, suffix: &str) -> String {
        format!("{}.{}", self.prefix, suffix)
    }

    /// Persist the CSRF state and return path for the pending login
    ///
    /// # Errors
    /// Returns error if storage is unavailable; unlike the token fallback,
    /// this write is required (without it the callback cannot validate).
    pub fn save(&self, state: &str, return_path: &str) -> Result<(), StorageError> {
        self.storage.set(&self.key(STATE_KEY), state)?;
        self.storage.set(&self.key(RETURN_PATH_KEY), return_path)?;
        Ok(())
    }

    /// Read the persisted CSRF state without consuming it
    ///
    /// Read failures surface as absent, which callers treat as a
    /// validation failure.
    #[must_use]
    pub fn peek_state(&self) -> Option<String> {
        self.storage.get(&self.key(STATE_KEY)).ok().flatten()
    }

    /// Delete the persisted CSRF state (single-use semantics)
    pub fn clear_state(&self) {
        if let Err(e) = self.storage.remove(&self.key(STATE_KEY)) {
            debug!(error = %e, "failed to clear persisted oauth state");
        }
    }

    /// Overwrite the stored return path (registration bypass honors the
    /// `returnUrl` it carries)
    pub fn set_return_path(&self, path: &str) {
        if let Err(e) = self.storage.set(&self.key(RETURN_PATH_KEY), path) {
            debug!(error = %e, "failed to store return path");
        }
    }

    /// Read and delete the stored return path
    #[must_use]
    pub fn take_return_path(&self) -> Option<String> {
        let path = self.storage.get(&self.key(RETURN_PATH_KEY)).ok().flatten();
        if let Err(e) = self.storage.remove(&self.key(RETURN_PATH_KEY)) {
            debug!(error = %e, "failed to clear return path");
        }
        path
    }
}
