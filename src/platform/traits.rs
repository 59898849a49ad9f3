//! Traits for host-environment capabilities
//!
//! These traits enable dependency injection and testing by abstracting the
//! ambient objects a browser host would normally provide (session storage,
//! location/navigation, hidden iframes and their message events).

use async_trait::async_trait;
use thiserror::Error;

/// Error type for key/value storage operations
///
/// Storage is treated as an unreliable optimization everywhere in the
/// toolkit: callers either swallow these errors (token persistence) or
/// surface them as a validation failure (OAuth session state).
#[derive(Debug, Error)]
pub enum StorageError {
    /// Backing storage is not available (disabled storage, private browsing,
    /// non-browser host)
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// A write was rejected (e.g. quota exceeded)
    #[error("storage write failed: {0}")]
    WriteFailed(String),
}

/// Session-scoped key/value storage
///
/// Models `sessionStorage`: string keys and values, lost when the browsing
/// session ends. Implementations must be cheap to call; no I/O beyond the
/// host storage API is expected.
pub trait KeyValueStore: Send + Sync {
    /// Read a value. `Ok(None)` means the key is absent.
    ///
    /// # Errors
    /// Returns error if the backing storage cannot be read at all.
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Write a value.
    ///
    /// # Errors
    /// Returns error if the write is rejected or storage is unavailable.
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Remove a key. Removing an absent key is not an error.
    ///
    /// # Errors
    /// Returns error if storage is unavailable.
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

/// Navigation and location capabilities of the embedding document
pub trait Navigator: Send + Sync {
    /// Origin of the current document (`scheme://host[:port]`, no trailing
    /// slash)
    fn origin(&self) -> String;

    /// Path (plus query) of the current document, used as the default
    /// post-login return path
    fn current_path(&self) -> String;

    /// Perform a full-page navigation. Does not return control to the
    /// caller in a real browser; fakes simply record the URL.
    fn redirect(&self, url: &str);

    /// User agent string, consulted by the silent-auth blocking heuristic
    fn user_agent(&self) -> String {
        String::new()
    }
}

/// Error type for hidden-frame operations
#[derive(Debug, Error)]
pub enum FrameError {
    /// The host refused to create the frame
    #[error("failed to open hidden frame: {0}")]
    OpenFailed(String),
}

/// An event observed by the document embedding a hidden frame
#[derive(Debug, Clone)]
pub enum FrameEvent {
    /// A cross-document `message` event. `origin` is the sender origin as
    /// reported by the host; `payload` is the structured message data.
    Message {
        origin: String,
        payload: serde_json::Value,
    },

    /// The frame failed to load its document
    LoadError,
}

/// A live hidden frame plus the message events arriving at its parent
#[async_trait]
pub trait HiddenFrame: Send {
    /// Wait for the next event. `None` means no further events will be
    /// delivered (the caller's timeout bounds the overall wait).
    async fn next_event(&mut self) -> Option<FrameEvent>;

    /// Detach the frame and its listeners. Must be idempotent.
    fn close(&mut self);
}

/// Factory for invisible, non-interactive frames
#[async_trait]
pub trait FrameHost: Send + Sync {
    /// Create a hidden frame navigated to `url` and attach it to the
    /// document.
    ///
    /// # Errors
    /// Returns error if the frame cannot be created.
    async fn open(&self, url: &str) -> Result<Box<dyn HiddenFrame>, FrameError>;
}
