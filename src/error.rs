//! Error types shared across the toolkit
//!
//! Module-local failure modes (storage, frames, callback validation) have
//! their own enums next to the code that produces them; `AuthError` is the
//! top-level type surfaced to the UI layer by the orchestrator and the HTTP
//! augmentation. Recoverable conditions never reach here; they are absorbed
//! into absent/false results at the component boundary.

use thiserror::Error;

use crate::oauth::FlowError;
use crate::platform::StorageError;

/// Top-level error surfaced to callers of the orchestrator and REST client
#[derive(Debug, Error)]
pub enum AuthError {
    /// HTTP transport failure (after retries were exhausted)
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Server rejected the request with 401; the unauthorized callback has
    /// already fired
    #[error("unauthorized")]
    Unauthorized,

    /// Non-success response carrying a human-readable detail
    #[error("{0}")]
    Server(String),

    /// OAuth callback / flow failure
    #[error(transparent)]
    Flow(#[from] FlowError),

    /// Session storage failed where it was required (not the token
    /// fallback, which is always best-effort)
    #[error(transparent)]
    Storage(#[from] StorageError),
}
