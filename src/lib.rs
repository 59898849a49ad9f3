//! Client-side authentication toolkit for single-page applications.
//!
//! Covers the auth concerns a browser-hosted app shares regardless of its
//! UI framework: access-token lifecycle with automatic renewal, the OAuth2
//! authorization-code flow (same-origin "direct" mode and cross-origin
//! "BFF + silent auth" mode), and an HTTP client that attaches bearer
//! tokens and retries transient failures.
//!
//! # Architecture
//!
//! ```text
//! AuthSession (session::orchestrator)
//!   ├── RestClient (http)            bearer attach, retry, 401 callback
//!   │     └── RenewalCoordinator     at-most-one in-flight renewal
//!   │           └── TokenStore       cache + session-storage fallback
//!   ├── OAuthFlowClient (oauth)      code flow, CSRF state, exchanges
//!   └── SilentAuthNegotiator         hidden-frame prompt=none handshake
//!
//! platform::{KeyValueStore, Navigator, FrameHost}
//!   capability traits over the ambient browser objects; inject fakes in
//!   tests or non-browser hosts
//! ```
//!
//! Components accept their dependencies explicitly; there is no ambient
//! global instance. Recoverable conditions (storage failures, renewal
//! failures, silent-auth timeouts) resolve to absent/false results, while
//! user-actionable ones (login rejection, callback validation) propagate
//! as [`AuthError`].

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::complexity, clippy::suspicious)]

pub mod config;
pub mod error;
pub mod http;
pub mod oauth;
pub mod platform;
pub mod session;
pub mod token;

// Re-export commonly used types for convenience
// ------------------------
pub use config::{BffConfig, OAuthConfig, SilentAuthConfig};
pub use error::AuthError;
pub use http::RestClient;
pub use oauth::{OAuthFlowClient, SilentAuthNegotiator, SilentAuthOutcome};
pub use session::{AuthSession, AuthState, ExternalTokenWatcher, User};
pub use token::{Credential, RenewalCoordinator, TokenStore};
