//! OAuth2 authorization-code and silent-auth flows
//!
//! - [`types`]: wire shapes (token response, provider errors, registration
//!   bypass token, callback parameters)
//! - [`state`]: CSRF state generation and session-scoped persistence
//! - [`flow`]: the authorization-code round trip (initiate, callback,
//!   code/refresh exchange, return-path tracking)
//! - [`silent`]: hidden-frame `prompt=none` handshake with timeout

pub mod flow;
pub mod silent;
pub mod state;
pub mod types;

pub use flow::{FlowError, OAuthFlowClient};
pub use silent::{likely_blocked, SilentAuthNegotiator, SilentAuthOutcome};
pub use state::{generate_state, SessionStateStore};
pub use types::{CallbackParams, OAuthErrorBody, RegistrationToken, TokenResponse};
