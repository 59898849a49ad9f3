//! Auth session state and orchestration
//!
//! - [`user`]: read-only user projection (backend responses or token claims)
//! - [`orchestrator`]: the loading/authenticated/unauthenticated state
//!   machine with direct and BFF wiring
//! - [`watcher`]: cancellable polling bridge for externally managed tokens

pub mod orchestrator;
pub mod user;
pub mod watcher;

pub use orchestrator::{AuthSession, AuthState, Credentials, SignupRequest};
pub use user::User;
pub use watcher::ExternalTokenWatcher;
