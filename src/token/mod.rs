//! Token lifecycle: credential storage and renewal
//!
//! - [`credential`]: bearer credential with absolute expiry, JWT claims decode
//! - [`store`]: dual-layer token store (in-process cache + session fallback)
//! - [`renewal`]: at-most-one-concurrent-renewal coordinator

pub mod credential;
pub mod renewal;
pub mod store;

pub use credential::{decode_jwt_claims, Credential};
pub use renewal::{AutoRefreshHandle, FreshToken, RenewalCoordinator, TokenFetcher};
pub use store::TokenStore;
