//! Authenticated HTTP with transparent retry
//!
//! [`rest`] wraps `reqwest` with the concerns every API call in an
//! authenticated SPA shares: bearer attachment through the renewal
//! coordinator, bounded retry with exponential backoff, and a 401 side
//! channel for forcing re-authentication.

pub mod rest;

pub use rest::{RestClient, RestClientBuilder, UnauthorizedCallback};
