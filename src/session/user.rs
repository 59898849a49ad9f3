//! User projection

use serde::{Deserialize, Serialize};

use crate::token::decode_jwt_claims;

/// Read-only projection of the authenticated user
///
/// Derived either from a backend current-user response or decoded from
/// bearer-token claims; the orchestrator replaces it wholesale on each
/// successful check, never mutates it in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Subject identifier (`sub` in token claims)
    #[serde(alias = "sub")]
    pub id: String,

    #[serde(default)]
    pub email: Option<String>,

    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub roles: Vec<String>,

    #[serde(default, rename = "emailVerified", alias = "email_verified")]
    pub email_verified: bool,
}

impl User {
    /// Project a user out of a bearer token's claims
    ///
    /// Undecodable or incomplete claims yield `None`, treated as "no
    /// credential" rather than an error.
    #[must_use]
    pub fn from_claims(token: &str) -> Option<Self> {
        let claims = decode_jwt_claims(token)?;
        serde_json::from_value(claims).ok()
    }
}
