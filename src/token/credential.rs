//! Bearer credential with absolute expiry

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};

/// An opaque bearer token and the instant it stops being valid
///
/// Owned exclusively by the [`TokenStore`](super::TokenStore) for its
/// storage-key namespace; everything else only sees transient clones.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    /// Opaque bearer value sent as `Authorization: Bearer <token>`
    pub token: String,

    /// Absolute expiration instant (UTC)
    pub expires_at: DateTime<Utc>,
}

impl Credential {
    /// Create a credential expiring `ttl_seconds` from now
    #[must_use]
    pub fn new(token: impl Into<String>, ttl_seconds: i64) -> Self {
        Self {
            token: token.into(),
            expires_at: Utc::now() + Duration::seconds(ttl_seconds),
        }
    }

    /// Rebuild a credential from a persisted expiry timestamp (epoch ms)
    #[must_use]
    pub fn from_parts(token: impl Into<String>, expires_at_ms: i64) -> Option<Self> {
        let expires_at = DateTime::<Utc>::from_timestamp_millis(expires_at_ms)?;
        Some(Self {
            token: token.into(),
            expires_at,
        })
    }

    /// True if the credential is still valid right now
    #[must_use]
    pub fn is_valid(&self) -> bool {
        Utc::now() < self.expires_at
    }

    /// True if the credential expires within `buffer_seconds` of now
    #[must_use]
    pub fn expires_within(&self, buffer_seconds: i64) -> bool {
        Utc::now() + Duration::seconds(buffer_seconds) >= self.expires_at
    }

    /// Seconds until expiry (negative once expired)
    #[must_use]
    pub fn remaining_ttl(&self) -> i64 {
        (self.expires_at - Utc::now()).num_seconds()
    }

    /// Expiry as epoch milliseconds, the persisted representation
    #[must_use]
    pub fn expires_at_ms(&self) -> i64 {
        self.expires_at.timestamp_millis()
    }
}

/// Decode the payload segment of a JWT without verifying its signature
///
/// Verification is assumed to have happened server-side; this only surfaces
/// the claims for display and role projection. Any malformed input yields
/// `None`: an undecodable token is treated as "no credential", never an
/// error.
#[must_use]
pub fn decode_jwt_claims(token: &str) -> Option<serde_json::Value> {
    let payload = token.split('.').nth(1)?;
    let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
    serde_json::from_slice(&bytes).ok()
}
