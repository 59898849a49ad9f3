//! OAuth wire types

use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine;
use serde::Deserialize;
use std::fmt;

/// Token endpoint response (RFC 6749)
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub id_token: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
}

/// Error body returned by the authorization server (RFC 6749 §5.2)
#[derive(Debug, Deserialize)]
pub struct OAuthErrorBody {
    pub error: String,
    #[serde(default)]
    pub error_description: Option<String>,
}

impl fmt::Display for OAuthErrorBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.error_description {
            Some(desc) => write!(f, "{}: {}", self.error, desc),
            None => write!(f, "{}", self.error),
        }
    }
}

/// Pre-authenticated registration link payload
///
/// A separate trusted origin base64/JSON-encodes this into the `state`
/// query parameter. It is exempt from CSRF comparison but only honored
/// inside a 120-second window around its timestamp.
#[derive(Debug, Clone, Deserialize)]
pub struct RegistrationToken {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(rename = "returnUrl", default)]
    pub return_url: Option<String>,
    /// Wall-clock epoch seconds at link creation
    pub ts: i64,
}

impl RegistrationToken {
    /// Seconds the registration window extends around `ts`
    pub const WINDOW_SECONDS: i64 = 120;

    /// Try to interpret a callback `state` value as a registration token
    ///
    /// Returns `None` for anything that is not a well-formed registration
    /// payload; callers then fall back to standard CSRF comparison.
    #[must_use]
    pub fn decode(state: &str) -> Option<Self> {
        let bytes = STANDARD
            .decode(state)
            .or_else(|_| URL_SAFE_NO_PAD.decode(state.trim_end_matches('=')))
            .ok()?;
        let token: Self = serde_json::from_slice(&bytes).ok()?;
        (token.kind == "registration").then_some(token)
    }

    /// True if `now` (epoch seconds) falls inside the acceptance window
    #[must_use]
    pub fn is_within_window(&self, now: i64) -> bool {
        (now - self.ts).abs() <= Self::WINDOW_SECONDS
    }
}

/// Query parameters delivered to the OAuth callback page
#[derive(Debug, Clone, Default)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

impl CallbackParams {
    /// Parse from a full callback URL
    #[must_use]
    pub fn from_url(callback_url: &str) -> Self {
        match url::Url::parse(callback_url) {
            Ok(parsed) => {
                let mut params = Self::default();
                for (key, value) in parsed.query_pairs() {
                    match key.as_ref() {
                        "code" => params.code = Some(value.into_owned()),
                        "state" => params.state = Some(value.into_owned()),
                        "error" => params.error = Some(value.into_owned()),
                        "error_description" => {
                            params.error_description = Some(value.into_owned());
                        }
                        _ => {}
                    }
                }
                params
            }
            Err(_) => Self::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for oauth::types.
    use super::*;

    #[test]
    fn parses_callback_url() {
        let params = CallbackParams::from_url(
            "https://app.example.com/auth/callback?code=abc&state=xyz",
        );
        assert_eq!(params.code.as_deref(), Some("abc"));
        assert_eq!(params.state.as_deref(), Some("xyz"));
        assert!(params.error.is_none());
    }

    #[test]
    fn parses_error_callback() {
        let params = CallbackParams::from_url(
            "https://app.example.com/auth/callback?error=access_denied&error_description=denied%20by%20user",
        );
        assert_eq!(params.error.as_deref(), Some("access_denied"));
        assert_eq!(params.error_description.as_deref(), Some("denied by user"));
    }

    #[test]
    fn decodes_registration_token() {
        let raw = STANDARD.encode(r#"{"type":"registration","returnUrl":"/welcome","ts":1700000000}"#);
        let token = RegistrationToken::decode(&raw).unwrap();
        assert_eq!(token.return_url.as_deref(), Some("/welcome"));
        assert_eq!(token.ts, 1_700_000_000);
    }

    #[test]
    fn rejects_non_registration_payloads() {
        // Random CSRF state values must not be mistaken for bypass tokens.
        assert!(RegistrationToken::decode("a1b2c3d4").is_none());

        let other = STANDARD.encode(r#"{"type":"something-else","ts":1}"#);
        assert!(RegistrationToken::decode(&other).is_none());

        let no_ts = STANDARD.encode(r#"{"type":"registration"}"#);
        assert!(RegistrationToken::decode(&no_ts).is_none());
    }

    #[test]
    fn registration_window() {
        let token = RegistrationToken { kind: "registration".into(), return_url: None, ts: 1000 };
        assert!(token.is_within_window(1030));
        assert!(token.is_within_window(1120));
        assert!(!token.is_within_window(1200));
        assert!(token.is_within_window(900));
    }

    #[test]
    fn oauth_error_display() {
        let body = OAuthErrorBody {
            error: "invalid_grant".into(),
            error_description: Some("refresh token revoked".into()),
        };
        assert_eq!(body.to_string(), "invalid_grant: refresh token revoked");

        let bare = OAuthErrorBody { error: "invalid_request".into(), error_description: None };
        assert_eq!(bare.to_string(), "invalid_request");
    }
}
