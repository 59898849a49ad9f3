//! Toolkit configuration
//!
//! Explicit constructor-built structs; optional behavior is layered on with
//! `with_` methods. Failure reporting stays callback-based
//! (`on_renewal_failure`, `on_unauthorized` live on the components that
//! invoke them), never ambient event emitters.

use std::time::Duration;

/// OAuth authorization-server configuration
///
/// `auth_service_url` is the server base (scheme + host, no trailing slash);
/// endpoint paths follow the `/oauth/authorize` / `/oauth/token` convention.
#[derive(Debug, Clone)]
pub struct OAuthConfig {
    /// Authorization server base URL (e.g. `https://auth.example.com`)
    pub auth_service_url: String,

    /// OAuth client ID
    pub client_id: String,

    /// Requested scopes (space-separated)
    pub scope: String,

    /// Path on the app origin the provider redirects back to
    pub callback_path: String,

    /// Path on the auth origin serving the silent-auth callback page
    pub silent_callback_path: String,
}

impl OAuthConfig {
    /// Create a configuration with the default scope and callback paths
    #[must_use]
    pub fn new(auth_service_url: impl Into<String>, client_id: impl Into<String>) -> Self {
        let auth_service_url = auth_service_url.into();
        Self {
            auth_service_url: auth_service_url.trim_end_matches('/').to_string(),
            client_id: client_id.into(),
            scope: "openid profile email".to_string(),
            callback_path: "/auth/callback".to_string(),
            silent_callback_path: "/auth/silent-callback".to_string(),
        }
    }

    /// Override the requested scopes
    #[must_use]
    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = scope.into();
        self
    }

    /// Override the app-origin callback path
    #[must_use]
    pub fn with_callback_path(mut self, path: impl Into<String>) -> Self {
        self.callback_path = path.into();
        self
    }

    /// Override the auth-origin silent callback path
    #[must_use]
    pub fn with_silent_callback_path(mut self, path: impl Into<String>) -> Self {
        self.silent_callback_path = path.into();
        self
    }

    /// The authorization endpoint
    #[must_use]
    pub fn authorize_url(&self) -> String {
        format!("{}/oauth/authorize", self.auth_service_url)
    }

    /// The token endpoint
    #[must_use]
    pub fn token_url(&self) -> String {
        format!("{}/oauth/token", self.auth_service_url)
    }

    /// Origin of the auth service (`scheme://host[:port]`)
    ///
    /// Used as the expected sender origin for silent-auth messages. Falls
    /// back to the configured URL when it does not parse.
    #[must_use]
    pub fn auth_origin(&self) -> String {
        match url::Url::parse(&self.auth_service_url) {
            Ok(parsed) => {
                let mut origin = format!(
                    "{}://{}",
                    parsed.scheme(),
                    parsed.host_str().unwrap_or_default()
                );
                if let Some(port) = parsed.port() {
                    origin.push_str(&format!(":{port}"));
                }
                origin
            }
            Err(_) => self.auth_service_url.clone(),
        }
    }
}

/// Backend-for-Frontend endpoints
///
/// All URLs are absolute; the BFF terminates OAuth server-side and the
/// browser only ever sees its session cookie.
#[derive(Debug, Clone)]
pub struct BffConfig {
    /// POST `{code, state}` after a successful silent auth
    pub token_exchange_url: String,

    /// GET returning the current `User` or 401
    pub user_info_url: String,

    /// Full-navigation login entry point
    pub login_url: String,

    /// Full-navigation logout entry point
    pub logout_url: String,

    /// Whether to try silent auth before the user-info check
    pub use_silent_auth: bool,
}

/// Silent-auth tuning knobs
#[derive(Debug, Clone)]
pub struct SilentAuthConfig {
    /// Bound on the whole attempt (default 5000 ms)
    pub timeout: Duration,

    /// Discriminant tag expected on callback messages
    pub message_type: String,
}

impl Default for SilentAuthConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(5000),
            message_type: "silent-auth-callback".to_string(),
        }
    }
}
