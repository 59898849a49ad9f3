//! OAuth authorization-code flow client
//!
//! Drives one code round trip: generates and persists CSRF state, builds
//! the authorization redirect, validates the callback (standard state
//! comparison or the registration bypass), exchanges the code, and tracks
//! the post-login return path across the redirect.
//!
//! State machine: `idle → awaiting_callback → exchanging → complete`, with
//! `failed` reachable from any transition. Whatever the outcome, the
//! persisted CSRF state is cleared at callback time: it is single-use.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::state::{generate_state, SessionStateStore};
use super::types::{CallbackParams, OAuthErrorBody, RegistrationToken, TokenResponse};
use crate::config::OAuthConfig;
use crate::error::AuthError;
use crate::platform::{KeyValueStore, Navigator, StorageError};
use crate::token::{FreshToken, TokenFetcher};

/// Error type for the authorization-code flow
#[derive(Debug, Error)]
pub enum FlowError {
    /// The provider redirected back with an error parameter
    #[error("authentication failed: {0}")]
    Provider(String),

    /// Callback was missing the code or state parameter
    #[error("missing code or state parameter in callback")]
    MissingParams,

    /// Callback state did not match the persisted CSRF state
    #[error("possible CSRF detected, please retry login")]
    StateMismatch,

    /// Registration link timestamp fell outside the acceptance window
    #[error("link expired")]
    RegistrationExpired,

    /// Token endpoint rejected the exchange
    #[error("token exchange failed: {0}")]
    ExchangeFailed(String),

    /// Session storage failure while persisting flow state
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// HTTP transport failure
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
}

/// Client for the OAuth2 authorization-code round trip
pub struct OAuthFlowClient {
    config: OAuthConfig,
    http: reqwest::Client,
    navigator: Arc<dyn Navigator>,
    session: SessionStateStore,
}

impl OAuthFlowClient {
    /// Create a flow client
    ///
    /// `http` should carry a cookie store: the token endpoint sets the
    /// session/refresh cookie on exchange, standing in for the browser's
    /// `credentials: include`.
    #[must_use]
    pub fn new(
        config: OAuthConfig,
        http: reqwest::Client,
        navigator: Arc<dyn Navigator>,
        storage: Arc<dyn KeyValueStore>,
        storage_prefix: impl Into<String>,
    ) -> Self {
        let session = SessionStateStore::new(storage, storage_prefix);
        Self { config, http, navigator, session }
    }

    /// The redirect URI sent with authorization and exchange requests
    ///
    /// Always `{origin}{callback_path}`, computed at call time and never
    /// persisted.
    #[must_use]
    pub fn redirect_uri(&self) -> String {
        format!("{}{}", self.navigator.origin(), self.config.callback_path)
    }

    /// Begin a login: persist CSRF state and redirect to the provider
    ///
    /// `return_path` defaults to the current document path; it is restored
    /// by [`take_return_path`](Self::take_return_path) after the callback.
    ///
    /// # Errors
    /// Returns error if session storage rejects the state write; without
    /// it the callback could never validate.
    pub fn initiate_login(&self, return_path: Option<&str>) -> Result<(), FlowError> {
        let state = generate_state();
        let return_path = match return_path {
            Some(path) => path.to_string(),
            None => self.navigator.current_path(),
        };
        self.session.save(&state, &return_path)?;

        let params = [
            ("client_id", self.config.client_id.as_str()),
            ("redirect_uri", &self.redirect_uri()),
            ("response_type", "code"),
            ("scope", &self.config.scope),
            ("state", &state),
        ];
        let query = params
            .iter()
            .map(|(k, v)| format!("{k}={}", urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&");
        let url = format!("{}?{}", self.config.authorize_url(), query);

        info!("redirecting to authorization endpoint");
        self.navigator.redirect(&url);
        Ok(())
    }

    /// Handle the provider callback: validate state and exchange the code
    ///
    /// The persisted CSRF state is cleared on every outcome so a retry
    /// starts clean.
    ///
    /// # Errors
    /// Returns error on a provider error parameter, missing parameters,
    /// state mismatch, an expired registration link, or a failed exchange.
    pub async fn handle_callback(
        &self,
        params: &CallbackParams,
    ) -> Result<TokenResponse, FlowError> {
        let result = self.process_callback(params).await;
        self.session.clear_state();
        result
    }

    async fn process_callback(
        &self,
        params: &CallbackParams,
    ) -> Result<TokenResponse, FlowError> {
        if let Some(error) = &params.error {
            let detail = params.error_description.clone().unwrap_or_else(|| error.clone());
            return Err(FlowError::Provider(detail));
        }

        let (Some(code), Some(state)) = (&params.code, &params.state) else {
            return Err(FlowError::MissingParams);
        };

        if let Some(registration) = RegistrationToken::decode(state) {
            if !registration.is_within_window(Utc::now().timestamp()) {
                return Err(FlowError::RegistrationExpired);
            }
            // Pre-authenticated by a trusted origin; exempt from CSRF
            // comparison, but its return URL wins.
            info!("callback carries registration bypass token");
            if let Some(return_url) = &registration.return_url {
                self.session.set_return_path(return_url);
            }
        } else {
            match self.session.peek_state() {
                Some(expected) if expected == *state => {
                    debug!("callback state validated");
                }
                _ => return Err(FlowError::StateMismatch),
            }
        }

        self.exchange_code(code).await
    }

    /// Exchange an authorization code at the token endpoint
    async fn exchange_code(&self, code: &str) -> Result<TokenResponse, FlowError> {
        let form = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", &self.redirect_uri()),
            ("client_id", &self.config.client_id),
        ];

        let response = self.http.post(self.config.token_url()).form(&form).send().await?;
        Self::parse_token_response(response).await
    }

    /// Mint a new access token from the refresh-token cookie
    ///
    /// # Errors
    /// Returns error if the exchange is rejected (revoked session, missing
    /// cookie) or the transport fails.
    pub async fn exchange_refresh_token(&self) -> Result<TokenResponse, FlowError> {
        let form = [
            ("grant_type", "refresh_token"),
            ("client_id", &self.config.client_id),
        ];

        let response = self.http.post(self.config.token_url()).form(&form).send().await?;
        Self::parse_token_response(response).await
    }

    async fn parse_token_response(
        response: reqwest::Response,
    ) -> Result<TokenResponse, FlowError> {
        if !response.status().is_success() {
            let detail = match response.json::<OAuthErrorBody>().await {
                Ok(body) => body.to_string(),
                Err(_) => "authentication failed, please try again".to_string(),
            };
            return Err(FlowError::ExchangeFailed(detail));
        }

        response
            .json::<TokenResponse>()
            .await
            .map_err(|e| FlowError::ExchangeFailed(format!("malformed token response: {e}")))
    }

    /// Read and delete the stored post-login return path
    ///
    /// Defaults to `/` when nothing was stored.
    #[must_use]
    pub fn take_return_path(&self) -> String {
        self.session.take_return_path().unwrap_or_else(|| "/".to_string())
    }
}

/// Renewal strategy: the refresh-token exchange is how the coordinator
/// mints new access tokens.
#[async_trait]
impl TokenFetcher for OAuthFlowClient {
    async fn fetch(&self) -> Result<FreshToken, AuthError> {
        let response = self.exchange_refresh_token().await.map_err(|e| {
            warn!(error = %e, "refresh-token exchange failed");
            AuthError::Flow(e)
        })?;
        Ok(FreshToken { token: response.access_token, ttl_seconds: response.expires_in })
    }
}
