//! Auth state orchestration
//!
//! One `AuthSession` owns the user-facing auth lifecycle: the
//! loading/authenticated/unauthenticated state machine, mount-time session
//! checks, and the login/logout/signup actions. Two wirings exist:
//!
//! - **direct**: the app talks to the auth service on its own origin
//!   (cookie session plus bearer tokens minted by refresh exchange);
//! - **BFF**: a backend-for-frontend terminates OAuth server-side and the
//!   app only ever calls its user-info endpoint, optionally primed by a
//!   silent-auth handshake.
//!
//! A busy lock serializes user-facing actions so a double-clicked login
//! cannot interleave two credential submissions.

use std::sync::Arc;

use reqwest::Method;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::config::{BffConfig, OAuthConfig};
use crate::error::AuthError;
use crate::http::RestClient;
use crate::oauth::{OAuthFlowClient, SilentAuthNegotiator, SilentAuthOutcome};
use crate::platform::Navigator;
use crate::session::user::User;
use crate::token::TokenStore;

/// Snapshot of the session state
///
/// `error` is a side channel independent of the boolean state: a failed
/// logout call, for example, leaves an error visible while the session
/// still ends up unauthenticated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthState {
    pub is_loading: bool,
    pub is_authenticated: bool,
    pub user: Option<User>,
    pub error: Option<String>,
}

impl Default for AuthState {
    fn default() -> Self {
        // A session starts loading until the first check settles.
        Self { is_loading: true, is_authenticated: false, user: None, error: None }
    }
}

/// Credentials submitted to direct-mode login
#[derive(Debug, Clone, Serialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

/// Direct-mode signup submission
#[derive(Debug, Clone, Serialize)]
pub struct SignupRequest {
    pub email: String,
    pub password: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    success: bool,
    #[serde(default)]
    user: Option<User>,
}

enum ModeWiring {
    Direct {
        oauth: OAuthConfig,
        flow: Arc<OAuthFlowClient>,
        store: Arc<TokenStore>,
    },
    Bff {
        config: BffConfig,
        navigator: Arc<dyn Navigator>,
        silent: Option<Arc<SilentAuthNegotiator>>,
    },
}

/// The auth state orchestrator
pub struct AuthSession {
    rest: RestClient,
    mode: ModeWiring,
    state: RwLock<AuthState>,
    busy: Mutex<()>,
}

impl AuthSession {
    /// Wire a session in direct mode
    ///
    /// `rest` should share its cookie jar with `flow`'s HTTP client when
    /// the auth service issues session cookies; the session endpoints live
    /// under `oauth.auth_service_url`.
    #[must_use]
    pub fn direct(
        oauth: OAuthConfig,
        rest: RestClient,
        flow: Arc<OAuthFlowClient>,
        store: Arc<TokenStore>,
    ) -> Self {
        Self {
            rest,
            mode: ModeWiring::Direct { oauth, flow, store },
            state: RwLock::new(AuthState::default()),
            busy: Mutex::new(()),
        }
    }

    /// Wire a session in BFF mode
    ///
    /// Pass a negotiator to prime the BFF session through silent auth
    /// before the user-info check; it only runs when
    /// `config.use_silent_auth` is set.
    #[must_use]
    pub fn bff(
        config: BffConfig,
        rest: RestClient,
        navigator: Arc<dyn Navigator>,
        silent: Option<Arc<SilentAuthNegotiator>>,
    ) -> Self {
        Self {
            rest,
            mode: ModeWiring::Bff { config, navigator, silent },
            state: RwLock::new(AuthState::default()),
            busy: Mutex::new(()),
        }
    }

    /// Current state snapshot
    pub async fn state(&self) -> AuthState {
        self.state.read().await.clone()
    }

    /// Check whether a session exists, settling loading → final state
    ///
    /// Safe to call repeatedly; failures settle to unauthenticated rather
    /// than propagating.
    pub async fn check(&self) {
        let _guard = self.busy.lock().await;
        self.set_loading(true).await;

        match &self.mode {
            ModeWiring::Direct { oauth, flow, store } => {
                self.check_direct(oauth, flow, store).await;
            }
            ModeWiring::Bff { config, silent, .. } => {
                self.check_bff(config, silent.as_ref()).await;
            }
        }
    }

    async fn check_direct(
        &self,
        oauth: &OAuthConfig,
        flow: &Arc<OAuthFlowClient>,
        store: &Arc<TokenStore>,
    ) {
        let url = format!("{}/auth/me", oauth.auth_service_url);
        match self.rest.get_json::<User, _>(url).await {
            Ok(user) => {
                // The cookie session is authoritative; a failed exchange
                // leaves the user logged in without a bearer token until
                // the next renewal.
                Self::refresh_access_token(flow, store).await;
                self.apply_authenticated(user).await;
            }
            Err(e) => {
                debug!(error = %e, "no active session");
                store.clear().await;
                self.apply_unauthenticated().await;
            }
        }
    }

    async fn check_bff(&self, config: &BffConfig, silent: Option<&Arc<SilentAuthNegotiator>>) {
        if config.use_silent_auth {
            if let Some(negotiator) = silent {
                self.complete_silent_auth(config, negotiator).await;
            }
        }

        match self.rest.get_json::<User, _>(&config.user_info_url).await {
            Ok(user) => self.apply_authenticated(user).await,
            Err(AuthError::Unauthorized) => self.apply_unauthenticated().await,
            Err(e) => {
                warn!(error = %e, "user-info check failed");
                self.apply_unauthenticated().await;
            }
        }
    }

    /// Run the silent handshake and hand its code to the BFF
    ///
    /// Failures are logged and treated as "no session"; the user-info
    /// check that follows is authoritative either way.
    async fn complete_silent_auth(&self, config: &BffConfig, negotiator: &SilentAuthNegotiator) {
        match negotiator.attempt().await {
            SilentAuthOutcome::Success { code, state } => {
                let body = serde_json::json!({ "code": code, "state": state });
                let request =
                    self.rest.request(Method::POST, &config.token_exchange_url).json(&body);
                match self.rest.send(request).await {
                    Ok(response) if response.status().is_success() => {
                        info!("silent-auth code exchanged with BFF");
                    }
                    Ok(response) => {
                        warn!(status = %response.status(), "BFF token exchange rejected");
                    }
                    Err(e) => warn!(error = %e, "BFF token exchange failed"),
                }
            }
            SilentAuthOutcome::Failure { error, .. } => {
                debug!(%error, "silent auth did not produce a session");
            }
        }
    }

    /// Log in
    ///
    /// BFF mode performs a full navigation to the BFF's login page and
    /// returns immediately. Direct mode submits the credentials, then
    /// mints an access token via refresh exchange (failure logged, not
    /// fatal) and populates the user from the login response.
    ///
    /// # Errors
    /// Returns error when the credential submission itself is rejected.
    pub async fn login(&self, credentials: &Credentials) -> Result<(), AuthError> {
        let _guard = self.busy.lock().await;
        match &self.mode {
            ModeWiring::Bff { config, navigator, .. } => {
                navigator.redirect(&config.login_url);
                Ok(())
            }
            ModeWiring::Direct { oauth, flow, store } => {
                self.set_loading(true).await;
                let result = self.login_direct(oauth, flow, store, credentials).await;
                if let Err(e) = &result {
                    self.fail(e.to_string()).await;
                }
                result
            }
        }
    }

    async fn login_direct(
        &self,
        oauth: &OAuthConfig,
        flow: &Arc<OAuthFlowClient>,
        store: &Arc<TokenStore>,
        credentials: &Credentials,
    ) -> Result<(), AuthError> {
        let url = format!("{}/auth/login", oauth.auth_service_url);
        let response: LoginResponse = self.rest.post_json(url, credentials).await?;
        if !response.success {
            return Err(AuthError::Server("invalid email or password".into()));
        }

        Self::refresh_access_token(flow, store).await;

        let user = response
            .user
            .ok_or_else(|| AuthError::Server("login response missing user".into()))?;
        info!(user_id = %user.id, "login succeeded");
        self.apply_authenticated(user).await;
        Ok(())
    }

    /// Log out
    ///
    /// BFF mode navigates to the BFF's logout page. Direct mode calls the
    /// logout endpoint; a failure there only surfaces through the error
    /// side channel and never blocks the local cleanup, which always runs.
    pub async fn logout(&self) {
        let _guard = self.busy.lock().await;
        match &self.mode {
            ModeWiring::Bff { config, navigator, .. } => {
                navigator.redirect(&config.logout_url);
            }
            ModeWiring::Direct { oauth, store, .. } => {
                let url = format!("{}/auth/logout", oauth.auth_service_url);
                let request = self.rest.request(Method::POST, url);
                match self.rest.send(request).await {
                    Ok(response) if response.status().is_success() => {}
                    Ok(response) => {
                        warn!(status = %response.status(), "logout endpoint rejected the call");
                        self.set_error(Some("logout failed".into())).await;
                    }
                    Err(e) => {
                        warn!(error = %e, "logout call failed");
                        self.set_error(Some("logout failed".into())).await;
                    }
                }

                store.clear().await;
                self.apply_unauthenticated_keeping_error().await;
                info!("session cleared");
            }
        }
    }

    /// Sign up, then log in with the same credentials
    ///
    /// # Errors
    /// Returns error when registration or the follow-up login is rejected.
    pub async fn signup(&self, request: &SignupRequest) -> Result<(), AuthError> {
        let _guard = self.busy.lock().await;
        match &self.mode {
            ModeWiring::Bff { config, navigator, .. } => {
                // Registration is the BFF's business; hand over wholesale.
                navigator.redirect(&config.login_url);
                Ok(())
            }
            ModeWiring::Direct { oauth, flow, store } => {
                self.set_loading(true).await;
                let result = self.signup_direct(oauth, flow, store, request).await;
                if let Err(e) = &result {
                    self.fail(e.to_string()).await;
                }
                result
            }
        }
    }

    async fn signup_direct(
        &self,
        oauth: &OAuthConfig,
        flow: &Arc<OAuthFlowClient>,
        store: &Arc<TokenStore>,
        request: &SignupRequest,
    ) -> Result<(), AuthError> {
        let url = format!("{}/auth/register", oauth.auth_service_url);
        let _: serde_json::Value = self.rest.post_json(url, request).await?;
        info!("registration accepted, logging in");

        let credentials = Credentials {
            email: request.email.clone(),
            password: request.password.clone(),
        };
        self.login_direct(oauth, flow, store, &credentials).await
    }

    async fn refresh_access_token(flow: &Arc<OAuthFlowClient>, store: &Arc<TokenStore>) {
        match flow.exchange_refresh_token().await {
            Ok(tokens) => store.set(tokens.access_token, tokens.expires_in).await,
            Err(e) => warn!(error = %e, "access-token exchange failed"),
        }
    }

    async fn set_loading(&self, loading: bool) {
        let mut state = self.state.write().await;
        state.is_loading = loading;
        if loading {
            state.error = None;
        }
    }

    async fn set_error(&self, error: Option<String>) {
        self.state.write().await.error = error;
    }

    async fn apply_authenticated(&self, user: User) {
        let mut state = self.state.write().await;
        *state = AuthState {
            is_loading: false,
            is_authenticated: true,
            user: Some(user),
            error: None,
        };
    }

    async fn apply_unauthenticated(&self) {
        let mut state = self.state.write().await;
        *state = AuthState {
            is_loading: false,
            is_authenticated: false,
            user: None,
            error: None,
        };
    }

    async fn apply_unauthenticated_keeping_error(&self) {
        let mut state = self.state.write().await;
        let error = state.error.take();
        *state = AuthState { is_loading: false, is_authenticated: false, user: None, error };
    }

    async fn fail(&self, message: String) {
        let mut state = self.state.write().await;
        state.is_loading = false;
        state.error = Some(message);
    }
}
