//! Silent authentication over a hidden frame
//!
//! Detects an existing session at the auth origin without visible UI: a
//! hidden frame loads the authorization endpoint with `prompt=none`, and
//! the auth origin's silent-callback page posts the result back to the
//! embedding document. The attempt is bounded by a timeout and resolves
//! exactly once; cleanup (frame detach) is idempotent.

use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde_json::json;
use tracing::{debug, info, warn};

use super::state::generate_state;
use crate::config::{OAuthConfig, SilentAuthConfig};
use crate::platform::{FrameEvent, FrameHost, HiddenFrame, Navigator};

/// Result of one silent-auth attempt
///
/// Failures are structured, never thrown; the caller falls back to
/// interactive login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SilentAuthOutcome {
    /// The auth origin had a session and returned an authorization code
    Success { code: String, state: String },

    /// No session, timeout, frame failure, or provider error
    Failure { error: String, error_description: Option<String> },
}

impl SilentAuthOutcome {
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    fn failure(error: &str) -> Self {
        Self::Failure { error: error.to_string(), error_description: None }
    }
}

/// Negotiator for the hidden-frame `prompt=none` handshake
pub struct SilentAuthNegotiator {
    oauth: OAuthConfig,
    config: SilentAuthConfig,
    frames: Arc<dyn FrameHost>,
    navigator: Arc<dyn Navigator>,
}

impl SilentAuthNegotiator {
    #[must_use]
    pub fn new(
        oauth: OAuthConfig,
        config: SilentAuthConfig,
        frames: Arc<dyn FrameHost>,
        navigator: Arc<dyn Navigator>,
    ) -> Self {
        Self { oauth, config, frames, navigator }
    }

    /// Attempt to obtain an authorization code without user interaction
    ///
    /// Accepts a callback message only when its origin is exactly the auth
    /// service's origin, its payload carries the expected discriminant tag,
    /// and its `state` equals the value this attempt generated. Anything
    /// else is ignored as unrelated noise. The whole attempt is bounded by
    /// the configured timeout (default 5000 ms).
    pub async fn attempt(&self) -> SilentAuthOutcome {
        // Wrap the random state with our origin so the callback page can
        // address its response to this document among concurrent attempts.
        let nonce = generate_state();
        let envelope = STANDARD.encode(
            json!({"state": nonce, "origin": self.navigator.origin()}).to_string(),
        );

        let redirect_uri =
            format!("{}{}", self.oauth.auth_origin(), self.oauth.silent_callback_path);
        let params = [
            ("client_id", self.oauth.client_id.as_str()),
            ("redirect_uri", &redirect_uri),
            ("response_type", "code"),
            ("scope", &self.oauth.scope),
            ("state", &envelope),
            ("prompt", "none"),
        ];
        let query = params
            .iter()
            .map(|(k, v)| format!("{k}={}", urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&");
        let url = format!("{}?{}", self.oauth.authorize_url(), query);

        debug!("opening silent-auth frame");
        let mut frame = match self.frames.open(&url).await {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %e, "failed to open silent-auth frame");
                return SilentAuthOutcome::failure("iframe_error");
            }
        };

        let expected_origin = self.oauth.auth_origin();
        let outcome = match tokio::time::timeout(
            self.config.timeout,
            Self::listen(frame.as_mut(), &expected_origin, &self.config.message_type, &envelope),
        )
        .await
        {
            Ok(outcome) => outcome,
            Err(_) => {
                debug!("silent auth timed out");
                SilentAuthOutcome::failure("timeout")
            }
        };

        // Single teardown point: the frame and its listener never outlive
        // one attempt, whichever way it resolved.
        frame.close();

        if outcome.is_success() {
            info!("silent auth obtained an authorization code");
        }
        outcome
    }

    async fn listen(
        frame: &mut dyn HiddenFrame,
        expected_origin: &str,
        message_type: &str,
        expected_state: &str,
    ) -> SilentAuthOutcome {
        loop {
            let Some(event) = frame.next_event().await else {
                // No further events will arrive; wait out the timeout.
                futures::future::pending::<()>().await;
                unreachable!();
            };

            match event {
                FrameEvent::LoadError => {
                    return SilentAuthOutcome::failure("iframe_error");
                }
                FrameEvent::Message { origin, payload } => {
                    // Triple check; mismatches are noise from unrelated
                    // senders, not failures.
                    if origin != expected_origin {
                        debug!(%origin, "ignoring message from unexpected origin");
                        continue;
                    }
                    if payload.get("type").and_then(|t| t.as_str()) != Some(message_type) {
                        continue;
                    }
                    if payload.get("state").and_then(|s| s.as_str()) != Some(expected_state) {
                        debug!("ignoring message with non-matching state");
                        continue;
                    }

                    if let Some(code) = payload.get("code").and_then(|c| c.as_str()) {
                        return SilentAuthOutcome::Success {
                            code: code.to_string(),
                            state: expected_state.to_string(),
                        };
                    }
                    if let Some(error) = payload.get("error").and_then(|e| e.as_str()) {
                        return SilentAuthOutcome::Failure {
                            error: error.to_string(),
                            error_description: payload
                                .get("errorDescription")
                                .and_then(|d| d.as_str())
                                .map(String::from),
                        };
                    }
                    // Tagged and state-matched but carrying neither code
                    // nor error: ignore.
                }
            }
        }
    }
}

/// Heuristic: does this user agent likely block third-party storage in
/// iframes?
///
/// A hint only, never a hard gate: callers may still attempt silent auth
/// and must handle its failure. Safari and Firefox ship strict tracking
/// prevention that defeats the hidden-frame session check.
#[must_use]
pub fn likely_blocked(user_agent: &str) -> bool {
    let is_safari = user_agent.contains("Safari")
        && !user_agent.contains("Chrome")
        && !user_agent.contains("Chromium");
    is_safari || user_agent.contains("Firefox")
}

#[cfg(test)]
mod tests {
    //! Unit tests for oauth::silent.
    use std::time::Duration;

    use serde_json::json;

    use super::*;
    use crate::platform::{ScriptedFrameHost, StaticNavigator};

    const AUTH_ORIGIN: &str = "https://auth.example.com";

    fn negotiator(
        host: &ScriptedFrameHost,
        timeout_ms: u64,
    ) -> SilentAuthNegotiator {
        let oauth = OAuthConfig::new(AUTH_ORIGIN, "client_1");
        let config = SilentAuthConfig {
            timeout: Duration::from_millis(timeout_ms),
            ..SilentAuthConfig::default()
        };
        let navigator = Arc::new(StaticNavigator::new("https://app.example.com", "/"));
        SilentAuthNegotiator::new(oauth, config, Arc::new(host.clone()), navigator)
    }

    /// Extract the state param from the URL the negotiator opened.
    fn opened_state(host: &ScriptedFrameHost) -> String {
        let url = host.opened_urls().pop().expect("frame opened");
        crate::oauth::CallbackParams::from_url(&url).state.expect("state param")
    }

    fn callback_payload(state: &str, code: Option<&str>, error: Option<&str>) -> serde_json::Value {
        let mut payload = json!({
            "type": "silent-auth-callback",
            "state": state,
        });
        if let Some(code) = code {
            payload["code"] = json!(code);
        }
        if let Some(error) = error {
            payload["error"] = json!(error);
        }
        payload
    }

    #[tokio::test]
    async fn resolves_success_on_matching_message() {
        let host = ScriptedFrameHost::new();
        let negotiator = negotiator(&host, 2000);

        let responder = {
            let host = host.clone();
            tokio::spawn(async move {
                while host.opened_urls().is_empty() {
                    tokio::time::sleep(Duration::from_millis(5)).await;
                }
                let state = opened_state(&host);
                host.send(FrameEvent::Message {
                    origin: AUTH_ORIGIN.to_string(),
                    payload: callback_payload(&state, Some("code_silent"), None),
                });
            })
        };

        let outcome = negotiator.attempt().await;
        responder.await.unwrap();

        match outcome {
            SilentAuthOutcome::Success { code, .. } => assert_eq!(code, "code_silent"),
            other => panic!("expected success, got {other:?}"),
        }
        assert_eq!(host.open_frame_count(), 0);
    }

    #[tokio::test]
    async fn authorize_url_carries_prompt_none_and_silent_redirect() {
        let host = ScriptedFrameHost::new();
        let negotiator = negotiator(&host, 50);

        let _ = negotiator.attempt().await; // times out, that's fine

        let url = host.opened_urls().pop().unwrap();
        assert!(url.starts_with("https://auth.example.com/oauth/authorize?"));
        assert!(url.contains("prompt=none"));
        assert!(url.contains(
            "redirect_uri=https%3A%2F%2Fauth.example.com%2Fauth%2Fsilent-callback"
        ));
    }

    #[tokio::test]
    async fn ignores_message_from_wrong_origin() {
        // A well-formed payload from a non-matching origin is ignored;
        // the attempt resolves only via the timeout path.
        let host = ScriptedFrameHost::new();
        let negotiator = negotiator(&host, 150);

        let responder = {
            let host = host.clone();
            tokio::spawn(async move {
                while host.opened_urls().is_empty() {
                    tokio::time::sleep(Duration::from_millis(5)).await;
                }
                let state = opened_state(&host);
                host.send(FrameEvent::Message {
                    origin: "https://evil.example.com".to_string(),
                    payload: callback_payload(&state, Some("stolen"), None),
                });
            })
        };

        let outcome = negotiator.attempt().await;
        responder.await.unwrap();

        assert_eq!(outcome, SilentAuthOutcome::failure("timeout"));
        assert_eq!(host.open_frame_count(), 0);
    }

    #[tokio::test]
    async fn ignores_message_with_wrong_state() {
        let host = ScriptedFrameHost::new();
        host.push_event(FrameEvent::Message {
            origin: AUTH_ORIGIN.to_string(),
            payload: callback_payload("someone-elses-state", Some("code"), None),
        });

        let outcome = negotiator(&host, 100).attempt().await;
        assert_eq!(outcome, SilentAuthOutcome::failure("timeout"));
    }

    #[tokio::test]
    async fn times_out_within_bound() {
        // No message ever arrives; resolves as a timeout failure close
        // to the configured bound and cleans up the frame.
        let host = ScriptedFrameHost::new();
        let negotiator = negotiator(&host, 100);

        let started = tokio::time::Instant::now();
        let outcome = negotiator.attempt().await;
        let elapsed = started.elapsed();

        assert_eq!(outcome, SilentAuthOutcome::failure("timeout"));
        assert!(elapsed >= Duration::from_millis(100));
        assert!(elapsed < Duration::from_millis(500));
        assert_eq!(host.open_frame_count(), 0);
    }

    #[tokio::test]
    async fn frame_load_error_resolves_iframe_error() {
        let host = ScriptedFrameHost::new();
        host.push_event(FrameEvent::LoadError);

        let outcome = negotiator(&host, 1000).attempt().await;
        assert_eq!(outcome, SilentAuthOutcome::failure("iframe_error"));
        assert_eq!(host.open_frame_count(), 0);
    }

    #[tokio::test]
    async fn open_failure_resolves_iframe_error() {
        let host = ScriptedFrameHost::new();
        host.fail_next_open();

        let outcome = negotiator(&host, 1000).attempt().await;
        assert_eq!(outcome, SilentAuthOutcome::failure("iframe_error"));
    }

    #[tokio::test]
    async fn provider_error_message_resolves_failure() {
        let host = ScriptedFrameHost::new();
        let negotiator = negotiator(&host, 2000);

        let responder = {
            let host = host.clone();
            tokio::spawn(async move {
                while host.opened_urls().is_empty() {
                    tokio::time::sleep(Duration::from_millis(5)).await;
                }
                let state = opened_state(&host);
                let mut payload = callback_payload(&state, None, Some("login_required"));
                payload["errorDescription"] = json!("no session");
                host.send(FrameEvent::Message {
                    origin: AUTH_ORIGIN.to_string(),
                    payload,
                });
            })
        };

        let outcome = negotiator.attempt().await;
        responder.await.unwrap();

        assert_eq!(
            outcome,
            SilentAuthOutcome::Failure {
                error: "login_required".to_string(),
                error_description: Some("no session".to_string()),
            }
        );
    }

    #[test]
    fn blocked_browser_heuristic() {
        let safari = "Mozilla/5.0 (Macintosh) AppleWebKit/605.1.15 Version/17.0 Safari/605.1.15";
        let firefox = "Mozilla/5.0 (X11; Linux x86_64; rv:126.0) Gecko/20100101 Firefox/126.0";
        let chrome = "Mozilla/5.0 (Windows NT 10.0) AppleWebKit/537.36 Chrome/125.0 Safari/537.36";

        assert!(likely_blocked(safari));
        assert!(likely_blocked(firefox));
        assert!(!likely_blocked(chrome));
        assert!(!likely_blocked(""));
    }
}
