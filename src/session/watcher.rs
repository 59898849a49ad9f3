//! Polling bridge for externally managed tokens
//!
//! Some hosts own the access token themselves (an embedding shell, a native
//! wrapper) and merely expose a getter. The watcher polls that getter on a
//! fixed interval, projects a [`User`] out of the token claims, and mirrors
//! the token into a [`TokenStore`] so the REST client can attach it. The
//! timer is owned by the watcher and stops on drop; it must never fire
//! afterwards.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Duration, MissedTickBehavior};
use tracing::{debug, info};

use crate::session::user::User;
use crate::token::{decode_jwt_claims, TokenStore};

/// Getter exposed by the host that owns the token
pub type TokenSource = Arc<dyn Fn() -> Option<String> + Send + Sync>;

/// Mirrored lifetime for tokens whose claims carry no `exp`
///
/// The host is the authority on such a token's validity; this only has to
/// keep the mirror attachable until the host hands over a different value.
const NO_EXPIRY_FALLBACK_TTL_SECONDS: i64 = 3600;

/// Cancellable poller turning an external token getter into auth state
pub struct ExternalTokenWatcher {
    handle: JoinHandle<()>,
    receiver: watch::Receiver<Option<User>>,
}

impl ExternalTokenWatcher {
    /// Start polling `source` every `interval`
    ///
    /// The first poll runs immediately. A token is only re-processed when
    /// its value changes; an undecodable or already-expired token counts
    /// as "no credential" and clears the store.
    #[must_use]
    pub fn spawn(source: TokenSource, store: Arc<TokenStore>, interval: Duration) -> Self {
        let (tx, receiver) = watch::channel(None);

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            let mut last_seen: Option<String> = None;

            loop {
                ticker.tick().await;

                let token = source();
                if token == last_seen {
                    continue;
                }
                last_seen = token.clone();

                match token.and_then(|t| User::from_claims(&t).map(|u| (t, u))) {
                    Some((token, user)) => {
                        let ttl = decode_jwt_claims(&token)
                            .and_then(|claims| claims.get("exp").and_then(|e| e.as_i64()))
                            .map_or(NO_EXPIRY_FALLBACK_TTL_SECONDS, |exp| {
                                exp - Utc::now().timestamp()
                            });
                        if ttl <= 0 {
                            debug!("external token already expired");
                            store.clear().await;
                            let _ = tx.send(None);
                            continue;
                        }
                        store.set(token, ttl).await;
                        info!(user_id = %user.id, "external token observed");
                        let _ = tx.send(Some(user));
                    }
                    None => {
                        debug!("external token absent or undecodable");
                        store.clear().await;
                        let _ = tx.send(None);
                    }
                }
            }
        });

        Self { handle, receiver }
    }

    /// Latest projected user
    #[must_use]
    pub fn user(&self) -> Option<User> {
        self.receiver.borrow().clone()
    }

    /// Subscribe to user changes
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Option<User>> {
        self.receiver.clone()
    }

    /// Stop polling explicitly
    pub fn stop(&self) {
        self.handle.abort();
    }
}

impl Drop for ExternalTokenWatcher {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
