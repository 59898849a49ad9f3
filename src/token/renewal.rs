//! Renewal coordinator with an at-most-one-in-flight guard
//!
//! Wraps a [`TokenStore`] with the renewal policy: a fresh cached token is
//! returned without any network traffic, and when a renewal is needed all
//! concurrent callers share the same in-flight fetch. Failures are reported
//! through a callback side channel and resolve to `None`; `ensure_valid`
//! never throws.

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tracing::{debug, info, warn};

use super::store::TokenStore;
use crate::error::AuthError;

/// A newly minted access token and its lifetime
#[derive(Debug, Clone)]
pub struct FreshToken {
    pub token: String,
    pub ttl_seconds: i64,
}

/// Strategy that performs the network round trip minting a new token
///
/// Typically the OAuth refresh-token exchange; renewal is opt-in and a
/// coordinator without a fetcher simply hands back whatever the store holds.
#[async_trait]
pub trait TokenFetcher: Send + Sync {
    /// Fetch a fresh token.
    ///
    /// # Errors
    /// Returns error when the renewal round trip fails; the coordinator
    /// converts this into the failure callback plus an absent result.
    async fn fetch(&self) -> Result<FreshToken, AuthError>;
}

/// Callback invoked when a renewal attempt fails
pub type RenewalFailureCallback = Arc<dyn Fn() + Send + Sync>;

type InFlight = Shared<BoxFuture<'static, Option<String>>>;

/// Token renewal coordinator
///
/// The in-flight slot is the only mutual-exclusion primitive: while a
/// renewal ticket is outstanding every concurrent `ensure_valid` call
/// awaits the same shared future, so one coordinator never issues two
/// racing fetches.
pub struct RenewalCoordinator {
    store: Arc<TokenStore>,
    fetcher: Option<Arc<dyn TokenFetcher>>,
    on_failure: Option<RenewalFailureCallback>,
    in_flight: Arc<Mutex<Option<InFlight>>>,
}

impl RenewalCoordinator {
    /// Create a coordinator over `store` with renewal disabled
    #[must_use]
    pub fn new(store: Arc<TokenStore>) -> Self {
        Self {
            store,
            fetcher: None,
            on_failure: None,
            in_flight: Arc::new(Mutex::new(None)),
        }
    }

    /// Enable renewal through the given fetch strategy
    #[must_use]
    pub fn with_fetcher(mut self, fetcher: Arc<dyn TokenFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    /// Register the renewal-failure side channel
    ///
    /// Invoked synchronously at the failure point, typically to trigger
    /// re-authentication.
    #[must_use]
    pub fn on_renewal_failure(mut self, callback: RenewalFailureCallback) -> Self {
        self.on_failure = Some(callback);
        self
    }

    /// The wrapped token store
    #[must_use]
    pub fn store(&self) -> &Arc<TokenStore> {
        &self.store
    }

    /// Return a valid access token, renewing it if necessary
    ///
    /// - A cached token not expiring soon is returned immediately.
    /// - Without a configured fetcher, whatever the store holds is returned.
    /// - Otherwise the caller joins or starts the single in-flight renewal.
    ///
    /// `None` means "could not authenticate", never a crash; failures are
    /// additionally reported through the failure callback.
    pub async fn ensure_valid(&self) -> Option<String> {
        if let Some(cred) = self.store.get().await {
            if !cred.expires_within(self.store.expiry_buffer()) {
                return Some(cred.token);
            }
        }

        let Some(fetcher) = self.fetcher.clone() else {
            return self.store.get().await.map(|cred| cred.token);
        };

        let renewal = {
            let mut slot = self.in_flight.lock().await;
            if let Some(existing) = slot.as_ref() {
                debug!("joining in-flight token renewal");
                existing.clone()
            } else {
                let started = Self::start_renewal(
                    fetcher,
                    self.store.clone(),
                    self.on_failure.clone(),
                    self.in_flight.clone(),
                );
                *slot = Some(started.clone());
                started
            }
        };

        renewal.await
    }

    fn start_renewal(
        fetcher: Arc<dyn TokenFetcher>,
        store: Arc<TokenStore>,
        on_failure: Option<RenewalFailureCallback>,
        in_flight: Arc<Mutex<Option<InFlight>>>,
    ) -> InFlight {
        async move {
            let result = match fetcher.fetch().await {
                Ok(fresh) => {
                    store.set(fresh.token.clone(), fresh.ttl_seconds).await;
                    info!("access token renewed");
                    Some(fresh.token)
                }
                Err(e) => {
                    warn!(error = %e, "token renewal failed");
                    if let Some(callback) = &on_failure {
                        callback();
                    }
                    None
                }
            };

            // Clear the ticket so subsequent calls may retry.
            *in_flight.lock().await = None;
            result
        }
        .boxed()
        .shared()
    }

    /// Spawn a background task that renews the token shortly before expiry
    ///
    /// Sleeps until the expiry buffer is reached, then calls
    /// [`ensure_valid`](Self::ensure_valid); backs off for 60 s after a
    /// failed or impossible renewal. The task is aborted when the returned
    /// handle is dropped.
    pub fn spawn_auto_refresh(self: &Arc<Self>) -> AutoRefreshHandle {
        let coordinator = Arc::clone(self);
        let handle = tokio::spawn(async move {
            info!("token auto-refresh task started");
            loop {
                let wake = match coordinator.store.remaining_ttl().await {
                    Some(ttl) => {
                        let until_refresh = ttl - coordinator.store.expiry_buffer();
                        if until_refresh <= 0 {
                            Duration::ZERO
                        } else {
                            Duration::from_secs(until_refresh as u64)
                        }
                    }
                    // Not authenticated yet, check again later.
                    None => Duration::from_secs(60),
                };

                if !wake.is_zero() {
                    tokio::time::sleep(wake).await;
                }

                if coordinator.store.is_expiring_soon().await {
                    let renewed = coordinator.ensure_valid().await;
                    if renewed.is_none() || coordinator.store.is_expiring_soon().await {
                        tokio::time::sleep(Duration::from_secs(60)).await;
                    }
                }
            }
        });

        AutoRefreshHandle { handle }
    }
}

/// Handle owning the background auto-refresh task
///
/// Dropping the handle stops the task; it must not fire afterwards.
pub struct AutoRefreshHandle {
    handle: JoinHandle<()>,
}

impl AutoRefreshHandle {
    /// Stop the background task explicitly
    pub fn stop(&self) {
        self.handle.abort();
    }
}

impl Drop for AutoRefreshHandle {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
