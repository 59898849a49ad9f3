//! Retrying REST client with automatic bearer attachment

use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client as ReqwestClient, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::AuthError;
use crate::token::RenewalCoordinator;

/// Header reporting which delivery attempt a request is (0 = first try)
pub const RETRY_COUNT_HEADER: &str = "x-retry-count";

/// Callback invoked when the server answers 401 after bearer attachment
pub type UnauthorizedCallback = Arc<dyn Fn() + Send + Sync>;

/// Statuses worth retrying: transient by definition, safe to repeat
fn is_retryable_status(status: StatusCode) -> bool {
    matches!(
        status.as_u16(),
        408 | 429 | 500 | 502 | 503 | 504
    )
}

/// HTTP client carrying the cross-cutting auth concerns
///
/// Every request goes out with a fresh bearer token (when a coordinator is
/// attached and holds one) and a retry-count header; transient failures are
/// retried with exponential backoff. A 401 is never retried: it means the
/// token was refused, and the unauthorized callback fires instead.
#[derive(Clone)]
pub struct RestClient {
    client: ReqwestClient,
    coordinator: Option<Arc<RenewalCoordinator>>,
    on_unauthorized: Option<UnauthorizedCallback>,
    max_retries: usize,
    base_backoff: Duration,
}

impl RestClient {
    /// Start building a new REST client
    #[must_use]
    pub fn builder() -> RestClientBuilder {
        RestClientBuilder::default()
    }

    /// Convenience constructor with default configuration
    ///
    /// # Errors
    /// Returns error if the underlying HTTP client cannot be constructed.
    pub fn new() -> Result<Self, AuthError> {
        Self::builder().build()
    }

    /// Create a request builder on the underlying client
    pub fn request<U>(&self, method: Method, url: U) -> RequestBuilder
    where
        U: reqwest::IntoUrl,
    {
        self.client.request(method, url)
    }

    /// Execute a request with bearer attachment and retry semantics
    ///
    /// Non-2xx statuses outside the retry set are returned as responses for
    /// the caller to inspect, except 401 which fires the unauthorized
    /// callback and becomes [`AuthError::Unauthorized`].
    ///
    /// # Errors
    /// Returns error on 401, on a network failure that survives all
    /// retries, or when the request body cannot be buffered for retry.
    pub async fn send(&self, builder: RequestBuilder) -> Result<Response, AuthError> {
        let attempts = self.max_retries + 1;

        for attempt in 0..attempts {
            let mut request = builder
                .try_clone()
                .ok_or_else(|| {
                    AuthError::Server(
                        "request body cannot be cloned; buffer the body to enable retries"
                            .into(),
                    )
                })?
                .header(RETRY_COUNT_HEADER, attempt.to_string());

            // Re-resolved per attempt: a retry after a slow backoff should
            // not go out with a token that expired in the meantime.
            if let Some(coordinator) = &self.coordinator {
                if let Some(token) = coordinator.ensure_valid().await {
                    request = request.bearer_auth(token);
                }
            }

            match request.send().await {
                Ok(response) => {
                    let status = response.status();
                    debug!(attempt, %status, "received HTTP response");

                    if status == StatusCode::UNAUTHORIZED {
                        if let Some(callback) = &self.on_unauthorized {
                            callback();
                        }
                        return Err(AuthError::Unauthorized);
                    }

                    if is_retryable_status(status) && attempt + 1 < attempts {
                        self.sleep_with_backoff(attempt).await;
                        continue;
                    }

                    return Ok(response);
                }
                Err(err) => {
                    warn!(attempt, error = %err, "HTTP request failed");

                    if attempt + 1 < attempts && should_retry_error(&err) {
                        self.sleep_with_backoff(attempt).await;
                        continue;
                    }

                    return Err(AuthError::Request(err));
                }
            }
        }

        unreachable!("attempt loop always returns");
    }

    /// GET a JSON resource
    ///
    /// # Errors
    /// Returns error on transport failure, 401, or any other non-success
    /// status (surfaced as [`AuthError::Server`] with the body text).
    pub async fn get_json<T, U>(&self, url: U) -> Result<T, AuthError>
    where
        T: DeserializeOwned,
        U: reqwest::IntoUrl,
    {
        let response = self.send(self.request(Method::GET, url)).await?;
        Self::read_json(response).await
    }

    /// POST a JSON body and parse a JSON response
    ///
    /// # Errors
    /// Same contract as [`get_json`](Self::get_json).
    pub async fn post_json<T, U, B>(&self, url: U, body: &B) -> Result<T, AuthError>
    where
        T: DeserializeOwned,
        U: reqwest::IntoUrl,
        B: Serialize + ?Sized,
    {
        let response = self.send(self.request(Method::POST, url).json(body)).await?;
        Self::read_json(response).await
    }

    async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T, AuthError> {
        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(AuthError::Server(if detail.is_empty() {
                format!("request failed with status {status}")
            } else {
                detail
            }));
        }
        Ok(response.json().await?)
    }

    fn backoff_delay(&self, retry_count: usize) -> Duration {
        let shift = retry_count.min(8) as u32;
        self.base_backoff.saturating_mul(1u32 << shift)
    }

    async fn sleep_with_backoff(&self, retry_count: usize) {
        let delay = self.backoff_delay(retry_count);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}

/// Builder for [`RestClient`]
pub struct RestClientBuilder {
    timeout: Duration,
    max_retries: usize,
    base_backoff: Duration,
    coordinator: Option<Arc<RenewalCoordinator>>,
    on_unauthorized: Option<UnauthorizedCallback>,
}

impl Default for RestClientBuilder {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_retries: 2,
            base_backoff: Duration::from_secs(1),
            coordinator: None,
            on_unauthorized: None,
        }
    }
}

impl RestClientBuilder {
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Retries after the initial attempt (default 2)
    #[must_use]
    pub fn max_retries(mut self, retries: usize) -> Self {
        self.max_retries = retries;
        self
    }

    /// First backoff delay; doubles per subsequent retry (default 1 s)
    #[must_use]
    pub fn base_backoff(mut self, backoff: Duration) -> Self {
        self.base_backoff = backoff;
        self
    }

    /// Attach bearer tokens resolved through this coordinator
    #[must_use]
    pub fn coordinator(mut self, coordinator: Arc<RenewalCoordinator>) -> Self {
        self.coordinator = Some(coordinator);
        self
    }

    /// Register the 401 side channel
    #[must_use]
    pub fn on_unauthorized(mut self, callback: UnauthorizedCallback) -> Self {
        self.on_unauthorized = Some(callback);
        self
    }

    /// Build the client.
    ///
    /// # Errors
    /// Returns error if the underlying HTTP client cannot be constructed.
    pub fn build(self) -> Result<RestClient, AuthError> {
        let client = ReqwestClient::builder()
            .timeout(self.timeout)
            .cookie_store(true)
            .build()?;

        Ok(RestClient {
            client,
            coordinator: self.coordinator,
            on_unauthorized: self.on_unauthorized,
            max_retries: self.max_retries,
            base_backoff: self.base_backoff,
        })
    }
}

fn should_retry_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_request() || err.is_connect()
}

#[cfg(test)]
mod tests {
    //! Unit tests for http::rest.
    use std::net::TcpListener;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde::Deserialize;
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::platform::MemoryStore;
    use crate::token::TokenStore;

    fn client() -> RestClient {
        RestClient::builder()
            .base_backoff(Duration::from_millis(10))
            .build()
            .expect("rest client")
    }

    async fn coordinator_with_token(token: &str) -> Arc<RenewalCoordinator> {
        let store = Arc::new(TokenStore::new(Arc::new(MemoryStore::new()), "rest_test"));
        store.set(token, 3600).await;
        Arc::new(RenewalCoordinator::new(store))
    }

    #[tokio::test]
    async fn attaches_bearer_and_retry_count() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(header("authorization", "Bearer tok_abc"))
            .and(header(RETRY_COUNT_HEADER, "0"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let client = RestClient::builder()
            .coordinator(coordinator_with_token("tok_abc").await)
            .build()
            .expect("rest client");

        let response = client.send(client.request(Method::GET, server.uri())).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn no_coordinator_means_no_auth_header() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let client = client();
        client.send(client.request(Method::GET, server.uri())).await.unwrap();

        let requests = server.received_requests().await.unwrap();
        assert!(!requests[0].headers.contains_key("authorization"));
    }

    #[tokio::test]
    async fn retries_transient_status_with_incrementing_count() {
        let server = MockServer::start().await;
        let hits = Arc::new(AtomicUsize::new(0));
        let hits_clone = hits.clone();
        Mock::given(method("GET"))
            .respond_with(move |_req: &wiremock::Request| {
                if hits_clone.fetch_add(1, Ordering::SeqCst) < 2 {
                    ResponseTemplate::new(503)
                } else {
                    ResponseTemplate::new(200)
                }
            })
            .expect(3)
            .mount(&server)
            .await;

        let client = client();
        let response = client.send(client.request(Method::GET, server.uri())).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let requests = server.received_requests().await.unwrap();
        let counts: Vec<_> = requests
            .iter()
            .map(|r| r.headers.get(RETRY_COUNT_HEADER).unwrap().to_str().unwrap().to_string())
            .collect();
        assert_eq!(counts, vec!["0", "1", "2"]);
    }

    #[tokio::test]
    async fn exhausted_retries_return_final_response() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .expect(3) // initial attempt + 2 retries
            .mount(&server)
            .await;

        let client = client();
        let response = client.send(client.request(Method::GET, server.uri())).await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn does_not_retry_client_errors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(400))
            .expect(1)
            .mount(&server)
            .await;

        let client = client();
        let response = client.send(client.request(Method::GET, server.uri())).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn unauthorized_fires_callback_without_retry() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;

        let fired = Arc::new(AtomicUsize::new(0));
        let fired_cb = fired.clone();
        let client = RestClient::builder()
            .base_backoff(Duration::from_millis(10))
            .on_unauthorized(Arc::new(move || {
                fired_cb.fetch_add(1, Ordering::SeqCst);
            }))
            .build()
            .expect("rest client");

        let result = client.send(client.request(Method::GET, server.uri())).await;
        assert!(matches!(result, Err(AuthError::Unauthorized)));
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_on_network_failure_then_errors() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener); // release the port so requests fail with ECONNREFUSED
        let url = format!("http://{addr}");

        let client = RestClient::builder()
            .base_backoff(Duration::from_millis(5))
            .max_retries(1)
            .build()
            .expect("rest client");

        let result = client.send(client.request(Method::GET, &url)).await;
        assert!(matches!(result, Err(AuthError::Request(_))));
    }

    #[tokio::test]
    async fn get_json_deserializes_success() {
        #[derive(Deserialize)]
        struct Greeting {
            message: String,
        }

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/hello"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"message": "hi"})))
            .mount(&server)
            .await;

        let greeting: Greeting =
            client().get_json(format!("{}/hello", server.uri())).await.unwrap();
        assert_eq!(greeting.message, "hi");
    }

    #[tokio::test]
    async fn get_json_surfaces_error_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(403).set_body_string("forbidden zone"))
            .mount(&server)
            .await;

        let result: Result<serde_json::Value, _> = client().get_json(server.uri()).await;
        match result {
            Err(AuthError::Server(detail)) => assert_eq!(detail, "forbidden zone"),
            other => panic!("expected server error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn post_json_sends_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/echo"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
            .expect(1)
            .mount(&server)
            .await;

        let result: serde_json::Value = client()
            .post_json(format!("{}/echo", server.uri()), &json!({"name": "ada"}))
            .await
            .unwrap();
        assert_eq!(result["ok"], json!(true));

        let requests = server.received_requests().await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
        assert_eq!(body["name"], json!("ada"));
    }
}
