//! HTTP transport: the only stage with network I/O.
//!
//! [`Transport`] is the seam between the client's retry/classification logic
//! and the wire. It performs exactly one request per call and never retries;
//! every failure comes back as a [`TransportError`] for the classifier.
//!
//! [`ReqwestTransport`] is the production implementation. It keeps:
//! * one pooled `reqwest::Client` with keep-alive and fixed headers,
//! * a semaphore capping concurrent requests (extra callers wait),
//! * a one-worker I/O runtime on which every request runs.
//!
//! Running requests on a runtime the transport owns means pooled connections
//! are always driven, whichever runtime or thread the caller is on. Blocking
//! callers get a fresh or thread-local runtime per call (see
//! [`crate::blocking`]); without a dedicated runtime, a connection opened on
//! one of those would stall once that runtime stopped being polled.

use crate::config::ClientConfig;
use crate::error::ClientError;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use serde_json::Value;
use std::error::Error as StdError;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;
use tokio::runtime::Runtime;
use tokio::sync::Semaphore;
use tracing::{debug, info};

/// HTTP verb. The API only needs two.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
        })
    }
}

/// One request against the API, relative to the configured endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    /// Path starting with `/`, e.g. `/convert`.
    pub path: String,
    /// JSON body, sent with `Content-Type: application/json`.
    pub body: Option<Value>,
}

impl HttpRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: HttpMethod::Get,
            path: path.into(),
            body: None,
        }
    }

    pub fn post_json(path: impl Into<String>, body: Value) -> Self {
        Self {
            method: HttpMethod::Post,
            path: path.into(),
            body: Some(body),
        }
    }
}

/// Raw response: status plus body text. Interpretation is the parser's job.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.status >= 400
    }
}

/// Why a single attempt failed below the HTTP layer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// TCP/TLS connection could not be established.
    #[error("connection failed: {0}")]
    Connect(String),

    /// Host name could not be resolved.
    #[error("DNS resolution failed: {0}")]
    Dns(String),

    /// The attempt exceeded its deadline.
    #[error("request timed out")]
    Timeout,

    /// The connection broke while sending or receiving.
    #[error("connection interrupted: {0}")]
    Io(String),

    /// The response arrived but could not be decoded.
    #[error("failed to decode response: {0}")]
    Decode(String),

    /// The transport was closed before this call.
    #[error("transport is closed")]
    Closed,

    /// Anything we cannot attribute to the network.
    #[error("{0}")]
    Other(String),
}

/// Sends one HTTP request. Implementations must not retry.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError>;

    /// Release pooled connections. Must be idempotent.
    fn close(&self) {}
}

/// Production [`Transport`] backed by `reqwest`.
pub struct ReqwestTransport {
    endpoint: String,
    slots: Arc<Semaphore>,
    state: Mutex<Option<Pooled>>,
}

struct Pooled {
    client: reqwest::Client,
    io: Runtime,
}

impl fmt::Debug for ReqwestTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReqwestTransport")
            .field("endpoint", &self.endpoint)
            .field("available_slots", &self.slots.available_permits())
            .field("closed", &self.lock().is_none())
            .finish()
    }
}

impl ReqwestTransport {
    /// Build the pooled client and its I/O runtime from `config`.
    pub fn new(config: &ClientConfig) -> Result<Self, ClientError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.timeout)
            .pool_max_idle_per_host(config.max_keepalive_connections)
            .default_headers(default_headers(config)?)
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| ClientError::conversion(format!("Failed to build HTTP client: {e}")))?;

        let io = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("md-client-io")
            .enable_all()
            .build()
            .map_err(|e| ClientError::conversion(format!("Failed to start I/O runtime: {e}")))?;

        info!(
            "HTTP transport ready for {} (keep-alive {}, max connections {})",
            config.endpoint, config.max_keepalive_connections, config.max_connections
        );

        Ok(Self {
            endpoint: config.endpoint.clone(),
            slots: Arc::new(Semaphore::new(config.max_connections)),
            state: Mutex::new(Some(Pooled { client, io })),
        })
    }

    pub fn is_closed(&self) -> bool {
        self.lock().is_none()
    }

    fn lock(&self) -> MutexGuard<'_, Option<Pooled>> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Fixed headers: `Accept`, and `Authorization` when an API key is set.
fn default_headers(config: &ClientConfig) -> Result<HeaderMap, ClientError> {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
    if let Some(key) = &config.api_key {
        let mut value = HeaderValue::from_str(&format!("Bearer {key}")).map_err(|_| {
            ClientError::invalid_input("API key contains characters not allowed in an HTTP header")
                .with_detail("field", "api_key")
        })?;
        value.set_sensitive(true);
        headers.insert(AUTHORIZATION, value);
    }
    Ok(headers)
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        let url = format!("{}{}", self.endpoint, request.path);

        // Clone the handles out so the lock is not held across an await.
        let (client, io) = {
            let guard = self.lock();
            let pooled = guard.as_ref().ok_or(TransportError::Closed)?;
            (pooled.client.clone(), pooled.io.handle().clone())
        };

        let permit = Arc::clone(&self.slots)
            .acquire_owned()
            .await
            .map_err(|_| TransportError::Closed)?;

        let mut builder = match request.method {
            HttpMethod::Get => client.get(&url),
            HttpMethod::Post => client.post(&url),
        };
        if let Some(body) = &request.body {
            let bytes = serde_json::to_vec(body).map_err(|e| TransportError::Other(e.to_string()))?;
            builder = builder.header(CONTENT_TYPE, "application/json").body(bytes);
        }

        debug!("{} {}", request.method, url);
        let task = io.spawn(async move {
            let _permit = permit;
            let response = builder.send().await.map_err(map_reqwest_error)?;
            let status = response.status().as_u16();
            let body = response.text().await.map_err(map_reqwest_error)?;
            Ok(HttpResponse { status, body })
        });

        match task.await {
            Ok(result) => result,
            // The I/O runtime was shut down underneath the request.
            Err(e) if e.is_cancelled() => Err(TransportError::Closed),
            Err(e) => Err(TransportError::Other(format!("request task failed: {e}"))),
        }
    }

    fn close(&self) {
        if let Some(pooled) = self.lock().take() {
            drop(pooled.client);
            // `shutdown_background` is safe from inside an async context,
            // unlike dropping the runtime.
            pooled.io.shutdown_background();
            self.slots.close();
            info!("HTTP transport for {} closed", self.endpoint);
        }
    }
}

impl Drop for ReqwestTransport {
    fn drop(&mut self) {
        self.close();
    }
}

/// Map a reqwest failure onto the transport taxonomy.
pub(crate) fn map_reqwest_error(e: reqwest::Error) -> TransportError {
    if e.is_timeout() {
        TransportError::Timeout
    } else if e.is_connect() {
        if is_dns_failure(&e) {
            TransportError::Dns(error_chain(&e))
        } else {
            TransportError::Connect(error_chain(&e))
        }
    } else if e.is_decode() {
        TransportError::Decode(error_chain(&e))
    } else if e.is_request() || e.is_body() {
        TransportError::Io(error_chain(&e))
    } else {
        TransportError::Other(error_chain(&e))
    }
}

/// hyper reports resolver failures as a connect error whose source chain
/// mentions DNS; there is no dedicated predicate.
fn is_dns_failure(e: &reqwest::Error) -> bool {
    let chain = error_chain(e).to_ascii_lowercase();
    chain.contains("dns error") || chain.contains("failed to lookup address")
}

/// `outer: inner: innermost`, the way the error would read in a log line.
fn error_chain(e: &(dyn StdError + 'static)) -> String {
    let mut out = e.to_string();
    let mut source = e.source();
    while let Some(inner) = source {
        out.push_str(": ");
        out.push_str(&inner.to_string());
        source = inner.source();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn config() -> ClientConfig {
        ClientConfig::builder("http://127.0.0.1:9")
            .api_key("k-123")
            .timeout(Duration::from_secs(2))
            .build()
            .unwrap()
    }

    #[test]
    fn headers_include_bearer_token() {
        let headers = default_headers(&config()).unwrap();
        assert_eq!(headers[ACCEPT], "application/json");
        assert_eq!(headers[AUTHORIZATION], "Bearer k-123");
        assert!(headers[AUTHORIZATION].is_sensitive());
    }

    #[test]
    fn headers_omit_authorization_without_key() {
        let cfg = ClientConfig::new("http://localhost").unwrap();
        let headers = default_headers(&cfg).unwrap();
        assert!(headers.get(AUTHORIZATION).is_none());
    }

    #[test]
    fn header_rejects_control_characters_in_key() {
        let cfg = ClientConfig::builder("http://localhost").api_key("bad\nkey").build().unwrap();
        let err = default_headers(&cfg).unwrap_err();
        assert_eq!(err.details()["field"], "api_key");
    }

    #[test]
    fn close_is_idempotent() {
        let t = ReqwestTransport::new(&config()).unwrap();
        assert!(!t.is_closed());
        t.close();
        t.close();
        assert!(t.is_closed());
    }

    #[tokio::test]
    async fn send_after_close_reports_closed() {
        let t = ReqwestTransport::new(&config()).unwrap();
        t.close();
        let err = t.send(&HttpRequest::get("/health")).await.unwrap_err();
        assert_eq!(err, TransportError::Closed);
    }

    #[test]
    fn request_constructors() {
        let r = HttpRequest::post_json("/convert", serde_json::json!({"text": "x"}));
        assert_eq!(r.method, HttpMethod::Post);
        assert_eq!(r.method.to_string(), "POST");
        assert!(HttpRequest::get("/health").body.is_none());
    }

    #[tokio::test]
    async fn unresolvable_host_maps_to_dns() {
        // `.invalid` never resolves.
        let cfg = ClientConfig::builder("http://md-server.invalid")
            .timeout(Duration::from_secs(5))
            .build()
            .unwrap();
        let t = ReqwestTransport::new(&cfg).unwrap();
        let err = t.send(&HttpRequest::get("/health")).await.unwrap_err();
        assert!(matches!(err, TransportError::Dns(_)), "got {err:?}");
        t.close();
    }

    #[tokio::test]
    async fn refused_connection_maps_to_connect() {
        let t = ReqwestTransport::new(&config()).unwrap();
        let err = t.send(&HttpRequest::get("/health")).await.unwrap_err();
        assert!(matches!(err, TransportError::Connect(_)), "got {err:?}");
        t.close();
    }
}
