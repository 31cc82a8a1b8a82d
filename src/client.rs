//! The remote client facade.
//!
//! [`RemoteClient`] wires the pipeline stages together:
//!
//! ```text
//! convert_*(input, options)
//!   ├─ options::merge_options      (no I/O)
//!   ├─ payload::*_payload          (reads the file for convert_file)
//!   ├─ retry::run_with_retry
//!   │    └─ transport.send ─▶ classify on failure
//!   └─ response::parse_conversion
//! ```
//!
//! Input problems are reported before anything touches the network. Every
//! async method has a `_sync` twin built on [`crate::blocking`].
//!
//! ## Lifecycle
//!
//! The client owns its transport (and with it the connection pool) until
//! [`RemoteClient::close`] or drop. `close` is idempotent; calls made after
//! it fail with a [`ClientError::Network`] "Client is closed".

use crate::blocking;
use crate::config::ClientConfig;
use crate::error::{ClientError, ErrorKind};
use crate::output::{ConversionResult, FormatsResponse, HealthStatus};
use crate::pipeline::classify::{classify_status, classify_transport};
use crate::pipeline::options::ConversionOptions;
use crate::pipeline::payload::{self, ConvertRequest};
use crate::pipeline::response::{parse_conversion, parse_json};
use crate::pipeline::retry::{run_with_retry, RetryPolicy, Sleeper, TokioSleeper};
use crate::pipeline::transport::{HttpRequest, HttpResponse, ReqwestTransport, Transport, TransportError};
use futures::future::BoxFuture;
use serde::de::DeserializeOwned;
use std::fmt;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;
use tracing::{debug, info};

pub const CONVERT_PATH: &str = "/convert";
pub const HEALTH_PATH: &str = "/health";
pub const FORMATS_PATH: &str = "/formats";

/// Client for a remote md-server.
///
/// `RemoteClient` is `Send + Sync`; share it behind an `Arc` to issue calls
/// from several tasks or threads over one connection pool.
///
/// # Example
/// ```rust,no_run
/// use md_server_client::{ClientConfig, ConversionOptions, RemoteClient};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), md_server_client::ClientError> {
/// let client = RemoteClient::new(ClientConfig::new("http://localhost:8080")?)?;
/// let result = client
///     .convert_url("https://example.com", &ConversionOptions::default().js_rendering(true))
///     .await?;
/// println!("{}", result.markdown);
/// client.close();
/// # Ok(())
/// # }
/// ```
pub struct RemoteClient {
    config: ClientConfig,
    transport: Mutex<Option<Arc<dyn Transport>>>,
    sleeper: Arc<dyn Sleeper>,
}

impl fmt::Debug for RemoteClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteClient")
            .field("config", &self.config)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl RemoteClient {
    /// Build a client with the default `reqwest` transport.
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        let transport = ReqwestTransport::new(&config)?;
        Ok(Self::with_transport(config, Arc::new(transport)))
    }

    /// Build a client over a caller-supplied transport.
    pub fn with_transport(config: ClientConfig, transport: Arc<dyn Transport>) -> Self {
        Self {
            config,
            transport: Mutex::new(Some(transport)),
            sleeper: Arc::new(TokioSleeper),
        }
    }

    /// Replace the backoff sleeper (tests use one that records instead of waiting).
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn is_closed(&self) -> bool {
        self.lock_transport().is_none()
    }

    /// Release the connection pool. Safe to call any number of times.
    pub fn close(&self) {
        let transport = self.lock_transport().take();
        if let Some(transport) = transport {
            transport.close();
            info!("Client for {} closed", self.config.endpoint);
        }
    }

    /// Run `f` with this client, then close it on every exit path.
    ///
    /// ```rust,no_run
    /// use futures::FutureExt;
    /// use md_server_client::{ClientConfig, RemoteClient};
    ///
    /// # async fn demo() -> Result<(), md_server_client::ClientError> {
    /// let client = RemoteClient::new(ClientConfig::new("http://localhost:8080")?)?;
    /// let health = client.scope(|c| async move { c.health_check().await }.boxed()).await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn scope<T, F>(self, f: F) -> Result<T, ClientError>
    where
        F: for<'c> FnOnce(&'c RemoteClient) -> BoxFuture<'c, Result<T, ClientError>>,
    {
        // `self` is dropped (and therefore closed) even if `f` panics.
        let result = f(&self).await;
        self.close();
        result
    }

    /// Open a client for `config`, run `f`, and close it.
    pub async fn scoped<T, F>(config: ClientConfig, f: F) -> Result<T, ClientError>
    where
        F: for<'c> FnOnce(&'c RemoteClient) -> BoxFuture<'c, Result<T, ClientError>>,
    {
        Self::new(config)?.scope(f).await
    }

    // ── Conversions ──────────────────────────────────────────────────────

    /// Read a local file and convert it.
    pub async fn convert_file(
        &self,
        path: impl AsRef<Path>,
        options: &ConversionOptions,
    ) -> Result<ConversionResult, ClientError> {
        let path = path.as_ref();
        info!("Converting file: {}", path.display());
        let request_options = options.to_request_options()?;
        let body = payload::file_payload(path, request_options)?;
        self.convert(body).await
    }

    /// Ask the server to fetch and convert an HTTP(S) URL.
    pub async fn convert_url(&self, url: &str, options: &ConversionOptions) -> Result<ConversionResult, ClientError> {
        info!("Converting URL: {}", url.trim());
        let request_options = options.to_request_options()?;
        let body = payload::url_payload(url, request_options)?;
        self.convert(body).await
    }

    /// Convert raw bytes. `filename` (if any) helps the server detect the format.
    pub async fn convert_content(
        &self,
        content: &[u8],
        filename: Option<&str>,
        options: &ConversionOptions,
    ) -> Result<ConversionResult, ClientError> {
        info!("Converting {} bytes of content", content.len());
        let request_options = options.to_request_options()?;
        let body = payload::content_payload(content, filename, request_options)?;
        self.convert(body).await
    }

    /// Convert text of the given MIME type (e.g. `text/html`).
    pub async fn convert_text(
        &self,
        text: &str,
        mime_type: &str,
        options: &ConversionOptions,
    ) -> Result<ConversionResult, ClientError> {
        info!("Converting {} bytes of {}", text.len(), mime_type.trim());
        let request_options = options.to_request_options()?;
        let body = payload::text_payload(text, mime_type, request_options)?;
        self.convert(body).await
    }

    /// `GET /health`. Any failure is reported as a network error.
    pub async fn health_check(&self) -> Result<HealthStatus, ClientError> {
        self.get_json(HEALTH_PATH)
            .await
            .map_err(|e| e.rewrap(ErrorKind::Network, "Health check failed"))
    }

    /// `GET /formats`. Any failure is reported as a network error.
    pub async fn get_formats(&self) -> Result<FormatsResponse, ClientError> {
        self.get_json(FORMATS_PATH)
            .await
            .map_err(|e| e.rewrap(ErrorKind::Network, "Failed to get formats"))
    }

    // ── Blocking twins ───────────────────────────────────────────────────

    pub fn convert_file_sync(
        &self,
        path: impl AsRef<Path>,
        options: &ConversionOptions,
    ) -> Result<ConversionResult, ClientError> {
        let path = path.as_ref();
        blocking::run(self.convert_file(path, options))
    }

    pub fn convert_url_sync(&self, url: &str, options: &ConversionOptions) -> Result<ConversionResult, ClientError> {
        blocking::run(self.convert_url(url, options))
    }

    pub fn convert_content_sync(
        &self,
        content: &[u8],
        filename: Option<&str>,
        options: &ConversionOptions,
    ) -> Result<ConversionResult, ClientError> {
        blocking::run(self.convert_content(content, filename, options))
    }

    pub fn convert_text_sync(
        &self,
        text: &str,
        mime_type: &str,
        options: &ConversionOptions,
    ) -> Result<ConversionResult, ClientError> {
        blocking::run(self.convert_text(text, mime_type, options))
    }

    pub fn health_check_sync(&self) -> Result<HealthStatus, ClientError> {
        blocking::run(self.health_check())
    }

    pub fn get_formats_sync(&self) -> Result<FormatsResponse, ClientError> {
        blocking::run(self.get_formats())
    }

    // ── Internal helpers ─────────────────────────────────────────────────

    async fn convert(&self, body: ConvertRequest) -> Result<ConversionResult, ClientError> {
        let start = Instant::now();
        let response = self.execute(HttpRequest::post_json(CONVERT_PATH, body.to_json())).await?;
        let result = parse_conversion(&response.body).map_err(|verdict| verdict.error)?;
        info!(
            "Conversion {} complete: {} bytes of markdown in {}ms",
            result.request_id,
            result.markdown.len(),
            start.elapsed().as_millis()
        );
        Ok(result)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        let response = self.execute(HttpRequest::get(path)).await?;
        parse_json(&response.body).map_err(|verdict| verdict.error)
    }

    /// One logical call: attempts with retry, each bounded by the timeout.
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, ClientError> {
        let url = self.config.url_for(&request.path);
        let transport = self.transport().ok_or_else(|| {
            classify_transport(&TransportError::Closed, &url, self.config.timeout).error
        })?;
        let timeout = self.config.timeout;
        let policy = RetryPolicy::from_config(&self.config);
        let request = &request;
        let url = url.as_str();

        run_with_retry(policy, self.sleeper.as_ref(), |attempt| {
            let transport = Arc::clone(&transport);
            async move {
                debug!("{} {} (attempt {})", request.method, url, attempt + 1);
                let outcome = match tokio::time::timeout(timeout, transport.send(request)).await {
                    Ok(outcome) => outcome,
                    Err(_) => Err(TransportError::Timeout),
                };
                match outcome {
                    Ok(response) if response.is_error() => Err(classify_status(response.status, &response.body)),
                    Ok(response) => Ok(response),
                    Err(failure) => Err(classify_transport(&failure, url, timeout)),
                }
            }
        })
        .await
    }

    fn transport(&self) -> Option<Arc<dyn Transport>> {
        self.lock_transport().as_ref().map(Arc::clone)
    }

    fn lock_transport(&self) -> MutexGuard<'_, Option<Arc<dyn Transport>>> {
        self.transport.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for RemoteClient {
    fn drop(&mut self) {
        self.close();
    }
}
