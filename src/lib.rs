//! # md-server-client
//!
//! Resilient client for an `md-server` document-to-Markdown conversion
//! service.
//!
//! ## Why this crate?
//!
//! Talking to a conversion server looks like one POST, but real deployments
//! drop connections, rate-limit, time out on large documents and sit behind
//! gateways that answer 502 with an HTML page. This crate turns all of that
//! into one typed [`ClientError`] with four kinds, retries only what is
//! worth retrying, and keeps the server's structured error details intact
//! for the caller.
//!
//! ## Pipeline Overview
//!
//! ```text
//! convert_{file,url,content,text}
//!  │
//!  ├─ 1. Options    keep recognized options, drop unknown ones
//!  ├─ 2. Payload    validate input, build the JSON body (base64 for bytes)
//!  ├─ 3. Retry      up to 1 + max_retries attempts, exponential backoff
//!  ├─ 4. Transport  pooled keep-alive HTTP, per-attempt timeout
//!  ├─ 5. Classify   status / transport failure → error kind + retry verdict
//!  └─ 6. Parse      success envelope → ConversionResult
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use md_server_client::{ClientConfig, ConversionOptions, RemoteClient};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ClientConfig::builder("http://localhost:8080")
//!         .api_key("secret")
//!         .build()?;
//!     let client = RemoteClient::new(config)?;
//!
//!     let result = client
//!         .convert_text("<h1>Hello</h1>", "text/html", &ConversionOptions::default())
//!         .await?;
//!     println!("{}", result.markdown);
//!     eprintln!("{} in {:.3}s", result.request_id, result.metadata.processing_time);
//!     Ok(())
//! }
//! ```
//!
//! Blocking code uses the `_sync` twins, which also work when called from
//! inside a running tokio runtime:
//!
//! ```rust,no_run
//! # use md_server_client::{ClientConfig, ConversionOptions, RemoteClient};
//! # fn main() -> Result<(), md_server_client::ClientError> {
//! let client = RemoteClient::new(ClientConfig::new("http://localhost:8080")?)?;
//! let result = client.convert_file_sync("report.pdf", &ConversionOptions::default().ocr_enabled(true))?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `md-convert` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! md-server-client = { version = "0.5", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod blocking;
pub mod client;
pub mod config;
pub mod error;
pub mod output;
pub mod pipeline;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use blocking::{BridgeStrategy, ExecutionContext};
pub use client::RemoteClient;
pub use config::{ClientConfig, ClientConfigBuilder};
pub use error::{ClientError, ErrorDetails, ErrorKind};
pub use output::{ConversionMetadata, ConversionResult, FormatsResponse, HealthStatus, SourceType};
pub use pipeline::options::ConversionOptions;
pub use pipeline::retry::{RetryPolicy, Sleeper, TokioSleeper};
pub use pipeline::transport::{HttpMethod, HttpRequest, HttpResponse, ReqwestTransport, Transport, TransportError};
