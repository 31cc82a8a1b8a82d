//! Client configuration.
//!
//! Every knob of a [`crate::RemoteClient`] lives in one immutable
//! [`ClientConfig`], built through [`ClientConfigBuilder`]. A client never
//! changes its configuration after construction; to point at another server
//! or change the retry budget, build a new client.

use crate::error::{ClientError, ErrorKind};
use std::fmt;
use std::time::Duration;

/// Default per-attempt timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
/// Default number of retries after the first attempt.
pub const DEFAULT_MAX_RETRIES: u32 = 3;
/// Default base delay for exponential backoff.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);
/// Default number of idle keep-alive connections kept in the pool.
pub const DEFAULT_MAX_KEEPALIVE: usize = 5;
/// Default cap on concurrent connections.
pub const DEFAULT_MAX_CONNECTIONS: usize = 10;

/// Configuration for a [`crate::RemoteClient`].
///
/// # Example
/// ```rust
/// use md_server_client::ClientConfig;
/// use std::time::Duration;
///
/// let config = ClientConfig::builder("https://md.example.com/")
///     .api_key("secret")
///     .timeout(Duration::from_secs(10))
///     .max_retries(5)
///     .build()
///     .unwrap();
/// assert_eq!(config.endpoint, "https://md.example.com");
/// ```
#[derive(Clone)]
pub struct ClientConfig {
    /// Base URL of the md-server API, without trailing slash.
    pub endpoint: String,

    /// Bearer token sent as `Authorization: Bearer <key>`. Omitted when `None`.
    pub api_key: Option<String>,

    /// Deadline for a single attempt (connect + request + response body). Default: 30 s.
    ///
    /// Applies per attempt, not per logical call: with 3 retries a call can
    /// take up to four timeouts plus the backoff sleeps in between.
    pub timeout: Duration,

    /// Retries after the first attempt. Default: 3 (so up to 4 attempts).
    pub max_retries: u32,

    /// Base delay for exponential backoff. Default: 1 s.
    ///
    /// Retry *n* (0-based) waits `retry_delay × 2^n`, capped at 60 s:
    /// 1 s → 2 s → 4 s with the defaults.
    pub retry_delay: Duration,

    /// Idle keep-alive connections kept in the pool. Default: 5.
    pub max_keepalive_connections: usize,

    /// Maximum concurrent in-flight requests. Default: 10.
    ///
    /// Calls beyond this limit wait for a free slot instead of failing.
    pub max_connections: usize,

    /// `User-Agent` header value.
    pub user_agent: String,
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("endpoint", &self.endpoint)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("timeout", &self.timeout)
            .field("max_retries", &self.max_retries)
            .field("retry_delay", &self.retry_delay)
            .field("max_keepalive_connections", &self.max_keepalive_connections)
            .field("max_connections", &self.max_connections)
            .field("user_agent", &self.user_agent)
            .finish()
    }
}

impl ClientConfig {
    /// Start a builder for the given endpoint.
    pub fn builder(endpoint: impl Into<String>) -> ClientConfigBuilder {
        ClientConfigBuilder {
            config: ClientConfig {
                endpoint: endpoint.into(),
                api_key: None,
                timeout: DEFAULT_TIMEOUT,
                max_retries: DEFAULT_MAX_RETRIES,
                retry_delay: DEFAULT_RETRY_DELAY,
                max_keepalive_connections: DEFAULT_MAX_KEEPALIVE,
                max_connections: DEFAULT_MAX_CONNECTIONS,
                user_agent: default_user_agent(),
            },
        }
    }

    /// Shorthand for `ClientConfig::builder(endpoint).build()`.
    pub fn new(endpoint: impl Into<String>) -> Result<Self, ClientError> {
        Self::builder(endpoint).build()
    }

    /// Full URL for an API path such as `/convert`.
    pub fn url_for(&self, path: &str) -> String {
        format!("{}{}", self.endpoint, path)
    }
}

/// `md-server-sdk/<crate version>`.
pub fn default_user_agent() -> String {
    format!("md-server-sdk/{}", env!("CARGO_PKG_VERSION"))
}

/// Builder for [`ClientConfig`].
#[derive(Debug)]
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.config.api_key = Some(key.into());
        self
    }

    /// Set or clear the API key. Empty strings count as "no key".
    pub fn api_key_opt(mut self, key: Option<String>) -> Self {
        self.config.api_key = key.filter(|k| !k.trim().is_empty());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.config.retry_delay = delay;
        self
    }

    pub fn max_keepalive_connections(mut self, n: usize) -> Self {
        self.config.max_keepalive_connections = n;
        self
    }

    pub fn max_connections(mut self, n: usize) -> Self {
        self.config.max_connections = n;
        self
    }

    pub fn user_agent(mut self, ua: impl Into<String>) -> Self {
        self.config.user_agent = ua.into();
        self
    }

    /// Normalise the endpoint and validate every field.
    pub fn build(mut self) -> Result<ClientConfig, ClientError> {
        let endpoint = self.config.endpoint.trim().trim_end_matches('/').to_string();
        if endpoint.is_empty() {
            return Err(invalid_field("endpoint", "Endpoint cannot be empty"));
        }
        if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
            return Err(invalid_field(
                "endpoint",
                format!("Endpoint must start with http:// or https://, got '{endpoint}'"),
            ));
        }
        self.config.endpoint = endpoint;

        let c = &self.config;
        if c.timeout.is_zero() {
            return Err(invalid_field("timeout", "Timeout must be greater than zero"));
        }
        if c.max_connections == 0 {
            return Err(invalid_field("max_connections", "max_connections must be ≥ 1"));
        }
        if c.max_keepalive_connections > c.max_connections {
            return Err(invalid_field(
                "max_keepalive_connections",
                format!(
                    "max_keepalive_connections ({}) cannot exceed max_connections ({})",
                    c.max_keepalive_connections, c.max_connections
                ),
            ));
        }
        Ok(self.config)
    }
}

fn invalid_field(field: &str, message: impl Into<String>) -> ClientError {
    ClientError::new(ErrorKind::InvalidInput, message).with_detail("field", field)
}
