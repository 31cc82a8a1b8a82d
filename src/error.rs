//! Error types for the md-server client.
//!
//! Every failure a caller can observe is a [`ClientError`]. The enum is
//! closed: each variant is one kind of the error taxonomy and carries the
//! same two fields:
//!
//! * `message` - human-readable, suitable for logs and terminals.
//! * `details` - structured data copied verbatim from the server's error
//!   payload (or added by the client, e.g. the request URL), so callers can
//!   branch on fields instead of parsing text.
//!
//! | Kind | Raised for | Retried |
//! |------|------------|---------|
//! | [`ClientError::InvalidInput`] | caller-side problems, HTTP 400/413/415 | never |
//! | [`ClientError::Network`] | connect / DNS / reset failures | yes |
//! | [`ClientError::Timeout`] | attempt deadline exceeded, HTTP 408 | transport case only |
//! | [`ClientError::Conversion`] | server failures, unclassified responses | 429/5xx only |

use serde_json::{Map, Value};
use std::fmt;
use thiserror::Error;

/// Structured error details: a JSON object, kept exactly as the server sent it.
pub type ErrorDetails = Map<String, Value>;

/// The four taxonomy kinds, without payload.
///
/// Handy for `match`-free assertions and for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidInput,
    Network,
    Timeout,
    Conversion,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::InvalidInput => "invalid_input",
            ErrorKind::Network => "network",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Conversion => "conversion",
        };
        f.write_str(name)
    }
}

/// All errors returned by the md-server client.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ClientError {
    /// The input (or the configuration) was rejected before or by the server.
    #[error("{message}")]
    InvalidInput {
        message: String,
        details: ErrorDetails,
    },

    /// The server could not be reached or the connection broke mid-flight.
    #[error("{message}")]
    Network {
        message: String,
        details: ErrorDetails,
    },

    /// An attempt exceeded its deadline, or the server reported 408.
    #[error("{message}")]
    Timeout {
        message: String,
        details: ErrorDetails,
    },

    /// Server-side processing failure or any response we could not classify.
    #[error("{message}")]
    Conversion {
        message: String,
        details: ErrorDetails,
    },
}

impl ClientError {
    /// Build an error of the given kind with empty details.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self::with_details(kind, message, ErrorDetails::new())
    }

    /// Build an error of the given kind carrying `details`.
    pub fn with_details(kind: ErrorKind, message: impl Into<String>, details: ErrorDetails) -> Self {
        let message = message.into();
        match kind {
            ErrorKind::InvalidInput => ClientError::InvalidInput { message, details },
            ErrorKind::Network => ClientError::Network { message, details },
            ErrorKind::Timeout => ClientError::Timeout { message, details },
            ErrorKind::Conversion => ClientError::Conversion { message, details },
        }
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidInput, message)
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Network, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Timeout, message)
    }

    pub fn conversion(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Conversion, message)
    }

    /// Add (or overwrite) one detail entry.
    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.details_mut().insert(key.into(), value.into());
        self
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ClientError::InvalidInput { .. } => ErrorKind::InvalidInput,
            ClientError::Network { .. } => ErrorKind::Network,
            ClientError::Timeout { .. } => ErrorKind::Timeout,
            ClientError::Conversion { .. } => ErrorKind::Conversion,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            ClientError::InvalidInput { message, .. }
            | ClientError::Network { message, .. }
            | ClientError::Timeout { message, .. }
            | ClientError::Conversion { message, .. } => message,
        }
    }

    pub fn details(&self) -> &ErrorDetails {
        match self {
            ClientError::InvalidInput { details, .. }
            | ClientError::Network { details, .. }
            | ClientError::Timeout { details, .. }
            | ClientError::Conversion { details, .. } => details,
        }
    }

    fn details_mut(&mut self) -> &mut ErrorDetails {
        match self {
            ClientError::InvalidInput { details, .. }
            | ClientError::Network { details, .. }
            | ClientError::Timeout { details, .. }
            | ClientError::Conversion { details, .. } => details,
        }
    }

    /// Split into `(kind, message, details)`.
    pub fn into_parts(self) -> (ErrorKind, String, ErrorDetails) {
        let kind = self.kind();
        match self {
            ClientError::InvalidInput { message, details }
            | ClientError::Network { message, details }
            | ClientError::Timeout { message, details }
            | ClientError::Conversion { message, details } => (kind, message, details),
        }
    }

    /// Re-wrap this error as `kind` with a prefixed message, keeping details.
    ///
    /// Used by the health and formats calls, which report every failure as a
    /// network problem with the original cause in the message.
    pub fn rewrap(self, kind: ErrorKind, prefix: &str) -> Self {
        let (_, message, details) = self.into_parts();
        Self::with_details(kind, format!("{prefix}: {message}"), details)
    }
}
