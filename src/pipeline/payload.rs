//! Request-body construction for `POST /convert`.
//!
//! One builder per input kind. They validate the input, then produce a
//! [`ConvertRequest`]. None of them touch the network; only
//! [`file_payload`] does I/O (reading the file into memory).
//!
//! Binary content travels base64-encoded inside the JSON body. The server
//! accepts exactly one of `url`, `content` or `text` per request.

use crate::error::ClientError;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::Serialize;
use serde_json::{Map, Value};
use std::io::ErrorKind as IoErrorKind;
use std::path::Path;
use tracing::debug;

/// Wire-format body of `POST /convert`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ConvertRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Base64 (standard alphabet) of the raw bytes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    /// Output of the option merger; omitted when empty.
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub options: Map<String, Value>,
}

impl ConvertRequest {
    pub fn to_json(&self) -> Value {
        // Serialising plain strings and a JSON map cannot fail.
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Read a local file and build a content payload named after its base name.
pub fn file_payload(path: &Path, options: Map<String, Value>) -> Result<ConvertRequest, ClientError> {
    let shown = path.display().to_string();
    if shown.trim().is_empty() {
        return Err(ClientError::invalid_input("File path cannot be empty"));
    }
    let Some(filename) = path.file_name().map(|n| n.to_string_lossy().into_owned()) else {
        return Err(ClientError::invalid_input(format!("Invalid file path: {shown}")).with_detail("path", shown));
    };

    let meta = match std::fs::metadata(path) {
        Ok(meta) => meta,
        Err(e) if e.kind() == IoErrorKind::NotFound => {
            return Err(ClientError::invalid_input(format!("File not found: {shown}")).with_detail("path", shown));
        }
        Err(e) if e.kind() == IoErrorKind::PermissionDenied => {
            return Err(permission_denied(&shown));
        }
        Err(e) => return Err(read_failed(&shown, &e)),
    };
    if !meta.is_file() {
        return Err(ClientError::invalid_input(format!("Path is not a file: {shown}")).with_detail("path", shown));
    }

    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == IoErrorKind::PermissionDenied => return Err(permission_denied(&shown)),
        Err(e) => return Err(read_failed(&shown, &e)),
    };
    if bytes.is_empty() {
        return Err(ClientError::invalid_input(format!("File is empty: {shown}")).with_detail("path", shown));
    }

    debug!("Read {} bytes from {}", bytes.len(), shown);
    content_payload(&bytes, Some(&filename), options)
}

fn permission_denied(shown: &str) -> ClientError {
    ClientError::invalid_input(format!("Permission denied reading file: {shown}")).with_detail("path", shown)
}

fn read_failed(shown: &str, e: &std::io::Error) -> ClientError {
    ClientError::invalid_input(format!("Error reading file {shown}: {e}")).with_detail("path", shown)
}

/// Build a URL payload. Only `http://` and `https://` are accepted.
pub fn url_payload(url: &str, options: Map<String, Value>) -> Result<ConvertRequest, ClientError> {
    let url = url.trim();
    if url.is_empty() {
        return Err(ClientError::invalid_input("URL cannot be empty"));
    }
    if !url.contains("://") {
        return Err(ClientError::invalid_input("Invalid URL format").with_detail("url", url));
    }
    if !is_http_url(url) {
        return Err(ClientError::invalid_input("Only HTTP/HTTPS URLs allowed").with_detail("url", url));
    }
    Ok(ConvertRequest {
        url: Some(url.to_string()),
        options,
        ..Default::default()
    })
}

/// Check if the input string looks like an HTTP(S) URL.
pub fn is_http_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Build a base64 content payload. `filename` helps the server detect the format.
pub fn content_payload(
    content: &[u8],
    filename: Option<&str>,
    options: Map<String, Value>,
) -> Result<ConvertRequest, ClientError> {
    if content.is_empty() {
        return Err(ClientError::invalid_input("Content cannot be empty"));
    }
    let encoded = STANDARD.encode(content);
    debug!("Encoded {} bytes → {} bytes base64", content.len(), encoded.len());
    Ok(ConvertRequest {
        content: Some(encoded),
        filename: filename.map(str::to_string),
        options,
        ..Default::default()
    })
}

/// Build a text payload with an explicit MIME type such as `text/html`.
pub fn text_payload(text: &str, mime_type: &str, options: Map<String, Value>) -> Result<ConvertRequest, ClientError> {
    if text.trim().is_empty() {
        return Err(ClientError::invalid_input("Text cannot be empty"));
    }
    let mime_type = mime_type.trim();
    if mime_type.is_empty() {
        return Err(ClientError::invalid_input("MIME type cannot be empty"));
    }
    if !mime_type.contains('/') {
        return Err(ClientError::invalid_input("MIME type must contain '/'").with_detail("mime_type", mime_type));
    }
    Ok(ConvertRequest {
        text: Some(text.to_string()),
        mime_type: Some(mime_type.to_string()),
        options,
        ..Default::default()
    })
}
