//! Success-envelope decoding.
//!
//! The parser is strict about the top-level discriminator (`success` /
//! `error`) and lenient about everything inside `metadata`: missing fields
//! default to zero, `"unknown"` or an empty list so a server that adds or
//! drops metadata does not break old clients.

use crate::error::{ClientError, ErrorKind};
use crate::output::{ConversionMetadata, ConversionResult, SourceType};
use crate::pipeline::classify::{details_from, Verdict};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

/// Every field is optional: a key that is absent or `null` takes its default.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct WireMetadata {
    source_type: Option<SourceType>,
    source_size: Option<u64>,
    markdown_size: Option<u64>,
    conversion_time_ms: Option<f64>,
    detected_format: Option<String>,
    warnings: Option<Vec<String>>,
}

impl From<WireMetadata> for ConversionMetadata {
    fn from(m: WireMetadata) -> Self {
        ConversionMetadata {
            source_type: m.source_type.unwrap_or_default(),
            source_size: m.source_size.unwrap_or_default(),
            markdown_size: m.markdown_size.unwrap_or_default(),
            processing_time: m.conversion_time_ms.unwrap_or_default() / 1000.0,
            detected_format: m.detected_format.unwrap_or_else(|| "unknown".to_string()),
            warnings: m.warnings.unwrap_or_default(),
        }
    }
}

/// Decode a 2xx `/convert` body into a [`ConversionResult`].
///
/// A 2xx body can still carry a logical failure (`success: false` or an
/// `error` object); that is returned as a non-retryable
/// [`ClientError::Conversion`] with the envelope's message and details.
pub fn parse_conversion(body: &str) -> Result<ConversionResult, Verdict> {
    let value = decode_object(body)?;

    let success = value.get("success").and_then(Value::as_bool);
    let error = value.get("error").filter(|e| !e.is_null());
    if success == Some(false) || error.is_some() {
        return Err(Verdict::fatal(envelope_error(error)));
    }
    if success.is_none() && value.get("markdown").is_none() {
        return Err(invalid("Invalid response format: missing 'success' field"));
    }

    let markdown = match value.get("markdown") {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(_) => return Err(invalid("Invalid response format: 'markdown' is not a string")),
    };

    let metadata = match value.get("metadata") {
        None | Some(Value::Null) => WireMetadata::default(),
        Some(m) => WireMetadata::deserialize(m)
            .map_err(|e| invalid(format!("Invalid response format: bad metadata: {e}")))?,
    };

    let request_id = value
        .get("request_id")
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .unwrap_or_else(new_request_id);

    Ok(ConversionResult {
        markdown,
        metadata: metadata.into(),
        success: true,
        request_id,
    })
}

/// Decode a 2xx JSON body of any shape (health, formats).
pub fn parse_json<T: DeserializeOwned>(body: &str) -> Result<T, Verdict> {
    serde_json::from_str(body).map_err(|e| invalid(format!("Invalid response format: {e}")))
}

/// Client-side request id, used when the server does not send one.
pub fn new_request_id() -> String {
    format!("req_{}", Uuid::new_v4())
}

fn decode_object(body: &str) -> Result<serde_json::Map<String, Value>, Verdict> {
    match serde_json::from_str::<Value>(body) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(invalid("Invalid response format: expected JSON object")),
        Err(e) => Err(invalid(format!("Invalid response format: {e}"))),
    }
}

fn envelope_error(error: Option<&Value>) -> ClientError {
    let message = error
        .and_then(|e| e.get("message"))
        .and_then(Value::as_str)
        .unwrap_or("Unknown error");
    let details = details_from(error.and_then(|e| e.get("details")));
    ClientError::with_details(ErrorKind::Conversion, message, details)
}

fn invalid(message: impl Into<String>) -> Verdict {
    Verdict::fatal(ClientError::conversion(message))
}
