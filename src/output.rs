//! Result types returned by the client.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::time::Duration;

/// Where the converted document came from, as reported by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    File,
    Url,
    Content,
    Text,
    /// The server omitted the field or sent a value this client does not know.
    #[default]
    #[serde(other)]
    Unknown,
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SourceType::File => "file",
            SourceType::Url => "url",
            SourceType::Content => "content",
            SourceType::Text => "text",
            SourceType::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// Metadata about one conversion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversionMetadata {
    pub source_type: SourceType,
    /// Size of the source input in bytes.
    pub source_size: u64,
    /// Size of the produced Markdown in bytes.
    pub markdown_size: u64,
    /// Server-side conversion time in seconds.
    pub processing_time: f64,
    /// MIME type (or format name) the server detected.
    pub detected_format: String,
    /// Non-fatal warnings, in server order.
    pub warnings: Vec<String>,
}

impl ConversionMetadata {
    /// Negative values read as zero; values too large for a `Duration` saturate.
    pub fn processing_duration(&self) -> Duration {
        Duration::try_from_secs_f64(self.processing_time.max(0.0)).unwrap_or(Duration::MAX)
    }
}

/// The result of a completed conversion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversionResult {
    pub markdown: String,
    pub metadata: ConversionMetadata,
    pub success: bool,
    /// Server-assigned id, or `req_<uuid>` when the server sent none.
    pub request_id: String,
}

/// Body of `GET /health`.
///
/// Only the common fields are typed; anything else the server reports is
/// kept in `extra`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct HealthStatus {
    #[serde(default)]
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uptime_seconds: Option<f64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        matches!(self.status.as_str(), "healthy" | "ok")
    }
}

/// Body of `GET /formats`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FormatsResponse {
    #[serde(default)]
    pub formats: Map<String, Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn source_type_accepts_unknown_values() {
        let t: SourceType = serde_json::from_value(json!("text")).unwrap();
        assert_eq!(t, SourceType::Text);
        let t: SourceType = serde_json::from_value(json!("carrier-pigeon")).unwrap();
        assert_eq!(t, SourceType::Unknown);
    }

    #[test]
    fn health_keeps_unknown_fields() {
        let h: HealthStatus = serde_json::from_value(json!({
            "status": "healthy",
            "version": "1.2.0",
            "uptime_seconds": 42.5,
            "conversions_total": 7
        }))
        .unwrap();
        assert!(h.is_healthy());
        assert_eq!(h.version.as_deref(), Some("1.2.0"));
        assert_eq!(h.extra["conversions_total"], json!(7));
    }

    #[test]
    fn processing_duration_from_seconds() {
        let m = ConversionMetadata {
            source_type: SourceType::File,
            source_size: 10,
            markdown_size: 5,
            processing_time: 0.25,
            detected_format: "text/plain".into(),
            warnings: vec![],
        };
        assert_eq!(m.processing_duration(), Duration::from_millis(250));
    }

    #[test]
    fn processing_duration_saturates_out_of_range_values() {
        let mut m = ConversionMetadata {
            source_type: SourceType::Text,
            source_size: 0,
            markdown_size: 0,
            processing_time: 1e297,
            detected_format: "unknown".into(),
            warnings: vec![],
        };
        assert_eq!(m.processing_duration(), Duration::MAX);
        m.processing_time = f64::INFINITY;
        assert_eq!(m.processing_duration(), Duration::MAX);
        m.processing_time = -3.0;
        assert_eq!(m.processing_duration(), Duration::ZERO);
    }
}
