//! Conversion options and the allow-list merger.
//!
//! The server understands a fixed set of options. Callers may hand us more
//! (e.g. keys a newer server knows about); those are dropped here rather
//! than rejected, so old clients keep working against new servers.

use crate::error::{ClientError, ErrorKind};
use serde_json::{Map, Value};

/// A recognized option: wire name plus a type check for its value.
pub type OptionRule = (&'static str, fn(&Value) -> bool);

/// Options the server recognizes. Adding one is a one-line change here.
pub const RECOGNIZED_OPTIONS: &[OptionRule] = &[
    ("js_rendering", Value::is_boolean),
    ("extract_images", Value::is_boolean),
    ("ocr_enabled", Value::is_boolean),
    ("preserve_formatting", Value::is_boolean),
    ("clean_markdown", Value::is_boolean),
    ("timeout", Value::is_u64),
];

/// Per-call conversion options.
///
/// Unset fields are not sent; the server applies its own defaults.
///
/// ```rust
/// use md_server_client::ConversionOptions;
///
/// let opts = ConversionOptions::default().ocr_enabled(true).timeout(60);
/// assert_eq!(opts.ocr_enabled, Some(true));
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConversionOptions {
    /// Render JavaScript with a headless browser (URL inputs).
    pub js_rendering: Option<bool>,
    /// Extract and reference embedded images.
    pub extract_images: Option<bool>,
    /// OCR scanned PDFs and images.
    pub ocr_enabled: Option<bool>,
    /// Keep complex formatting.
    pub preserve_formatting: Option<bool>,
    /// Normalise the produced Markdown.
    pub clean_markdown: Option<bool>,
    /// Server-side conversion timeout in seconds.
    pub timeout: Option<u64>,
    /// Free-form extras. Only recognized keys survive [`merge_options`].
    pub extra: Map<String, Value>,
}

impl ConversionOptions {
    pub fn js_rendering(mut self, v: bool) -> Self {
        self.js_rendering = Some(v);
        self
    }

    pub fn extract_images(mut self, v: bool) -> Self {
        self.extract_images = Some(v);
        self
    }

    pub fn ocr_enabled(mut self, v: bool) -> Self {
        self.ocr_enabled = Some(v);
        self
    }

    pub fn preserve_formatting(mut self, v: bool) -> Self {
        self.preserve_formatting = Some(v);
        self
    }

    pub fn clean_markdown(mut self, v: bool) -> Self {
        self.clean_markdown = Some(v);
        self
    }

    pub fn timeout(mut self, secs: u64) -> Self {
        self.timeout = Some(secs);
        self
    }

    /// Attach an arbitrary key. Typed fields win over extras of the same name.
    pub fn extra(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// Flatten into the candidate map fed to [`merge_options`].
    pub fn to_candidates(&self) -> Map<String, Value> {
        let mut candidates = self.extra.clone();
        let typed: [(&str, Option<Value>); 6] = [
            ("js_rendering", self.js_rendering.map(Value::from)),
            ("extract_images", self.extract_images.map(Value::from)),
            ("ocr_enabled", self.ocr_enabled.map(Value::from)),
            ("preserve_formatting", self.preserve_formatting.map(Value::from)),
            ("clean_markdown", self.clean_markdown.map(Value::from)),
            ("timeout", self.timeout.map(Value::from)),
        ];
        for (name, value) in typed {
            if let Some(v) = value {
                candidates.insert(name.to_string(), v);
            }
        }
        candidates
    }

    /// Run the merger over these options.
    pub fn to_request_options(&self) -> Result<Map<String, Value>, ClientError> {
        merge_options(&self.to_candidates())
    }
}

/// Keep only recognized, non-null options.
///
/// Unknown keys are dropped silently. A recognized key with a value of the
/// wrong type is an [`ClientError::InvalidInput`].
pub fn merge_options(candidates: &Map<String, Value>) -> Result<Map<String, Value>, ClientError> {
    let mut merged = Map::new();
    for (name, is_valid) in RECOGNIZED_OPTIONS {
        let Some(value) = candidates.get(*name) else {
            continue;
        };
        if value.is_null() {
            continue;
        }
        if !is_valid(value) {
            return Err(ClientError::new(
                ErrorKind::InvalidInput,
                format!("Invalid value for option '{name}': {value}"),
            )
            .with_detail("option", *name)
            .with_detail("value", value.clone()));
        }
        merged.insert((*name).to_string(), value.clone());
    }
    Ok(merged)
}
