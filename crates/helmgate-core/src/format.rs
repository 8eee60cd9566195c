//! Decoders for the structured output formats the tool can emit
//!
//! The registry is an ordinary value owned by whoever needs it. Decoders are
//! looked up by the same name passed to the tool's `--output` flag.

use std::collections::HashMap;
use std::sync::Arc;

use serde::de::DeserializeOwned;

use crate::error::{CoreError, Result};

/// Parses tool output into a generic JSON value
pub trait Decoder: Send + Sync {
    fn decode(&self, text: &str) -> Result<serde_json::Value>;
}

pub struct JsonDecoder;

impl Decoder for JsonDecoder {
    fn decode(&self, text: &str) -> Result<serde_json::Value> {
        Ok(serde_json::from_str(text)?)
    }
}

pub struct YamlDecoder;

impl Decoder for YamlDecoder {
    fn decode(&self, text: &str) -> Result<serde_json::Value> {
        // Empty documents (e.g. `get values` on a release without overrides)
        if text.trim().is_empty() {
            return Ok(serde_json::Value::Null);
        }
        Ok(serde_yaml::from_str(text)?)
    }
}

/// Format name to decoder mapping
#[derive(Clone, Default)]
pub struct FormatRegistry {
    decoders: HashMap<String, Arc<dyn Decoder>>,
}

impl FormatRegistry {
    /// An empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with `json` and `yaml`
    pub fn with_defaults() -> Self {
        Self::new()
            .register("json", JsonDecoder)
            .register("yaml", YamlDecoder)
    }

    pub fn register(mut self, format: impl Into<String>, decoder: impl Decoder + 'static) -> Self {
        self.decoders.insert(format.into(), Arc::new(decoder));
        self
    }

    pub fn supports(&self, format: &str) -> bool {
        self.decoders.contains_key(format)
    }

    /// Decode `text` emitted in `format` into `T`
    pub fn decode<T: DeserializeOwned>(&self, format: &str, text: &str) -> Result<T> {
        let decoder = self.decoders.get(format).ok_or_else(|| CoreError::Format {
            format: format.to_string(),
            message: "no decoder registered".to_string(),
        })?;
        let value = decoder.decode(text)?;
        serde_json::from_value(value).map_err(|e| CoreError::Format {
            format: format.to_string(),
            message: e.to_string(),
        })
    }
}

impl std::fmt::Debug for FormatRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut formats: Vec<_> = self.decoders.keys().collect();
        formats.sort();
        f.debug_struct("FormatRegistry")
            .field("formats", &formats)
            .finish()
    }
}
