//! Engine configuration.

use retouch_core::{EditorResult, DEFAULT_HISTORY_LIMIT, DEFAULT_THUMBNAIL_SIZE};
use retouch_pipeline::PipelineConfig;
use serde::{Deserialize, Serialize};

/// Configuration for an editing session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Maximum number of history entries kept.
    pub history_limit: usize,
    /// Edge length of layer thumbnails in pixels.
    pub thumbnail_size: u32,
    /// Operation pipeline settings.
    pub pipeline: PipelineConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            history_limit: DEFAULT_HISTORY_LIMIT,
            thumbnail_size: DEFAULT_THUMBNAIL_SIZE,
            pipeline: PipelineConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Parse from JSON; missing fields take their defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is malformed.
    pub fn from_json(json: &str) -> EditorResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Serialize to pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> EditorResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.history_limit, 50);
        assert_eq!(config.thumbnail_size, 128);
        assert_eq!(config.pipeline.log_limit, 20);
    }

    #[test]
    fn test_nested_partial_json() {
        let config = EngineConfig::from_json(r#"{"history_limit": 10, "pipeline": {"operation_timeout_ms": 500}}"#).unwrap();
        assert_eq!(config.history_limit, 10);
        assert_eq!(config.thumbnail_size, 128);
        assert_eq!(config.pipeline.operation_timeout_ms, 500);
        assert_eq!(config.pipeline.log_limit, 20);
    }

    #[test]
    fn test_json_round_trip() {
        let config = EngineConfig {
            thumbnail_size: 64,
            ..EngineConfig::default()
        };
        assert_eq!(EngineConfig::from_json(&config.to_json().unwrap()).unwrap(), config);
    }
}
