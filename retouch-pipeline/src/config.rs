//! Pipeline configuration.

use std::collections::HashMap;
use std::time::Duration;

use retouch_core::{CommitMode, EditorResult, ToolKind};
use serde::{Deserialize, Serialize};

/// Default time a collaborator call may take before the operation fails.
pub const DEFAULT_OPERATION_TIMEOUT_MS: u64 = 120_000;

/// Default number of finished operations kept in the log.
pub const DEFAULT_LOG_LIMIT: usize = 20;

/// Configuration for the operation pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Collaborator timeout in milliseconds.
    pub operation_timeout_ms: u64,
    /// Maximum number of finished operations kept in the log.
    pub log_limit: usize,
    /// Per-tool commit behavior replacing the tool's default.
    pub commit_overrides: HashMap<ToolKind, CommitMode>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            operation_timeout_ms: DEFAULT_OPERATION_TIMEOUT_MS,
            log_limit: DEFAULT_LOG_LIMIT,
            commit_overrides: HashMap::new(),
        }
    }
}

impl PipelineConfig {
    /// Set the collaborator timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Override how a tool commits its result.
    #[must_use]
    pub fn with_commit_override(mut self, tool: ToolKind, mode: CommitMode) -> Self {
        self.commit_overrides.insert(tool, mode);
        self
    }

    /// Collaborator timeout.
    #[must_use]
    pub fn operation_timeout(&self) -> Duration {
        Duration::from_millis(self.operation_timeout_ms)
    }

    /// Effective commit behavior for a tool.
    #[must_use]
    pub fn commit_mode(&self, tool: ToolKind) -> CommitMode {
        self.commit_overrides
            .get(&tool)
            .copied()
            .unwrap_or_else(|| tool.default_commit())
    }

    /// Parse from JSON; missing fields take their defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is malformed.
    pub fn from_json(json: &str) -> EditorResult<Self> {
        Ok(serde_json::from_str(json)?)
    }
}
