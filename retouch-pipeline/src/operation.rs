//! AI operation records and their lifecycle.
//!
//! ```text
//!   Queued ──► Processing ──► Completed
//!     │             │
//!     └─────────────┴───────► Failed(reason)
//! ```
//!
//! Transitions only move forward. Skipping `Processing` is reserved for
//! cancelling a queued operation.

use retouch_core::{timestamp_ms, CommitMode, EditorError, EditorResult, LayerId, OperationId, Selection, ToolKind};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Where an operation is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationStatus {
    /// Accepted, not yet sent to the collaborator.
    Queued,
    /// Collaborator call in flight.
    Processing,
    /// Result committed to the document.
    Completed,
    /// Finished without a result.
    Failed,
}

impl OperationStatus {
    /// Whether the operation has finished, successfully or not.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// Why an operation failed.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "type", content = "detail", rename_all = "snake_case")]
pub enum FailureReason {
    /// Cancelled by the operator.
    #[error("cancelled")]
    Cancelled,
    /// The collaborator did not answer in time.
    #[error("timed out after {after_ms} ms")]
    Timeout {
        /// Configured timeout.
        after_ms: u64,
    },
    /// The collaborator could not be reached.
    #[error("network error: {0}")]
    Network(String),
    /// The collaborator refused or failed the request.
    #[error("collaborator error: {0}")]
    Collaborator(String),
    /// The returned image could not be used.
    #[error("invalid result: {0}")]
    InvalidResult(String),
    /// The result could not be applied to the document.
    #[error("commit rejected: {0}")]
    Commit(String),
}

/// One request to transform the image with an AI tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    id: OperationId,
    kind: ToolKind,
    prompt: Option<String>,
    selection: Selection,
    commit: CommitMode,
    target_layer: LayerId,
    status: OperationStatus,
    result_layer_id: Option<LayerId>,
    failure: Option<FailureReason>,
    submitted_at: u64,
    finished_at: Option<u64>,
}

impl Operation {
    /// Create a queued operation.
    ///
    /// `target_layer` is the layer active at submission, the one a
    /// [`CommitMode::ReplaceActive`] result lands on.
    #[must_use]
    pub fn new(
        kind: ToolKind,
        prompt: Option<String>,
        selection: Selection,
        commit: CommitMode,
        target_layer: LayerId,
    ) -> Self {
        Self {
            id: OperationId::new(),
            kind,
            prompt,
            selection,
            commit,
            target_layer,
            status: OperationStatus::Queued,
            result_layer_id: None,
            failure: None,
            submitted_at: timestamp_ms(),
            finished_at: None,
        }
    }

    /// Operation ID.
    #[must_use]
    pub fn id(&self) -> OperationId {
        self.id
    }

    /// Tool applied.
    #[must_use]
    pub fn kind(&self) -> ToolKind {
        self.kind
    }

    /// Prompt, if one was given.
    #[must_use]
    pub fn prompt(&self) -> Option<&str> {
        self.prompt.as_deref()
    }

    /// Region the tool applies to.
    #[must_use]
    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    /// How the result will be committed.
    #[must_use]
    pub fn commit_mode(&self) -> CommitMode {
        self.commit
    }

    /// Layer active when the operation was submitted.
    #[must_use]
    pub fn target_layer(&self) -> LayerId {
        self.target_layer
    }

    /// Current status.
    #[must_use]
    pub fn status(&self) -> OperationStatus {
        self.status
    }

    /// Layer holding the result, set on completion.
    #[must_use]
    pub fn result_layer_id(&self) -> Option<LayerId> {
        self.result_layer_id
    }

    /// Failure reason, set on failure.
    #[must_use]
    pub fn failure(&self) -> Option<&FailureReason> {
        self.failure.as_ref()
    }

    /// Submission time (ms since epoch).
    #[must_use]
    pub fn submitted_at(&self) -> u64 {
        self.submitted_at
    }

    /// Completion or failure time (ms since epoch).
    #[must_use]
    pub fn finished_at(&self) -> Option<u64> {
        self.finished_at
    }

    /// Whether the operation still occupies the pipeline.
    #[must_use]
    pub fn is_active(&self) -> bool {
        !self.status.is_terminal()
    }

    /// Final outcome, `None` while the operation is still active.
    #[must_use]
    pub fn outcome(&self) -> Option<EditorResult<LayerId>> {
        match (self.status, &self.failure) {
            (OperationStatus::Completed, _) => self
                .result_layer_id
                .map(Ok)
                .or_else(|| Some(Err(EditorError::OperationFailed("no result layer".to_string())))),
            (OperationStatus::Failed, Some(FailureReason::Cancelled)) => Some(Err(EditorError::Cancelled)),
            (OperationStatus::Failed, Some(reason)) => Some(Err(EditorError::OperationFailed(reason.to_string()))),
            (OperationStatus::Failed, None) => Some(Err(EditorError::OperationFailed("unknown".to_string()))),
            _ => None,
        }
    }

    pub(crate) fn start(&mut self) -> EditorResult<()> {
        if self.status != OperationStatus::Queued {
            return Err(self.illegal("start"));
        }
        self.status = OperationStatus::Processing;
        Ok(())
    }

    pub(crate) fn complete(&mut self, layer: LayerId) -> EditorResult<()> {
        if self.status != OperationStatus::Processing {
            return Err(self.illegal("complete"));
        }
        self.status = OperationStatus::Completed;
        self.result_layer_id = Some(layer);
        self.finished_at = Some(timestamp_ms());
        Ok(())
    }

    pub(crate) fn fail(&mut self, reason: FailureReason) -> EditorResult<()> {
        match (self.status, &reason) {
            (OperationStatus::Processing, _) | (OperationStatus::Queued, FailureReason::Cancelled) => {
                self.status = OperationStatus::Failed;
                self.failure = Some(reason);
                self.finished_at = Some(timestamp_ms());
                Ok(())
            }
            _ => Err(self.illegal("fail")),
        }
    }

    fn illegal(&self, action: &str) -> EditorError {
        EditorError::InvalidState(format!(
            "cannot {action} operation {} in status {:?}",
            self.id, self.status
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn queued() -> Operation {
        Operation::new(
            ToolKind::Relight,
            Some("golden hour".to_string()),
            Selection::All,
            CommitMode::NewLayer,
            LayerId::new(),
        )
    }

    #[test]
    fn test_new_operation_is_queued() {
        let op = queued();
        assert_eq!(op.status(), OperationStatus::Queued);
        assert!(op.is_active());
        assert!(op.outcome().is_none());
        assert!(op.result_layer_id().is_none());
        assert!(op.submitted_at() > 0);
    }

    #[test]
    fn test_happy_path() {
        let mut op = queued();
        op.start().unwrap();
        assert!(op.outcome().is_none());
        let layer = LayerId::new();
        op.complete(layer).unwrap();
        assert_eq!(op.status(), OperationStatus::Completed);
        assert_eq!(op.outcome().unwrap().unwrap(), layer);
        assert!(op.finished_at().is_some());
    }

    #[test]
    fn test_cannot_complete_queued() {
        let mut op = queued();
        assert!(matches!(op.complete(LayerId::new()), Err(EditorError::InvalidState(_))));
    }

    #[test]
    fn test_queued_can_only_fail_by_cancellation() {
        let mut op = queued();
        assert!(op.fail(FailureReason::Network("down".into())).is_err());
        op.fail(FailureReason::Cancelled).unwrap();
        assert!(matches!(op.outcome(), Some(Err(EditorError::Cancelled))));
    }

    #[test]
    fn test_terminal_states_are_final() {
        let mut op = queued();
        op.start().unwrap();
        op.fail(FailureReason::Timeout { after_ms: 10 }).unwrap();
        assert!(op.start().is_err());
        assert!(op.complete(LayerId::new()).is_err());
        assert!(op.fail(FailureReason::Cancelled).is_err());
        match op.outcome() {
            Some(Err(EditorError::OperationFailed(msg))) => assert_eq!(msg, "timed out after 10 ms"),
            other => panic!("unexpected outcome {other:?}"),
        }
    }
}
