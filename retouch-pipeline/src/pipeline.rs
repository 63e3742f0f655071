//! Single-slot operation pipeline.
//!
//! At most one operation is queued or processing at a time. Dispatch spawns
//! the collaborator call on the tokio runtime under a timeout; its outcome
//! comes back over a channel and is handed to the caller exactly once.
//! Applying the result to the document is the caller's job, which then
//! reports back with [`OperationPipeline::complete`] or
//! [`OperationPipeline::fail`].

use std::collections::VecDeque;
use std::sync::Arc;

use image::RgbaImage;
use retouch_core::{EditorError, EditorResult, LayerId, Mask, OperationId, Selection, ToolKind};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::PipelineConfig;
use crate::operation::{FailureReason, Operation, OperationStatus};
use crate::transformer::{TransformRequest, TransformResponse, Transformer};

/// Result of a collaborator call, ready to be committed or recorded as failed.
#[derive(Debug)]
pub struct Outcome {
    /// Operation the outcome belongs to.
    pub operation_id: OperationId,
    /// Collaborator response or failure.
    pub result: Result<TransformResponse, FailureReason>,
}

struct Slot {
    operation: Operation,
    task: Option<JoinHandle<()>>,
}

/// Queue of AI operations with a single active slot.
pub struct OperationPipeline {
    config: PipelineConfig,
    transformer: Arc<dyn Transformer>,
    slot: Option<Slot>,
    outcome_tx: mpsc::UnboundedSender<Outcome>,
    outcome_rx: mpsc::UnboundedReceiver<Outcome>,
    ready: Option<Outcome>,
    log: VecDeque<Operation>,
}

impl std::fmt::Debug for OperationPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperationPipeline")
            .field("config", &self.config)
            .field("active", &self.active())
            .field("log_len", &self.log.len())
            .finish_non_exhaustive()
    }
}

impl OperationPipeline {
    /// Create a pipeline backed by `transformer`.
    #[must_use]
    pub fn new(transformer: Arc<dyn Transformer>, config: PipelineConfig) -> Self {
        let (outcome_tx, outcome_rx) = mpsc::unbounded_channel();
        Self {
            config,
            transformer,
            slot: None,
            outcome_tx,
            outcome_rx,
            ready: None,
            log: VecDeque::new(),
        }
    }

    /// Pipeline configuration.
    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// The queued or processing operation, if any.
    #[must_use]
    pub fn active(&self) -> Option<&Operation> {
        self.slot.as_ref().map(|slot| &slot.operation)
    }

    /// Whether an operation occupies the slot.
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.slot.is_some()
    }

    /// Finished operations, oldest first.
    pub fn log(&self) -> impl Iterator<Item = &Operation> {
        self.log.iter()
    }

    /// Look up an operation, active or logged.
    #[must_use]
    pub fn get(&self, id: OperationId) -> Option<&Operation> {
        self.active()
            .filter(|op| op.id() == id)
            .or_else(|| self.log.iter().rev().find(|op| op.id() == id))
    }

    /// Validate and queue an operation.
    ///
    /// A prompt made only of whitespace counts as missing. `selection` is
    /// normalized first, so an empty region means the whole canvas.
    ///
    /// # Errors
    ///
    /// - [`EditorError::Busy`] while another operation is queued or processing
    /// - [`EditorError::MissingPrompt`] if the tool needs a prompt
    /// - [`EditorError::MissingSelection`] if the tool needs a region and
    ///   `selection` covers the whole canvas
    pub fn submit(
        &mut self,
        kind: ToolKind,
        prompt: Option<String>,
        selection: Selection,
        target_layer: LayerId,
    ) -> EditorResult<&Operation> {
        if let Some(active) = self.active() {
            return Err(EditorError::Busy(active.id()));
        }

        let prompt = prompt.filter(|p| !p.trim().is_empty());
        if kind.needs_prompt() && prompt.is_none() {
            return Err(EditorError::MissingPrompt(kind));
        }

        let selection = selection.normalized();
        if kind.needs_selection() && selection.is_all() {
            return Err(EditorError::MissingSelection(kind));
        }

        let operation = Operation::new(kind, prompt, selection, self.config.commit_mode(kind), target_layer);
        tracing::info!("Queued {} operation {}", kind, operation.id());
        let slot = self.slot.insert(Slot { operation, task: None });
        Ok(&slot.operation)
    }

    /// Start the queued operation.
    ///
    /// `source_image` is the composite the collaborator works on; `mask` is
    /// the operation's region, `None` for the whole canvas.
    ///
    /// # Errors
    ///
    /// Returns [`EditorError::InvalidState`] if nothing is queued or no tokio
    /// runtime is running.
    pub fn dispatch(&mut self, source_image: RgbaImage, mask: Option<Mask>) -> EditorResult<OperationId> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| EditorError::InvalidState(format!("no async runtime: {e}")))?;
        let slot = self
            .slot
            .as_mut()
            .filter(|slot| slot.operation.status() == OperationStatus::Queued)
            .ok_or_else(|| EditorError::InvalidState("no queued operation".to_string()))?;
        slot.operation.start()?;

        let operation = &slot.operation;
        let request = TransformRequest {
            operation_id: operation.id(),
            tool: operation.kind(),
            prompt: operation.prompt().map(str::to_string),
            mask,
            source_image: Arc::new(source_image),
        };
        let operation_id = operation.id();
        let transformer = Arc::clone(&self.transformer);
        let tx = self.outcome_tx.clone();
        let timeout = self.config.operation_timeout();
        let after_ms = self.config.operation_timeout_ms;

        slot.task = Some(runtime.spawn(async move {
            let result = match tokio::time::timeout(timeout, transformer.transform(request)).await {
                Ok(Ok(response)) => Ok(response),
                Ok(Err(err)) => Err(FailureReason::from(err)),
                Err(_) => Err(FailureReason::Timeout { after_ms }),
            };
            // The receiver lives as long as the pipeline.
            let _ = tx.send(Outcome { operation_id, result });
        }));
        tracing::info!("Dispatched operation {operation_id}");
        Ok(operation_id)
    }

    /// Cancel the active operation.
    ///
    /// The collaborator task is aborted. Once the collaborator has returned,
    /// its result belongs to the caller and can no longer be cancelled.
    ///
    /// # Errors
    ///
    /// Returns [`EditorError::InvalidState`] if `id` is not the active
    /// operation or its result has already arrived.
    pub fn cancel(&mut self, id: OperationId) -> EditorResult<Operation> {
        self.slot_for(id)?;
        if self.ready.is_none() {
            self.ready = self.try_next_outcome();
        }
        let returned = self.ready.is_some()
            || self
                .slot_for(id)?
                .task
                .as_ref()
                .is_some_and(JoinHandle::is_finished);
        if returned {
            return Err(EditorError::InvalidState(format!(
                "operation {id} already returned a result"
            )));
        }

        if let Some(task) = self.slot_for(id)?.task.take() {
            task.abort();
        }
        tracing::info!("Cancelled operation {id}");
        self.finish(id, |op| op.fail(FailureReason::Cancelled))
    }

    /// Wait for the active operation's outcome.
    ///
    /// Returns `None` immediately when nothing is processing. Outcomes of
    /// operations that are no longer active are dropped.
    pub async fn next_outcome(&mut self) -> Option<Outcome> {
        if let Some(outcome) = self.ready.take() {
            return Some(outcome);
        }
        while self.is_processing() {
            let outcome = self.outcome_rx.recv().await?;
            if let Some(outcome) = self.accept(outcome) {
                return Some(outcome);
            }
        }
        None
    }

    /// Take the active operation's outcome if it is already available.
    pub fn try_next_outcome(&mut self) -> Option<Outcome> {
        if let Some(outcome) = self.ready.take() {
            return Some(outcome);
        }
        while let Ok(outcome) = self.outcome_rx.try_recv() {
            if let Some(outcome) = self.accept(outcome) {
                return Some(outcome);
            }
        }
        None
    }

    /// Mark the active operation completed with its result layer.
    ///
    /// # Errors
    ///
    /// Returns [`EditorError::InvalidState`] if `id` is not the active,
    /// processing operation.
    pub fn complete(&mut self, id: OperationId, result_layer: LayerId) -> EditorResult<Operation> {
        let finished = self.finish(id, |op| op.complete(result_layer))?;
        tracing::info!("Completed {} operation {id}", finished.kind());
        Ok(finished)
    }

    /// Mark the active operation failed.
    ///
    /// # Errors
    ///
    /// Returns [`EditorError::InvalidState`] if `id` is not the active
    /// operation or the transition is not allowed.
    pub fn fail(&mut self, id: OperationId, reason: FailureReason) -> EditorResult<Operation> {
        tracing::warn!("Operation {id} failed: {reason}");
        self.finish(id, |op| op.fail(reason))
    }

    fn is_processing(&self) -> bool {
        self.active()
            .is_some_and(|op| op.status() == OperationStatus::Processing)
    }

    fn accept(&mut self, outcome: Outcome) -> Option<Outcome> {
        if self
            .active()
            .is_some_and(|op| op.id() == outcome.operation_id && op.status() == OperationStatus::Processing)
        {
            if let Some(slot) = self.slot.as_mut() {
                slot.task = None;
            }
            Some(outcome)
        } else {
            tracing::warn!("Discarding late outcome for operation {}", outcome.operation_id);
            None
        }
    }

    fn slot_for(&mut self, id: OperationId) -> EditorResult<&mut Slot> {
        self.slot
            .as_mut()
            .filter(|slot| slot.operation.id() == id)
            .ok_or_else(|| EditorError::InvalidState(format!("operation {id} is not active")))
    }

    fn finish(
        &mut self,
        id: OperationId,
        transition: impl FnOnce(&mut Operation) -> EditorResult<()>,
    ) -> EditorResult<Operation> {
        transition(&mut self.slot_for(id)?.operation)?;
        let slot = self
            .slot
            .take()
            .ok_or_else(|| EditorError::InvalidState(format!("operation {id} is not active")))?;
        if let Some(task) = slot.task {
            task.abort();
        }
        self.ready = None;
        if self.log.len() >= self.config.log_limit.max(1) {
            self.log.pop_front();
        }
        self.log.push_back(slot.operation.clone());
        Ok(slot.operation)
    }
}

impl Drop for OperationPipeline {
    fn drop(&mut self) {
        if let Some(task) = self.slot.as_mut().and_then(|slot| slot.task.take()) {
            task.abort();
        }
    }
}
