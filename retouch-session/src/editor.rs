//! The editing session.
//!
//! [`Editor`] owns the document and is the only way to change it. Every
//! mutation runs to completion on `&mut self`, then records one history
//! entry. The AI pipeline is the single suspension point: `submit` returns
//! at once and the result is committed later by [`Editor::settle`] or
//! [`Editor::poll`].

use std::path::Path;
use std::sync::Arc;

use image::{Rgba, RgbaImage};
use retouch_compositor::{composite, CacheStats, CompositeCache};
use retouch_core::{
    BlendMode, CommitMode, CoverageMap, DocumentSnapshot, EditorError, EditorResult, History, Layer,
    LayerId, LayerStack, Mask, OperationId, Point, Rect, Selection, SelectionEngine, Snapshot, ToolKind,
};
use retouch_pipeline::{FailureReason, Operation, OperationPipeline, Outcome, TransformResponse, Transformer};

use crate::config::EngineConfig;
use crate::paint::paint_through_mask;
use crate::versions::{VersionId, VersionStore, VersionSummary};

/// Which part of the composite a mutation invalidates.
#[derive(Debug, Clone, Copy)]
enum Damage {
    None,
    All,
    Region(Rect),
}

impl Damage {
    fn of_mask(mask: &Mask) -> Self {
        mask.bounds().map_or(Self::None, Self::Region)
    }
}

/// A single-image editing session.
#[derive(Debug)]
pub struct Editor {
    config: EngineConfig,
    stack: LayerStack,
    selection: SelectionEngine,
    history: History,
    pipeline: OperationPipeline,
    cache: CompositeCache,
    versions: VersionStore,
}

impl Editor {
    /// Open a session on `base`, which becomes the "Background" layer.
    ///
    /// # Errors
    ///
    /// Returns [`EditorError::InvalidState`] for a zero-sized image.
    pub fn new(base: RgbaImage, transformer: Arc<dyn Transformer>, config: EngineConfig) -> EditorResult<Self> {
        if base.width() == 0 || base.height() == 0 {
            return Err(EditorError::InvalidState("canvas must not be empty".to_string()));
        }
        let stack = LayerStack::with_thumbnail_size(Layer::raster("Background", base), config.thumbnail_size);
        Ok(Self::start(stack, transformer, config, "Open Image"))
    }

    /// Open a session on a saved document.
    ///
    /// History starts fresh with the loaded state as its only entry.
    ///
    /// # Errors
    ///
    /// Returns an error if the document fails validation.
    pub fn deserialize(
        document: DocumentSnapshot,
        transformer: Arc<dyn Transformer>,
        config: EngineConfig,
    ) -> EditorResult<Self> {
        let stack = document.into_stack(config.thumbnail_size)?;
        Ok(Self::start(stack, transformer, config, "Open Document"))
    }

    /// Open a session from a JSON document on disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or the document is invalid.
    pub fn open(
        path: impl AsRef<Path>,
        transformer: Arc<dyn Transformer>,
        config: EngineConfig,
    ) -> EditorResult<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)?;
        let editor = Self::deserialize(DocumentSnapshot::from_json(&json)?, transformer, config)?;
        tracing::info!("Opened document from {}", path.display());
        Ok(editor)
    }

    fn start(stack: LayerStack, transformer: Arc<dyn Transformer>, config: EngineConfig, label: &str) -> Self {
        let mut editor = Self {
            history: History::new(config.history_limit),
            pipeline: OperationPipeline::new(transformer, config.pipeline.clone()),
            config,
            stack,
            selection: SelectionEngine::new(),
            cache: CompositeCache::new(),
            versions: VersionStore::default(),
        };
        editor.record(label);
        editor
    }

    // --- Queries ---

    /// Session configuration.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The layer stack.
    #[must_use]
    pub fn stack(&self) -> &LayerStack {
        &self.stack
    }

    /// The live selection.
    #[must_use]
    pub fn selection(&self) -> &Selection {
        self.selection.current()
    }

    /// The history timeline.
    #[must_use]
    pub fn history(&self) -> &History {
        &self.history
    }

    /// The operation pipeline.
    #[must_use]
    pub fn pipeline(&self) -> &OperationPipeline {
        &self.pipeline
    }

    /// The queued or processing operation, if any.
    #[must_use]
    pub fn active_operation(&self) -> Option<&Operation> {
        self.pipeline.active()
    }

    /// Finished operations, oldest first.
    pub fn operation_log(&self) -> impl Iterator<Item = &Operation> {
        self.pipeline.log()
    }

    /// Compositing cache counters.
    #[must_use]
    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    // --- Layer stack ---

    /// Add a layer at `position` (top when `None`).
    ///
    /// # Errors
    ///
    /// Returns [`EditorError::InvalidState`] for a bad position or raster size.
    pub fn add_layer(&mut self, layer: Layer, position: Option<usize>) -> EditorResult<&LayerStack> {
        self.mutate("Add Layer", Damage::All, |stack| stack.add_layer(layer, position))
    }

    /// Delete a layer.
    ///
    /// # Errors
    ///
    /// Returns [`EditorError::InvalidState`] for an unknown or sole layer and
    /// [`EditorError::Locked`] for a locked one.
    pub fn delete_layer(&mut self, id: LayerId) -> EditorResult<&LayerStack> {
        self.mutate("Delete Layer", Damage::All, |stack| stack.delete_layer(id))
    }

    /// Move a layer to `position`.
    ///
    /// # Errors
    ///
    /// Returns [`EditorError::InvalidState`] for an unknown layer or bad
    /// position and [`EditorError::Locked`] for a locked one.
    pub fn move_layer(&mut self, id: LayerId, position: usize) -> EditorResult<&LayerStack> {
        self.mutate("Move Layer", Damage::All, |stack| stack.move_layer(id, position))
    }

    /// Move a layer, allowing it to pass below locked layers.
    ///
    /// # Errors
    ///
    /// Returns [`EditorError::Locked`] if the moved layer itself is locked and
    /// [`EditorError::InvalidState`] for an unknown layer or bad position.
    pub fn force_move_layer(&mut self, id: LayerId, position: usize) -> EditorResult<&LayerStack> {
        self.mutate("Move Layer", Damage::All, |stack| stack.force_move_layer(id, position))
    }

    /// Show or hide a layer.
    ///
    /// # Errors
    ///
    /// Returns [`EditorError::InvalidState`] for an unknown layer.
    pub fn toggle_visibility(&mut self, id: LayerId) -> EditorResult<&LayerStack> {
        self.mutate("Toggle Visibility", Damage::All, |stack| stack.toggle_visibility(id))
    }

    /// Lock or unlock a layer.
    ///
    /// # Errors
    ///
    /// Returns [`EditorError::InvalidState`] for an unknown layer.
    pub fn toggle_lock(&mut self, id: LayerId) -> EditorResult<&LayerStack> {
        self.mutate("Toggle Lock", Damage::None, |stack| stack.toggle_lock(id))
    }

    /// Set layer opacity; values outside 0..=100 are clamped.
    ///
    /// Allowed on locked layers, which only protect pixels and position.
    ///
    /// # Errors
    ///
    /// Returns [`EditorError::InvalidState`] for an unknown layer.
    pub fn set_opacity(&mut self, id: LayerId, value: i32) -> EditorResult<&LayerStack> {
        self.mutate("Set Opacity", Damage::All, |stack| stack.set_opacity(id, value))
    }

    /// Set a layer's blend mode. Allowed on locked layers.
    ///
    /// # Errors
    ///
    /// Returns [`EditorError::InvalidState`] for an unknown layer.
    pub fn set_blend_mode(&mut self, id: LayerId, mode: BlendMode) -> EditorResult<&LayerStack> {
        self.mutate("Set Blend Mode", Damage::All, |stack| stack.set_blend_mode(id, mode))
    }

    /// Set a layer's blend mode by name.
    ///
    /// # Errors
    ///
    /// Returns [`EditorError::UnknownBlendMode`] for an unrecognized name,
    /// plus the errors of [`Editor::set_blend_mode`].
    pub fn set_blend_mode_named(&mut self, id: LayerId, mode: &str) -> EditorResult<&LayerStack> {
        self.mutate("Set Blend Mode", Damage::All, |stack| stack.set_blend_mode_named(id, mode))
    }

    /// Rename a layer.
    ///
    /// # Errors
    ///
    /// Returns [`EditorError::InvalidState`] for an unknown layer or blank name.
    pub fn rename_layer(&mut self, id: LayerId, name: &str) -> EditorResult<&LayerStack> {
        self.mutate("Rename Layer", Damage::None, |stack| stack.rename_layer(id, name))
    }

    /// Copy a layer directly above itself.
    ///
    /// # Errors
    ///
    /// Returns [`EditorError::InvalidState`] for an unknown layer.
    pub fn duplicate_layer(&mut self, id: LayerId) -> EditorResult<&LayerStack> {
        self.mutate("Duplicate Layer", Damage::All, |stack| stack.duplicate_layer(id))
    }

    /// Make a layer the target of edits.
    ///
    /// This adds no history entry; the choice is folded into the current
    /// entry so undo and redo return to it.
    ///
    /// # Errors
    ///
    /// Returns [`EditorError::InvalidState`] for an unknown layer.
    pub fn set_active(&mut self, id: LayerId) -> EditorResult<&LayerStack> {
        self.stack.set_active(id)?;
        let stack = self.stack.clone();
        self.history.amend_current(|snapshot| snapshot.stack = stack);
        Ok(&self.stack)
    }

    // --- Selection ---

    /// Select a rectangle.
    pub fn select_rectangle(&mut self, rect: Rect) -> &Selection {
        self.selection.set_rectangle(rect);
        self.record("Rectangle Selection");
        self.selection.current()
    }

    /// Select a closed polygon.
    pub fn select_path(&mut self, points: Vec<Point>) -> &Selection {
        self.selection.set_path(points);
        self.record("Path Selection");
        self.selection.current()
    }

    /// Select by explicit per-pixel coverage.
    pub fn select_coverage(&mut self, map: CoverageMap) -> &Selection {
        self.selection.set_coverage_map(map);
        self.record("Mask Selection");
        self.selection.current()
    }

    /// Drop the selection so the whole canvas is selected.
    pub fn deselect(&mut self) -> &Selection {
        self.selection.clear();
        self.record("Deselect");
        self.selection.current()
    }

    // --- Manual edits ---

    /// Paint the selection on the active layer with a solid color.
    ///
    /// # Errors
    ///
    /// Returns [`EditorError::Locked`] if the active layer is locked.
    pub fn fill_selection(&mut self, rgba: [u8; 4]) -> EditorResult<&LayerStack> {
        self.paint_selection("Fill Selection", Rgba(rgba))
    }

    /// Clear the selection on the active layer to transparent.
    ///
    /// # Errors
    ///
    /// Returns [`EditorError::Locked`] if the active layer is locked.
    pub fn erase_selection(&mut self) -> EditorResult<&LayerStack> {
        self.paint_selection("Delete Selection", Rgba([0, 0, 0, 0]))
    }

    fn paint_selection(&mut self, label: &str, color: Rgba<u8>) -> EditorResult<&LayerStack> {
        let mask = self.selection.to_mask(self.stack.width(), self.stack.height());
        let target = self.stack.active_id();
        self.mutate(label, Damage::of_mask(&mask), |stack| {
            stack.update_pixels(target, |img| paint_through_mask(img, &mask, |_, _| color))
        })
    }

    // --- History ---

    /// Step back one entry. A no-op at the oldest entry.
    pub fn undo(&mut self) -> &LayerStack {
        if !self.history.can_undo() {
            return &self.stack;
        }
        if let Some(snapshot) = self.history.undo().cloned() {
            self.restore(snapshot);
        }
        &self.stack
    }

    /// Step forward one entry. A no-op at the newest entry.
    pub fn redo(&mut self) -> &LayerStack {
        if !self.history.can_redo() {
            return &self.stack;
        }
        if let Some(snapshot) = self.history.redo().cloned() {
            self.restore(snapshot);
        }
        &self.stack
    }

    /// Jump to any history entry.
    ///
    /// # Errors
    ///
    /// Returns [`EditorError::OutOfRange`] for a bad index.
    pub fn restore_to(&mut self, index: usize) -> EditorResult<&LayerStack> {
        let snapshot = self.history.restore_to(index)?.clone();
        self.restore(snapshot);
        Ok(&self.stack)
    }

    // --- Versions ---

    /// Capture the current state as a named version.
    pub fn create_version(&mut self, name: Option<&str>) -> VersionId {
        let snapshot = self.snapshot();
        self.versions.create(name, snapshot).id()
    }

    /// Restore a version. Recorded in history so it can be undone.
    ///
    /// # Errors
    ///
    /// Returns [`EditorError::InvalidState`] for an unknown version.
    pub fn switch_to_version(&mut self, id: VersionId) -> EditorResult<&LayerStack> {
        let version = self.versions.switch(id)?;
        let label = format!("Switch to {}", version.name());
        let snapshot = version.snapshot().clone();
        self.restore(snapshot);
        self.record(&label);
        Ok(&self.stack)
    }

    /// All versions with the current one flagged.
    #[must_use]
    pub fn versions(&self) -> Vec<VersionSummary> {
        self.versions.summaries()
    }

    // --- AI operations ---

    /// Queue an AI operation on the current selection and start it.
    ///
    /// Returns the operation as it was queued; its progress is visible
    /// through [`Editor::active_operation`].
    ///
    /// Tools that rewrite the active layer are refused up front when that
    /// layer is locked.
    ///
    /// # Errors
    ///
    /// - [`EditorError::Busy`] while another operation is active
    /// - [`EditorError::MissingPrompt`] / [`EditorError::MissingSelection`]
    /// - [`EditorError::Locked`] for an in-place tool on a locked layer
    /// - [`EditorError::InvalidState`] outside a tokio runtime
    pub fn submit(&mut self, kind: ToolKind, prompt: Option<&str>) -> EditorResult<Operation> {
        tokio::runtime::Handle::try_current()
            .map_err(|e| EditorError::InvalidState(format!("no async runtime: {e}")))?;

        let target = self.stack.active_id();
        if !self.pipeline.is_busy()
            && self.pipeline.config().commit_mode(kind) == CommitMode::ReplaceActive
            && self.stack.active_layer().is_some_and(Layer::is_locked)
        {
            return Err(EditorError::Locked(target));
        }

        let (width, height) = (self.stack.width(), self.stack.height());
        let operation = self.pipeline.submit(
            kind,
            prompt.map(str::to_string),
            self.selection.current().clone(),
            target,
        )?;
        let queued = operation.clone();
        let mask = region_mask(queued.selection(), width, height);

        let source = self.composited_raster();
        if let Err(err) = self.pipeline.dispatch(source, mask) {
            if let Err(cancel_err) = self.pipeline.cancel(queued.id()) {
                tracing::warn!("Could not release operation {}: {cancel_err}", queued.id());
            }
            return Err(err);
        }
        Ok(queued)
    }

    /// Cancel the active operation.
    ///
    /// # Errors
    ///
    /// Returns [`EditorError::InvalidState`] if `id` is not active.
    pub fn cancel(&mut self, id: OperationId) -> EditorResult<Operation> {
        self.pipeline.cancel(id)
    }

    /// Wait for the active operation to finish and apply its result.
    ///
    /// Returns `Ok(None)` when nothing is processing.
    ///
    /// # Errors
    ///
    /// Returns [`EditorError::InvalidState`] if the outcome no longer matches
    /// the active operation.
    pub async fn settle(&mut self) -> EditorResult<Option<Operation>> {
        match self.pipeline.next_outcome().await {
            Some(outcome) => self.apply_outcome(outcome).map(Some),
            None => Ok(None),
        }
    }

    /// Apply the active operation's result if it has already arrived.
    ///
    /// # Errors
    ///
    /// See [`Editor::settle`].
    pub fn poll(&mut self) -> EditorResult<Option<Operation>> {
        match self.pipeline.try_next_outcome() {
            Some(outcome) => self.apply_outcome(outcome).map(Some),
            None => Ok(None),
        }
    }

    fn apply_outcome(&mut self, outcome: Outcome) -> EditorResult<Operation> {
        let operation = self
            .pipeline
            .active()
            .filter(|op| op.id() == outcome.operation_id)
            .cloned()
            .ok_or_else(|| {
                EditorError::InvalidState(format!("operation {} is not active", outcome.operation_id))
            })?;

        match outcome.result.and_then(|response| self.commit(&operation, response)) {
            Ok(layer) => self.pipeline.complete(operation.id(), layer),
            Err(reason) => self.pipeline.fail(operation.id(), reason),
        }
    }

    /// Write a collaborator result into the document.
    ///
    /// Nothing is changed or recorded unless the whole commit succeeds.
    fn commit(&mut self, operation: &Operation, response: TransformResponse) -> Result<LayerId, FailureReason> {
        let (width, height) = (self.stack.width(), self.stack.height());
        let raster = response.result_image.into_canvas_raster(width, height)?;
        let mask = region_mask(operation.selection(), width, height);
        let damage = mask.as_ref().map_or(Damage::All, Damage::of_mask);

        let layer_id = match operation.commit_mode() {
            CommitMode::NewLayer => {
                let mut layer = Layer::generated(operation.kind().result_layer_name(), raster);
                if let Some(mask) = mask {
                    layer = layer.with_mask(mask);
                }
                let id = layer.id();
                self.stack.add_layer(layer, None).map_err(commit_failure)?;
                id
            }
            CommitMode::ReplaceActive => {
                let target = operation.target_layer();
                match mask {
                    None => self.stack.replace_pixels(target, raster),
                    Some(mask) => self.stack.update_pixels(target, |img| {
                        paint_through_mask(img, &mask, |x, y| *raster.get_pixel(x, y));
                    }),
                }
                .map_err(commit_failure)?;
                target
            }
        };

        self.damage(damage);
        self.record(&operation.kind().history_label());
        Ok(layer_id)
    }

    // --- Output ---

    /// The current composite, recomputing only what changed since the last call.
    pub fn composited_raster(&mut self) -> RgbaImage {
        match self.cache.refresh(&self.stack) {
            Ok(raster) => raster.clone(),
            Err(err) => {
                tracing::warn!("Composite cache refresh failed, rendering in full: {err}");
                self.cache.mark_all_dirty();
                composite(&self.stack)
            }
        }
    }

    /// Capture the document for saving. History is not included.
    #[must_use]
    pub fn serialize(&self) -> DocumentSnapshot {
        DocumentSnapshot::from_stack(&self.stack)
    }

    /// Save the document as JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding or writing fails.
    pub fn save(&self, path: impl AsRef<Path>) -> EditorResult<()> {
        let path = path.as_ref();
        std::fs::write(path, self.serialize().to_json()?)?;
        tracing::info!("Saved document to {}", path.display());
        Ok(())
    }

    // --- Internals ---

    fn mutate<F>(&mut self, label: &str, damage: Damage, f: F) -> EditorResult<&LayerStack>
    where
        F: FnOnce(&mut LayerStack) -> EditorResult<&LayerStack>,
    {
        f(&mut self.stack)?;
        self.damage(damage);
        self.record(label);
        Ok(&self.stack)
    }

    fn damage(&mut self, damage: Damage) {
        match damage {
            Damage::None => {}
            Damage::All => self.cache.mark_all_dirty(),
            Damage::Region(rect) => self.cache.mark_dirty(rect),
        }
    }

    fn snapshot(&self) -> Snapshot {
        Snapshot {
            stack: self.stack.clone(),
            selection: self.selection.current().clone(),
        }
    }

    fn record(&mut self, label: &str) {
        let snapshot = self.snapshot();
        self.history.record(label, snapshot);
    }

    fn restore(&mut self, snapshot: Snapshot) {
        self.stack = snapshot.stack;
        self.selection.replace(snapshot.selection);
        self.cache.mark_all_dirty();
    }
}

fn region_mask(selection: &Selection, width: u32, height: u32) -> Option<Mask> {
    (!selection.is_all()).then(|| selection.to_mask(width, height))
}

#[allow(clippy::needless_pass_by_value)]
fn commit_failure(err: EditorError) -> FailureReason {
    FailureReason::Commit(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use retouch_pipeline::{ResultImage, TransformError, TransformRequest};

    struct Solid([u8; 4]);

    #[async_trait]
    impl Transformer for Solid {
        async fn transform(&self, request: TransformRequest) -> Result<TransformResponse, TransformError> {
            let (w, h) = request.source_image.dimensions();
            Ok(TransformResponse::new(ResultImage::Raster(RgbaImage::from_pixel(w, h, Rgba(self.0)))))
        }
    }

    fn editor() -> Editor {
        let base = RgbaImage::from_pixel(8, 8, Rgba([40, 40, 40, 255]));
        Editor::new(base, Arc::new(Solid([255, 0, 0, 255])), EngineConfig::default()).unwrap()
    }

    #[test]
    fn test_new_records_open_image() {
        let editor = editor();
        assert_eq!(editor.history().labels(), vec!["Open Image"]);
        assert_eq!(editor.stack().len(), 1);
        assert_eq!(editor.stack().layers()[0].name(), "Background");
    }

    #[test]
    fn test_empty_canvas_rejected() {
        let result = Editor::new(RgbaImage::new(0, 4), Arc::new(Solid([0; 4])), EngineConfig::default());
        assert!(matches!(result, Err(EditorError::InvalidState(_))));
    }

    #[test]
    fn test_failed_mutation_records_nothing() {
        let mut editor = editor();
        let id = editor.stack().active_id();
        assert!(matches!(editor.delete_layer(id), Err(EditorError::InvalidState(_))));
        assert_eq!(editor.history().len(), 1);
    }

    #[test]
    fn test_set_active_not_recorded() {
        let mut editor = editor();
        let base = editor.stack().active_id();
        editor.add_layer(Layer::raster("top", RgbaImage::new(8, 8)), None).unwrap();
        let before = editor.history().len();
        editor.set_active(base).unwrap();
        assert_eq!(editor.history().len(), before);
        assert_eq!(editor.stack().active_id(), base);
    }

    #[test]
    fn test_undo_redo_at_bounds_keep_active_layer() {
        let mut editor = editor();
        let base = editor.stack().active_id();
        editor.add_layer(Layer::raster("top", RgbaImage::new(8, 8)), None).unwrap();
        editor.set_active(base).unwrap();

        editor.redo();
        assert_eq!(editor.stack().active_id(), base);

        editor.undo();
        editor.undo();
        assert_eq!(editor.stack().len(), 1);
        editor.undo();
        assert_eq!(editor.stack().active_id(), base);
        assert!(!editor.history().can_undo());
    }

    #[test]
    fn test_active_layer_survives_undo_then_redo() {
        let mut editor = editor();
        let base = editor.stack().active_id();
        editor.add_layer(Layer::raster("top", RgbaImage::new(8, 8)), None).unwrap();
        editor.set_active(base).unwrap();
        let before = editor.stack().clone();

        editor.undo();
        editor.redo();
        assert_eq!(editor.stack(), &before);
        assert_eq!(editor.stack().active_id(), base);
    }

    #[test]
    fn test_selection_changes_are_undoable() {
        let mut editor = editor();
        editor.select_rectangle(Rect::new(0, 0, 2, 2));
        editor.deselect();
        assert_eq!(editor.history().labels(), vec!["Open Image", "Rectangle Selection", "Deselect"]);
        editor.undo();
        assert_eq!(editor.selection(), &Selection::Rectangle(Rect::new(0, 0, 2, 2)));
    }

    #[test]
    fn test_fill_selection_marks_only_region_dirty() {
        let mut editor = editor();
        editor.composited_raster();
        editor.select_rectangle(Rect::new(2, 2, 2, 2));
        editor.fill_selection([0, 0, 255, 255]).unwrap();

        let raster = editor.composited_raster();
        assert_eq!(raster.get_pixel(2, 2).0, [0, 0, 255, 255]);
        assert_eq!(raster.get_pixel(0, 0).0, [40, 40, 40, 255]);
        let stats = editor.cache_stats();
        assert_eq!(stats.full_renders, 1);
        assert_eq!(stats.partial_renders, 1);
        assert_eq!(stats.pixels_rendered, 64 + 4);
    }

    #[test]
    fn test_fill_locked_layer_rejected() {
        let mut editor = editor();
        let id = editor.stack().active_id();
        editor.toggle_lock(id).unwrap();
        let before = editor.history().len();
        assert!(matches!(editor.fill_selection([1, 2, 3, 255]), Err(EditorError::Locked(_))));
        assert_eq!(editor.history().len(), before);
    }

    #[test]
    fn test_locked_layer_keeps_opacity_and_blend_editable() {
        let mut editor = editor();
        let base = editor.stack().active_id();
        editor.add_layer(Layer::raster("top", RgbaImage::new(8, 8)), None).unwrap();
        let top = editor.stack().top().unwrap().id();
        editor.toggle_lock(top).unwrap();

        editor.set_opacity(top, 40).unwrap();
        editor.set_blend_mode(top, BlendMode::Screen).unwrap();
        editor.set_blend_mode_named(top, "multiply").unwrap();
        let layer = editor.stack().get(top).unwrap();
        assert_eq!(layer.opacity(), 40);
        assert_eq!(layer.blend_mode(), BlendMode::Multiply);

        assert!(matches!(editor.force_move_layer(top, 0), Err(EditorError::Locked(l)) if l == top));
        editor.force_move_layer(base, 1).unwrap();
        assert_eq!(editor.stack().top().unwrap().id(), base);
    }

    #[test]
    fn test_submit_outside_runtime() {
        let mut editor = editor();
        let err = editor.submit(ToolKind::Enhance, None).unwrap_err();
        assert!(matches!(err, EditorError::InvalidState(_)));
        assert!(!editor.pipeline().is_busy());
        assert_eq!(editor.operation_log().count(), 0);
    }

    #[tokio::test]
    async fn test_replace_active_with_selection_paints_region() {
        let mut editor = editor();
        editor.select_rectangle(Rect::new(0, 0, 4, 8));
        let op = editor.submit(ToolKind::ColorGrade, None).unwrap();
        let done = editor.settle().await.unwrap().unwrap();

        assert_eq!(done.id(), op.id());
        assert_eq!(done.result_layer_id(), Some(editor.stack().active_id()));
        assert_eq!(editor.stack().len(), 1);
        let pixels = editor.stack().layers()[0].pixels();
        assert_eq!(pixels.get_pixel(1, 1).0, [255, 0, 0, 255]);
        assert_eq!(pixels.get_pixel(6, 1).0, [40, 40, 40, 255]);
        assert_eq!(editor.history().labels().last(), Some(&"Apply Color Grade"));
    }

    #[tokio::test]
    async fn test_replace_active_on_locked_layer_refused() {
        let mut editor = editor();
        let id = editor.stack().active_id();
        editor.toggle_lock(id).unwrap();
        assert!(matches!(editor.submit(ToolKind::Upscale, None), Err(EditorError::Locked(l)) if l == id));
        assert!(!editor.pipeline().is_busy());
    }

    #[tokio::test]
    async fn test_target_locked_after_submit_fails_commit() {
        let mut editor = editor();
        let id = editor.stack().active_id();
        editor.submit(ToolKind::Denoise, None).unwrap();
        editor.toggle_lock(id).unwrap();
        let history_len = editor.history().len();

        let done = editor.settle().await.unwrap().unwrap();
        assert!(matches!(done.failure(), Some(FailureReason::Commit(_))));
        assert_eq!(editor.history().len(), history_len);
        assert_eq!(editor.stack().layers()[0].pixels().get_pixel(0, 0).0, [40, 40, 40, 255]);
    }

    #[tokio::test]
    async fn test_settle_without_operation() {
        let mut editor = editor();
        assert!(editor.settle().await.unwrap().is_none());
        assert!(editor.poll().unwrap().is_none());
    }
}
