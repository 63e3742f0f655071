//! Linear undo/redo history over whole-document snapshots.
//!
//! ```text
//!   entries:  [open] [add layer] [opacity] [apply inpaint]
//!                                   ^ cursor
//!   record() here drops [apply inpaint] before appending
//! ```
//!
//! Snapshots hold layers whose pixel buffers are shared copy-on-write, so a
//! snapshot costs one reference per layer until somebody paints.

use std::collections::VecDeque;
use std::time::{SystemTime, UNIX_EPOCH};

use uuid::Uuid;

use crate::selection::Selection;
use crate::stack::LayerStack;
use crate::{EditorError, EditorResult};

/// Default maximum number of history entries.
pub const DEFAULT_HISTORY_LIMIT: usize = 50;

/// Current time in milliseconds since the Unix epoch.
#[must_use]
#[allow(clippy::cast_possible_truncation)] // Timestamps won't exceed u64 for billions of years
pub fn timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Editor state at one point in time.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    /// The layer stack, including the active layer.
    pub stack: LayerStack,
    /// The live selection.
    pub selection: Selection,
}

/// One recorded step.
#[derive(Debug, Clone)]
pub struct HistoryEntry {
    id: Uuid,
    label: String,
    timestamp: u64,
    snapshot: Snapshot,
}

impl HistoryEntry {
    /// Unique entry identifier.
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Human-readable action name.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// When the entry was recorded (ms since epoch).
    #[must_use]
    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    /// State after the action.
    #[must_use]
    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }
}

/// Bounded linear history with a cursor.
#[derive(Debug, Clone)]
pub struct History {
    entries: VecDeque<HistoryEntry>,
    cursor: usize,
    limit: usize,
}

impl Default for History {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_LIMIT)
    }
}

impl History {
    /// Create an empty history keeping at most `limit` entries (minimum 1).
    #[must_use]
    pub fn new(limit: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            cursor: 0,
            limit: limit.max(1),
        }
    }

    /// Record a new step after the cursor.
    ///
    /// Entries beyond the cursor are discarded first; when the history is
    /// full the oldest entry is dropped.
    pub fn record(&mut self, label: impl Into<String>, snapshot: Snapshot) -> &HistoryEntry {
        if !self.entries.is_empty() {
            let discarded = self.entries.len() - (self.cursor + 1);
            if discarded > 0 {
                tracing::debug!("Discarding {discarded} redo entries");
            }
            self.entries.truncate(self.cursor + 1);
        }
        if self.entries.len() >= self.limit {
            self.entries.pop_front();
        }

        let entry = HistoryEntry {
            id: Uuid::new_v4(),
            label: label.into(),
            timestamp: timestamp_ms(),
            snapshot,
        };
        tracing::info!("History: {}", entry.label);
        self.entries.push_back(entry);
        self.cursor = self.entries.len() - 1;
        &self.entries[self.cursor]
    }

    /// Step back; at the base this is a no-op returning the current state.
    ///
    /// Returns `None` only when nothing has been recorded.
    pub fn undo(&mut self) -> Option<&Snapshot> {
        if self.cursor > 0 {
            self.cursor -= 1;
        }
        self.current()
    }

    /// Step forward; at the tip this is a no-op returning the current state.
    ///
    /// Returns `None` only when nothing has been recorded.
    pub fn redo(&mut self) -> Option<&Snapshot> {
        if self.cursor + 1 < self.entries.len() {
            self.cursor += 1;
        }
        self.current()
    }

    /// Jump to an arbitrary entry.
    ///
    /// # Errors
    ///
    /// Returns [`EditorError::OutOfRange`] if `index` is not a recorded entry.
    pub fn restore_to(&mut self, index: usize) -> EditorResult<&Snapshot> {
        if index >= self.entries.len() {
            return Err(EditorError::OutOfRange {
                index,
                len: self.entries.len(),
            });
        }
        self.cursor = index;
        Ok(&self.entries[index].snapshot)
    }

    /// Snapshot at the cursor.
    #[must_use]
    pub fn current(&self) -> Option<&Snapshot> {
        self.entries.get(self.cursor).map(|e| &e.snapshot)
    }

    /// Rewrite the snapshot at the cursor without adding an entry.
    ///
    /// Used for state that travels with a step but is not a step of its
    /// own, such as which layer is active. Does nothing on an empty history.
    pub fn amend_current(&mut self, f: impl FnOnce(&mut Snapshot)) {
        if let Some(entry) = self.entries.get_mut(self.cursor) {
            f(&mut entry.snapshot);
        }
    }

    /// Entry at the cursor.
    #[must_use]
    pub fn current_entry(&self) -> Option<&HistoryEntry> {
        self.entries.get(self.cursor)
    }

    /// Cursor position.
    #[must_use]
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Maximum number of entries kept.
    #[must_use]
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Whether [`History::undo`] would move the cursor.
    #[must_use]
    pub fn can_undo(&self) -> bool {
        self.cursor > 0
    }

    /// Whether [`History::redo`] would move the cursor.
    #[must_use]
    pub fn can_redo(&self) -> bool {
        self.cursor + 1 < self.entries.len()
    }

    /// All entries, oldest first.
    pub fn entries(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.entries.iter()
    }

    /// Labels of all entries, oldest first.
    #[must_use]
    pub fn labels(&self) -> Vec<&str> {
        self.entries.iter().map(HistoryEntry::label).collect()
    }
}
