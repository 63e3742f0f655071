//! Named version checkpoints.
//!
//! A version is a labelled snapshot with a link to the version that was
//! current when it was taken. Versions sit beside the linear history rather
//! than inside it: switching to one is itself an undoable history step.

use std::fmt;

use retouch_core::{timestamp_ms, EditorError, EditorResult, Snapshot};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VersionId(Uuid);

impl VersionId {
    /// Create a new unique version ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for VersionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for VersionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A named checkpoint.
#[derive(Debug, Clone)]
pub struct Version {
    id: VersionId,
    name: String,
    parent: Option<VersionId>,
    created_at: u64,
    snapshot: Snapshot,
}

impl Version {
    /// Version ID.
    #[must_use]
    pub fn id(&self) -> VersionId {
        self.id
    }

    /// Display name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Version that was current when this one was created.
    #[must_use]
    pub fn parent(&self) -> Option<VersionId> {
        self.parent
    }

    /// Creation time (ms since epoch).
    #[must_use]
    pub fn created_at(&self) -> u64 {
        self.created_at
    }

    /// Captured state.
    #[must_use]
    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }
}

/// Listing entry for a version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionSummary {
    /// Version ID.
    pub id: VersionId,
    /// Display name.
    pub name: String,
    /// Parent version.
    pub parent: Option<VersionId>,
    /// Creation time (ms since epoch).
    pub created_at: u64,
    /// Whether this is the version last created or switched to.
    pub is_current: bool,
}

/// All versions of a document, in creation order.
#[derive(Debug, Clone, Default)]
pub struct VersionStore {
    versions: Vec<Version>,
    current: Option<VersionId>,
}

impl VersionStore {
    /// Capture `snapshot` as a new version and make it current.
    ///
    /// A missing or blank name becomes "Version N".
    pub fn create(&mut self, name: Option<&str>, snapshot: Snapshot) -> &Version {
        let name = name
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map_or_else(|| format!("Version {}", self.versions.len() + 1), str::to_string);
        let version = Version {
            id: VersionId::new(),
            name,
            parent: self.current,
            created_at: timestamp_ms(),
            snapshot,
        };
        tracing::info!("Created version '{}'", version.name);
        self.current = Some(version.id);
        self.versions.push(version);
        &self.versions[self.versions.len() - 1]
    }

    /// Make `id` current and return it.
    ///
    /// # Errors
    ///
    /// Returns [`EditorError::InvalidState`] for an unknown version.
    pub fn switch(&mut self, id: VersionId) -> EditorResult<&Version> {
        let index = self
            .versions
            .iter()
            .position(|v| v.id == id)
            .ok_or_else(|| EditorError::InvalidState(format!("unknown version {id}")))?;
        self.current = Some(id);
        Ok(&self.versions[index])
    }

    /// Look up a version.
    #[must_use]
    pub fn get(&self, id: VersionId) -> Option<&Version> {
        self.versions.iter().find(|v| v.id == id)
    }

    /// The version last created or switched to.
    #[must_use]
    pub fn current(&self) -> Option<&Version> {
        self.current.and_then(|id| self.get(id))
    }

    /// Listing of all versions with the current one flagged.
    #[must_use]
    pub fn summaries(&self) -> Vec<VersionSummary> {
        self.versions
            .iter()
            .map(|v| VersionSummary {
                id: v.id,
                name: v.name.clone(),
                parent: v.parent,
                created_at: v.created_at,
                is_current: Some(v.id) == self.current,
            })
            .collect()
    }

    /// Number of versions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.versions.len()
    }

    /// Whether no version has been created.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }
}
