//! AI tool catalogue.
//!
//! Each tool carries its validation rules and commit behavior as data, looked
//! up by an exhaustive match rather than a string-keyed table.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for an AI operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OperationId(Uuid);

impl OperationId {
    /// Create a new unique operation ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for OperationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How a finished operation lands in the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommitMode {
    /// Add the result as a new generated layer on top.
    NewLayer,
    /// Replace the pixels of the layer that was active at submission.
    ReplaceActive,
}

/// Validation and commit rules for a tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToolSpec {
    /// Display label.
    pub label: &'static str,
    /// The tool is driven by a text prompt.
    pub needs_prompt: bool,
    /// The tool needs a target region; whole-canvas tools do not.
    pub needs_selection: bool,
    /// Default commit behavior.
    pub commit: CommitMode,
}

/// AI tool kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ToolKind {
    /// Repaint the selected region from a prompt.
    Inpaint,
    /// Remove the selected object.
    Remove,
    /// Change the lighting of the scene.
    Relight,
    /// Extend the image beyond its borders.
    ExpandCanvas,
    /// Keep the selected region sharp and blur the rest.
    FocusBlur,
    /// Regrade colors across the whole image.
    ColorGrade,
    /// Upscale and re-detail the whole image.
    Upscale,
    /// Content-aware fill of the selected region from a prompt.
    GenerativeFill,
    /// Restyle the image after a described style.
    StyleTransfer,
    /// Cut the main subject out onto its own layer.
    ExtractSubject,
    /// Auto-enhance image quality.
    Enhance,
    /// Remove noise and grain.
    Denoise,
    /// Add color to monochrome images.
    Colorize,
    /// Restore and enhance faces.
    FaceFix,
}

impl ToolKind {
    /// Every tool, in palette order.
    pub const ALL: [Self; 14] = [
        Self::Inpaint,
        Self::Remove,
        Self::Relight,
        Self::ExpandCanvas,
        Self::FocusBlur,
        Self::ColorGrade,
        Self::Upscale,
        Self::GenerativeFill,
        Self::StyleTransfer,
        Self::ExtractSubject,
        Self::Enhance,
        Self::Denoise,
        Self::Colorize,
        Self::FaceFix,
    ];

    /// Rules for this tool.
    #[must_use]
    pub const fn spec(self) -> ToolSpec {
        use CommitMode::{NewLayer, ReplaceActive};

        let (label, needs_prompt, needs_selection, commit) = match self {
            Self::Inpaint => ("Inpaint", true, true, NewLayer),
            Self::Remove => ("Remove", false, true, NewLayer),
            Self::Relight => ("Relight", true, false, NewLayer),
            Self::ExpandCanvas => ("Expand Canvas", false, false, NewLayer),
            Self::FocusBlur => ("Focus Blur", false, true, NewLayer),
            Self::ColorGrade => ("Color Grade", false, false, ReplaceActive),
            Self::Upscale => ("Upscale", false, false, ReplaceActive),
            Self::GenerativeFill => ("Generative Fill", true, true, NewLayer),
            Self::StyleTransfer => ("Style Transfer", true, false, NewLayer),
            Self::ExtractSubject => ("Extract Subject", false, false, NewLayer),
            Self::Enhance => ("Enhance", false, false, ReplaceActive),
            Self::Denoise => ("Denoise", false, false, ReplaceActive),
            Self::Colorize => ("Colorize", false, false, ReplaceActive),
            Self::FaceFix => ("Fix Faces", false, false, ReplaceActive),
        };
        ToolSpec {
            label,
            needs_prompt,
            needs_selection,
            commit,
        }
    }

    /// Display label, e.g. "Generative Fill".
    #[must_use]
    pub const fn label(self) -> &'static str {
        self.spec().label
    }

    /// Whether a prompt is mandatory.
    #[must_use]
    pub const fn needs_prompt(self) -> bool {
        self.spec().needs_prompt
    }

    /// Whether a non-empty selection is mandatory.
    #[must_use]
    pub const fn needs_selection(self) -> bool {
        self.spec().needs_selection
    }

    /// Default commit behavior.
    #[must_use]
    pub const fn default_commit(self) -> CommitMode {
        self.spec().commit
    }

    /// Name of the layer a successful run creates.
    #[must_use]
    pub fn result_layer_name(self) -> String {
        format!("{} Result", self.label())
    }

    /// History label for a successful run.
    #[must_use]
    pub fn history_label(self) -> String {
        format!("Apply {}", self.label())
    }
}

impl fmt::Display for ToolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
