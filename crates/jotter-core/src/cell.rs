//! Cell model shared by every pipeline stage.

use serde::{Deserialize, Serialize};

/// Opaque identifier of a notebook cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CellId(u64);

impl CellId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for CellId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "cell_{}", self.0)
    }
}

/// Declared language of a cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LanguageTag {
    /// Plain JavaScript.
    Plain,
    /// TypeScript.
    Typed,
    /// JavaScript with embedded JSX markup.
    MarkupPlain,
    /// TypeScript with embedded JSX markup.
    MarkupTyped,
    /// Markdown prose, rendered as-is and never executed.
    Prose,
}

impl LanguageTag {
    /// Map a markdown fence tag to a language.
    ///
    /// Matching is case-insensitive and accepts the long names
    /// (`javascript`, `typescript`, `markdown`) as aliases.
    pub fn from_fence(tag: &str) -> Option<Self> {
        match tag.trim().to_ascii_lowercase().as_str() {
            "js" | "javascript" | "mjs" => Some(Self::Plain),
            "ts" | "typescript" => Some(Self::Typed),
            "jsx" => Some(Self::MarkupPlain),
            "tsx" => Some(Self::MarkupTyped),
            "md" | "markdown" => Some(Self::Prose),
            _ => None,
        }
    }

    /// Canonical fence tag for this language.
    pub fn fence(&self) -> &'static str {
        match self {
            Self::Plain => "js",
            Self::Typed => "ts",
            Self::MarkupPlain => "jsx",
            Self::MarkupTyped => "tsx",
            Self::Prose => "md",
        }
    }

    pub fn is_markup(&self) -> bool {
        matches!(self, Self::MarkupPlain | Self::MarkupTyped)
    }

    pub fn is_typed(&self) -> bool {
        matches!(self, Self::Typed | Self::MarkupTyped)
    }

    /// Whether cells of this language go through the execution pipeline.
    pub fn is_executable(&self) -> bool {
        !matches!(self, Self::Prose)
    }
}

impl std::fmt::Display for LanguageTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.fence())
    }
}

/// One cell as handed over by the editor: read-only input to an execution request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellUnit {
    pub id: CellId,
    pub source: String,
    pub language: LanguageTag,
}

impl CellUnit {
    pub fn new(id: CellId, source: impl Into<String>, language: LanguageTag) -> Self {
        Self {
            id,
            source: source.into(),
            language,
        }
    }
}
