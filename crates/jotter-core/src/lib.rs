//! Cell execution engine for Jotter JavaScript notebooks.
//!
//! This crate provides:
//! - Declaration extraction over the oxc AST
//! - Code transformation for implicit result capture and namespace publication
//! - Lowering of TypeScript and JSX cells to plain JavaScript
//! - Isolated execution of cells as single-use QuickJS modules
//! - A session-scoped shared namespace
//! - Sandboxed rendering of markup cells with content sizing
//!
//! ```text
//! source + language
//!     │
//!     └── CodeTransformer (DeclarationExtractor)
//!             │
//!             └── Lowerer
//!                     │
//!                     ├── ExecutionHost ◀──▶ SharedNamespace ──▶ ExecutionOutcome
//!                     │
//!                     └── SandboxRenderer ◀── SharedNamespace ──▶ RenderReport
//! ```

pub mod cell;
pub mod config;
pub mod error;
pub mod execute;
pub mod extract;
pub mod format;
pub mod lower;
pub mod namespace;
pub mod render;
pub mod session;
mod syntax;
pub mod transform;

pub use cell::{CellId, CellUnit, LanguageTag};
pub use config::{EngineConfig, SurfaceConfig};
pub use error::{Error, ErrorKind, Result};
pub use execute::{
    AbortHandle, ExecutionCallback, ExecutionHost, ExecutionOutcome, ExecutionStage, Failure,
};
pub use extract::{DeclarationExtractor, FinalStatement, SourceAnalysis, TopLevelBindings};
pub use format::format_source;
pub use lower::{LoweredUnit, Lowerer};
pub use namespace::{JsValueStore, SharedNamespace};
pub use render::{MarkupNode, RenderReport, RenderSurfaceHandle, SandboxRenderer, SizeEvent};
pub use session::NotebookSession;
pub use transform::{CodeTransformer, TransformedUnit};
