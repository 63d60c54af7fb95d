//! Jotter: JavaScript notebook cells, executed.
//!
//! This crate runs [`jotter_core::NotebookSession`]s behind an async
//! [`SessionHandle`] and broadcasts [`SessionEvent`]s while cells execute.
//! The engine types are re-exported so most callers only need this crate.
//!
//! ```no_run
//! use jotter::{CellId, EngineConfig, LanguageTag, SessionHandle};
//!
//! # async fn run() -> jotter::ServiceResult<()> {
//! let session = SessionHandle::spawn(EngineConfig::default()).await?;
//! session.execute(CellId::new(1), "const a = 3;", LanguageTag::Plain).await?;
//! let outcome = session.execute(CellId::new(2), "a + 2", LanguageTag::Plain).await?;
//! assert_eq!(outcome.lines, vec!["5"]);
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod events;
pub mod service;

pub use error::{ServiceError, ServiceResult};
pub use events::{EVENT_CHANNEL_CAPACITY, SessionEvent};
pub use service::{SessionHandle, SessionId};

pub use jotter_core::{
    AbortHandle, CellId, CellUnit, EngineConfig, Error, ErrorKind, ExecutionOutcome,
    ExecutionStage, Failure, LanguageTag, MarkupNode, RenderReport, RenderSurfaceHandle,
    SizeEvent, SurfaceConfig, format_source,
};
