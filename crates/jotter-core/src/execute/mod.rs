//! Execution engine for notebook cells.
//!
//! # Architecture
//!
//! ```text
//! LoweredUnit
//!     │
//!     └── ExecutionHost::execute
//!             │
//!             ├── fresh realm (rquickjs::Context) in the session Runtime
//!             │       ├── namespace entries as globals + staging object
//!             │       └── display / console capture
//!             │
//!             ├── Module::declare + eval, top-level await driven to completion
//!             │
//!             └── success: display default export, merge publications and
//!                 exports into the SharedNamespace as one batch
//! ```
//!
//! # Module Structure
//!
//! - `context` - Abort handle, interrupt deadline and execution callbacks
//! - `host` - ExecutionHost
//! - `outcome` - ExecutionOutcome and Failure
//! - `realm` - Realm setup shared with the sandbox renderer
//! - `resolver` - Import resolution over the module search paths

mod context;
mod host;
mod outcome;
pub(crate) mod realm;
mod resolver;

pub use context::{AbortHandle, ExecutionCallback, ExecutionStage};
pub(crate) use context::Interrupt;
pub(crate) use resolver::SearchPathResolver;
pub use host::ExecutionHost;
pub use outcome::{ExecutionOutcome, Failure, SUCCESS_PLACEHOLDER};
pub use realm::CONSOLE_TARGET;
