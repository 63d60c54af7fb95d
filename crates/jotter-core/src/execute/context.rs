//! Execution context and callbacks for notebook cells.
//!
//! Provides progress reporting and interruption of running scripts.

use std::cell::Cell;
use std::rc::Rc;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use rquickjs::Runtime;
use serde::{Deserialize, Serialize};

use crate::cell::CellId;
use crate::render::SizeEvent;

use super::outcome::{ExecutionOutcome, Failure};

/// Stops the script a session is currently running.
///
/// The session runtime's interrupt handler reads this flag while a cell
/// loads, so `abort` from another thread ends even a `while (true) {}`
/// cell with an interrupted failure. The flag only covers the request in
/// flight: the session clears it when a request enters its loading stage
/// and again when that request finishes.
///
/// # Example
///
/// ```
/// use jotter_core::execute::AbortHandle;
///
/// let handle = AbortHandle::new();
/// let handle_clone = handle.clone();
///
/// assert!(!handle.is_aborted());
/// handle_clone.abort();
/// assert!(handle.is_aborted());
/// ```
#[derive(Clone, Default)]
pub struct AbortHandle {
    /// Shared abort flag.
    aborted: Arc<AtomicBool>,
}

impl AbortHandle {
    /// Create a new abort handle.
    pub fn new() -> Self {
        Self {
            aborted: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Check if abort has been requested.
    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::Relaxed)
    }

    /// Interrupt the cell currently loading, if any.
    pub fn abort(&self) {
        self.aborted.store(true, Ordering::Relaxed);
    }

    /// Clear the flag without waiting for a request to do it.
    pub fn reset(&self) {
        self.aborted.store(false, Ordering::Relaxed);
    }
}

/// Pipeline stage of one execution request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStage {
    Idle,
    Transforming,
    Lowering,
    Loading,
    Succeeded,
    Failed,
}

/// Callback trait for execution progress reporting.
pub trait ExecutionCallback: Send + Sync {
    /// Called when a cell starts executing.
    fn on_cell_started(&self, cell_id: CellId);

    /// Called on every stage transition.
    fn on_stage(&self, _cell_id: CellId, _stage: ExecutionStage) {}

    /// Called when a cell completes successfully.
    fn on_cell_completed(&self, cell_id: CellId, outcome: &ExecutionOutcome);

    /// Called when a cell execution fails.
    fn on_cell_error(&self, cell_id: CellId, failure: &Failure);

    /// Called when a sandbox surface reports its content height.
    fn on_surface_resized(&self, _event: &SizeEvent) {}
}

/// Interrupt state polled by the interpreter.
///
/// Combines the session's [`AbortHandle`] with an optional wall-clock
/// deadline armed around each execution.
#[derive(Clone)]
pub(crate) struct Interrupt {
    abort: AbortHandle,
    deadline: Rc<Cell<Option<Instant>>>,
}

impl Interrupt {
    pub(crate) fn new(abort: AbortHandle) -> Self {
        Self {
            abort,
            deadline: Rc::new(Cell::new(None)),
        }
    }

    /// Route the runtime's interrupt handler through this state.
    pub(crate) fn install(&self, runtime: &Runtime) {
        let interrupt = self.clone();
        runtime.set_interrupt_handler(Some(Box::new(move || interrupt.tripped())));
    }

    /// Clear any previous abort and start the timeout clock.
    pub(crate) fn arm(&self, timeout: Option<Duration>) {
        self.abort.reset();
        self.deadline.set(timeout.map(|timeout| Instant::now() + timeout));
    }

    /// Stop the clock and drop an abort aimed at the request that just ended.
    pub(crate) fn disarm(&self) {
        self.deadline.set(None);
        self.abort.reset();
    }

    pub(crate) fn tripped(&self) -> bool {
        self.abort.is_aborted()
            || self
                .deadline
                .get()
                .is_some_and(|deadline| Instant::now() >= deadline)
    }

    pub(crate) fn abort_handle(&self) -> &AbortHandle {
        &self.abort
    }
}
