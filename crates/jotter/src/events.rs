//! Session events broadcast to subscribers.
//!
//! Events are emitted from the interpreter thread as a cell moves through
//! the pipeline. Subscribers that fall behind lose the oldest events.

use jotter_core::{
    CellId, ErrorKind, ExecutionCallback, ExecutionOutcome, ExecutionStage, Failure, SizeEvent,
};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::error::ServiceResult;

/// Capacity for the event broadcast channel.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Progress notification for one session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    /// A cell started executing.
    CellStarted {
        cell_id: CellId,
    },

    /// A cell moved to another pipeline stage.
    StageChanged {
        cell_id: CellId,
        stage: ExecutionStage,
    },

    /// A cell finished successfully.
    CellCompleted {
        cell_id: CellId,
        /// Display and console lines, in call order.
        lines: Vec<String>,
    },

    /// A cell failed.
    CellFailed {
        cell_id: CellId,
        kind: ErrorKind,
        message: String,
    },

    /// A sandbox surface reported its content height.
    SurfaceResized {
        cell_id: CellId,
        generation: u64,
        height_px: u32,
    },
}

impl SessionEvent {
    /// Cell the event is about.
    pub fn cell_id(&self) -> CellId {
        match self {
            Self::CellStarted { cell_id }
            | Self::StageChanged { cell_id, .. }
            | Self::CellCompleted { cell_id, .. }
            | Self::CellFailed { cell_id, .. }
            | Self::SurfaceResized { cell_id, .. } => *cell_id,
        }
    }

    /// Serialize for a wire transport.
    pub fn to_json(&self) -> ServiceResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Forwards execution callbacks to a broadcast channel.
pub(crate) struct BroadcastCallback {
    tx: broadcast::Sender<SessionEvent>,
}

impl BroadcastCallback {
    pub(crate) fn new(tx: broadcast::Sender<SessionEvent>) -> Self {
        Self { tx }
    }

    /// Send an event, ignoring the case where nobody is subscribed.
    fn send(&self, event: SessionEvent) {
        let _ = self.tx.send(event);
    }
}

impl ExecutionCallback for BroadcastCallback {
    fn on_cell_started(&self, cell_id: CellId) {
        self.send(SessionEvent::CellStarted { cell_id });
    }

    fn on_stage(&self, cell_id: CellId, stage: ExecutionStage) {
        self.send(SessionEvent::StageChanged { cell_id, stage });
    }

    fn on_cell_completed(&self, cell_id: CellId, outcome: &ExecutionOutcome) {
        self.send(SessionEvent::CellCompleted {
            cell_id,
            lines: outcome.lines.clone(),
        });
    }

    fn on_cell_error(&self, cell_id: CellId, failure: &Failure) {
        self.send(SessionEvent::CellFailed {
            cell_id,
            kind: failure.kind,
            message: failure.message.clone(),
        });
    }

    fn on_surface_resized(&self, event: &SizeEvent) {
        self.send(SessionEvent::SurfaceResized {
            cell_id: event.cell_id,
            generation: event.generation,
            height_px: event.height_px,
        });
    }
}
