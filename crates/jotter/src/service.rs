//! Asynchronous session service.
//!
//! QuickJS values are bound to the thread that created their runtime, so
//! each session lives on its own interpreter thread. [`SessionHandle`] is
//! the async face of that thread:
//!
//! ```text
//! SessionHandle (any task) ──mpsc──▶ interpreter thread ──▶ NotebookSession
//!        ▲                                 │
//!        └────────── oneshot reply ────────┤
//!                                          └──broadcast──▶ SessionEvent subscribers
//! ```
//!
//! Requests are applied one at a time in arrival order. Aborting is the
//! only operation that reaches a running request, through the shared
//! [`AbortHandle`].

use std::fmt;
use std::thread;

use jotter_core::{
    AbortHandle, CellId, CellUnit, EngineConfig, ExecutionOutcome, LanguageTag, NotebookSession,
    RenderReport,
};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc, oneshot};
use uuid::Uuid;

use crate::error::{ServiceError, ServiceResult};
use crate::events::{BroadcastCallback, EVENT_CHANNEL_CAPACITY, SessionEvent};

/// Unique identifier of a running session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(Uuid);

impl SessionId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

type Reply<T> = oneshot::Sender<T>;

/// Requests handled on the interpreter thread.
enum Command {
    Execute {
        cell_id: CellId,
        source: String,
        language: LanguageTag,
        reply: Reply<ExecutionOutcome>,
    },
    RenderMarkup {
        cell_id: CellId,
        source: String,
        reply: Reply<jotter_core::Result<RenderReport>>,
    },
    EditCell {
        cell_id: CellId,
        source: String,
        language: LanguageTag,
        reply: Reply<()>,
    },
    RunAll {
        cells: Vec<CellUnit>,
        reply: Reply<Vec<(CellId, ExecutionOutcome)>>,
    },
    Reset {
        reply: Reply<()>,
    },
    NamespaceNames {
        reply: Reply<Vec<String>>,
    },
    Inspect {
        name: String,
        reply: Reply<jotter_core::Result<Option<String>>>,
    },
}

/// Handle to a session running on its interpreter thread.
///
/// Handles are cheap to clone. The thread stops once every handle is gone.
#[derive(Clone)]
pub struct SessionHandle {
    id: SessionId,
    commands: mpsc::UnboundedSender<Command>,
    events: broadcast::Sender<SessionEvent>,
    abort: AbortHandle,
}

impl SessionHandle {
    /// Start a session on a new interpreter thread.
    ///
    /// Fails when the configuration is rejected or the runtime cannot be
    /// created.
    pub async fn spawn(config: EngineConfig) -> ServiceResult<Self> {
        let id = SessionId::new();
        let abort = AbortHandle::new();
        let (commands, rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (ready_tx, ready_rx) = oneshot::channel();

        let thread_abort = abort.clone();
        let thread_events = events.clone();
        thread::Builder::new()
            .name(format!("jotter-session-{}", id))
            .spawn(move || {
                let mut session = match NotebookSession::with_abort_handle(config, thread_abort) {
                    Ok(session) => session,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                session.set_callback(BroadcastCallback::new(thread_events));
                if ready_tx.send(Ok(())).is_err() {
                    return;
                }
                serve(id, session, rx);
            })?;

        ready_rx.await.map_err(|_| ServiceError::SessionClosed)??;
        tracing::info!("Session {} started", id);

        Ok(Self {
            id,
            commands,
            events,
            abort,
        })
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Subscribe to session events.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Interrupt the request currently running, if any.
    pub fn abort(&self) {
        tracing::info!("Abort requested for session {}", self.id);
        self.abort.abort();
    }

    /// Execute one cell. Failures are reported in the outcome.
    pub async fn execute(
        &self,
        cell_id: CellId,
        source: impl Into<String>,
        language: LanguageTag,
    ) -> ServiceResult<ExecutionOutcome> {
        let source = source.into();
        self.request(|reply| Command::Execute {
            cell_id,
            source,
            language,
            reply,
        })
        .await
    }

    /// Render a markup cell into its sandbox surface.
    pub async fn render_markup(
        &self,
        cell_id: CellId,
        source: impl Into<String>,
    ) -> ServiceResult<RenderReport> {
        let source = source.into();
        let report = self
            .request(|reply| Command::RenderMarkup {
                cell_id,
                source,
                reply,
            })
            .await??;
        Ok(report)
    }

    /// Record a source edit without executing it.
    pub async fn edit_cell(
        &self,
        cell_id: CellId,
        source: impl Into<String>,
        language: LanguageTag,
    ) -> ServiceResult<()> {
        let source = source.into();
        self.request(|reply| Command::EditCell {
            cell_id,
            source,
            language,
            reply,
        })
        .await
    }

    /// Execute cells in order, continuing past failures.
    pub async fn run_all(
        &self,
        cells: Vec<CellUnit>,
    ) -> ServiceResult<Vec<(CellId, ExecutionOutcome)>> {
        self.request(|reply| Command::RunAll { cells, reply }).await
    }

    /// Clear the shared namespace and every surface.
    pub async fn reset(&self) -> ServiceResult<()> {
        self.request(|reply| Command::Reset { reply }).await
    }

    /// Published names, sorted.
    pub async fn namespace_names(&self) -> ServiceResult<Vec<String>> {
        self.request(|reply| Command::NamespaceNames { reply }).await
    }

    /// Display form of one published value.
    pub async fn inspect(&self, name: impl Into<String>) -> ServiceResult<Option<String>> {
        let name = name.into();
        let value = self
            .request(|reply| Command::Inspect { name, reply })
            .await??;
        Ok(value)
    }

    async fn request<T>(&self, command: impl FnOnce(Reply<T>) -> Command) -> ServiceResult<T> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(command(reply))
            .map_err(|_| ServiceError::SessionClosed)?;
        rx.await.map_err(|_| ServiceError::SessionClosed)
    }
}

/// Interpreter thread main loop.
fn serve(id: SessionId, mut session: NotebookSession, mut rx: mpsc::UnboundedReceiver<Command>) {
    while let Some(command) = rx.blocking_recv() {
        // A dropped reply receiver means the caller went away; the work is
        // still applied so the namespace matches arrival order.
        match command {
            Command::Execute {
                cell_id,
                source,
                language,
                reply,
            } => {
                let _ = reply.send(session.execute(cell_id, &source, language));
            }
            Command::RenderMarkup {
                cell_id,
                source,
                reply,
            } => {
                let _ = reply.send(session.render_markup(cell_id, &source));
            }
            Command::EditCell {
                cell_id,
                source,
                language,
                reply,
            } => {
                session.edit_cell(cell_id, &source, language);
                let _ = reply.send(());
            }
            Command::RunAll { cells, reply } => {
                let _ = reply.send(session.run_all(&cells));
            }
            Command::Reset { reply } => {
                session.reset();
                let _ = reply.send(());
            }
            Command::NamespaceNames { reply } => {
                let _ = reply.send(session.namespace_names());
            }
            Command::Inspect { name, reply } => {
                let _ = reply.send(session.inspect(&name));
            }
        }
    }
    tracing::info!("Session {} stopped", id);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_ids_are_unique() {
        assert_ne!(SessionId::new(), SessionId::new());
    }

    #[test]
    fn test_session_id_serializes_as_uuid() {
        let id = SessionId::new();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{}\"", id.as_uuid()));
    }
}
