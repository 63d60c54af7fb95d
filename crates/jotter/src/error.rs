//! Error types for the Jotter session service.

/// Service error type.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// Jotter core error.
    #[error("Core error: {0}")]
    Core(#[from] jotter_core::Error),

    /// The interpreter thread has stopped.
    #[error("Session closed")]
    SessionClosed,

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The interpreter thread could not be started.
    #[error("Failed to spawn session thread: {0}")]
    Spawn(String),
}

impl From<std::io::Error> for ServiceError {
    fn from(e: std::io::Error) -> Self {
        Self::Spawn(e.to_string())
    }
}

/// Result type for service operations.
pub type ServiceResult<T> = Result<T, ServiceError>;
