//! Error types for jotter-core.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cell::CellId;

/// Result type for jotter-core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in jotter-core.
#[derive(Debug, Error)]
pub enum Error {
    /// Cell source is not valid for its dialect.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// The compiler rejected a typed or markup cell.
    #[error("compilation failed: {}", diagnostics.join("; "))]
    Compile { diagnostics: Vec<String> },

    /// Script threw while being loaded or evaluated.
    #[error("{message}")]
    Runtime {
        message: String,
        stack: Option<String>,
    },

    /// Execution was stopped by an abort request or the configured timeout.
    #[error("execution interrupted")]
    Interrupted,

    /// Cell not found.
    #[error("cell not found: {0}")]
    CellNotFound(CellId),

    /// Invalid engine configuration.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The embedded engine failed outside of script evaluation.
    #[error("engine error: {0}")]
    Engine(String),

    /// Invalid operation (e.g., executing a prose cell).
    #[error("invalid operation: {0}")]
    InvalidOperation(String),
}

/// Coarse classification of an [`Error`], carried in execution outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Parse,
    Compile,
    Runtime,
    Interrupted,
    Internal,
}

impl Error {
    /// Build a runtime error from the exception pending on `ctx`.
    pub fn from_js_catch(ctx: &rquickjs::Ctx<'_>) -> Self {
        Self::from_js_value(ctx, ctx.catch())
    }

    /// Build a runtime error from a thrown value.
    ///
    /// Error objects keep their message and stack. Other objects are shown
    /// as JSON and primitives as `String(value)`.
    pub fn from_js_value<'js>(ctx: &rquickjs::Ctx<'js>, thrown: rquickjs::Value<'js>) -> Self {
        if let Some(exception) = thrown.as_exception() {
            return Self::Runtime {
                message: exception.message().unwrap_or_default(),
                stack: exception.stack().filter(|stack| !stack.is_empty()),
            };
        }
        Self::Runtime {
            message: thrown_text(ctx, thrown),
            stack: None,
        }
    }

    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Parse { .. } => ErrorKind::Parse,
            Error::Compile { .. } => ErrorKind::Compile,
            Error::Runtime { .. } => ErrorKind::Runtime,
            Error::Interrupted => ErrorKind::Interrupted,
            _ => ErrorKind::Internal,
        }
    }

    /// Stack trace captured with a runtime error, if any.
    pub fn stack(&self) -> Option<&str> {
        match self {
            Error::Runtime { stack, .. } => stack.as_deref(),
            _ => None,
        }
    }
}

impl From<rquickjs::Error> for Error {
    fn from(e: rquickjs::Error) -> Self {
        Self::Engine(e.to_string())
    }
}

fn thrown_text<'js>(ctx: &rquickjs::Ctx<'js>, thrown: rquickjs::Value<'js>) -> String {
    use rquickjs::{Coerced, Type};

    if thrown.type_of() == Type::Uninitialized {
        return "unknown exception".to_string();
    }
    if let Some(text) = thrown.as_string() {
        return text.to_string().unwrap_or_default();
    }
    if thrown.is_object() && !thrown.is_function() {
        match ctx.json_stringify(thrown.clone()) {
            Ok(Some(json)) => {
                if let Ok(json) = json.to_string() {
                    return json;
                }
            }
            Ok(None) => {}
            Err(_) => {
                let _ = ctx.catch();
            }
        }
    }
    match thrown.get::<Coerced<String>>() {
        Ok(Coerced(text)) => text,
        Err(_) => {
            // The conversion threw; discard its exception too.
            let _ = ctx.catch();
            format!("uncaught {}", thrown.type_name())
        }
    }
}

/// Extension for engine results that should surface the pending exception.
pub(crate) trait JsResultExt<T> {
    /// Convert an engine error, taking the thrown value from `ctx` when there is one.
    fn catch_js(self, ctx: &rquickjs::Ctx<'_>) -> Result<T>;
}

impl<T> JsResultExt<T> for rquickjs::Result<T> {
    fn catch_js(self, ctx: &rquickjs::Ctx<'_>) -> Result<T> {
        self.map_err(|err| match err {
            rquickjs::Error::Exception => Error::from_js_catch(ctx),
            other => Error::from(other),
        })
    }
}
