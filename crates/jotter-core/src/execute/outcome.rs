//! Result of one execution request.

use serde::{Deserialize, Serialize};

use crate::error::{Error, ErrorKind};
use crate::render::RenderReport;

/// Message shown when an execution produced nothing to display.
pub const SUCCESS_PLACEHOLDER: &str = "Code executed successfully.";

/// Why an execution failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Failure {
    pub kind: ErrorKind,
    pub message: String,
    /// Script stack trace, for runtime failures.
    pub stack: Option<String>,
}

impl From<&Error> for Failure {
    fn from(error: &Error) -> Self {
        Self {
            kind: error.kind(),
            message: error.to_string(),
            stack: error.stack().map(str::to_string),
        }
    }
}

/// Everything one execution request produced.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionOutcome {
    /// One entry per display or console call, in call order.
    pub lines: Vec<String>,
    /// Display form of the captured trailing expression.
    pub produced: Option<String>,
    pub failure: Option<Failure>,
    /// Sandbox render result, for markup cells.
    pub render: Option<RenderReport>,
}

impl ExecutionOutcome {
    pub fn succeeded(lines: Vec<String>, produced: Option<String>) -> Self {
        Self {
            lines,
            produced,
            failure: None,
            render: None,
        }
    }

    pub fn failed(lines: Vec<String>, error: &Error) -> Self {
        Self {
            lines,
            produced: None,
            failure: Some(Failure::from(error)),
            render: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.failure.is_none()
    }

    /// Text for the cell's output panel.
    ///
    /// Captured lines, then `Error: <message>` on failure. A successful run
    /// with no output shows [`SUCCESS_PLACEHOLDER`].
    pub fn display_text(&self) -> String {
        let mut out = self.lines.join("\n");
        if let Some(failure) = &self.failure {
            if !out.is_empty() {
                out.push('\n');
            }
            out.push_str("Error: ");
            out.push_str(&failure.message);
        }
        if out.is_empty() {
            SUCCESS_PLACEHOLDER.to_string()
        } else {
            out
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_text_lines() {
        let outcome = ExecutionOutcome::succeeded(vec!["1".into(), "two".into()], None);
        assert_eq!(outcome.display_text(), "1\ntwo");
    }

    #[test]
    fn test_display_text_placeholder() {
        assert_eq!(ExecutionOutcome::default().display_text(), SUCCESS_PLACEHOLDER);
    }

    #[test]
    fn test_display_text_failure_after_lines() {
        let error = Error::Runtime {
            message: "boom".into(),
            stack: None,
        };
        let outcome = ExecutionOutcome::failed(vec!["before".into()], &error);
        assert!(!outcome.is_success());
        assert_eq!(outcome.display_text(), "before\nError: boom");
        assert_eq!(outcome.failure.unwrap().kind, ErrorKind::Runtime);
    }
}
