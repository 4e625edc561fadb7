//! Shell process errors with structured context.

use null_term_common::error_codes::{self, ErrorCategory};
use serde_json::{json, Value};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PtyError {
    #[error("Failed to open PTY: {0}")]
    Open(String),
    #[error("Failed to spawn {shell}: {reason}")]
    Spawn { shell: String, reason: String },
    #[error("Failed to write to shell: {0}")]
    Write(String),
    #[error("Failed to read from shell: {0}")]
    Read(String),
    #[error("Failed to resize PTY: {0}")]
    Resize(String),
    #[error("Failed to kill shell: {0}")]
    Kill(String),
}

impl PtyError {
    pub fn spawn(shell: impl Into<String>, reason: impl Into<String>) -> Self {
        PtyError::Spawn {
            shell: shell.into(),
            reason: reason.into(),
        }
    }

    /// Spawn failures are split by cause so the panel can tell a typo in the
    /// shell path apart from a permission problem.
    pub fn code(&self) -> i32 {
        match self {
            PtyError::Spawn { reason, .. } if is_not_found(reason) => {
                error_codes::COMMAND_NOT_FOUND
            }
            PtyError::Spawn { reason, .. } if reason.contains("Permission denied") => {
                error_codes::PERMISSION_DENIED
            }
            PtyError::Spawn { .. } => error_codes::SPAWN_FAILED,
            _ => error_codes::PTY_ERROR,
        }
    }

    pub fn category(&self) -> ErrorCategory {
        ErrorCategory::External
    }

    pub fn context(&self) -> Value {
        match self {
            PtyError::Spawn { shell, reason } => json!({
                "operation": "spawn",
                "shell": shell,
                "reason": reason
            }),
            other => json!({
                "operation": other.operation(),
                "reason": other.reason()
            }),
        }
    }

    pub fn suggestion(&self) -> String {
        match self {
            PtyError::Open(_) => {
                "PTY allocation failed. Check system resource limits (ulimit -n) or set NULL_TERM_SPAWN_MODE=pipes."
                    .to_string()
            }
            PtyError::Spawn { reason, .. } => {
                if is_not_found(reason) {
                    "Shell not found. Check the path or set NULL_TERM_SHELL.".to_string()
                } else if reason.contains("Permission denied") {
                    "Permission denied. Check that the shell is executable.".to_string()
                } else {
                    "Shell spawn failed. Check the shell path and working directory.".to_string()
                }
            }
            PtyError::Write(_) | PtyError::Read(_) => {
                "The shell may have exited. Open a new terminal tab.".to_string()
            }
            PtyError::Resize(_) => "Failed to resize terminal. Try again.".to_string(),
            PtyError::Kill(_) => "The process may already be gone.".to_string(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, PtyError::Open(_) | PtyError::Resize(_))
    }

    pub fn operation(&self) -> &'static str {
        match self {
            PtyError::Open(_) => "open",
            PtyError::Spawn { .. } => "spawn",
            PtyError::Write(_) => "write",
            PtyError::Read(_) => "read",
            PtyError::Resize(_) => "resize",
            PtyError::Kill(_) => "kill",
        }
    }

    pub fn reason(&self) -> &str {
        match self {
            PtyError::Spawn { reason, .. } => reason,
            PtyError::Open(r)
            | PtyError::Write(r)
            | PtyError::Read(r)
            | PtyError::Resize(r)
            | PtyError::Kill(r) => r,
        }
    }
}

fn is_not_found(reason: &str) -> bool {
    reason.contains("not found") || reason.contains("No such file")
}
