//! Host-side errors. Session errors never cross the channel as JSON-RPC
//! errors; they become `{success: false, error, code}` results.

use null_term_common::error_codes::{self, ErrorCategory};
use null_term_pty::PtyError;
use serde_json::{json, Value};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Terminal not found: {0}")]
    NotFound(String),
    #[error("Terminal already exists: {0}")]
    AlreadyExists(String),
    #[error("Session limit reached: maximum {0} sessions allowed")]
    LimitReached(usize),
    #[error("Invalid terminal size {cols}x{rows}")]
    InvalidSize { cols: u16, rows: u16 },
    #[error("Invalid terminal id")]
    InvalidId,
    #[error(transparent)]
    Pty(#[from] PtyError),
}

impl SessionError {
    pub fn code(&self) -> i32 {
        match self {
            SessionError::NotFound(_) => error_codes::SESSION_NOT_FOUND,
            SessionError::AlreadyExists(_) => error_codes::SESSION_EXISTS,
            SessionError::LimitReached(_) => error_codes::SESSION_LIMIT,
            SessionError::InvalidSize { .. } | SessionError::InvalidId => {
                error_codes::INVALID_PARAMS
            }
            SessionError::Pty(pty_err) => pty_err.code(),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        error_codes::category_for_code(self.code())
    }

    pub fn context(&self) -> Value {
        match self {
            SessionError::NotFound(id) | SessionError::AlreadyExists(id) => {
                json!({ "session_id": id })
            }
            SessionError::LimitReached(max) => json!({ "max_sessions": max }),
            SessionError::InvalidSize { cols, rows } => json!({ "cols": cols, "rows": rows }),
            SessionError::InvalidId => json!({}),
            SessionError::Pty(pty_err) => pty_err.context(),
        }
    }

    pub fn suggestion(&self) -> String {
        match self {
            SessionError::NotFound(_) => {
                "The terminal has exited or was closed. Run 'null-term sessions' to list live ones."
                    .to_string()
            }
            SessionError::AlreadyExists(_) => {
                "Terminal ids are single-use. Generate a fresh id.".to_string()
            }
            SessionError::LimitReached(_) => {
                "Close unused terminals or raise NULL_TERM_MAX_SESSIONS.".to_string()
            }
            SessionError::InvalidSize { .. } => "Columns and rows must be at least 1.".to_string(),
            SessionError::InvalidId => "Terminal ids must be non-empty.".to_string(),
            SessionError::Pty(pty_err) => pty_err.suggestion(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            SessionError::Pty(pty_err) => pty_err.is_retryable(),
            _ => error_codes::is_retryable(self.code()),
        }
    }
}

/// Host startup and lifecycle errors.
#[derive(Error, Debug)]
pub enum HostError {
    #[error("Failed to bind socket: {0}")]
    SocketBind(String),
    #[error("Another host instance is already running")]
    AlreadyRunning,
    #[error("Failed to acquire lock: {0}")]
    LockFailed(String),
    #[error("Failed to setup signal handler: {0}")]
    SignalSetup(String),
    #[error("Failed to create thread pool: {0}")]
    ThreadPool(String),
}

impl HostError {
    pub fn code(&self) -> i32 {
        error_codes::HOST_ERROR
    }

    pub fn category(&self) -> ErrorCategory {
        ErrorCategory::External
    }

    pub fn context(&self) -> Value {
        match self {
            HostError::SocketBind(reason) => {
                json!({ "operation": "socket_bind", "reason": reason })
            }
            HostError::AlreadyRunning => {
                json!({ "operation": "startup", "reason": "another instance running" })
            }
            HostError::LockFailed(reason) => json!({ "operation": "lock", "reason": reason }),
            HostError::SignalSetup(reason) => {
                json!({ "operation": "signal_setup", "reason": reason })
            }
            HostError::ThreadPool(reason) => {
                json!({ "operation": "thread_pool", "reason": reason })
            }
        }
    }

    pub fn suggestion(&self) -> String {
        match self {
            HostError::SocketBind(_) => {
                "Check that the socket directory is writable or set NULL_TERM_SOCKET.".to_string()
            }
            HostError::AlreadyRunning => {
                "A host is already serving this socket. Connect with 'null-term panel'.".to_string()
            }
            HostError::LockFailed(_) => {
                "Lock file issue. Remove the stale '.lock' file next to the socket.".to_string()
            }
            HostError::SignalSetup(_) => {
                "Signal handler setup failed. Check system signal configuration.".to_string()
            }
            HostError::ThreadPool(_) => {
                "Thread pool creation failed. Check system thread limits (ulimit -u).".to_string()
            }
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, HostError::LockFailed(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_error_codes() {
        assert_eq!(
            SessionError::NotFound("t".into()).code(),
            error_codes::SESSION_NOT_FOUND
        );
        assert_eq!(
            SessionError::AlreadyExists("t".into()).code(),
            error_codes::SESSION_EXISTS
        );
        assert_eq!(SessionError::LimitReached(2).code(), error_codes::SESSION_LIMIT);
        assert_eq!(
            SessionError::InvalidSize { cols: 0, rows: 5 }.code(),
            error_codes::INVALID_PARAMS
        );
    }

    #[test]
    fn test_session_error_wraps_pty_codes() {
        let err = SessionError::from(PtyError::spawn("/x", "No such file or directory"));
        assert_eq!(err.code(), error_codes::COMMAND_NOT_FOUND);
        assert_eq!(err.category(), ErrorCategory::External);
        assert_eq!(err.to_string(), "Failed to spawn /x: No such file or directory");
    }

    #[test]
    fn test_session_error_context_and_retry() {
        assert_eq!(
            SessionError::NotFound("term-1".into()).context()["session_id"],
            "term-1"
        );
        assert!(SessionError::LimitReached(4).is_retryable());
        assert!(!SessionError::NotFound("x".into()).is_retryable());
    }

    #[test]
    fn test_host_error_shape() {
        let err = HostError::SocketBind("denied".into());
        assert_eq!(err.code(), error_codes::HOST_ERROR);
        assert_eq!(err.context()["operation"], "socket_bind");
        assert!(!err.is_retryable());
        assert!(HostError::LockFailed("x".into()).is_retryable());
    }
}
