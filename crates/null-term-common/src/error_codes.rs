//! Error codes shared by the host, the channel client and the panel.
//!
//! Standard JSON-RPC codes are used only for protocol faults. Domain
//! failures travel inside `{success: false}` results and carry one of the
//! application codes below in their `code` field.

pub const PARSE_ERROR: i32 = -32700;
pub const INVALID_REQUEST: i32 = -32600;
pub const METHOD_NOT_FOUND: i32 = -32601;
pub const INVALID_PARAMS: i32 = -32602;

pub const SESSION_NOT_FOUND: i32 = -32001;
pub const SESSION_EXISTS: i32 = -32002;
pub const SESSION_LIMIT: i32 = -32006;
pub const PTY_ERROR: i32 = -32008;
pub const SPAWN_FAILED: i32 = -32009;

pub const COMMAND_NOT_FOUND: i32 = -32014;
pub const PERMISSION_DENIED: i32 = -32015;

pub const HOST_ERROR: i32 = -32016;
pub const TRANSPORT_LOST: i32 = -32018;

pub const GENERIC_ERROR: i32 = -32000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    NotFound,
    InvalidInput,
    Busy,
    Internal,
    External,
    Disconnected,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::NotFound => "not_found",
            ErrorCategory::InvalidInput => "invalid_input",
            ErrorCategory::Busy => "busy",
            ErrorCategory::Internal => "internal",
            ErrorCategory::External => "external",
            ErrorCategory::Disconnected => "disconnected",
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

pub fn is_retryable(code: i32) -> bool {
    matches!(code, SESSION_LIMIT | GENERIC_ERROR)
}

pub fn category_for_code(code: i32) -> ErrorCategory {
    match code {
        SESSION_NOT_FOUND | METHOD_NOT_FOUND => ErrorCategory::NotFound,
        SESSION_EXISTS | INVALID_PARAMS | INVALID_REQUEST | PARSE_ERROR => {
            ErrorCategory::InvalidInput
        }
        SESSION_LIMIT => ErrorCategory::Busy,
        PTY_ERROR | SPAWN_FAILED | COMMAND_NOT_FOUND | PERMISSION_DENIED | HOST_ERROR => {
            ErrorCategory::External
        }
        TRANSPORT_LOST => ErrorCategory::Disconnected,
        _ => ErrorCategory::Internal,
    }
}
