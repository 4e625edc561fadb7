use null_term_common::error_codes::{self, ErrorCategory};
use null_term_ipc::ClientError;
use thiserror::Error;

use crate::state::LifecycleState;

#[derive(Error, Debug)]
pub enum UiError {
    #[error("Terminal not found: {0}")]
    NotFound(String),

    #[error("Terminal {id} is {state}")]
    NotRunning { id: String, state: LifecycleState },

    #[error("Host rejected request: {message}")]
    Rejected { code: Option<i32>, message: String },

    #[error("Transport to host lost")]
    TransportLost,

    #[error(transparent)]
    Client(ClientError),
}

impl From<ClientError> for UiError {
    fn from(err: ClientError) -> Self {
        match err {
            ClientError::TransportLost => UiError::TransportLost,
            other => UiError::Client(other),
        }
    }
}

impl UiError {
    pub fn rejected(code: Option<i32>, message: Option<String>) -> Self {
        UiError::Rejected {
            code,
            message: message.unwrap_or_else(|| "unknown error".to_string()),
        }
    }

    pub fn code(&self) -> i32 {
        match self {
            UiError::NotFound(_) => error_codes::SESSION_NOT_FOUND,
            UiError::NotRunning { .. } => error_codes::SESSION_NOT_FOUND,
            UiError::Rejected { code, .. } => code.unwrap_or(error_codes::GENERIC_ERROR),
            UiError::TransportLost => error_codes::TRANSPORT_LOST,
            UiError::Client(err) => err.code().unwrap_or(error_codes::GENERIC_ERROR),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        error_codes::category_for_code(self.code())
    }

    pub fn suggestion(&self) -> Option<String> {
        match self {
            UiError::NotFound(_) => Some("Run '::tabs' to list open terminals.".to_string()),
            UiError::NotRunning { .. } => {
                Some("Open a new terminal with '::new'.".to_string())
            }
            UiError::TransportLost => {
                Some("The host went away. Restart the panel to reconnect.".to_string())
            }
            UiError::Client(err) => err.suggestion(),
            UiError::Rejected { .. } => None,
        }
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            UiError::Client(err) => err.is_retryable(),
            UiError::Rejected { code, .. } => code.is_some_and(error_codes::is_retryable),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_lost_is_not_wrapped() {
        let err: UiError = ClientError::TransportLost.into();
        assert!(matches!(err, UiError::TransportLost));
        assert_eq!(err.category(), ErrorCategory::Disconnected);
    }

    #[test]
    fn test_not_running_message() {
        let err = UiError::NotRunning {
            id: "term-1-abcd1234".to_string(),
            state: LifecycleState::Exited,
        };
        assert_eq!(err.to_string(), "Terminal term-1-abcd1234 is exited");
        assert_eq!(err.category(), ErrorCategory::NotFound);
        assert!(err.suggestion().is_some());
    }

    #[test]
    fn test_rejected_keeps_host_code() {
        let err = UiError::rejected(
            Some(error_codes::SESSION_LIMIT),
            Some("limit".to_string()),
        );
        assert_eq!(err.code(), error_codes::SESSION_LIMIT);
        assert_eq!(err.category(), ErrorCategory::Busy);
    }
}
