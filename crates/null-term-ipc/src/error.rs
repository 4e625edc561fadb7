use null_term_common::error_codes::{self, ErrorCategory};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Failed to connect to host: {0}")]
    ConnectionFailed(#[from] std::io::Error),

    #[error("Failed to serialize request: {0}")]
    SerializationFailed(#[from] serde_json::Error),

    #[error("RPC error ({code}): {message}")]
    RpcError { code: i32, message: String },

    #[error("Host not running")]
    HostNotRunning,

    #[error("Invalid response from host")]
    InvalidResponse,

    /// The channel to the host closed. Every pending and later call on the
    /// same client fails with this.
    #[error("Transport to host lost")]
    TransportLost,
}

impl ClientError {
    pub fn code(&self) -> Option<i32> {
        match self {
            ClientError::RpcError { code, .. } => Some(*code),
            ClientError::TransportLost => Some(error_codes::TRANSPORT_LOST),
            ClientError::HostNotRunning => Some(error_codes::HOST_ERROR),
            _ => None,
        }
    }

    pub fn category(&self) -> Option<ErrorCategory> {
        self.code().map(error_codes::category_for_code)
    }

    pub fn suggestion(&self) -> Option<String> {
        match self {
            ClientError::HostNotRunning | ClientError::ConnectionFailed(_) => Some(
                "Start the host with 'null-term host' or check NULL_TERM_SOCKET.".to_string(),
            ),
            ClientError::TransportLost => {
                Some("The host went away. Restart the panel to reconnect.".to_string())
            }
            ClientError::RpcError { code, .. } if *code == error_codes::METHOD_NOT_FOUND => {
                Some("Host and panel versions may differ. Restart the host.".to_string())
            }
            _ => None,
        }
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            ClientError::ConnectionFailed(_) | ClientError::HostNotRunning => true,
            ClientError::RpcError { code, .. } => error_codes::is_retryable(*code),
            _ => false,
        }
    }
}
