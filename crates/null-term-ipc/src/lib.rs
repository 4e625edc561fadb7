#![deny(clippy::all)]

mod client;
mod error;
pub mod lifecycle;
pub mod methods;
mod socket;
mod types;

pub use null_term_common::error_codes;

pub use client::ChannelClient;
pub use client::ChannelEvent;
pub use error::ClientError;
pub use socket::socket_path;
pub use socket::SOCKET_ENV_VAR;
pub use types::ActionResult;
pub use types::KillParams;
pub use types::ListResult;
pub use types::ResizeParams;
pub use types::ResizeResult;
pub use types::RpcNotification;
pub use types::RpcRequest;
pub use types::RpcResponse;
pub use types::RpcServerError;
pub use types::SessionSummary;
pub use types::SpawnParams;
pub use types::SpawnResult;
pub use types::TerminalEvent;
pub use types::WriteParams;

pub type Result<T> = std::result::Result<T, ClientError>;
