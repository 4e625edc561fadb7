#![deny(clippy::all)]

mod adapter;
pub mod config;
pub mod error;
mod events;
mod pump;
mod registry;
mod server;
mod signal_handler;
mod transport;

pub use adapter::ProcessAdapter;
pub use adapter::SpawnOutcome;
pub use adapter::SESSION_ID_ENV_VAR;
pub use config::HostConfig;
pub use error::HostError;
pub use error::SessionError;
pub use events::EventHub;
pub use events::EventSink;
pub use registry::ConnectionId;
pub use registry::LiveSession;
pub use registry::SessionRegistry;
pub use server::start_host;
pub use server::HostHandle;
pub use server::HostServer;
pub use signal_handler::SignalHandler;
