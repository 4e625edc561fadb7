#![deny(clippy::all)]

pub mod error;
mod manager;
mod panel;
mod retry;
mod sleeper;
mod state;
mod surface;
mod transport;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use error::UiError;
pub use manager::SessionFailure;
pub use manager::SessionInfo;
pub use manager::SessionManager;
pub use manager::SpawnOptions;
pub use panel::PanelController;
pub use panel::TabInfo;
pub use panel::DEFAULT_PANEL_HEIGHT;
pub use panel::MAX_PANEL_HEIGHT;
pub use panel::MIN_PANEL_HEIGHT;
pub use retry::RetryExhausted;
pub use retry::RetryPolicy;
pub use sleeper::MockSleeper;
pub use sleeper::Sleeper;
pub use sleeper::TokioSleeper;
pub use state::LifecycleState;
pub use surface::PanelGeometry;
pub use surface::RenderSurface;
pub use surface::SurfaceError;
pub use surface::SurfaceFactory;
pub use surface::TermSize;
pub use transport::TerminalTransport;
