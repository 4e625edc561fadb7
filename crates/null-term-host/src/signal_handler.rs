use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use signal_hook::consts::{SIGHUP, SIGINT, SIGTERM};
use signal_hook::SigId;
use tracing::debug;

use crate::error::HostError;

/// Signals that stop the host. SIGHUP is included because the host is often
/// launched from a panel whose controlling terminal goes away with it.
const SHUTDOWN_SIGNALS: [i32; 3] = [SIGINT, SIGTERM, SIGHUP];

/// Raises the host's shutdown flag on SIGINT, SIGTERM or SIGHUP.
///
/// The serve loop polls the flag and tears every session down before it
/// returns. Registrations are removed when this is dropped.
pub struct SignalHandler {
    registrations: Vec<SigId>,
}

impl SignalHandler {
    pub fn setup(shutdown: Arc<AtomicBool>) -> Result<Self, HostError> {
        let mut handler = Self {
            registrations: Vec::with_capacity(SHUTDOWN_SIGNALS.len()),
        };
        for signal in SHUTDOWN_SIGNALS {
            let id = signal_hook::flag::register(signal, Arc::clone(&shutdown)).map_err(|e| {
                HostError::SignalSetup(format!("failed to register signal {}: {}", signal, e))
            })?;
            handler.registrations.push(id);
        }
        debug!(signals = ?SHUTDOWN_SIGNALS, "Shutdown signals registered");
        Ok(handler)
    }
}

impl Drop for SignalHandler {
    fn drop(&mut self) {
        for id in self.registrations.drain(..) {
            signal_hook::low_level::unregister(id);
        }
    }
}
