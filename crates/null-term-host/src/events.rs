use std::collections::HashMap;
use std::sync::RwLock;

use crossbeam_channel::Sender;
use null_term_common::rwlock_read_or_recover;
use null_term_common::rwlock_write_or_recover;
use null_term_ipc::TerminalEvent;
use tracing::{trace, warn};

use crate::registry::ConnectionId;

/// Receives process output and exit events from the adapter.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: TerminalEvent);
}

impl EventSink for Sender<TerminalEvent> {
    fn emit(&self, event: TerminalEvent) {
        let _ = self.send(event);
    }
}

/// Fans events out to every connected client as notification lines.
///
/// Each connection has one FIFO outbound queue shared with its responses,
/// so a session's events reach a client in the order they were emitted.
#[derive(Default)]
pub struct EventHub {
    connections: RwLock<HashMap<ConnectionId, Sender<String>>>,
}

impl EventHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach(&self, conn: ConnectionId, outbound: Sender<String>) {
        rwlock_write_or_recover(&self.connections).insert(conn, outbound);
    }

    pub fn detach(&self, conn: ConnectionId) {
        rwlock_write_or_recover(&self.connections).remove(&conn);
    }

    pub fn connection_count(&self) -> usize {
        rwlock_read_or_recover(&self.connections).len()
    }
}

impl EventSink for EventHub {
    fn emit(&self, event: TerminalEvent) {
        let line = match serde_json::to_string(&event.to_notification()) {
            Ok(line) => line,
            Err(e) => {
                warn!(session_id = %event.session_id(), error = %e, "Failed to encode event");
                return;
            }
        };

        let mut closed = Vec::new();
        for (conn, outbound) in rwlock_read_or_recover(&self.connections).iter() {
            if outbound.send(line.clone()).is_err() {
                closed.push(*conn);
            }
        }
        trace!(session_id = %event.session_id(), "Event broadcast");

        if !closed.is_empty() {
            let mut connections = rwlock_write_or_recover(&self.connections);
            for conn in closed {
                connections.remove(&conn);
            }
        }
    }
}
