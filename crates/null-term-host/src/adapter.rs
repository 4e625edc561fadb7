use std::path::PathBuf;
use std::sync::Arc;

use null_term_ipc::SessionSummary;
use null_term_ipc::SpawnParams;
use null_term_pty::resolve_shell;
use null_term_pty::spawn_shell;
use null_term_pty::Platform;
use null_term_pty::SpawnRequest;
use null_term_pty::DEFAULT_COLS;
use null_term_pty::DEFAULT_ROWS;
use tracing::{debug, info, warn};

use crate::config::HostConfig;
use crate::error::SessionError;
use crate::events::EventSink;
use crate::pump::Pump;
use crate::registry::ConnectionId;
use crate::registry::LiveSession;
use crate::registry::SessionRegistry;

/// Exported to every shell so scripts can tell which panel tab they run in.
pub const SESSION_ID_ENV_VAR: &str = "NULL_TERM_SESSION_ID";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpawnOutcome {
    pub pid: Option<u32>,
    pub pty: bool,
}

/// Owns every shell process the host runs and reports their output and
/// exits through an [`EventSink`].
pub struct ProcessAdapter {
    registry: Arc<SessionRegistry>,
    sink: Arc<dyn EventSink>,
    config: HostConfig,
    platform: Platform,
}

impl ProcessAdapter {
    pub fn new(registry: Arc<SessionRegistry>, sink: Arc<dyn EventSink>, config: HostConfig) -> Self {
        Self {
            registry,
            sink,
            config,
            platform: Platform::current(),
        }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    pub fn spawn(
        &self,
        params: &SpawnParams,
        owner: Option<ConnectionId>,
    ) -> Result<SpawnOutcome, SessionError> {
        if params.id.trim().is_empty() {
            return Err(SessionError::InvalidId);
        }
        let cols = params.cols.unwrap_or(DEFAULT_COLS);
        let rows = params.rows.unwrap_or(DEFAULT_ROWS);
        validate_size(cols, rows)?;
        self.registry.check_available(&params.id)?;

        let shell = resolve_shell(
            params.shell.as_deref().or(self.config.shell.as_deref()),
            self.platform,
        );
        let cwd = params.cwd.clone().filter(|c| !c.trim().is_empty());
        let request = SpawnRequest::new(&shell, cols, rows)
            .with_cwd(cwd.as_ref().map(PathBuf::from))
            .with_env(SESSION_ID_ENV_VAR, params.id.as_str());

        let spawned = spawn_shell(&request, self.config.spawn_mode).inspect_err(|e| {
            warn!(session_id = %params.id, shell = %shell, error = %e, "Spawn failed");
        })?;

        let session = Arc::new(LiveSession::new(
            params.id.clone(),
            shell.clone(),
            cwd,
            owner,
            (cols, rows),
            spawned.process,
        ));
        let outcome = SpawnOutcome {
            pid: session.pid(),
            pty: session.is_pty(),
        };

        if let Err(e) = self.registry.insert(Arc::clone(&session)) {
            // Lost a race with a concurrent spawn of the same id.
            let _ = session.kill();
            return Err(e);
        }

        let pump = Pump {
            session: Arc::clone(&session),
            registry: Arc::clone(&self.registry),
            sink: Arc::clone(&self.sink),
            exit_grace: self.config.exit_grace,
        };
        if let Err(e) = pump.start(spawned.output) {
            self.registry.remove_exact(&session);
            let _ = session.kill();
            return Err(e.into());
        }

        info!(
            session_id = %params.id,
            shell = %shell,
            pid = ?outcome.pid,
            pty = outcome.pty,
            cols,
            rows,
            "Terminal spawned"
        );
        Ok(outcome)
    }

    pub fn write(&self, id: &str, data: &str) -> Result<(), SessionError> {
        let session = self.registry.get(id)?;
        session.write(data.as_bytes())?;
        Ok(())
    }

    /// Returns whether the size reached the process.
    pub fn resize(&self, id: &str, cols: u16, rows: u16) -> Result<bool, SessionError> {
        validate_size(cols, rows)?;
        let session = self.registry.get(id)?;
        let applied = session.resize(cols, rows)?;
        debug!(session_id = %id, cols, rows, applied, "Terminal resized");
        Ok(applied)
    }

    /// Unregisters the session, then terminates its process. The exit event
    /// still follows once the process is gone.
    pub fn kill(&self, id: &str) -> Result<(), SessionError> {
        let session = self.registry.remove(id)?;
        session.kill()?;
        info!(session_id = %id, "Terminal killed");
        Ok(())
    }

    pub fn list(&self) -> Vec<SessionSummary> {
        self.registry.summaries()
    }

    pub fn kill_owned_by(&self, owner: ConnectionId) -> usize {
        let ids = self.registry.owned_by(owner);
        let mut killed = 0;
        for id in ids {
            match self.kill(&id) {
                Ok(()) => killed += 1,
                Err(SessionError::NotFound(_)) => {}
                Err(e) => warn!(session_id = %id, error = %e, "Failed to kill terminal"),
            }
        }
        killed
    }

    pub fn kill_all(&self) -> usize {
        let sessions = self.registry.drain();
        let count = sessions.len();
        for session in sessions {
            if let Err(e) = session.kill() {
                warn!(session_id = %session.id(), error = %e, "Failed to kill terminal");
            }
        }
        if count > 0 {
            info!(count, "Killed all terminals");
        }
        count
    }
}

fn validate_size(cols: u16, rows: u16) -> Result<(), SessionError> {
    if cols == 0 || rows == 0 {
        return Err(SessionError::InvalidSize { cols, rows });
    }
    Ok(())
}
