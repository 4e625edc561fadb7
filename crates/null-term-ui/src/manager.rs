use std::sync::Arc;

use null_term_ipc::{ChannelEvent, ClientError, SpawnParams};
use tokio::sync::mpsc::{self, error::TryRecvError};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::UiError;
use crate::panel::DEFAULT_PANEL_HEIGHT;
use crate::retry::RetryPolicy;
use crate::sleeper::{Sleeper, TokioSleeper};
use crate::state::LifecycleState;
use crate::surface::{PanelGeometry, RenderSurface, SurfaceFactory, TermSize};
use crate::transport::TerminalTransport;

const TRANSPORT_LOST_NOTICE: &str =
    "\r\n\u{2717} Connection to the terminal host was lost. Restart the panel to reconnect.\r\n";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionFailure {
    Spawn { code: Option<i32>, message: String },
    TransportLost,
}

/// Shell and working directory requested for new sessions. `None` lets the
/// host pick its defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpawnOptions {
    pub shell: Option<String>,
    pub cwd: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    pub id: String,
    pub display_name: String,
    pub state: LifecycleState,
    pub active: bool,
    pub pid: Option<u32>,
    /// `Some(false)` when the host fell back to pipes and resizes are no-ops.
    pub pty: Option<bool>,
    pub size: Option<TermSize>,
    pub exit_code: Option<i32>,
    pub failure: Option<SessionFailure>,
}

struct ManagedSession {
    id: String,
    display_name: String,
    state: LifecycleState,
    surface: Box<dyn RenderSurface>,
    events: Option<mpsc::UnboundedReceiver<ChannelEvent>>,
    pending_input: Vec<String>,
    size: Option<TermSize>,
    pid: Option<u32>,
    pty: Option<bool>,
    exit_code: Option<i32>,
    failure: Option<SessionFailure>,
}

impl ManagedSession {
    fn transition(&mut self, next: LifecycleState) -> bool {
        if !self.state.can_transition_to(next) {
            debug!(
                session_id = %self.id,
                from = %self.state,
                to = %next,
                "Ignoring lifecycle transition"
            );
            return false;
        }
        debug!(session_id = %self.id, from = %self.state, to = %next, "Lifecycle transition");
        self.state = next;
        true
    }

    fn info(&self, active: bool) -> SessionInfo {
        SessionInfo {
            id: self.id.clone(),
            display_name: self.display_name.clone(),
            state: self.state,
            active,
            pid: self.pid,
            pty: self.pty,
            size: self.size,
            exit_code: self.exit_code,
            failure: self.failure.clone(),
        }
    }
}

/// Owns every terminal session in the panel: creation, activation, input,
/// output routing, resizing and teardown.
///
/// Sessions are kept in creation order. At most one is active; only the
/// active session's surface is shown and only it is resized.
pub struct SessionManager {
    transport: Arc<dyn TerminalTransport>,
    /// Consumer key this manager registers its event listeners under.
    listener_key: String,
    surfaces: Box<dyn SurfaceFactory>,
    sleeper: Arc<dyn Sleeper>,
    retry: RetryPolicy,
    options: SpawnOptions,
    sessions: Vec<ManagedSession>,
    active: Option<String>,
    visible: bool,
    geometry: PanelGeometry,
    next_seq: u64,
    next_name: u64,
    transport_lost: bool,
}

impl SessionManager {
    pub fn new(transport: Arc<dyn TerminalTransport>, surfaces: Box<dyn SurfaceFactory>) -> Self {
        Self {
            transport,
            listener_key: format!("session-manager-{}", Uuid::new_v4().simple()),
            surfaces,
            sleeper: Arc::new(TokioSleeper),
            retry: RetryPolicy::default(),
            options: SpawnOptions::default(),
            sessions: Vec::new(),
            active: None,
            visible: true,
            geometry: PanelGeometry {
                height_px: DEFAULT_PANEL_HEIGHT,
            },
            next_seq: 0,
            next_name: 0,
            transport_lost: false,
        }
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_spawn_options(mut self, options: SpawnOptions) -> Self {
        self.options = options;
        self
    }

    /// Applies to sessions started from now on.
    pub fn set_spawn_options(&mut self, options: SpawnOptions) {
        self.options = options;
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn active_id(&self) -> Option<&str> {
        self.active.as_deref()
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn is_transport_lost(&self) -> bool {
        self.transport_lost
    }

    pub fn sessions(&self) -> Vec<SessionInfo> {
        self.sessions
            .iter()
            .map(|session| session.info(self.is_active(&session.id)))
            .collect()
    }

    pub fn session(&self, id: &str) -> Option<SessionInfo> {
        self.sessions
            .iter()
            .find(|session| session.id == id)
            .map(|session| session.info(self.is_active(id)))
    }

    /// Registers a new session in `Created`, subscribes to its events and
    /// makes it active. Input written before [`start_session`] is queued.
    ///
    /// [`start_session`]: SessionManager::start_session
    pub fn begin_session(&mut self) -> String {
        let id = self.next_session_id();
        self.next_name += 1;
        let display_name = format!("Terminal {}", self.next_name);

        let surface = self.surfaces.create(&id, &display_name);
        let events = self.transport.subscribe(&id, &self.listener_key);
        self.sessions.push(ManagedSession {
            id: id.clone(),
            display_name: display_name.clone(),
            state: LifecycleState::Created,
            surface,
            events: Some(events),
            pending_input: Vec::new(),
            size: None,
            pid: None,
            pty: None,
            exit_code: None,
            failure: None,
        });
        info!(session_id = %id, name = %display_name, "Terminal session created");

        self.activate(&id);
        id
    }

    /// Attaches the surface, measures it and asks the host to spawn the
    /// shell. Spawn failures leave the session `Exited` with the reason on
    /// screen; other sessions are untouched.
    pub async fn start_session(&mut self, id: &str) -> Result<(), UiError> {
        let idx = self.index_of(id)?;
        if !self.sessions[idx].transition(LifecycleState::Spawning) {
            return Err(UiError::NotRunning {
                id: id.to_string(),
                state: self.sessions[idx].state,
            });
        }

        let size = if self.ensure_attached(idx).await {
            self.sessions[idx].surface.fit(self.geometry)
        } else {
            None
        }
        .unwrap_or_default();
        self.sessions[idx].size = Some(size);

        let params = SpawnParams {
            id: id.to_string(),
            shell: self.options.shell.clone(),
            cwd: self.options.cwd.clone(),
            cols: Some(size.cols),
            rows: Some(size.rows),
        };
        debug!(session_id = %id, size = %size, "Spawning shell");

        match self.transport.spawn(&params).await {
            Ok(result) if result.success => {
                let session = &mut self.sessions[idx];
                session.transition(LifecycleState::Running);
                session.pid = result.pid;
                session.pty = result.pty;
                session
                    .surface
                    .write(&format!("\u{2713} {} ready\r\n", session.display_name));
                if result.pty == Some(false) {
                    warn!(session_id = %id, "Shell runs without a pty; resize is unavailable");
                }
                info!(session_id = %id, pid = ?result.pid, pty = ?result.pty, "Terminal session running");

                let pending = std::mem::take(&mut session.pending_input);
                for data in pending {
                    self.forward_input(idx, &data).await?;
                }
                Ok(())
            }
            Ok(result) => {
                let message = result
                    .error
                    .clone()
                    .unwrap_or_else(|| "unknown error".to_string());
                self.fail_spawn(idx, result.code, message);
                Err(UiError::rejected(result.code, result.error))
            }
            Err(ClientError::TransportLost) => {
                self.mark_transport_lost();
                Err(UiError::TransportLost)
            }
            Err(err) => {
                self.fail_spawn(idx, err.code(), err.to_string());
                Err(err.into())
            }
        }
    }

    /// Creates and starts a session. The id is returned even when the
    /// spawn fails; the session then sits in `Exited` with its failure.
    pub async fn create_session(&mut self) -> String {
        let id = self.begin_session();
        if let Err(err) = self.start_session(&id).await {
            warn!(session_id = %id, error = %err, "Terminal session failed to start");
        }
        id
    }

    pub async fn write(&mut self, id: &str, data: &str) -> Result<(), UiError> {
        let idx = self.index_of(id)?;
        match self.sessions[idx].state {
            LifecycleState::Created | LifecycleState::Spawning => {
                self.sessions[idx].pending_input.push(data.to_string());
                Ok(())
            }
            LifecycleState::Running => self.forward_input(idx, data).await,
            state => Err(UiError::NotRunning {
                id: id.to_string(),
                state,
            }),
        }
    }

    /// Writes to the active session.
    pub async fn write_active(&mut self, data: &str) -> Result<(), UiError> {
        let id = self
            .active
            .clone()
            .ok_or_else(|| UiError::NotFound("no active terminal".to_string()))?;
        self.write(&id, data).await
    }

    /// Tears a session down: stop routing its events, kill the process,
    /// dispose the surface, forget it. Activation falls to the most recently
    /// created remaining session.
    pub async fn close_session(&mut self, id: &str) -> Result<(), UiError> {
        let idx = self.index_of(id)?;
        self.transport.unsubscribe(id, &self.listener_key);
        let mut session = self.sessions.remove(idx);
        session.events = None;

        if matches!(
            session.state,
            LifecycleState::Created | LifecycleState::Spawning | LifecycleState::Running
        ) {
            if !self.transport_lost {
                match self.transport.kill(id).await {
                    Ok(result) if result.success || result.is_not_found() => {}
                    Ok(result) => {
                        warn!(session_id = %id, error = ?result.error, "Host refused kill")
                    }
                    Err(ClientError::TransportLost) => self.mark_transport_lost(),
                    Err(err) => warn!(session_id = %id, error = %err, "Kill request failed"),
                }
            }
            session.transition(LifecycleState::Killed);
        }

        session.surface.dispose();
        session.transition(LifecycleState::Disposed);
        info!(session_id = %id, "Terminal session closed");

        if self.active.as_deref() == Some(id) {
            self.active = None;
            if let Some(next) = self.sessions.last().map(|s| s.id.clone()) {
                if let Err(err) = self.switch_to(&next).await {
                    debug!(session_id = %next, error = %err, "Reflow after close failed");
                }
            }
        }
        Ok(())
    }

    /// Closes every session. Used when the window goes away.
    pub async fn close_all(&mut self) -> usize {
        self.active = None;
        let ids: Vec<String> = self.sessions.iter().map(|s| s.id.clone()).collect();
        let mut closed = 0;
        for id in ids {
            match self.close_session(&id).await {
                Ok(()) => closed += 1,
                Err(err) => warn!(session_id = %id, error = %err, "Failed to close session"),
            }
        }
        closed
    }

    /// Activates `id`, shows its surface and refits it to the panel.
    pub async fn switch_to(&mut self, id: &str) -> Result<Option<TermSize>, UiError> {
        let idx = self.index_of(id)?;
        self.activate(id);
        self.reflow(idx).await
    }

    /// Refits the active session. Hidden sessions are refit when they are
    /// next activated.
    pub async fn resize_all(&mut self) -> Result<Option<TermSize>, UiError> {
        match self.active_index() {
            Some(idx) => self.reflow(idx).await,
            None => Ok(None),
        }
    }

    pub fn set_visible(&mut self, visible: bool) {
        self.visible = visible;
        self.apply_visibility();
    }

    pub fn set_geometry(&mut self, geometry: PanelGeometry) {
        self.geometry = geometry;
    }

    /// Drains pending host events into the sessions' surfaces and states.
    /// Returns how many events were handled.
    pub fn pump_events(&mut self) -> usize {
        let mut handled = 0;
        let mut lost = false;

        for session in &mut self.sessions {
            let Some(mut events) = session.events.take() else {
                continue;
            };
            let mut closed = false;
            loop {
                match events.try_recv() {
                    Ok(ChannelEvent::Data { data }) => {
                        handled += 1;
                        session.surface.write(&data);
                    }
                    Ok(ChannelEvent::Exit { exit_code }) => {
                        handled += 1;
                        if session.transition(LifecycleState::Exited) {
                            session.exit_code = Some(exit_code);
                            session.surface.write(&format!(
                                "\r\n[Process exited with code {}]\r\n",
                                exit_code
                            ));
                            info!(session_id = %session.id, exit_code, "Shell exited");
                        }
                    }
                    Ok(ChannelEvent::TransportLost) => {
                        handled += 1;
                        lost = true;
                    }
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => {
                        closed = true;
                        break;
                    }
                }
            }
            if !closed {
                session.events = Some(events);
            }
        }

        if lost {
            self.mark_transport_lost();
        }
        handled
    }

    fn next_session_id(&mut self) -> String {
        self.next_seq += 1;
        let suffix = Uuid::new_v4().simple().to_string();
        format!("term-{}-{}", self.next_seq, &suffix[..8])
    }

    fn is_active(&self, id: &str) -> bool {
        self.active.as_deref() == Some(id)
    }

    fn index_of(&self, id: &str) -> Result<usize, UiError> {
        self.sessions
            .iter()
            .position(|session| session.id == id)
            .ok_or_else(|| UiError::NotFound(id.to_string()))
    }

    fn active_index(&self) -> Option<usize> {
        let active = self.active.as_deref()?;
        self.sessions.iter().position(|session| session.id == active)
    }

    fn activate(&mut self, id: &str) {
        self.active = Some(id.to_string());
        self.apply_visibility();
    }

    fn apply_visibility(&mut self) {
        let active = self.active.as_deref();
        for session in &mut self.sessions {
            let shown = self.visible && active == Some(session.id.as_str());
            session.surface.set_visible(shown);
        }
    }

    /// Attaches the session's surface if it is the shown one, retrying while
    /// the container has no layout. Returns false when it stays detached; the
    /// next activation or resize tries again.
    async fn ensure_attached(&mut self, idx: usize) -> bool {
        if self.sessions[idx].surface.is_attached() {
            return true;
        }
        if !self.visible || !self.is_active(&self.sessions[idx].id) {
            return false;
        }

        let id = self.sessions[idx].id.clone();
        let surface = &mut self.sessions[idx].surface;
        match self
            .retry
            .run(self.sleeper.as_ref(), |_| surface.try_attach())
            .await
        {
            Ok(()) => true,
            Err(exhausted) => {
                warn!(
                    session_id = %id,
                    attempts = exhausted.attempts,
                    waited_ms = exhausted.waited.as_millis() as u64,
                    error = %exhausted.last_error,
                    "Render surface did not attach"
                );
                false
            }
        }
    }

    async fn reflow(&mut self, idx: usize) -> Result<Option<TermSize>, UiError> {
        if !self.visible || !self.ensure_attached(idx).await {
            return Ok(None);
        }

        let geometry = self.geometry;
        let session = &mut self.sessions[idx];
        let Some(size) = session.surface.fit(geometry) else {
            return Ok(None);
        };
        if session.size == Some(size) {
            return Ok(None);
        }
        if session.state != LifecycleState::Running {
            session.size = Some(size);
            return Ok(None);
        }

        let id = session.id.clone();
        match self.transport.resize(&id, size.cols, size.rows).await {
            Ok(result) if result.success => {
                self.sessions[idx].size = Some(size);
                debug!(session_id = %id, size = %size, applied = ?result.applied, "Resized terminal");
                Ok(Some(size))
            }
            Ok(result) if result.code == Some(null_term_ipc::error_codes::SESSION_NOT_FOUND) => {
                debug!(session_id = %id, "Resize raced with shell exit");
                Ok(None)
            }
            Ok(result) => Err(UiError::rejected(result.code, result.error)),
            Err(ClientError::TransportLost) => {
                self.mark_transport_lost();
                Err(UiError::TransportLost)
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn forward_input(&mut self, idx: usize, data: &str) -> Result<(), UiError> {
        let id = self.sessions[idx].id.clone();
        match self.transport.write(&id, data).await {
            Ok(result) if result.success => Ok(()),
            Ok(result) => Err(UiError::rejected(result.code, result.error)),
            Err(ClientError::TransportLost) => {
                self.mark_transport_lost();
                Err(UiError::TransportLost)
            }
            Err(err) => Err(err.into()),
        }
    }

    fn fail_spawn(&mut self, idx: usize, code: Option<i32>, message: String) {
        let session = &mut self.sessions[idx];
        session.transition(LifecycleState::Exited);
        session.pending_input.clear();
        session
            .surface
            .write(&format!("\u{2717} Failed to start terminal: {}\r\n", message));
        warn!(session_id = %session.id, code = ?code, error = %message, "Spawn failed");
        session.failure = Some(SessionFailure::Spawn { code, message });
    }

    /// Every session that still expects a process becomes `Exited` with a
    /// transport failure. Later operations fail fast.
    fn mark_transport_lost(&mut self) {
        if !self.transport_lost {
            warn!(sessions = self.sessions.len(), "Transport to host lost");
        }
        self.transport_lost = true;
        for session in &mut self.sessions {
            if !session.state.accepts_input() {
                continue;
            }
            session.transition(LifecycleState::Exited);
            session.pending_input.clear();
            session.failure = Some(SessionFailure::TransportLost);
            session.surface.write(TRANSPORT_LOST_NOTICE);
        }
    }
}
