//! In-memory transport and render surfaces for driving the session manager
//! without a host or a real widget.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use null_term_common::mutex_lock_or_recover;
use null_term_ipc::error_codes;
use null_term_ipc::{
    ActionResult, ChannelEvent, ClientError, ResizeResult, SpawnParams, SpawnResult,
};
use tokio::sync::mpsc;

use crate::surface::{PanelGeometry, RenderSurface, SurfaceError, SurfaceFactory, TermSize};
use crate::transport::TerminalTransport;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportCall {
    Spawn(SpawnParams),
    Write { id: String, data: String },
    Resize { id: String, cols: u16, rows: u16 },
    Kill { id: String },
}

#[derive(Default)]
struct FakeHostState {
    calls: Vec<TransportCall>,
    listeners: HashMap<String, HashMap<String, mpsc::UnboundedSender<ChannelEvent>>>,
    live: HashSet<String>,
    failing_shells: HashSet<String>,
    failing_ids: HashSet<String>,
    pipes: bool,
    lost: bool,
    spawned: u32,
}

/// Behaves like a host: tracks live sessions, answers with the same result
/// shapes, and emits `exit` after a kill to whoever is still listening.
#[derive(Default)]
pub struct FakeTransport {
    state: Mutex<FakeHostState>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_spawns_for(&self, shell: &str) {
        mutex_lock_or_recover(&self.state)
            .failing_shells
            .insert(shell.to_string());
    }

    pub fn fail_spawn_of(&self, id: &str) {
        mutex_lock_or_recover(&self.state)
            .failing_ids
            .insert(id.to_string());
    }

    /// Report every later spawn as pipe-backed (`pty: false`).
    pub fn use_pipes(&self) {
        mutex_lock_or_recover(&self.state).pipes = true;
    }

    pub fn calls(&self) -> Vec<TransportCall> {
        mutex_lock_or_recover(&self.state).calls.clone()
    }

    pub fn spawns(&self) -> Vec<SpawnParams> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                TransportCall::Spawn(params) => Some(params),
                _ => None,
            })
            .collect()
    }

    pub fn writes_for(&self, id: &str) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                TransportCall::Write { id: target, data } if target == id => Some(data),
                _ => None,
            })
            .collect()
    }

    pub fn resizes_for(&self, id: &str) -> Vec<(u16, u16)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                TransportCall::Resize {
                    id: target,
                    cols,
                    rows,
                } if target == id => Some((cols, rows)),
                _ => None,
            })
            .collect()
    }

    pub fn kills(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                TransportCall::Kill { id } => Some(id),
                _ => None,
            })
            .collect()
    }

    pub fn is_live(&self, id: &str) -> bool {
        mutex_lock_or_recover(&self.state).live.contains(id)
    }

    pub fn is_subscribed(&self, id: &str) -> bool {
        mutex_lock_or_recover(&self.state)
            .listeners
            .get(id)
            .is_some_and(|consumers| !consumers.is_empty())
    }

    /// Returns false when nobody is listening for `id`.
    pub fn emit_data(&self, id: &str, data: &str) -> bool {
        self.emit(
            id,
            ChannelEvent::Data {
                data: data.to_string(),
            },
        )
    }

    pub fn emit_exit(&self, id: &str, exit_code: i32) -> bool {
        mutex_lock_or_recover(&self.state).live.remove(id);
        self.emit(id, ChannelEvent::Exit { exit_code })
    }

    pub fn lose_transport(&self) {
        let mut state = mutex_lock_or_recover(&self.state);
        state.lost = true;
        state.live.clear();
        for listener in state.listeners.values().flat_map(HashMap::values) {
            let _ = listener.send(ChannelEvent::TransportLost);
        }
    }

    fn emit(&self, id: &str, event: ChannelEvent) -> bool {
        let state = mutex_lock_or_recover(&self.state);
        let Some(consumers) = state.listeners.get(id) else {
            return false;
        };
        let mut delivered = false;
        for listener in consumers.values() {
            delivered |= listener.send(event.clone()).is_ok();
        }
        delivered
    }

    fn record(&self, call: TransportCall) -> Result<(), ClientError> {
        let mut state = mutex_lock_or_recover(&self.state);
        if state.lost {
            return Err(ClientError::TransportLost);
        }
        state.calls.push(call);
        Ok(())
    }
}

fn not_found(id: &str) -> (i32, String) {
    (error_codes::SESSION_NOT_FOUND, format!("Terminal not found: {}", id))
}

#[async_trait]
impl TerminalTransport for FakeTransport {
    async fn spawn(&self, params: &SpawnParams) -> Result<SpawnResult, ClientError> {
        self.record(TransportCall::Spawn(params.clone()))?;
        let mut state = mutex_lock_or_recover(&self.state);
        let shell = params.shell.clone().unwrap_or_else(|| "/bin/sh".to_string());
        if state.failing_shells.contains(&shell) || state.failing_ids.contains(&params.id) {
            return Ok(SpawnResult::failed(
                error_codes::COMMAND_NOT_FOUND,
                format!("Failed to spawn '{}': command not found", shell),
            ));
        }
        if !state.live.insert(params.id.clone()) {
            return Ok(SpawnResult::failed(
                error_codes::SESSION_EXISTS,
                format!("Terminal already exists: {}", params.id),
            ));
        }
        state.spawned += 1;
        Ok(SpawnResult::spawned(Some(1000 + state.spawned), !state.pipes))
    }

    async fn write(&self, id: &str, data: &str) -> Result<ActionResult, ClientError> {
        self.record(TransportCall::Write {
            id: id.to_string(),
            data: data.to_string(),
        })?;
        if self.is_live(id) {
            Ok(ActionResult::ok())
        } else {
            let (code, message) = not_found(id);
            Ok(ActionResult::failed(code, message))
        }
    }

    async fn resize(&self, id: &str, cols: u16, rows: u16) -> Result<ResizeResult, ClientError> {
        self.record(TransportCall::Resize {
            id: id.to_string(),
            cols,
            rows,
        })?;
        let state = mutex_lock_or_recover(&self.state);
        if state.live.contains(id) {
            Ok(ResizeResult::resized(!state.pipes))
        } else {
            let (code, message) = not_found(id);
            Ok(ResizeResult::failed(code, message))
        }
    }

    async fn kill(&self, id: &str) -> Result<ActionResult, ClientError> {
        self.record(TransportCall::Kill { id: id.to_string() })?;
        let removed = mutex_lock_or_recover(&self.state).live.remove(id);
        if removed {
            self.emit(id, ChannelEvent::Exit { exit_code: 137 });
            Ok(ActionResult::ok())
        } else {
            let (code, message) = not_found(id);
            Ok(ActionResult::failed(code, message))
        }
    }

    fn subscribe(&self, id: &str, consumer: &str) -> mpsc::UnboundedReceiver<ChannelEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut state = mutex_lock_or_recover(&self.state);
        if state.lost {
            let _ = tx.send(ChannelEvent::TransportLost);
        }
        state
            .listeners
            .entry(id.to_string())
            .or_default()
            .insert(consumer.to_string(), tx);
        rx
    }

    fn unsubscribe(&self, id: &str, consumer: &str) -> bool {
        let mut state = mutex_lock_or_recover(&self.state);
        let Some(consumers) = state.listeners.get_mut(id) else {
            return false;
        };
        let removed = consumers.remove(consumer).is_some();
        if consumers.is_empty() {
            state.listeners.remove(id);
        }
        removed
    }
}

#[derive(Debug, Default)]
struct SurfaceState {
    output: String,
    attached: bool,
    visible: bool,
    disposed: bool,
    attach_attempts: u32,
    attach_failures: u32,
    size: TermSize,
}

/// Test-side handle onto one [`FakeSurface`].
#[derive(Debug, Clone, Default)]
pub struct SurfaceView(Arc<Mutex<SurfaceState>>);

impl SurfaceView {
    pub fn output(&self) -> String {
        mutex_lock_or_recover(&self.0).output.clone()
    }

    pub fn is_attached(&self) -> bool {
        mutex_lock_or_recover(&self.0).attached
    }

    pub fn is_visible(&self) -> bool {
        mutex_lock_or_recover(&self.0).visible
    }

    pub fn is_disposed(&self) -> bool {
        mutex_lock_or_recover(&self.0).disposed
    }

    pub fn attach_attempts(&self) -> u32 {
        mutex_lock_or_recover(&self.0).attach_attempts
    }

    pub fn set_size(&self, cols: u16, rows: u16) {
        mutex_lock_or_recover(&self.0).size = TermSize::new(cols, rows);
    }

    pub fn fail_next_attaches(&self, count: u32) {
        mutex_lock_or_recover(&self.0).attach_failures = count;
    }
}

/// Attaches only while visible, after a configurable number of failed
/// layout passes, and measures to a fixed size.
pub struct FakeSurface {
    view: SurfaceView,
}

impl RenderSurface for FakeSurface {
    fn try_attach(&mut self) -> Result<(), SurfaceError> {
        let mut state = mutex_lock_or_recover(&self.view.0);
        state.attach_attempts += 1;
        if state.disposed {
            return Err(SurfaceError::Disposed);
        }
        if !state.visible || state.attach_failures > 0 {
            state.attach_failures = state.attach_failures.saturating_sub(1);
            return Err(SurfaceError::NotLaidOut);
        }
        state.attached = true;
        Ok(())
    }

    fn is_attached(&self) -> bool {
        self.view.is_attached()
    }

    fn write(&mut self, text: &str) {
        mutex_lock_or_recover(&self.view.0).output.push_str(text);
    }

    fn fit(&mut self, _geometry: PanelGeometry) -> Option<TermSize> {
        let state = mutex_lock_or_recover(&self.view.0);
        (state.attached && state.visible && !state.disposed).then_some(state.size)
    }

    fn set_visible(&mut self, visible: bool) {
        mutex_lock_or_recover(&self.view.0).visible = visible;
    }

    fn dispose(&mut self) {
        let mut state = mutex_lock_or_recover(&self.view.0);
        state.disposed = true;
        state.attached = false;
        state.visible = false;
    }
}

#[derive(Clone, Default)]
pub struct FakeSurfaceFactory {
    views: Arc<Mutex<Vec<(String, SurfaceView)>>>,
    attach_failures: u32,
    size: TermSize,
}

impl FakeSurfaceFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_attach_failures(mut self, count: u32) -> Self {
        self.attach_failures = count;
        self
    }

    pub fn with_size(mut self, cols: u16, rows: u16) -> Self {
        self.size = TermSize::new(cols, rows);
        self
    }

    pub fn view(&self, session_id: &str) -> Option<SurfaceView> {
        mutex_lock_or_recover(&self.views)
            .iter()
            .find(|(id, _)| id == session_id)
            .map(|(_, view)| view.clone())
    }

    pub fn created(&self) -> usize {
        mutex_lock_or_recover(&self.views).len()
    }
}

impl SurfaceFactory for FakeSurfaceFactory {
    fn create(&mut self, session_id: &str, _display_name: &str) -> Box<dyn RenderSurface> {
        let view = SurfaceView::default();
        {
            let mut state = mutex_lock_or_recover(&view.0);
            state.attach_failures = self.attach_failures;
            state.size = self.size;
        }
        mutex_lock_or_recover(&self.views).push((session_id.to_string(), view.clone()));
        Box::new(FakeSurface { view })
    }
}
