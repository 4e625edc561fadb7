//! Asynchronous client side of the channel.
//!
//! One connection carries every session. Replies are matched to calls by
//! request id; pushed events fan out to every consumer listening on the
//! session. When the
//! connection drops, every pending call and every listener is told so
//! instead of being left waiting.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::sync::Mutex;

use null_term_common::mutex_lock_or_recover;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::io::AsyncBufReadExt;
use tokio::io::AsyncWriteExt;
use tokio::io::BufReader;
use tokio::net::unix::OwnedReadHalf;
use tokio::net::unix::OwnedWriteHalf;
use tokio::net::UnixStream;
use tokio::sync::mpsc;
use tokio::sync::oneshot;
use tracing::{debug, trace, warn};

use crate::error::ClientError;
use crate::methods;
use crate::types::{
    ActionResult, KillParams, ListResult, ResizeParams, ResizeResult, RpcNotification,
    RpcRequest, RpcResponse, SpawnParams, SpawnResult, TerminalEvent, WriteParams,
};

/// What a session listener receives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    Data { data: String },
    Exit { exit_code: i32 },
    TransportLost,
}

type Reply = Result<Value, ClientError>;

#[derive(Default)]
struct State {
    pending: HashMap<u64, oneshot::Sender<Reply>>,
    /// session id -> consumer key -> sender
    listeners: HashMap<String, HashMap<String, mpsc::UnboundedSender<ChannelEvent>>>,
    lost: bool,
}

impl State {
    fn listener_count(&self) -> usize {
        self.listeners.values().map(HashMap::len).sum()
    }
}

#[derive(Default)]
struct Shared {
    state: Mutex<State>,
}

impl Shared {
    fn dispatch(&self, line: &str) {
        let value: Value = match serde_json::from_str(line) {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "Dropping malformed line from host");
                return;
            }
        };

        if value.get("id").is_some_and(|id| !id.is_null()) {
            self.complete(value);
        } else if value.get("method").is_some() {
            match serde_json::from_value::<RpcNotification>(value) {
                Ok(note) => self.route(&note),
                Err(e) => warn!(error = %e, "Dropping malformed notification"),
            }
        } else {
            warn!("Dropping message with neither id nor method");
        }
    }

    fn complete(&self, value: Value) {
        let response: RpcResponse = match serde_json::from_value(value) {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "Dropping malformed response");
                return;
            }
        };
        let Some(waiter) = mutex_lock_or_recover(&self.state)
            .pending
            .remove(&response.id)
        else {
            debug!(id = response.id, "Response for unknown request");
            return;
        };
        let reply = match (response.result, response.error) {
            (_, Some(error)) => Err(ClientError::RpcError {
                code: error.code,
                message: error.message,
            }),
            (Some(result), None) => Ok(result),
            (None, None) => Err(ClientError::InvalidResponse),
        };
        let _ = waiter.send(reply);
    }

    fn route(&self, note: &RpcNotification) {
        let Some(event) = TerminalEvent::from_notification(note) else {
            debug!(method = %note.method, "Ignoring unknown notification");
            return;
        };
        let (id, routed) = match event {
            TerminalEvent::Data { id, data } => (id, ChannelEvent::Data { data }),
            TerminalEvent::Exit { id, exit_code } => (id, ChannelEvent::Exit { exit_code }),
        };

        let mut state = mutex_lock_or_recover(&self.state);
        let Some(consumers) = state.listeners.get_mut(&id) else {
            trace!(session_id = %id, "No listener for event");
            return;
        };
        consumers.retain(|consumer, listener| {
            let open = listener.send(routed.clone()).is_ok();
            if !open {
                debug!(session_id = %id, consumer = %consumer, "Dropping closed listener");
            }
            open
        });
        if consumers.is_empty() {
            state.listeners.remove(&id);
        }
    }

    fn mark_lost(&self) {
        let mut state = mutex_lock_or_recover(&self.state);
        if state.lost {
            return;
        }
        state.lost = true;
        let pending = std::mem::take(&mut state.pending);
        let waiting = pending.len();
        for (_, waiter) in pending {
            let _ = waiter.send(Err(ClientError::TransportLost));
        }
        for listener in state.listeners.values().flat_map(HashMap::values) {
            let _ = listener.send(ChannelEvent::TransportLost);
        }
        warn!(
            pending_calls = waiting,
            listeners = state.listener_count(),
            "Transport to host lost"
        );
    }
}

#[derive(Clone)]
pub struct ChannelClient {
    shared: Arc<Shared>,
    outbound: mpsc::UnboundedSender<String>,
    next_id: Arc<AtomicU64>,
}

impl ChannelClient {
    pub async fn connect(path: &Path) -> Result<Self, ClientError> {
        if !path.exists() {
            return Err(ClientError::HostNotRunning);
        }
        let stream = UnixStream::connect(path).await?;
        Ok(Self::from_stream(stream))
    }

    /// Wraps an already connected stream. Must run inside a tokio runtime.
    pub fn from_stream(stream: UnixStream) -> Self {
        let (read_half, write_half) = stream.into_split();
        let shared = Arc::new(Shared::default());
        let (outbound, queue) = mpsc::unbounded_channel();

        tokio::spawn(write_loop(write_half, queue, Arc::clone(&shared)));
        tokio::spawn(read_loop(read_half, Arc::clone(&shared)));

        Self {
            shared,
            outbound,
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    pub fn is_lost(&self) -> bool {
        mutex_lock_or_recover(&self.shared.state).lost
    }

    pub async fn call(&self, method: &str, params: Option<Value>) -> Result<Value, ClientError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let line = serde_json::to_string(&RpcRequest::new(id, method, params))?;
        let (tx, rx) = oneshot::channel();

        {
            let mut state = mutex_lock_or_recover(&self.shared.state);
            if state.lost {
                return Err(ClientError::TransportLost);
            }
            state.pending.insert(id, tx);
        }

        if self.outbound.send(line).is_err() {
            mutex_lock_or_recover(&self.shared.state).pending.remove(&id);
            return Err(ClientError::TransportLost);
        }

        rx.await.unwrap_or(Err(ClientError::TransportLost))
    }

    async fn call_typed<P, R>(&self, method: &str, params: &P) -> Result<R, ClientError>
    where
        P: Serialize,
        R: DeserializeOwned,
    {
        let params = serde_json::to_value(params)?;
        let result = self.call(method, Some(params)).await?;
        serde_json::from_value(result).map_err(|_| ClientError::InvalidResponse)
    }

    pub async fn spawn(&self, params: &SpawnParams) -> Result<SpawnResult, ClientError> {
        self.call_typed(methods::SPAWN, params).await
    }

    pub async fn write(&self, id: &str, data: &str) -> Result<ActionResult, ClientError> {
        let params = WriteParams {
            id: id.to_string(),
            data: data.to_string(),
        };
        self.call_typed(methods::WRITE, &params).await
    }

    pub async fn resize(&self, id: &str, cols: u16, rows: u16) -> Result<ResizeResult, ClientError> {
        let params = ResizeParams {
            id: id.to_string(),
            cols,
            rows,
        };
        self.call_typed(methods::RESIZE, &params).await
    }

    pub async fn kill(&self, id: &str) -> Result<ActionResult, ClientError> {
        let params = KillParams { id: id.to_string() };
        self.call_typed(methods::KILL, &params).await
    }

    pub async fn list(&self) -> Result<ListResult, ClientError> {
        let result = self.call(methods::LIST, None).await?;
        serde_json::from_value(result).map_err(|_| ClientError::InvalidResponse)
    }

    pub async fn ping(&self) -> Result<(), ClientError> {
        self.call(methods::PING, None).await.map(|_| ())
    }

    /// Registers `consumer`'s listener for `session_id`. Every consumer on a
    /// session receives every event. Registering the same consumer again
    /// replaces its earlier receiver, so it still gets each event once.
    pub fn subscribe(
        &self,
        session_id: &str,
        consumer: &str,
    ) -> mpsc::UnboundedReceiver<ChannelEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut state = mutex_lock_or_recover(&self.shared.state);
        if state.lost {
            let _ = tx.send(ChannelEvent::TransportLost);
        }
        state
            .listeners
            .entry(session_id.to_string())
            .or_default()
            .insert(consumer.to_string(), tx);
        rx
    }

    /// Removes `consumer`'s listener for `session_id`. Other consumers on the
    /// same session keep theirs.
    pub fn unsubscribe(&self, session_id: &str, consumer: &str) -> bool {
        let mut state = mutex_lock_or_recover(&self.shared.state);
        let Some(consumers) = state.listeners.get_mut(session_id) else {
            return false;
        };
        let removed = consumers.remove(consumer).is_some();
        if consumers.is_empty() {
            state.listeners.remove(session_id);
        }
        removed
    }

    pub fn listener_count(&self) -> usize {
        mutex_lock_or_recover(&self.shared.state).listener_count()
    }
}

async fn write_loop(
    mut writer: OwnedWriteHalf,
    mut queue: mpsc::UnboundedReceiver<String>,
    shared: Arc<Shared>,
) {
    while let Some(mut line) = queue.recv().await {
        line.push('\n');
        if let Err(e) = writer.write_all(line.as_bytes()).await {
            warn!(error = %e, "Write to host failed");
            shared.mark_lost();
            return;
        }
    }
    let _ = writer.shutdown().await;
}

async fn read_loop(reader: OwnedReadHalf, shared: Arc<Shared>) {
    let mut lines = BufReader::new(reader).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) if line.trim().is_empty() => continue,
            Ok(Some(line)) => shared.dispatch(&line),
            Ok(None) => break,
            Err(e) => {
                warn!(error = %e, "Read from host failed");
                break;
            }
        }
    }
    shared.mark_lost();
}
