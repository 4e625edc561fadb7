use std::fs::OpenOptions;
use std::io::BufWriter;
use std::io::Write;
use std::os::unix::io::AsRawFd;
use std::os::unix::net::UnixStream;
use std::path::Path;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TrySendError};
use null_term_ipc::error_codes;
use null_term_ipc::methods;
use null_term_ipc::{
    ActionResult, KillParams, ListResult, ResizeParams, ResizeResult, RpcRequest, RpcResponse,
    SpawnParams, SpawnResult, WriteParams,
};
use serde_json::json;
use tracing::{debug, error, info, warn};

use crate::adapter::ProcessAdapter;
use crate::config::HostConfig;
use crate::error::HostError;
use crate::events::EventHub;
use crate::registry::ConnectionId;
use crate::registry::SessionRegistry;
use crate::signal_handler::SignalHandler;
use crate::transport::{split_connection, TransportError, UnixSocketListener};

const CHANNEL_CAPACITY: usize = 16;
const READ_POLL_INTERVAL: Duration = Duration::from_millis(200);
const WRITE_TIMEOUT: Duration = Duration::from_secs(10);
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

pub struct HostServer {
    adapter: ProcessAdapter,
    hub: Arc<EventHub>,
    config: HostConfig,
    next_connection: AtomicU64,
    active_connections: AtomicUsize,
}

impl HostServer {
    pub fn new(config: HostConfig) -> Self {
        let registry = Arc::new(SessionRegistry::new(config.max_sessions));
        let hub = Arc::new(EventHub::new());
        let adapter = ProcessAdapter::new(registry, hub.clone(), config.clone());
        Self {
            adapter,
            hub,
            config,
            next_connection: AtomicU64::new(1),
            active_connections: AtomicUsize::new(0),
        }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        self.adapter.registry()
    }

    pub fn active_connections(&self) -> usize {
        self.active_connections.load(Ordering::Relaxed)
    }

    pub fn shutdown_all_sessions(&self) -> usize {
        self.adapter.kill_all()
    }

    /// Answers one request. Session failures come back as successful
    /// responses carrying `success: false`; only malformed requests and
    /// unknown methods produce JSON-RPC errors.
    pub fn handle_request(&self, request: RpcRequest, conn: Option<ConnectionId>) -> RpcResponse {
        match request.method.as_str() {
            methods::PING => RpcResponse::success(request.id, json!({ "pong": true })),
            methods::SPAWN => self.handle_spawn(&request, conn),
            methods::WRITE => self.handle_write(&request),
            methods::RESIZE => self.handle_resize(&request),
            methods::KILL => self.handle_kill(&request),
            methods::LIST => RpcResponse::typed(
                request.id,
                &ListResult {
                    sessions: self.adapter.list(),
                },
            ),
            _ => RpcResponse::error(
                request.id,
                error_codes::METHOD_NOT_FOUND,
                &format!("Method not found: {}", request.method),
            ),
        }
    }

    fn handle_spawn(&self, request: &RpcRequest, conn: Option<ConnectionId>) -> RpcResponse {
        let params: SpawnParams = match request.parse_params() {
            Ok(p) => p,
            Err(response) => return response,
        };
        let result = match self.adapter.spawn(&params, conn) {
            Ok(outcome) => SpawnResult::spawned(outcome.pid, outcome.pty),
            Err(e) => SpawnResult::failed(e.code(), e.to_string()),
        };
        RpcResponse::typed(request.id, &result)
    }

    fn handle_write(&self, request: &RpcRequest) -> RpcResponse {
        let params: WriteParams = match request.parse_params() {
            Ok(p) => p,
            Err(response) => return response,
        };
        let result = match self.adapter.write(&params.id, &params.data) {
            Ok(()) => ActionResult::ok(),
            Err(e) => ActionResult::failed(e.code(), e.to_string()),
        };
        RpcResponse::typed(request.id, &result)
    }

    fn handle_resize(&self, request: &RpcRequest) -> RpcResponse {
        let params: ResizeParams = match request.parse_params() {
            Ok(p) => p,
            Err(response) => return response,
        };
        let result = match self.adapter.resize(&params.id, params.cols, params.rows) {
            Ok(applied) => ResizeResult::resized(applied),
            Err(e) => ResizeResult::failed(e.code(), e.to_string()),
        };
        RpcResponse::typed(request.id, &result)
    }

    fn handle_kill(&self, request: &RpcRequest) -> RpcResponse {
        let params: KillParams = match request.parse_params() {
            Ok(p) => p,
            Err(response) => return response,
        };
        let result = match self.adapter.kill(&params.id) {
            Ok(()) => ActionResult::ok(),
            Err(e) => ActionResult::failed(e.code(), e.to_string()),
        };
        RpcResponse::typed(request.id, &result)
    }

    fn handle_client(&self, stream: UnixStream, shutdown: &AtomicBool) {
        let conn_id = self.next_connection.fetch_add(1, Ordering::SeqCst);
        let (mut reader, writer) =
            match split_connection(stream, self.config.max_request_bytes, READ_POLL_INTERVAL) {
                Ok(parts) => parts,
                Err(e) => {
                    warn!(connection = conn_id, error = %e, "Failed to set up connection");
                    return;
                }
            };
        if let Err(e) = writer.set_write_timeout(Some(WRITE_TIMEOUT)) {
            warn!(connection = conn_id, error = %e, "Failed to set write timeout");
            return;
        }

        let (outbound, queue) = crossbeam_channel::unbounded::<String>();
        let writer_thread = thread::Builder::new()
            .name(format!("conn-{}-writer", conn_id))
            .spawn(move || write_lines(writer, queue));
        if let Err(e) = &writer_thread {
            warn!(connection = conn_id, error = %e, "Failed to spawn writer thread");
            return;
        }

        self.hub.attach(conn_id, outbound.clone());
        debug!(connection = conn_id, "Client connected");

        while !shutdown.load(Ordering::Relaxed) {
            let request = match reader.read_request() {
                Ok(req) => req,
                Err(TransportError::Timeout) => continue,
                Err(TransportError::ConnectionClosed) => break,
                Err(TransportError::SizeLimit { max_bytes }) => {
                    let response = RpcResponse::error(
                        0,
                        error_codes::PARSE_ERROR,
                        &format!("Parse error: request size limit exceeded ({} bytes max)", max_bytes),
                    );
                    send_response(&outbound, &response);
                    break;
                }
                Err(TransportError::Parse(msg)) => {
                    let response = RpcResponse::error(
                        0,
                        error_codes::PARSE_ERROR,
                        &format!("Parse error: {}", msg),
                    );
                    send_response(&outbound, &response);
                    continue;
                }
                Err(TransportError::Io(e)) => {
                    warn!(connection = conn_id, error = %e, "Client connection error");
                    break;
                }
            };

            let response = self.handle_request(request, Some(conn_id));
            if !send_response(&outbound, &response) {
                break;
            }
        }

        self.hub.detach(conn_id);
        if self.config.kill_on_disconnect {
            let killed = self.adapter.kill_owned_by(conn_id);
            if killed > 0 {
                info!(connection = conn_id, killed, "Killed terminals of closed connection");
            }
        }
        drop(outbound);
        if let Ok(handle) = writer_thread {
            let _ = handle.join();
        }
        debug!(connection = conn_id, "Client disconnected");
    }
}

fn send_response(outbound: &Sender<String>, response: &RpcResponse) -> bool {
    match serde_json::to_string(response) {
        Ok(line) => outbound.send(line).is_ok(),
        Err(e) => {
            error!(error = %e, "Failed to serialize response");
            true
        }
    }
}

fn write_lines(writer: UnixStream, queue: Receiver<String>) {
    let mut writer = BufWriter::new(writer);
    for line in queue.iter() {
        if writeln!(writer, "{}", line).is_err() {
            return;
        }
        if queue.is_empty() && writer.flush().is_err() {
            return;
        }
    }
    let _ = writer.flush();
}

struct ThreadPool {
    workers: Vec<thread::JoinHandle<()>>,
    sender: Sender<UnixStream>,
}

impl ThreadPool {
    fn new(size: usize, server: Arc<HostServer>, shutdown: Arc<AtomicBool>) -> std::io::Result<Self> {
        let (sender, receiver) = crossbeam_channel::bounded::<UnixStream>(CHANNEL_CAPACITY);
        let mut workers = Vec::with_capacity(size);

        for id in 0..size.max(1) {
            let receiver = receiver.clone();
            let server = Arc::clone(&server);
            let shutdown = Arc::clone(&shutdown);

            let spawned = thread::Builder::new()
                .name(format!("worker-{}", id))
                .spawn(move || loop {
                    if shutdown.load(Ordering::Relaxed) {
                        break;
                    }
                    let stream = match receiver.recv_timeout(Duration::from_millis(100)) {
                        Ok(stream) => stream,
                        Err(RecvTimeoutError::Timeout) => continue,
                        Err(RecvTimeoutError::Disconnected) => break,
                    };
                    server.active_connections.fetch_add(1, Ordering::Relaxed);
                    server.handle_client(stream, &shutdown);
                    server.active_connections.fetch_sub(1, Ordering::Relaxed);
                });

            match spawned {
                Ok(handle) => workers.push(handle),
                Err(e) => warn!(worker = id, error = %e, "Failed to spawn worker"),
            }
        }

        if workers.is_empty() {
            return Err(std::io::Error::other("Failed to spawn any worker threads"));
        }

        Ok(ThreadPool { workers, sender })
    }

    fn execute(&self, stream: UnixStream) -> Result<(), UnixStream> {
        self.sender.try_send(stream).map_err(|e| match e {
            TrySendError::Full(s) | TrySendError::Disconnected(s) => s,
        })
    }

    fn shutdown(self) {
        drop(self.sender);
        for worker in self.workers {
            let _ = worker.join();
        }
    }
}

/// A bound, running host. Dropping it shuts the host down and kills every
/// session it still owns.
pub struct HostHandle {
    server: Arc<HostServer>,
    shutdown: Arc<AtomicBool>,
    accept_thread: Option<thread::JoinHandle<()>>,
    socket_path: PathBuf,
}

impl HostHandle {
    pub fn bind(config: HostConfig, socket_path: &Path) -> Result<Self, HostError> {
        if socket_path.exists() {
            std::fs::remove_file(socket_path)
                .map_err(|e| HostError::SocketBind(format!("failed to remove stale socket: {}", e)))?;
        }
        let listener = UnixSocketListener::bind(socket_path)
            .map_err(|e| HostError::SocketBind(format!("failed to bind socket: {}", e)))?;
        listener
            .set_nonblocking(true)
            .map_err(|e| HostError::SocketBind(format!("failed to set non-blocking: {}", e)))?;

        let shutdown = Arc::new(AtomicBool::new(false));
        let server = Arc::new(HostServer::new(config.clone()));
        let pool = ThreadPool::new(config.max_connections, Arc::clone(&server), Arc::clone(&shutdown))
            .map_err(|e| HostError::ThreadPool(e.to_string()))?;

        let accept_thread = {
            let server = Arc::clone(&server);
            let shutdown = Arc::clone(&shutdown);
            thread::Builder::new()
                .name("accept".to_string())
                .spawn(move || accept_loop(listener, pool, server, shutdown))
                .map_err(|e| HostError::ThreadPool(e.to_string()))?
        };

        info!(socket = %socket_path.display(), "Host listening");
        Ok(Self {
            server,
            shutdown,
            accept_thread: Some(accept_thread),
            socket_path: socket_path.to_path_buf(),
        })
    }

    pub fn server(&self) -> &Arc<HostServer> {
        &self.server
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    pub fn stop(mut self) {
        self.stop_inner();
    }

    fn stop_inner(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(handle) = self.accept_thread.take() {
            let _ = handle.join();
            if self.socket_path.exists() {
                let _ = std::fs::remove_file(&self.socket_path);
            }
        }
    }
}

impl Drop for HostHandle {
    fn drop(&mut self) {
        self.stop_inner();
    }
}

fn accept_loop(
    listener: UnixSocketListener,
    pool: ThreadPool,
    server: Arc<HostServer>,
    shutdown: Arc<AtomicBool>,
) {
    while !shutdown.load(Ordering::Relaxed) {
        match listener.accept() {
            Ok(stream) => {
                if let Err(stream) = pool.execute(stream) {
                    warn!("Connection limit reached, dropping connection");
                    drop(stream);
                }
            }
            Err(TransportError::Timeout) => {
                thread::sleep(Duration::from_millis(10));
            }
            Err(e) => {
                if !shutdown.load(Ordering::Relaxed) {
                    warn!(error = %e, "Error accepting connection");
                }
            }
        }
    }

    info!("Shutting down host");
    let killed = server.shutdown_all_sessions();
    info!(killed, "Cleaned up sessions");

    let deadline = Instant::now() + SHUTDOWN_GRACE;
    while server.active_connections() > 0 {
        if Instant::now() > deadline {
            warn!(
                active = server.active_connections(),
                "Shutdown timeout, forcing close"
            );
            break;
        }
        thread::sleep(Duration::from_millis(50));
    }

    pool.shutdown();
}

/// Runs the host in the foreground until SIGINT/SIGTERM, holding an
/// exclusive lock next to the socket so only one host serves it.
pub fn start_host(config: HostConfig, socket_path: &Path) -> Result<(), HostError> {
    let lock_path = socket_path.with_extension("lock");
    let mut lock_file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(false)
        .open(&lock_path)
        .map_err(|e| HostError::LockFailed(format!("failed to open lock file: {}", e)))?;

    let result = unsafe { libc::flock(lock_file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
    if result != 0 {
        return Err(HostError::AlreadyRunning);
    }
    lock_file
        .set_len(0)
        .map_err(|e| HostError::LockFailed(format!("failed to truncate lock file: {}", e)))?;
    writeln!(lock_file, "{}", std::process::id())
        .map_err(|e| HostError::LockFailed(format!("failed to write PID to lock file: {}", e)))?;

    let handle = HostHandle::bind(config, socket_path)?;
    let _signals = SignalHandler::setup(handle.shutdown_flag())?;
    info!(pid = std::process::id(), "null-term host started");

    while !handle.is_shutting_down() {
        thread::sleep(Duration::from_millis(100));
    }
    handle.stop();

    let _ = std::fs::remove_file(&lock_path);
    info!("Host shutdown complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn server() -> HostServer {
        HostServer::new(
            HostConfig::default()
                .with_spawn_mode(null_term_pty::SpawnMode::Pipes)
                .with_shell(Some("/bin/sh".to_string())),
        )
    }

    fn call(server: &HostServer, method: &str, params: Option<Value>) -> Value {
        let response = server.handle_request(RpcRequest::new(1, method, params), Some(1));
        serde_json::to_value(response).unwrap()
    }

    #[test]
    fn test_ping() {
        let value = call(&server(), methods::PING, None);
        assert_eq!(value["result"]["pong"], true);
    }

    #[test]
    fn test_unknown_method_is_rpc_error() {
        let value = call(&server(), "terminal.snapshot", None);
        assert_eq!(value["error"]["code"], error_codes::METHOD_NOT_FOUND);
    }

    #[test]
    fn test_missing_params_is_invalid_params() {
        let value = call(&server(), methods::WRITE, Some(json!({"id": "x"})));
        assert_eq!(value["error"]["code"], error_codes::INVALID_PARAMS);
    }

    #[test]
    fn test_unknown_session_is_failed_result_not_error() {
        let server = server();
        for (method, params) in [
            (methods::WRITE, json!({"id": "ghost", "data": "x"})),
            (methods::RESIZE, json!({"id": "ghost", "cols": 80, "rows": 24})),
            (methods::KILL, json!({"id": "ghost"})),
        ] {
            let value = call(&server, method, Some(params));
            assert!(value.get("error").is_none(), "{} returned an error", method);
            assert_eq!(value["result"]["success"], false);
            assert_eq!(value["result"]["code"], error_codes::SESSION_NOT_FOUND);
            assert!(value["result"]["error"]
                .as_str()
                .unwrap()
                .contains("Terminal not found"));
        }
    }

    #[test]
    fn test_spawn_failure_is_failed_result() {
        let value = call(
            &server(),
            methods::SPAWN,
            Some(json!({"id": "bad", "shell": "/no/such/shell"})),
        );
        assert_eq!(value["result"]["success"], false);
        assert_eq!(value["result"]["code"], error_codes::COMMAND_NOT_FOUND);
    }

    #[test]
    fn test_spawn_list_kill() {
        let server = server();
        let value = call(&server, methods::SPAWN, Some(json!({"id": "s1", "cols": 90, "rows": 20})));
        assert_eq!(value["result"]["success"], true);
        assert_eq!(value["result"]["pty"], false);

        let value = call(&server, methods::LIST, None);
        let sessions = value["result"]["sessions"].as_array().unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0]["id"], "s1");
        assert_eq!(sessions[0]["cols"], 90);

        let value = call(&server, methods::KILL, Some(json!({"id": "s1"})));
        assert_eq!(value["result"]["success"], true);
        assert!(server.registry().is_empty());
    }

    #[test]
    fn test_host_handle_serves_and_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("host.sock");
        let handle = HostHandle::bind(
            HostConfig::default().with_spawn_mode(null_term_pty::SpawnMode::Pipes),
            &path,
        )
        .unwrap();

        let mut stream = UnixStream::connect(&path).unwrap();
        writeln!(stream, r#"{{"jsonrpc":"2.0","id":9,"method":"ping"}}"#).unwrap();
        let mut reader = std::io::BufReader::new(stream.try_clone().unwrap());
        let mut line = String::new();
        std::io::BufRead::read_line(&mut reader, &mut line).unwrap();
        let value: Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["id"], 9);
        assert_eq!(value["result"]["pong"], true);

        drop(stream);
        handle.stop();
        assert!(!path.exists());
    }
}
