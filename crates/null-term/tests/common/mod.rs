#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use assert_cmd::Command;
use null_term_host::{HostConfig, HostHandle};
use null_term_ipc::ChannelClient;
use null_term_pty::{process_alive, SpawnMode};
use null_term_ui::testing::FakeSurfaceFactory;
use null_term_ui::{MockSleeper, SessionManager, SpawnOptions};
use tempfile::TempDir;

pub const WAIT_TIMEOUT: Duration = Duration::from_secs(10);
const POLL_INTERVAL: Duration = Duration::from_millis(20);

pub fn null_term_cmd() -> Command {
    Command::new(assert_cmd::cargo::cargo_bin!("null-term"))
}

/// A host bound to a socket in a private temp dir, torn down on drop.
pub struct TestHost {
    pub handle: HostHandle,
    _dir: TempDir,
}

impl TestHost {
    pub fn start() -> Self {
        Self::start_with(HostConfig::default())
    }

    pub fn start_with(config: HostConfig) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let socket = dir.path().join("host.sock");
        let config = config
            .with_shell(Some("/bin/sh".to_string()))
            .with_spawn_mode(SpawnMode::Auto);
        let handle = HostHandle::bind(config, &socket).unwrap();
        Self { handle, _dir: dir }
    }

    pub fn socket(&self) -> &Path {
        self.handle.socket_path()
    }

    pub fn has_session(&self, id: &str) -> bool {
        self.handle.server().registry().contains(id)
    }

    pub async fn client(&self) -> ChannelClient {
        ChannelClient::connect(self.socket()).await.unwrap()
    }

    /// A session manager wired to this host with in-memory surfaces.
    pub async fn manager(&self) -> (SessionManager, FakeSurfaceFactory) {
        let surfaces = FakeSurfaceFactory::new();
        let manager = SessionManager::new(Arc::new(self.client().await), Box::new(surfaces.clone()))
            .with_sleeper(Arc::new(MockSleeper::new()))
            .with_spawn_options(SpawnOptions::default());
        (manager, surfaces)
    }
}

/// Pumps host events into the manager until `done` holds or the timeout
/// passes. Returns whether `done` held.
pub async fn pump_until<F>(manager: &mut SessionManager, timeout: Duration, mut done: F) -> bool
where
    F: FnMut(&SessionManager) -> bool,
{
    let deadline = Instant::now() + timeout;
    loop {
        manager.pump_events();
        if done(manager) {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

pub async fn wait_for<F>(timeout: Duration, mut done: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if done() {
            return true;
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
    done()
}

pub async fn with_timeout<F, T>(duration: Duration, future: F) -> T
where
    F: std::future::Future<Output = T>,
{
    tokio::time::timeout(duration, future)
        .await
        .expect("operation timed out")
}

/// Pid printed by a shell as `<tag>=<pid>`, skipping the echoed command
/// line where `$!` has not been expanded yet.
pub fn printed_pid(output: &str, tag: &str) -> Option<u32> {
    let marker = format!("{}=", tag);
    output.match_indices(&marker).find_map(|(at, _)| {
        let digits: String = output[at + marker.len()..]
            .chars()
            .take_while(char::is_ascii_digit)
            .collect();
        digits.parse().ok()
    })
}

/// Alive and not a zombie waiting on a parent that will never reap it.
pub fn process_running(pid: u32) -> bool {
    if !process_alive(pid) {
        return false;
    }
    match std::fs::read_to_string(format!("/proc/{}/stat", pid)) {
        // The state letter follows the parenthesised command name.
        Ok(stat) => stat
            .rsplit_once(')')
            .and_then(|(_, rest)| rest.trim_start().chars().next())
            .is_some_and(|state| state != 'Z'),
        Err(_) => true,
    }
}
