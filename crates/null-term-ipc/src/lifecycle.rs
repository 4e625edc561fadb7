//! Blocking helpers for locating or launching the host before the panel's
//! async runtime starts.

use std::fs::OpenOptions;
use std::os::unix::net::UnixStream;
use std::path::Path;
use std::process::Command;
use std::process::Stdio;
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::ClientError;
use crate::socket::SOCKET_ENV_VAR;

const STARTUP_POLL_INTERVAL: Duration = Duration::from_millis(100);
const STARTUP_POLL_ATTEMPTS: u32 = 50;

pub fn is_host_running(path: &Path) -> bool {
    path.exists() && UnixStream::connect(path).is_ok()
}

/// Re-executes the current binary as `host` in the background and waits for
/// its socket to accept connections.
pub fn start_host_background(path: &Path) -> Result<(), ClientError> {
    let exe = std::env::current_exe()?;
    let log_path = path.with_extension("log");

    let stderr = match OpenOptions::new().create(true).append(true).open(&log_path) {
        Ok(f) => Stdio::from(f),
        Err(e) => {
            debug!(path = %log_path.display(), error = %e, "Host log unavailable");
            Stdio::null()
        }
    };

    Command::new(exe)
        .arg("host")
        .env(SOCKET_ENV_VAR, path)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(stderr)
        .spawn()?;

    for _ in 0..STARTUP_POLL_ATTEMPTS {
        std::thread::sleep(STARTUP_POLL_INTERVAL);
        if is_host_running(path) {
            return Ok(());
        }
    }

    if let Ok(log_content) = std::fs::read_to_string(&log_path) {
        let last_lines: Vec<&str> = log_content.lines().rev().take(5).collect();
        if !last_lines.is_empty() {
            warn!(
                recent_log = %last_lines.into_iter().rev().collect::<Vec<_>>().join("\n"),
                "Host failed to start"
            );
        }
    }

    Err(ClientError::HostNotRunning)
}

pub fn ensure_host(path: &Path) -> Result<(), ClientError> {
    if !is_host_running(path) {
        start_host_background(path)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::net::UnixListener;

    #[test]
    fn test_is_host_running_false_without_socket() {
        let dir = tempfile::tempdir().unwrap();
        assert!(!is_host_running(&dir.path().join("none.sock")));
    }

    #[test]
    fn test_is_host_running_true_with_listener() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("host.sock");
        let _listener = UnixListener::bind(&path).unwrap();
        assert!(is_host_running(&path));
    }

    #[test]
    fn test_stale_socket_file_is_not_running() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stale.sock");
        drop(UnixListener::bind(&path).unwrap());
        assert!(path.exists());
        assert!(!is_host_running(&path));
    }
}
