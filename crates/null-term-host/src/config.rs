use std::env;
use std::time::Duration;

use null_term_pty::SpawnMode;

pub const DEFAULT_MAX_SESSIONS: usize = 16;
const DEFAULT_MAX_CONNECTIONS: usize = 8;
const DEFAULT_MAX_REQUEST_BYTES: usize = 1_048_576; // 1MB
const DEFAULT_EXIT_GRACE_MS: u64 = 200;

#[derive(Debug, Clone)]
pub struct HostConfig {
    pub max_sessions: usize,
    pub max_connections: usize,
    pub max_request_bytes: usize,
    pub spawn_mode: SpawnMode,
    /// Overrides the platform default shell when a spawn names none.
    pub shell: Option<String>,
    /// Kill the sessions a connection spawned when it goes away.
    pub kill_on_disconnect: bool,
    /// How long output keeps draining after the process has exited.
    pub exit_grace: Duration,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

impl HostConfig {
    pub fn from_env() -> Self {
        Self {
            max_sessions: env_parse("NULL_TERM_MAX_SESSIONS").unwrap_or(DEFAULT_MAX_SESSIONS),
            max_connections: env_parse("NULL_TERM_MAX_CONNECTIONS")
                .unwrap_or(DEFAULT_MAX_CONNECTIONS),
            max_request_bytes: env_parse("NULL_TERM_MAX_REQUEST")
                .unwrap_or(DEFAULT_MAX_REQUEST_BYTES),
            spawn_mode: env_parse("NULL_TERM_SPAWN_MODE").unwrap_or_default(),
            shell: env::var("NULL_TERM_SHELL").ok().filter(|s| !s.trim().is_empty()),
            kill_on_disconnect: env::var("NULL_TERM_KILL_ON_DISCONNECT")
                .map(|v| !matches!(v.trim(), "0" | "false" | "no"))
                .unwrap_or(true),
            exit_grace: Duration::from_millis(
                env_parse("NULL_TERM_EXIT_GRACE_MS").unwrap_or(DEFAULT_EXIT_GRACE_MS),
            ),
        }
    }

    pub fn with_max_sessions(mut self, max: usize) -> Self {
        self.max_sessions = max;
        self
    }

    pub fn with_max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    pub fn with_max_request_bytes(mut self, max: usize) -> Self {
        self.max_request_bytes = max;
        self
    }

    pub fn with_spawn_mode(mut self, mode: SpawnMode) -> Self {
        self.spawn_mode = mode;
        self
    }

    pub fn with_shell(mut self, shell: Option<String>) -> Self {
        self.shell = shell;
        self
    }

    pub fn with_kill_on_disconnect(mut self, enabled: bool) -> Self {
        self.kill_on_disconnect = enabled;
        self
    }

    pub fn with_exit_grace(mut self, grace: Duration) -> Self {
        self.exit_grace = grace;
        self
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.trim().parse().ok())
}
