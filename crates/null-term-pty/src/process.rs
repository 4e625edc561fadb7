use std::io::Read;
use std::path::PathBuf;
use std::str::FromStr;

use tracing::{debug, warn};

use crate::pipes::PipeProcess;
use crate::pty::PtyProcess;
use crate::PtyError;

/// Control half of a running shell. The output half is handed out separately
/// as a blocking reader so it can live on its own thread.
pub trait ShellProcess: Send {
    fn pid(&self) -> Option<u32>;

    /// True when backed by a pseudo-terminal; false in pipe fallback mode.
    fn is_pty(&self) -> bool;

    fn write(&mut self, data: &[u8]) -> Result<(), PtyError>;

    /// Returns whether the new size reached the process. Pipe-backed shells
    /// accept the call but cannot apply it.
    fn resize(&mut self, cols: u16, rows: u16) -> Result<bool, PtyError>;

    fn kill(&mut self) -> Result<(), PtyError>;

    /// `Some(exit_code)` once the process has ended. Also reaps it.
    fn try_wait(&mut self) -> Result<Option<i32>, PtyError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SpawnMode {
    /// Pseudo-terminal, falling back to pipes when no PTY can be opened.
    #[default]
    Auto,
    Pty,
    Pipes,
}

impl SpawnMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SpawnMode::Auto => "auto",
            SpawnMode::Pty => "pty",
            SpawnMode::Pipes => "pipes",
        }
    }
}

impl FromStr for SpawnMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(SpawnMode::Auto),
            "pty" => Ok(SpawnMode::Pty),
            "pipes" | "pipe" => Ok(SpawnMode::Pipes),
            other => Err(format!("unknown spawn mode '{}'", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SpawnRequest {
    pub shell: String,
    pub cwd: Option<PathBuf>,
    pub env: Vec<(String, String)>,
    pub cols: u16,
    pub rows: u16,
}

impl SpawnRequest {
    pub fn new(shell: impl Into<String>, cols: u16, rows: u16) -> Self {
        Self {
            shell: shell.into(),
            cwd: None,
            env: Vec::new(),
            cols,
            rows,
        }
    }

    pub fn with_cwd(mut self, cwd: Option<PathBuf>) -> Self {
        self.cwd = cwd;
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }
}

pub struct SpawnedShell {
    pub process: Box<dyn ShellProcess>,
    pub output: Box<dyn Read + Send>,
}

impl std::fmt::Debug for SpawnedShell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpawnedShell")
            .field("pid", &self.process.pid())
            .field("pty", &self.process.is_pty())
            .finish()
    }
}

/// Starts `request.shell` using `mode`.
///
/// A shell that cannot be found or executed fails the same way in every
/// mode, so only PTY allocation failures trigger the pipe fallback.
pub fn spawn_shell(request: &SpawnRequest, mode: SpawnMode) -> Result<SpawnedShell, PtyError> {
    #[cfg(unix)]
    crate::shell::locate_executable(&request.shell)?;

    if let Some(cwd) = &request.cwd {
        if !cwd.is_dir() {
            return Err(PtyError::spawn(
                &request.shell,
                format!("working directory {} No such file or directory", cwd.display()),
            ));
        }
    }

    match mode {
        SpawnMode::Pty => PtyProcess::spawn(request),
        SpawnMode::Pipes => PipeProcess::spawn(request),
        SpawnMode::Auto => match PtyProcess::spawn(request) {
            Err(PtyError::Open(reason)) => {
                warn!(
                    shell = %request.shell,
                    reason = %reason,
                    "PTY unavailable, falling back to pipes"
                );
                PipeProcess::spawn(request)
            }
            other => other,
        },
    }
    .inspect(|spawned| {
        debug!(
            shell = %request.shell,
            pid = ?spawned.process.pid(),
            pty = spawned.process.is_pty(),
            "Shell spawned"
        );
    })
}

/// Whether `pid` still names a process (zombies included).
#[cfg(unix)]
pub fn process_alive(pid: u32) -> bool {
    let Ok(pid) = libc::pid_t::try_from(pid) else {
        return false;
    };
    // Signal 0 only performs the existence and permission checks.
    let result = unsafe { libc::kill(pid, 0) };
    if result == 0 {
        return true;
    }
    std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}

#[cfg(not(unix))]
pub fn process_alive(_pid: u32) -> bool {
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spawn_mode_parse() {
        assert_eq!("auto".parse::<SpawnMode>(), Ok(SpawnMode::Auto));
        assert_eq!("PTY".parse::<SpawnMode>(), Ok(SpawnMode::Pty));
        assert_eq!(" pipes ".parse::<SpawnMode>(), Ok(SpawnMode::Pipes));
        assert!("tty".parse::<SpawnMode>().is_err());
    }

    #[test]
    fn test_spawn_mode_default_is_auto() {
        assert_eq!(SpawnMode::default(), SpawnMode::Auto);
        assert_eq!(SpawnMode::default().as_str(), "auto");
    }

    #[test]
    fn test_spawn_missing_shell_fails_in_every_mode() {
        let request = SpawnRequest::new("/no/such/shell", 80, 24);
        for mode in [SpawnMode::Auto, SpawnMode::Pty, SpawnMode::Pipes] {
            let err = spawn_shell(&request, mode).unwrap_err();
            assert_eq!(err.operation(), "spawn");
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_spawn_rejects_missing_cwd() {
        let request =
            SpawnRequest::new("/bin/sh", 80, 24).with_cwd(Some(PathBuf::from("/no/such/dir")));
        let err = spawn_shell(&request, SpawnMode::Pipes).unwrap_err();
        assert!(err.reason().contains("No such file"));
    }

    #[cfg(unix)]
    #[test]
    fn test_process_alive_for_self_and_bogus_pid() {
        assert!(process_alive(std::process::id()));
        assert!(!process_alive(u32::MAX));
    }
}
