use std::path::Path;
use std::path::PathBuf;

use crate::PtyError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Windows,
    MacOs,
    Linux,
    OtherUnix,
}

impl Platform {
    pub fn current() -> Self {
        if cfg!(windows) {
            Platform::Windows
        } else if cfg!(target_os = "macos") {
            Platform::MacOs
        } else if cfg!(target_os = "linux") {
            Platform::Linux
        } else {
            Platform::OtherUnix
        }
    }

    fn fallback_shell(self) -> &'static str {
        match self {
            Platform::Windows => "cmd.exe",
            _ => "/bin/sh",
        }
    }
}

/// Preferred interactive shell for a platform. Pure, so callers and tests can
/// ask about any platform regardless of the one they run on.
pub fn default_shell_for(platform: Platform) -> &'static str {
    match platform {
        Platform::Windows => "powershell.exe",
        Platform::MacOs => "/bin/zsh",
        Platform::Linux | Platform::OtherUnix => "/bin/bash",
    }
}

/// Picks the shell to launch: an explicit request wins, then the platform
/// default if it is installed, then the platform's always-present fallback.
pub fn resolve_shell(requested: Option<&str>, platform: Platform) -> String {
    if let Some(shell) = requested.map(str::trim).filter(|s| !s.is_empty()) {
        return shell.to_string();
    }
    let preferred = default_shell_for(platform);
    if platform == Platform::Windows || locate_executable(preferred).is_ok() {
        preferred.to_string()
    } else {
        platform.fallback_shell().to_string()
    }
}

/// Finds `program` the way a shell would: paths containing a separator are
/// checked directly, bare names are searched on `PATH`.
pub fn locate_executable(program: &str) -> Result<PathBuf, PtyError> {
    if program.contains(std::path::MAIN_SEPARATOR) || program.contains('/') {
        let path = PathBuf::from(program);
        return check_executable(&path).map(|()| path);
    }

    let search = std::env::var_os("PATH").unwrap_or_default();
    let mut denied = false;
    for dir in std::env::split_paths(&search) {
        let candidate = dir.join(program);
        match check_executable(&candidate) {
            Ok(()) => return Ok(candidate),
            Err(PtyError::Spawn { reason, .. }) if reason.contains("Permission denied") => {
                denied = true;
            }
            Err(_) => {}
        }
    }

    let reason = if denied {
        "Permission denied"
    } else {
        "command not found in PATH"
    };
    Err(PtyError::spawn(program, reason))
}

fn check_executable(path: &Path) -> Result<(), PtyError> {
    let shell = path.display().to_string();
    let metadata =
        std::fs::metadata(path).map_err(|_| PtyError::spawn(&shell, "No such file or directory"))?;
    if !metadata.is_file() {
        return Err(PtyError::spawn(&shell, "Permission denied (not a regular file)"));
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if metadata.permissions().mode() & 0o111 == 0 {
            return Err(PtyError::spawn(&shell, "Permission denied"));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_shell_per_platform() {
        assert_eq!(default_shell_for(Platform::Windows), "powershell.exe");
        assert_eq!(default_shell_for(Platform::MacOs), "/bin/zsh");
        assert_eq!(default_shell_for(Platform::Linux), "/bin/bash");
        assert_eq!(default_shell_for(Platform::OtherUnix), "/bin/bash");
    }

    #[test]
    fn test_resolve_shell_prefers_explicit_request() {
        assert_eq!(resolve_shell(Some("/bin/sh"), Platform::MacOs), "/bin/sh");
        assert_eq!(resolve_shell(Some("  fish "), Platform::Linux), "fish");
    }

    #[test]
    fn test_resolve_shell_ignores_blank_request() {
        assert_eq!(resolve_shell(Some("   "), Platform::Windows), "powershell.exe");
    }

    #[cfg(unix)]
    #[test]
    fn test_resolve_shell_unix_default_is_runnable() {
        let shell = resolve_shell(None, Platform::Linux);
        assert!(shell == "/bin/bash" || shell == "/bin/sh");
        assert!(locate_executable(&shell).is_ok());
    }

    #[cfg(unix)]
    #[test]
    fn test_locate_executable_absolute() {
        assert_eq!(locate_executable("/bin/sh").unwrap(), PathBuf::from("/bin/sh"));
    }

    #[cfg(unix)]
    #[test]
    fn test_locate_executable_on_path() {
        let found = locate_executable("sh").unwrap();
        assert!(found.ends_with("sh"));
    }

    #[test]
    fn test_locate_executable_missing() {
        let err = locate_executable("/definitely/not/a/shell").unwrap_err();
        assert!(err.reason().contains("No such file"));

        let err = locate_executable("no-such-shell-null-term").unwrap_err();
        assert!(err.reason().contains("not found"));
    }

    #[cfg(unix)]
    #[test]
    fn test_locate_executable_not_executable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plain.txt");
        std::fs::write(&path, "echo hi").unwrap();
        let err = locate_executable(path.to_str().unwrap()).unwrap_err();
        assert!(err.reason().contains("Permission denied"));
    }

    #[cfg(unix)]
    #[test]
    fn test_locate_executable_directory() {
        let dir = tempfile::tempdir().unwrap();
        let err = locate_executable(dir.path().to_str().unwrap()).unwrap_err();
        assert!(err.reason().contains("Permission denied"));
    }
}
