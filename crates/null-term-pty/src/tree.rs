//! Tearing down everything a shell started, not only the shell itself.

use std::thread;
use std::time::Duration;

use tracing::debug;

/// Time hung-up processes get to exit before the group is killed outright.
pub(crate) const KILL_GRACE: Duration = Duration::from_millis(200);

/// Hangs up every process group the shell led by `leader` owns, then kills
/// whatever is left once [`KILL_GRACE`] has passed.
///
/// The shell's own group is always covered. On Linux the other groups of
/// its session are found too, since job-control shells move background
/// jobs into groups of their own.
#[cfg(unix)]
pub(crate) fn terminate_tree(leader: u32) {
    let Ok(leader) = libc::pid_t::try_from(leader) else {
        return;
    };
    let groups = shell_groups(leader);
    let signalled = signal_groups(&groups, libc::SIGHUP);
    debug!(leader, groups = groups.len(), signalled, "Shell tree hung up");
    if signalled == 0 {
        return;
    }

    let sweep = thread::Builder::new()
        .name(format!("tree-kill-{}", leader))
        .spawn(move || {
            thread::sleep(KILL_GRACE);
            signal_groups(&shell_groups(leader), libc::SIGKILL);
        });
    if let Err(e) = sweep {
        debug!(leader, error = %e, "Kill sweep thread unavailable, killing now");
        signal_groups(&groups, libc::SIGKILL);
    }
}

#[cfg(not(unix))]
pub(crate) fn terminate_tree(_leader: u32) {}

#[cfg(unix)]
fn shell_groups(leader: libc::pid_t) -> Vec<libc::pid_t> {
    let mut groups = vec![leader];
    for pid in session_members(leader) {
        let pgid = unsafe { libc::getpgid(pid) };
        if pgid > 0 && !groups.contains(&pgid) {
            groups.push(pgid);
        }
    }
    groups
}

/// Returns how many groups accepted the signal.
#[cfg(unix)]
fn signal_groups(groups: &[libc::pid_t], signal: libc::c_int) -> usize {
    groups
        .iter()
        // A negative pid addresses the whole process group.
        .filter(|&&pgid| unsafe { libc::kill(-pgid, signal) } == 0)
        .count()
}

/// Processes whose session was started by `leader`. Pipe-mode shells never
/// lead a session, so this is empty for them.
#[cfg(target_os = "linux")]
fn session_members(leader: libc::pid_t) -> Vec<libc::pid_t> {
    let Ok(entries) = std::fs::read_dir("/proc") else {
        return Vec::new();
    };
    entries
        .filter_map(Result::ok)
        .filter_map(|entry| entry.file_name().to_str()?.parse::<libc::pid_t>().ok())
        .filter(|&pid| pid != leader && unsafe { libc::getsid(pid) } == leader)
        .collect()
}

#[cfg(all(unix, not(target_os = "linux")))]
fn session_members(_leader: libc::pid_t) -> Vec<libc::pid_t> {
    Vec::new()
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::process::CommandExt;
    use std::process::Command;
    use std::time::Instant;

    fn reaped_within(child: &mut std::process::Child, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if matches!(child.try_wait(), Ok(Some(_))) {
                return true;
            }
            thread::sleep(Duration::from_millis(10));
        }
        false
    }

    #[test]
    fn test_terminate_tree_kills_process_that_ignores_hangup() {
        let mut child = Command::new("/bin/sh")
            .args(["-c", "trap '' HUP; sleep 300"])
            .process_group(0)
            .spawn()
            .unwrap();
        thread::sleep(Duration::from_millis(50));

        terminate_tree(child.id());

        assert!(reaped_within(&mut child, Duration::from_secs(5)));
    }

    #[test]
    fn test_terminate_tree_on_missing_group_is_quiet() {
        terminate_tree(u32::try_from(libc::pid_t::MAX).unwrap());
    }
}
