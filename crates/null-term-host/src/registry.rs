use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::RwLock;

use chrono::DateTime;
use chrono::Utc;
use null_term_common::mutex_lock_or_recover;
use null_term_common::rwlock_read_or_recover;
use null_term_common::rwlock_write_or_recover;
use null_term_ipc::SessionSummary;
use null_term_pty::PtyError;
use null_term_pty::ShellProcess;

use crate::config::DEFAULT_MAX_SESSIONS;
use crate::error::SessionError;

/// Identifies one client connection to the host.
pub type ConnectionId = u64;

/// A live shell process, owned by the host for as long as it is registered.
pub struct LiveSession {
    id: String,
    shell: String,
    cwd: Option<String>,
    pid: Option<u32>,
    pty: bool,
    owner: Option<ConnectionId>,
    created_at: DateTime<Utc>,
    size: Mutex<(u16, u16)>,
    process: Mutex<Box<dyn ShellProcess>>,
    killed: AtomicBool,
}

impl LiveSession {
    pub fn new(
        id: String,
        shell: String,
        cwd: Option<String>,
        owner: Option<ConnectionId>,
        size: (u16, u16),
        process: Box<dyn ShellProcess>,
    ) -> Self {
        Self {
            id,
            shell,
            cwd,
            pid: process.pid(),
            pty: process.is_pty(),
            owner,
            created_at: Utc::now(),
            size: Mutex::new(size),
            process: Mutex::new(process),
            killed: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn is_pty(&self) -> bool {
        self.pty
    }

    pub fn owner(&self) -> Option<ConnectionId> {
        self.owner
    }

    pub fn is_killed(&self) -> bool {
        self.killed.load(Ordering::SeqCst)
    }

    pub fn write(&self, data: &[u8]) -> Result<(), PtyError> {
        mutex_lock_or_recover(&self.process).write(data)
    }

    pub fn resize(&self, cols: u16, rows: u16) -> Result<bool, PtyError> {
        let applied = mutex_lock_or_recover(&self.process).resize(cols, rows)?;
        *mutex_lock_or_recover(&self.size) = (cols, rows);
        Ok(applied)
    }

    /// Marks the session killed, which silences further output, then
    /// signals the process.
    pub fn kill(&self) -> Result<(), PtyError> {
        self.killed.store(true, Ordering::SeqCst);
        mutex_lock_or_recover(&self.process).kill()
    }

    pub fn try_wait(&self) -> Result<Option<i32>, PtyError> {
        mutex_lock_or_recover(&self.process).try_wait()
    }

    pub fn summary(&self) -> SessionSummary {
        let (cols, rows) = *mutex_lock_or_recover(&self.size);
        SessionSummary {
            id: self.id.clone(),
            pid: self.pid,
            shell: self.shell.clone(),
            cwd: self.cwd.clone(),
            pty: self.pty,
            cols,
            rows,
            created_at: self.created_at.to_rfc3339(),
        }
    }
}

/// `id -> live process`. At most one process per id; an id leaves the
/// registry as soon as its process is killed or has exited.
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, Arc<LiveSession>>>,
    max_sessions: usize,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_SESSIONS)
    }
}

impl SessionRegistry {
    pub fn new(max_sessions: usize) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            max_sessions,
        }
    }

    pub fn max_sessions(&self) -> usize {
        self.max_sessions
    }

    /// Cheap pre-spawn check so a doomed spawn never starts a process.
    pub fn check_available(&self, id: &str) -> Result<(), SessionError> {
        let sessions = rwlock_read_or_recover(&self.sessions);
        Self::check(&sessions, id, self.max_sessions)
    }

    pub fn insert(&self, session: Arc<LiveSession>) -> Result<(), SessionError> {
        let mut sessions = rwlock_write_or_recover(&self.sessions);
        Self::check(&sessions, session.id(), self.max_sessions)?;
        sessions.insert(session.id().to_string(), session);
        Ok(())
    }

    fn check(
        sessions: &HashMap<String, Arc<LiveSession>>,
        id: &str,
        max_sessions: usize,
    ) -> Result<(), SessionError> {
        if sessions.contains_key(id) {
            return Err(SessionError::AlreadyExists(id.to_string()));
        }
        if sessions.len() >= max_sessions {
            return Err(SessionError::LimitReached(max_sessions));
        }
        Ok(())
    }

    pub fn get(&self, id: &str) -> Result<Arc<LiveSession>, SessionError> {
        rwlock_read_or_recover(&self.sessions)
            .get(id)
            .cloned()
            .ok_or_else(|| SessionError::NotFound(id.to_string()))
    }

    pub fn remove(&self, id: &str) -> Result<Arc<LiveSession>, SessionError> {
        rwlock_write_or_recover(&self.sessions)
            .remove(id)
            .ok_or_else(|| SessionError::NotFound(id.to_string()))
    }

    /// Removes `session` only if the id still maps to this very process, so a
    /// late exit can never evict a newer session that reused the slot.
    pub fn remove_exact(&self, session: &Arc<LiveSession>) -> bool {
        let mut sessions = rwlock_write_or_recover(&self.sessions);
        match sessions.get(session.id()) {
            Some(current) if Arc::ptr_eq(current, session) => {
                sessions.remove(session.id());
                true
            }
            _ => false,
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        rwlock_read_or_recover(&self.sessions).contains_key(id)
    }

    pub fn len(&self) -> usize {
        rwlock_read_or_recover(&self.sessions).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn owned_by(&self, owner: ConnectionId) -> Vec<String> {
        rwlock_read_or_recover(&self.sessions)
            .values()
            .filter(|s| s.owner() == Some(owner))
            .map(|s| s.id().to_string())
            .collect()
    }

    pub fn summaries(&self) -> Vec<SessionSummary> {
        let mut list: Vec<SessionSummary> = rwlock_read_or_recover(&self.sessions)
            .values()
            .map(|s| s.summary())
            .collect();
        list.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        list
    }

    /// Empties the registry, handing every live session to the caller.
    pub fn drain(&self) -> Vec<Arc<LiveSession>> {
        rwlock_write_or_recover(&self.sessions)
            .drain()
            .map(|(_, s)| s)
            .collect()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// In-memory process for registry and adapter tests.
    #[derive(Default)]
    pub(crate) struct StubProcess {
        pub written: Arc<Mutex<Vec<u8>>>,
        pub exit_code: Arc<Mutex<Option<i32>>>,
        pub killed: Arc<AtomicBool>,
        pub pty: bool,
    }

    impl ShellProcess for StubProcess {
        fn pid(&self) -> Option<u32> {
            Some(4242)
        }

        fn is_pty(&self) -> bool {
            self.pty
        }

        fn write(&mut self, data: &[u8]) -> Result<(), PtyError> {
            self.written.lock().unwrap().extend_from_slice(data);
            Ok(())
        }

        fn resize(&mut self, _cols: u16, _rows: u16) -> Result<bool, PtyError> {
            Ok(self.pty)
        }

        fn kill(&mut self) -> Result<(), PtyError> {
            self.killed.store(true, Ordering::SeqCst);
            self.exit_code.lock().unwrap().get_or_insert(137);
            Ok(())
        }

        fn try_wait(&mut self) -> Result<Option<i32>, PtyError> {
            Ok(*self.exit_code.lock().unwrap())
        }
    }

    fn session(id: &str, owner: Option<ConnectionId>) -> Arc<LiveSession> {
        Arc::new(LiveSession::new(
            id.to_string(),
            "/bin/sh".to_string(),
            None,
            owner,
            (80, 24),
            Box::new(StubProcess {
                pty: true,
                ..StubProcess::default()
            }),
        ))
    }

    #[test]
    fn test_insert_and_get() {
        let registry = SessionRegistry::new(4);
        registry.insert(session("a", None)).unwrap();
        assert!(registry.contains("a"));
        assert_eq!(registry.get("a").unwrap().pid(), Some(4242));
        assert!(matches!(registry.get("b"), Err(SessionError::NotFound(_))));
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let registry = SessionRegistry::new(4);
        registry.insert(session("a", None)).unwrap();
        assert!(matches!(
            registry.insert(session("a", None)),
            Err(SessionError::AlreadyExists(_))
        ));
        assert!(matches!(
            registry.check_available("a"),
            Err(SessionError::AlreadyExists(_))
        ));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_limit_enforced() {
        let registry = SessionRegistry::new(1);
        registry.insert(session("a", None)).unwrap();
        assert!(matches!(
            registry.insert(session("b", None)),
            Err(SessionError::LimitReached(1))
        ));
    }

    #[test]
    fn test_remove_exact_ignores_replaced_session() {
        let registry = SessionRegistry::new(4);
        let old = session("a", None);
        registry.insert(Arc::clone(&old)).unwrap();
        registry.remove("a").unwrap();

        let newer = session("a", None);
        registry.insert(Arc::clone(&newer)).unwrap();

        assert!(!registry.remove_exact(&old));
        assert!(registry.contains("a"));
        assert!(registry.remove_exact(&newer));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_owned_by_and_drain() {
        let registry = SessionRegistry::new(4);
        registry.insert(session("a", Some(1))).unwrap();
        registry.insert(session("b", Some(2))).unwrap();
        registry.insert(session("c", Some(1))).unwrap();

        let mut owned = registry.owned_by(1);
        owned.sort();
        assert_eq!(owned, vec!["a".to_string(), "c".to_string()]);

        assert_eq!(registry.drain().len(), 3);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_kill_marks_session_and_resize_updates_summary() {
        let s = session("a", None);
        assert!(s.resize(132, 50).unwrap());
        let summary = s.summary();
        assert_eq!((summary.cols, summary.rows), (132, 50));
        assert!(summary.pty);

        assert!(!s.is_killed());
        s.kill().unwrap();
        assert!(s.is_killed());
        assert_eq!(s.try_wait().unwrap(), Some(137));
    }
}
