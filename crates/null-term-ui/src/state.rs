/// Where a session is in its life, as seen from the panel.
///
/// ```text
/// Created -> Spawning -> Running -> (Exited | Killed) -> Disposed
///               \-> Exited (spawn failed)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleState {
    Created,
    Spawning,
    Running,
    Exited,
    Killed,
    Disposed,
}

impl LifecycleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleState::Created => "created",
            LifecycleState::Spawning => "spawning",
            LifecycleState::Running => "running",
            LifecycleState::Exited => "exited",
            LifecycleState::Killed => "killed",
            LifecycleState::Disposed => "disposed",
        }
    }

    pub fn can_transition_to(self, next: LifecycleState) -> bool {
        use LifecycleState::*;
        matches!(
            (self, next),
            (Created, Spawning)
                | (Spawning, Running)
                | (Spawning, Exited)
                | (Running, Exited)
                | (Running, Killed)
                | (Exited, Disposed)
                | (Killed, Disposed)
                // Closed or cut off before the spawn was answered.
                | (Created, Exited)
                | (Created, Killed)
                | (Spawning, Killed)
        )
    }

    /// Input is accepted (and queued until the spawn lands) in these states.
    pub fn accepts_input(self) -> bool {
        matches!(
            self,
            LifecycleState::Created | LifecycleState::Spawning | LifecycleState::Running
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            LifecycleState::Exited | LifecycleState::Killed | LifecycleState::Disposed
        )
    }
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::LifecycleState::*;
    use super::*;

    #[test]
    fn test_happy_path_transitions() {
        assert!(Created.can_transition_to(Spawning));
        assert!(Spawning.can_transition_to(Running));
        assert!(Running.can_transition_to(Exited));
        assert!(Running.can_transition_to(Killed));
        assert!(Exited.can_transition_to(Disposed));
        assert!(Killed.can_transition_to(Disposed));
    }

    #[test]
    fn test_spawn_failure_goes_to_exited() {
        assert!(Spawning.can_transition_to(Exited));
    }

    #[test]
    fn test_no_way_back() {
        assert!(!Disposed.can_transition_to(Created));
        assert!(!Disposed.can_transition_to(Running));
        assert!(!Exited.can_transition_to(Running));
        assert!(!Killed.can_transition_to(Exited));
        assert!(!Running.can_transition_to(Spawning));
        assert!(!Running.can_transition_to(Disposed));
    }

    #[test]
    fn test_input_and_terminal_flags() {
        assert!(Spawning.accepts_input());
        assert!(!Exited.accepts_input());
        assert!(Killed.is_terminal());
        assert!(!Running.is_terminal());
        assert_eq!(Running.to_string(), "running");
    }
}
