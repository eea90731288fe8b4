//! Lifecycle state types.

/// State of the orchestrator, shown to the user as the status line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LifecycleState {
    /// No supervised processes are expected to be running.
    #[default]
    Stopped,

    /// A Run sequence has completed.
    ///
    /// This does not guarantee that both processes were started; Run sets it
    /// even when startup fails.
    Running,
}

impl LifecycleState {
    /// Returns the state as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stopped => "Stopped",
            Self::Running => "Running",
        }
    }
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
