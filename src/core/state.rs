use std::fmt;

/// Lifecycle state of a [`UnitInstance`](crate::core::instance::UnitInstance).
///
/// The happy path is start, enter, run, exit, end. A pause goes through
/// suspend, resume and re-enter, and a failure goes through fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum State {
    Created,
    Entering,
    Running,
    Exiting,
    Completed,
    Suspended,
    Resuming,
    ReEntering,
    /// halt
    Aborting,
    Faulted,
}

impl State {
    /// Returns `true` if `self -> to` is an edge of the lifecycle.
    pub fn can_transition_to(self, to: State) -> bool {
        use State::*;
        matches!(
            (self, to),
            (Created, Entering)
                | (Created, Aborting)
                | (Entering, Running)
                | (Entering, Aborting)
                | (Running, Exiting)
                | (Running, Suspended)
                | (Running, Faulted)
                | (Running, Aborting)
                | (Exiting, Completed)
                | (Faulted, Completed)
                | (Suspended, Resuming)
                | (Suspended, Aborting)
                | (Resuming, ReEntering)
                | (Resuming, Aborting)
                | (ReEntering, Running)
                | (ReEntering, Aborting)
                | (Aborting, Completed)
        )
    }

    /// States in which the scheduler may select an instance as current.
    pub fn is_active(self) -> bool {
        matches!(
            self,
            State::Created | State::Entering | State::Running | State::Resuming | State::ReEntering
        )
    }

    pub fn is_terminal(self) -> bool {
        self == State::Completed
    }

    pub fn as_str(self) -> &'static str {
        match self {
            State::Created => "created",
            State::Entering => "entering",
            State::Running => "running",
            State::Exiting => "exiting",
            State::Completed => "completed",
            State::Suspended => "suspended",
            State::Resuming => "resuming",
            State::ReEntering => "re_entering",
            State::Aborting => "aborting",
            State::Faulted => "faulted",
        }
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
