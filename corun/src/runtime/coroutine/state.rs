/// Lifecycle state of a coroutine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum State {
    /// Constructed, never transferred into.
    Init,

    /// Suspended by its own yield, waiting for a resume.
    Waiting,

    /// Currently executing.
    ///
    /// At most one coroutine of a scheduling domain is in this state.
    Running,

    /// The body has returned and the coroutine has been closed.
    ///
    /// It is no longer reachable by id and will never run again.
    End,
}

impl State {
    /// Returns a short lowercase name, used in log output.
    pub fn as_str(self) -> &'static str {
        match self {
            State::Init => "init",
            State::Waiting => "waiting",
            State::Running => "running",
            State::End => "end",
        }
    }
}

impl std::fmt::Display for State {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
