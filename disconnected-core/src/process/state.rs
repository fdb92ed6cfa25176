use serde::{Deserialize, Serialize};

/// Lifecycle of a world process.
///
/// `Stopped` is terminal. Only `Running` and `Interrupted` processes tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProcessState {
    #[default]
    Running,
    Suspended,
    /// Asked to wind down; expected to reach `Stopped` on its own.
    Interrupted,
    Stopped,
}

impl ProcessState {
    pub fn is_active(self) -> bool {
        matches!(self, ProcessState::Running | ProcessState::Interrupted)
    }

    pub fn is_terminal(self) -> bool {
        self == ProcessState::Stopped
    }

    pub fn can_transition_to(self, next: ProcessState) -> bool {
        use ProcessState::*;
        match (self, next) {
            (Stopped, _) => false,
            (_, Interrupted) | (_, Stopped) => true,
            (Running, Suspended) | (Suspended, Running) => true,
            _ => false,
        }
    }
}
