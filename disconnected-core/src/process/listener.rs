use serde::{Deserialize, Serialize};

use crate::process::{Pid, ProcessState};

/// One transition of one process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateChange {
    pub pid: Pid,
    pub old: ProcessState,
    pub new: ProcessState,
}

/// Observer attached to a single process, called on every transition.
///
/// A listener may ask for a follow-up transition, which is applied right after
/// all listeners of the current one have run.
pub trait ProcessStateListener: Send {
    fn state_changed(&mut self, change: &StateChange) -> Option<ProcessState>;
}

/// Turns an interrupt into a stop, so tasks need no shutdown code of their own.
#[derive(Debug, Clone, Copy, Default)]
pub struct StopOnInterrupt;

impl ProcessStateListener for StopOnInterrupt {
    fn state_changed(&mut self, change: &StateChange) -> Option<ProcessState> {
        (change.new == ProcessState::Interrupted).then_some(ProcessState::Stopped)
    }
}

/// Closure-backed listener.
pub struct FnListener<F>(pub F);

impl<F> ProcessStateListener for FnListener<F>
where
    F: FnMut(&StateChange) -> Option<ProcessState> + Send,
{
    fn state_changed(&mut self, change: &StateChange) -> Option<ProcessState> {
        (self.0)(change)
    }
}
