//! Error types for the scheduling and process engine.
//!
//! Policy failures (rights, missing arguments, misuse of the scheduler) are
//! ordinary values the caller can inspect. Nothing in here is fatal to the
//! tick loop.

use thiserror::Error;

use crate::process::{Pid, ProcessState};
use crate::process::rights::Rights;

/// Rejected calls to `schedule` and friends.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("delay must be at least one tick")]
    ZeroDelay,

    #[error("period must be at least one tick")]
    ZeroPeriod,

    #[error("unknown scheduler group '{0}'")]
    UnknownGroup(String),

    #[error("node has no scheduler attached")]
    NoScheduler,
}

/// Failure raised by a running task or executor.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TaskError {
    #[error("{0}")]
    Failed(String),

    #[error("task panicked: {0}")]
    Panicked(String),

    #[error("missing required argument '{0}'")]
    MissingArgument(String),

    #[error("argument '{name}' expected {expected}")]
    WrongArgumentType { name: String, expected: &'static str },

    #[error("unknown callback '{0}'")]
    UnknownCallback(String),
}

impl TaskError {
    pub fn failed(message: impl Into<String>) -> Self {
        TaskError::Failed(message.into())
    }

    /// Turns a payload caught by `catch_unwind` into a task error.
    pub fn from_panic(payload: Box<dyn std::any::Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };
        TaskError::Panicked(message)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProcessError {
    #[error("no process with pid {0}")]
    UnknownProcess(Pid),

    #[error("process {0} is stopped")]
    Terminal(Pid),

    #[error("process {pid} cannot go from {from:?} to {to:?}")]
    InvalidTransition { pid: Pid, from: ProcessState, to: ProcessState },

    #[error("process {pid} is {state:?} and cannot spawn children")]
    ParentNotRunning { pid: Pid, state: ProcessState },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RightsError {
    #[error("user '{user}' lacks {missing} on '{source_name}'")]
    Missing { user: String, source_name: String, missing: Rights },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RunError {
    #[error("task runner is already bound to an executor")]
    AlreadyBound,

    #[error("task runner has no executor")]
    NotBound,

    #[error(transparent)]
    Task(#[from] TaskError),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LaunchError {
    #[error("unknown program '{0}'")]
    UnknownProgram(String),

    #[error("program '{program}' has no task '{task}'")]
    UnknownTask { program: String, task: String },

    #[error(transparent)]
    Rights(#[from] RightsError),

    #[error(transparent)]
    Process(#[from] ProcessError),

    #[error(transparent)]
    Run(#[from] RunError),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WorldError {
    #[error("unknown world node")]
    UnknownNode,

    #[error("the world root cannot be detached or removed")]
    RootNode,

    #[error("node is not a computer")]
    NotAComputer,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RestoreError {
    #[error("no task kind '{0}' in the catalog")]
    UnknownTaskKind(String),

    #[error("snapshot entry for '{0}' has zero remaining ticks")]
    ZeroRemaining(String),

    #[error("snapshot is inconsistent: {0}")]
    Inconsistent(String),
}
