//! World processes: the tree, its state machine and the rights checks
//! guarding program launches.

pub mod listener;
pub mod rights;
pub mod state;
pub mod tree;

/// Process id, unique among the live processes of one tree.
pub type Pid = u32;

pub use listener::{FnListener, ProcessStateListener, StateChange, StopOnInterrupt};
pub use rights::{FileRights, Rights, RightsSource};
pub use state::ProcessState;
pub use tree::{
    LaunchOptions, Process, ProcessEvent, ProcessSnapshot, ProcessTickReport, ProcessTree, ProcessTreeSnapshot,
    TaskLabel, ROOT_PID,
};
