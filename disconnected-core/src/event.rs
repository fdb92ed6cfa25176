use serde::{Deserialize, Serialize};

use crate::process::ProcessEvent;
use crate::task::params::Arguments;
use crate::world::NodeId;

/// Outgoing simulation event, collected in the world outbox and relayed to
/// observers once per tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum WorldEvent {
    /// A scheduled task returned an error or panicked and was dropped.
    TaskFailed { owner: NodeId, group: String, task: String, error: String },
    /// Schedulers whose owners were no longer part of the world.
    SchedulersPruned { owners: Vec<NodeId> },
    NodeRemoved { node: NodeId },
    Process { computer: NodeId, event: ProcessEvent },
    /// Free-form event raised by game code.
    Custom { name: String, payload: Arguments },
}

impl WorldEvent {
    pub fn custom(name: impl Into<String>, payload: Arguments) -> Self {
        WorldEvent::Custom { name: name.into(), payload }
    }

    /// Short tag used in logs.
    pub fn name(&self) -> &str {
        match self {
            WorldEvent::TaskFailed { .. } => "task_failed",
            WorldEvent::SchedulersPruned { .. } => "schedulers_pruned",
            WorldEvent::NodeRemoved { .. } => "node_removed",
            WorldEvent::Process { .. } => "process",
            WorldEvent::Custom { name, .. } => name,
        }
    }
}
