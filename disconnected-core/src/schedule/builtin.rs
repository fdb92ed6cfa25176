//! Tasks the engine installs on every computer.

use log::trace;

use crate::error::TaskError;
use crate::schedule::task::{ScheduleTask, TaskContext};

/// Ticks the executors of every active process on the owning computer.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessTickTask;

impl ProcessTickTask {
    pub const KIND: &'static str = "process.tick";
}

impl ScheduleTask for ProcessTickTask {
    fn kind(&self) -> &str {
        Self::KIND
    }

    fn execute(&mut self, ctx: &mut TaskContext<'_>) -> Result<(), TaskError> {
        let tick = ctx.tick();
        if let Some(tree) = ctx.processes_mut() {
            let report = tree.tick(tick);
            if report.ticked > 0 {
                trace!("Ticked {} processes, {} finished, {} failed", report.ticked, report.finished, report.failed);
            }
        }
        Ok(())
    }
}

/// Removes stopped processes from the owning computer.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReapTask;

impl ReapTask {
    pub const KIND: &'static str = "process.reap";
}

impl ScheduleTask for ReapTask {
    fn kind(&self) -> &str {
        Self::KIND
    }

    fn execute(&mut self, ctx: &mut TaskContext<'_>) -> Result<(), TaskError> {
        if let Some(tree) = ctx.processes_mut() {
            tree.reap();
        }
        Ok(())
    }
}
