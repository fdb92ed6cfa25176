use crate::error::{ScheduleError, TaskError};
use crate::event::WorldEvent;
use crate::process::ProcessTree;
use crate::task::params::Arguments;
use crate::world::{NodeId, World};

/// A unit of deferred work held by a [`Scheduler`](super::Scheduler).
pub trait ScheduleTask: Send {
    /// Stable name of the task type, used in logs and snapshots.
    fn kind(&self) -> &str;

    fn execute(&mut self, ctx: &mut TaskContext<'_>) -> Result<(), TaskError>;

    /// State persisted in snapshots; a catalog constructor rebuilds the task from it.
    fn save(&self) -> Arguments {
        Arguments::new()
    }
}

/// Closure-backed task for ad-hoc scheduling.
pub struct FnTask<F> {
    kind: String,
    run: F,
}

impl<F> FnTask<F>
where
    F: FnMut(&mut TaskContext<'_>) -> Result<(), TaskError> + Send,
{
    pub fn new(kind: impl Into<String>, run: F) -> Self {
        Self { kind: kind.into(), run }
    }
}

impl<F> ScheduleTask for FnTask<F>
where
    F: FnMut(&mut TaskContext<'_>) -> Result<(), TaskError> + Send,
{
    fn kind(&self) -> &str {
        &self.kind
    }

    fn execute(&mut self, ctx: &mut TaskContext<'_>) -> Result<(), TaskError> {
        (self.run)(ctx)
    }
}

/// What a task sees while it executes: the world and the node owning its scheduler.
pub struct TaskContext<'a> {
    world: &'a mut World,
    owner: NodeId,
    group: &'a str,
}

impl<'a> TaskContext<'a> {
    pub fn new(world: &'a mut World, owner: NodeId, group: &'a str) -> Self {
        Self { world, owner, group }
    }

    pub fn owner(&self) -> NodeId {
        self.owner
    }

    pub fn group(&self) -> &str {
        self.group
    }

    pub fn tick(&self) -> u64 {
        self.world.current_tick()
    }

    pub fn world(&self) -> &World {
        self.world
    }

    pub fn world_mut(&mut self) -> &mut World {
        self.world
    }

    /// Schedules onto the owner's scheduler. The task never fires in the
    /// pass that is currently running.
    pub fn schedule(
        &mut self,
        task: impl ScheduleTask + 'static,
        group: &str,
        delay: u32,
    ) -> Result<(), ScheduleError> {
        self.world.schedule(self.owner, task, group, delay)
    }

    pub fn schedule_periodic(
        &mut self,
        task: impl ScheduleTask + 'static,
        group: &str,
        delay: u32,
        period: u32,
    ) -> Result<(), ScheduleError> {
        self.world.schedule_periodic(self.owner, task, group, delay, period)
    }

    pub fn schedule_on(
        &mut self,
        node: NodeId,
        task: impl ScheduleTask + 'static,
        group: &str,
        delay: u32,
    ) -> Result<(), ScheduleError> {
        self.world.schedule(node, task, group, delay)
    }

    pub fn emit(&mut self, event: WorldEvent) {
        self.world.emit(event);
    }

    /// Process tree of the owner, if the owner is a computer.
    pub fn processes_mut(&mut self) -> Option<&mut ProcessTree> {
        self.world.processes_mut(self.owner)
    }
}
