//! Tick-driven scheduling and process engine of the Disconnected world
//! simulation.
//!
//! A [`World`] owns the node tree, one [`Scheduler`] per scheduler-owning
//! node and one [`ProcessTree`] per computer. Each [`World::tick`] runs every
//! scheduler group in priority order across all live schedulers.

pub mod context;
pub mod error;
pub mod event;
pub mod inbox;
pub mod process;
pub mod schedule;
pub mod task;
pub mod world;

pub use context::EngineContext;
pub use error::{
    LaunchError, ProcessError, RestoreError, RightsError, RunError, ScheduleError, TaskError, WorldError,
};
pub use event::WorldEvent;
pub use inbox::{CommandInbox, InboxClosed, InboxHandle, WorldCommand};
pub use process::{
    LaunchOptions, Pid, ProcessEvent, ProcessState, ProcessStateListener, ProcessTree, ProcessTreeSnapshot,
    StateChange, StopOnInterrupt,
};
pub use schedule::{
    FnTask, ScheduleTask, Scheduler, SchedulerGroups, SchedulerSnapshot, TaskCatalog, TaskContext, TaskTemplate,
    UpdateReport,
};
pub use task::{Arguments, ParameterSet, Program, ProgramRegistry, Progress, TaskDefinition, TaskExecutor};
pub use world::{NodeId, TickReport, World, WorldTree, COMPUTER};
