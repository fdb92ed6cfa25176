//! Delayed tasks, scheduler groups and the registry of live schedulers.

pub mod builtin;
pub mod group;
pub mod registry;
pub mod scheduler;
pub mod task;
pub mod template;

pub use builtin::{ProcessTickTask, ReapTask};
pub use group::{SchedulerGroup, SchedulerGroups, CLEANUP, NETWORK, PROGRAM, SYSTEM};
pub use registry::{SchedulerKey, SchedulerRegistry};
pub use scheduler::{PendingTaskSnapshot, ScheduleTaskContext, Scheduler, SchedulerSnapshot, UpdateReport};
pub use task::{FnTask, ScheduleTask, TaskContext};
pub use template::{TaskCatalog, TaskConstructor, TaskFactory, TaskTemplate, TaskTemplates};
