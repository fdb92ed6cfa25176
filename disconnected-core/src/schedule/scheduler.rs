use std::ops::AddAssign;
use std::panic::{catch_unwind, AssertUnwindSafe};

use log::{error, trace};
use serde::{Deserialize, Serialize};

use crate::error::{RestoreError, ScheduleError, TaskError};
use crate::event::WorldEvent;
use crate::schedule::task::{ScheduleTask, TaskContext};
use crate::schedule::template::TaskCatalog;
use crate::task::params::Arguments;
use crate::world::{NodeId, World};

/// A pending task with its tick counter.
pub struct ScheduleTaskContext {
    task: Box<dyn ScheduleTask>,
    group: String,
    remaining: u32,
    period: Option<u32>,
}

impl ScheduleTaskContext {
    /// Rejects a zero delay or a zero period.
    pub fn new(
        task: Box<dyn ScheduleTask>,
        group: impl Into<String>,
        delay: u32,
        period: Option<u32>,
    ) -> Result<Self, ScheduleError> {
        if delay == 0 {
            return Err(ScheduleError::ZeroDelay);
        }
        if period == Some(0) {
            return Err(ScheduleError::ZeroPeriod);
        }
        Ok(Self { task, group: group.into(), remaining: delay, period })
    }

    pub fn kind(&self) -> &str {
        self.task.kind()
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    /// Updates of its group left before the task fires.
    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    pub fn period(&self) -> Option<u32> {
        self.period
    }
}

impl std::fmt::Debug for ScheduleTaskContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScheduleTaskContext")
            .field("kind", &self.task.kind())
            .field("group", &self.group)
            .field("remaining", &self.remaining)
            .field("period", &self.period)
            .finish()
    }
}

/// Outcome of one scheduler pass over one group.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct UpdateReport {
    pub executed: usize,
    pub failed: usize,
}

impl AddAssign for UpdateReport {
    fn add_assign(&mut self, other: Self) {
        self.executed += other.executed;
        self.failed += other.failed;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingTaskSnapshot {
    pub kind: String,
    pub group: String,
    pub remaining: u32,
    pub period: Option<u32>,
    pub state: Arguments,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchedulerSnapshot {
    pub tasks: Vec<PendingTaskSnapshot>,
}

/// Delayed-task queue owned by one world node.
///
/// Pending tasks are kept in insertion order; tasks due in the same pass fire
/// in that order.
#[derive(Debug, Default)]
pub struct Scheduler {
    pending: Vec<ScheduleTaskContext>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fires `task` on the `delay`-th update of `group`.
    pub fn schedule(
        &mut self,
        task: impl ScheduleTask + 'static,
        group: &str,
        delay: u32,
    ) -> Result<(), ScheduleError> {
        self.push(ScheduleTaskContext::new(Box::new(task), group, delay, None)?);
        Ok(())
    }

    /// Like [`schedule`](Self::schedule), re-armed with `period` after every
    /// successful run.
    pub fn schedule_periodic(
        &mut self,
        task: impl ScheduleTask + 'static,
        group: &str,
        delay: u32,
        period: u32,
    ) -> Result<(), ScheduleError> {
        self.push(ScheduleTaskContext::new(Box::new(task), group, delay, Some(period))?);
        Ok(())
    }

    pub fn push(&mut self, entry: ScheduleTaskContext) {
        self.pending.push(entry);
    }

    pub fn count_tasks(&self) -> usize {
        self.pending.len()
    }

    pub fn count_in_group(&self, group: &str) -> usize {
        self.pending.iter().filter(|e| e.group == group).count()
    }

    pub fn pending(&self) -> impl Iterator<Item = &ScheduleTaskContext> {
        self.pending.iter()
    }

    /// Advances every task of `group` by one tick and executes those that
    /// became due. Other groups are untouched.
    ///
    /// A failing or panicking task is logged, reported as a
    /// [`WorldEvent::TaskFailed`] and dropped; the remaining due tasks still run.
    pub fn update(&mut self, group: &str, world: &mut World, owner: NodeId) -> UpdateReport {
        let mut report = UpdateReport::default();
        let mut kept = Vec::with_capacity(self.pending.len());
        let mut due = Vec::new();
        for mut entry in self.pending.drain(..) {
            if entry.group != group {
                kept.push(entry);
                continue;
            }
            entry.remaining = entry.remaining.saturating_sub(1);
            if entry.remaining == 0 {
                due.push(entry);
            } else {
                kept.push(entry);
            }
        }

        for mut entry in due {
            let mut ctx = TaskContext::new(world, owner, group);
            let result = catch_unwind(AssertUnwindSafe(|| entry.task.execute(&mut ctx)))
                .unwrap_or_else(|payload| Err(TaskError::from_panic(payload)));

            match result {
                Ok(()) => {
                    report.executed += 1;
                    trace!("Task '{}' ran in group '{}'", entry.task.kind(), group);
                    if let Some(period) = entry.period {
                        entry.remaining = period;
                        kept.push(entry);
                    }
                }
                Err(err) => {
                    report.failed += 1;
                    error!(
                        "Task '{}' in group '{}' on {:?} failed: {}",
                        entry.task.kind(),
                        group,
                        owner,
                        err
                    );
                    world.emit(WorldEvent::TaskFailed {
                        owner,
                        group: group.to_string(),
                        task: entry.task.kind().to_string(),
                        error: err.to_string(),
                    });
                }
            }
        }

        self.pending = kept;
        report
    }

    pub fn snapshot(&self) -> SchedulerSnapshot {
        SchedulerSnapshot {
            tasks: self
                .pending
                .iter()
                .map(|e| PendingTaskSnapshot {
                    kind: e.task.kind().to_string(),
                    group: e.group.clone(),
                    remaining: e.remaining,
                    period: e.period,
                    state: e.task.save(),
                })
                .collect(),
        }
    }

    /// Rebuilds the pending queue, counters unchanged, using `catalog` to
    /// construct each task from its saved state.
    pub fn restore(snapshot: &SchedulerSnapshot, catalog: &TaskCatalog) -> Result<Self, RestoreError> {
        let mut scheduler = Self::new();
        for saved in &snapshot.tasks {
            if saved.remaining == 0 {
                return Err(RestoreError::ZeroRemaining(saved.kind.clone()));
            }
            let task = catalog.construct(&saved.kind, &saved.state)?;
            let entry = ScheduleTaskContext::new(task, saved.group.clone(), saved.remaining, saved.period)
                .map_err(|err| RestoreError::Inconsistent(format!("task '{}': {}", saved.kind, err)))?;
            scheduler.push(entry);
        }
        Ok(scheduler)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::EngineContext;
    use crate::schedule::task::FnTask;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn world() -> (World, NodeId) {
        let world = World::new(Arc::new(EngineContext::with_defaults()));
        let root = world.root();
        (world, root)
    }

    fn counting(kind: &str, counter: &Arc<AtomicUsize>) -> FnTask<impl FnMut(&mut TaskContext<'_>) -> Result<(), TaskError> + Send> {
        let counter = Arc::clone(counter);
        FnTask::new(kind, move |_ctx: &mut TaskContext<'_>| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }

    #[test]
    fn zero_delay_and_period_are_rejected() {
        let mut scheduler = Scheduler::new();
        let counter = Arc::new(AtomicUsize::new(0));
        assert_eq!(scheduler.schedule(counting("t", &counter), "net", 0), Err(ScheduleError::ZeroDelay));
        assert_eq!(
            scheduler.schedule_periodic(counting("t", &counter), "net", 1, 0),
            Err(ScheduleError::ZeroPeriod)
        );
        assert_eq!(scheduler.count_tasks(), 0);
    }

    #[test]
    fn fires_exactly_on_the_delay_th_update() {
        let (mut world, owner) = world();
        let counter = Arc::new(AtomicUsize::new(0));
        let mut scheduler = Scheduler::new();
        scheduler.schedule(counting("t", &counter), "net", 5).unwrap();

        for _ in 0..4 {
            scheduler.update("net", &mut world, owner);
        }
        assert_eq!(counter.load(Ordering::SeqCst), 0);
        assert_eq!(scheduler.count_tasks(), 1);

        let report = scheduler.update("net", &mut world, owner);
        assert_eq!(report.executed, 1);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(scheduler.count_tasks(), 0);

        scheduler.update("net", &mut world, owner);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn other_groups_are_untouched() {
        let (mut world, owner) = world();
        let counter = Arc::new(AtomicUsize::new(0));
        let mut scheduler = Scheduler::new();
        scheduler.schedule(counting("t", &counter), "prog", 1).unwrap();

        scheduler.update("net", &mut world, owner);
        assert_eq!(scheduler.pending().next().map(ScheduleTaskContext::remaining), Some(1));
        scheduler.update("prog", &mut world, owner);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn due_tasks_fire_in_insertion_order() {
        let (mut world, owner) = world();
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));
        let mut scheduler = Scheduler::new();
        for (name, delay) in [("a", 2), ("b", 1), ("c", 2)] {
            let order = Arc::clone(&order);
            scheduler
                .schedule(
                    FnTask::new(name, move |_ctx: &mut TaskContext<'_>| {
                        order.lock().unwrap().push(name);
                        Ok(())
                    }),
                    "net",
                    delay,
                )
                .unwrap();
        }

        scheduler.update("net", &mut world, owner);
        scheduler.update("net", &mut world, owner);
        assert_eq!(*order.lock().unwrap(), vec!["b", "a", "c"]);
    }

    #[test]
    fn failing_task_is_removed_and_siblings_still_run() {
        let (mut world, owner) = world();
        let counter = Arc::new(AtomicUsize::new(0));
        let mut scheduler = Scheduler::new();
        scheduler
            .schedule(FnTask::new("broken", |_ctx: &mut TaskContext<'_>| Err(TaskError::failed("boom"))), "net", 1)
            .unwrap();
        scheduler
            .schedule(FnTask::new("panicky", |_ctx: &mut TaskContext<'_>| -> Result<(), TaskError> { panic!("kaboom") }), "net", 1)
            .unwrap();
        scheduler.schedule(counting("fine", &counter), "net", 1).unwrap();

        let report = scheduler.update("net", &mut world, owner);
        assert_eq!(report, UpdateReport { executed: 1, failed: 2 });
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(scheduler.count_tasks(), 0);

        let failures: Vec<String> = world
            .drain_events()
            .into_iter()
            .filter_map(|e| match e {
                WorldEvent::TaskFailed { task, .. } => Some(task),
                _ => None,
            })
            .collect();
        assert_eq!(failures, vec!["broken", "panicky"]);
    }

    #[test]
    fn periodic_tasks_are_rearmed_until_they_fail() {
        let (mut world, owner) = world();
        let runs = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&runs);
        let mut scheduler = Scheduler::new();
        scheduler
            .schedule_periodic(
                FnTask::new("heartbeat", move |_ctx: &mut TaskContext<'_>| {
                    if seen.fetch_add(1, Ordering::SeqCst) == 2 {
                        return Err(TaskError::failed("tired"));
                    }
                    Ok(())
                }),
                "net",
                1,
                2,
            )
            .unwrap();

        let mut fired_on = Vec::new();
        for update in 1..=8 {
            let before = runs.load(Ordering::SeqCst);
            scheduler.update("net", &mut world, owner);
            if runs.load(Ordering::SeqCst) > before {
                fired_on.push(update);
            }
        }
        assert_eq!(fired_on, vec![1, 3, 5]);
        assert_eq!(scheduler.count_tasks(), 0);
    }

    #[test]
    fn snapshot_keeps_counters() {
        let (mut world, owner) = world();
        let counter = Arc::new(AtomicUsize::new(0));
        let mut scheduler = Scheduler::new();
        scheduler.schedule(counting("t", &counter), "net", 3).unwrap();
        scheduler.schedule_periodic(counting("p", &counter), "prog", 4, 9).unwrap();
        scheduler.update("net", &mut world, owner);

        let snapshot = scheduler.snapshot();
        assert_eq!(snapshot.tasks.len(), 2);
        assert_eq!((snapshot.tasks[0].kind.as_str(), snapshot.tasks[0].remaining), ("t", 2));
        assert_eq!((snapshot.tasks[1].remaining, snapshot.tasks[1].period), (4, Some(9)));
    }

    #[test]
    fn restore_rejects_unknown_kinds_and_zero_counters() {
        let catalog = TaskCatalog::new();
        let mut snapshot = SchedulerSnapshot {
            tasks: vec![PendingTaskSnapshot {
                kind: "mystery".into(),
                group: "net".into(),
                remaining: 1,
                period: None,
                state: Arguments::new(),
            }],
        };
        assert!(matches!(
            Scheduler::restore(&snapshot, &catalog),
            Err(RestoreError::UnknownTaskKind(kind)) if kind == "mystery"
        ));

        snapshot.tasks[0].remaining = 0;
        assert!(matches!(Scheduler::restore(&snapshot, &catalog), Err(RestoreError::ZeroRemaining(_))));
    }
}
