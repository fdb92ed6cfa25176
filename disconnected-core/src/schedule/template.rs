use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{RestoreError, ScheduleError, TaskError};
use crate::schedule::scheduler::ScheduleTaskContext;
use crate::schedule::task::ScheduleTask;
use crate::task::params::Arguments;

pub type TaskFactory = Arc<dyn Fn() -> Box<dyn ScheduleTask> + Send + Sync>;

pub type TaskConstructor = Arc<dyn Fn(&Arguments) -> Result<Box<dyn ScheduleTask>, TaskError> + Send + Sync>;

/// A task scheduled onto every new scheduler whose owner has a given kind.
#[derive(Clone)]
pub struct TaskTemplate {
    group: String,
    delay: u32,
    period: Option<u32>,
    factory: TaskFactory,
}

impl TaskTemplate {
    pub fn new<F>(group: impl Into<String>, delay: u32, factory: F) -> Self
    where
        F: Fn() -> Box<dyn ScheduleTask> + Send + Sync + 'static,
    {
        Self { group: group.into(), delay, period: None, factory: Arc::new(factory) }
    }

    pub fn every(mut self, period: u32) -> Self {
        self.period = Some(period);
        self
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    pub fn delay(&self) -> u32 {
        self.delay
    }

    pub fn period(&self) -> Option<u32> {
        self.period
    }

    pub fn instantiate(&self) -> Result<ScheduleTaskContext, ScheduleError> {
        ScheduleTaskContext::new((self.factory)(), self.group.clone(), self.delay, self.period)
    }
}

impl std::fmt::Debug for TaskTemplate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskTemplate")
            .field("group", &self.group)
            .field("delay", &self.delay)
            .field("period", &self.period)
            .finish_non_exhaustive()
    }
}

/// Templates keyed by owner kind (`computer`, `hard_drive`, ...).
#[derive(Debug, Clone, Default)]
pub struct TaskTemplates {
    by_kind: HashMap<String, Vec<TaskTemplate>>,
}

impl TaskTemplates {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, owner_kind: impl Into<String>, template: TaskTemplate) {
        self.by_kind.entry(owner_kind.into()).or_default().push(template);
    }

    pub fn for_kind(&self, owner_kind: &str) -> &[TaskTemplate] {
        self.by_kind.get(owner_kind).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.by_kind.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Maps task kinds to constructors so saved schedulers can be rebuilt.
#[derive(Clone, Default)]
pub struct TaskCatalog {
    constructors: HashMap<String, TaskConstructor>,
}

impl TaskCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, kind: impl Into<String>, constructor: F)
    where
        F: Fn(&Arguments) -> Result<Box<dyn ScheduleTask>, TaskError> + Send + Sync + 'static,
    {
        self.constructors.insert(kind.into(), Arc::new(constructor));
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.constructors.contains_key(kind)
    }

    pub fn construct(&self, kind: &str, state: &Arguments) -> Result<Box<dyn ScheduleTask>, RestoreError> {
        let constructor = self
            .constructors
            .get(kind)
            .ok_or_else(|| RestoreError::UnknownTaskKind(kind.to_string()))?;
        constructor(state).map_err(|err| RestoreError::Inconsistent(format!("task '{}': {}", kind, err)))
    }
}

impl std::fmt::Debug for TaskCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut kinds: Vec<&String> = self.constructors.keys().collect();
        kinds.sort();
        f.debug_struct("TaskCatalog").field("kinds", &kinds).finish()
    }
}
