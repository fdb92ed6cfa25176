use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::error::{RightsError, TaskError};
use crate::process::rights::{FileRights, Rights, RightsSource};
use crate::process::{Pid, ProcessState};
use crate::task::params::{Arguments, ParameterSet};

/// What an executor wants after a call returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    /// Keep the process alive and tick it again.
    Continue,
    /// Work is done; the process stops.
    Finished,
}

/// Request from a running executor to start another task as its child.
#[derive(Debug, Clone, PartialEq)]
pub struct LaunchRequest {
    pub program: String,
    pub task: String,
    pub arguments: Arguments,
}

/// Per-call view an executor gets of its process.
#[derive(Debug)]
pub struct ExecutionContext<'a> {
    pid: Pid,
    user: &'a str,
    tick: u64,
    state: ProcessState,
    callbacks: Vec<(String, Arguments)>,
    launches: Vec<LaunchRequest>,
}

impl<'a> ExecutionContext<'a> {
    pub fn new(pid: Pid, user: &'a str, tick: u64, state: ProcessState) -> Self {
        Self { pid, user, tick, state, callbacks: Vec::new(), launches: Vec::new() }
    }

    pub fn pid(&self) -> Pid {
        self.pid
    }

    pub fn user(&self) -> &str {
        self.user
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn state(&self) -> ProcessState {
        self.state
    }

    /// True once someone asked this process to wind down.
    pub fn is_interrupted(&self) -> bool {
        self.state == ProcessState::Interrupted
    }

    /// Reports a result to whoever created the process.
    pub fn callback(&mut self, name: impl Into<String>, outputs: Arguments) {
        self.callbacks.push((name.into(), outputs));
    }

    /// Starts `program`/`task` as a child of this process after the call returns.
    pub fn launch(&mut self, program: impl Into<String>, task: impl Into<String>, arguments: Arguments) {
        self.launches.push(LaunchRequest { program: program.into(), task: task.into(), arguments });
    }

    pub(crate) fn take_callbacks(&mut self) -> Vec<(String, Arguments)> {
        std::mem::take(&mut self.callbacks)
    }

    pub(crate) fn take_launches(&mut self) -> Vec<LaunchRequest> {
        std::mem::take(&mut self.launches)
    }
}

/// The concrete logic a process runs.
pub trait TaskExecutor: Send {
    /// Inputs and callbacks this executor understands.
    fn parameters(&self) -> ParameterSet;

    /// Called once with the resolved inputs.
    fn start(&mut self, inputs: &Arguments, ctx: &mut ExecutionContext<'_>) -> Result<Progress, TaskError>;

    /// Called once per tick while the process is active.
    fn tick(&mut self, _ctx: &mut ExecutionContext<'_>) -> Result<Progress, TaskError> {
        Ok(Progress::Continue)
    }

    /// A child process reported a callback.
    fn child_callback(
        &mut self,
        _child: Pid,
        _name: &str,
        _outputs: &Arguments,
        _ctx: &mut ExecutionContext<'_>,
    ) -> Result<Progress, TaskError> {
        Ok(Progress::Continue)
    }
}

/// Declarative executor: the task is built from its resolved inputs.
///
/// Implementors describe the contract with [`StaticTask::descriptor`] and
/// wrap themselves in a [`StaticExecutor`] via [`TaskDefinition::of_static`].
pub trait StaticTask: Send + Sized + 'static {
    fn descriptor() -> ParameterSet;

    fn from_arguments(inputs: &Arguments) -> Result<Self, TaskError>;

    fn run(&mut self, ctx: &mut ExecutionContext<'_>) -> Result<Progress, TaskError>;

    fn tick(&mut self, _ctx: &mut ExecutionContext<'_>) -> Result<Progress, TaskError> {
        Ok(Progress::Continue)
    }
}

pub struct StaticExecutor<T: StaticTask> {
    task: Option<T>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: StaticTask> StaticExecutor<T> {
    pub fn new() -> Self {
        Self { task: None, _marker: PhantomData }
    }
}

impl<T: StaticTask> Default for StaticExecutor<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: StaticTask> TaskExecutor for StaticExecutor<T> {
    fn parameters(&self) -> ParameterSet {
        T::descriptor()
    }

    fn start(&mut self, inputs: &Arguments, ctx: &mut ExecutionContext<'_>) -> Result<Progress, TaskError> {
        let task = self.task.insert(T::from_arguments(inputs)?);
        task.run(ctx)
    }

    fn tick(&mut self, ctx: &mut ExecutionContext<'_>) -> Result<Progress, TaskError> {
        match self.task.as_mut() {
            Some(task) => task.tick(ctx),
            None => Ok(Progress::Finished),
        }
    }
}

pub type ExecutorFactory = Arc<dyn Fn() -> Box<dyn TaskExecutor> + Send + Sync>;

/// A named task inside a program.
#[derive(Clone)]
pub struct TaskDefinition {
    name: String,
    factory: ExecutorFactory,
}

impl TaskDefinition {
    pub fn new<F>(name: impl Into<String>, factory: F) -> Self
    where
        F: Fn() -> Box<dyn TaskExecutor> + Send + Sync + 'static,
    {
        Self { name: name.into(), factory: Arc::new(factory) }
    }

    pub fn of_static<T: StaticTask>(name: impl Into<String>) -> Self {
        Self::new(name, || Box::new(StaticExecutor::<T>::new()))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn instantiate(&self) -> Box<dyn TaskExecutor> {
        (self.factory)()
    }
}

impl std::fmt::Debug for TaskDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskDefinition").field("name", &self.name).finish_non_exhaustive()
    }
}

/// A task container with file rights, the unit a user executes.
#[derive(Debug, Clone)]
pub struct Program {
    name: String,
    rights: FileRights,
    tasks: HashMap<String, TaskDefinition>,
}

impl Program {
    pub fn new(name: impl Into<String>, rights: FileRights) -> Self {
        Self { name: name.into(), rights, tasks: HashMap::new() }
    }

    pub fn with_task(mut self, definition: TaskDefinition) -> Self {
        self.tasks.insert(definition.name().to_string(), definition);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn task(&self, name: &str) -> Option<&TaskDefinition> {
        self.tasks.get(name)
    }

    pub fn task_names(&self) -> impl Iterator<Item = &str> {
        self.tasks.keys().map(String::as_str)
    }
}

impl RightsSource for Program {
    fn source_name(&self) -> &str {
        &self.name
    }

    fn rights_for(&self, user: &str) -> Rights {
        self.rights.rights_for(user)
    }
}

#[derive(Debug, Default)]
pub struct ProgramRegistry {
    programs: HashMap<String, Program>,
}

impl ProgramRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` if a program with that name already exists.
    pub fn register(&mut self, program: Program) -> bool {
        if self.programs.contains_key(program.name()) {
            return false;
        }
        self.programs.insert(program.name().to_string(), program);
        true
    }

    pub fn get(&self, name: &str) -> Option<&Program> {
        self.programs.get(name)
    }

    pub fn len(&self) -> usize {
        self.programs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.programs.is_empty()
    }

    /// Convenience for rights checks done outside a launch.
    pub fn check(&self, program: &str, user: &str, required: Rights) -> Option<Result<(), RightsError>> {
        self.get(program).map(|p| p.check_rights(user, required))
    }
}
