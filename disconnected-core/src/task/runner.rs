use serde::{Deserialize, Serialize};

use crate::error::RunError;
use crate::process::Pid;
use crate::task::executor::{ExecutionContext, Progress, TaskDefinition, TaskExecutor};
use crate::task::params::{Arguments, ParameterSet};

/// A callback accepted by a runner, waiting to be delivered upward.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallbackRecord {
    pub name: String,
    pub outputs: Arguments,
}

/// Supplies inputs to a freshly bound executor and starts it.
pub trait RunHook: Send {
    fn do_run(
        &mut self,
        executor: &mut dyn TaskExecutor,
        parameters: &ParameterSet,
        ctx: &mut ExecutionContext<'_>,
    ) -> Result<Progress, RunError>;
}

/// Starts the executor with a fixed argument map.
#[derive(Debug, Clone, Default)]
pub struct ArgumentsHook {
    arguments: Arguments,
}

impl ArgumentsHook {
    pub fn new(arguments: Arguments) -> Self {
        Self { arguments }
    }
}

impl RunHook for ArgumentsHook {
    fn do_run(
        &mut self,
        executor: &mut dyn TaskExecutor,
        parameters: &ParameterSet,
        ctx: &mut ExecutionContext<'_>,
    ) -> Result<Progress, RunError> {
        let inputs = parameters.resolve(&self.arguments)?;
        Ok(executor.start(&inputs, ctx)?)
    }
}

/// Binds one executor to one process. A runner can be used exactly once.
pub struct TaskRunner {
    task: Option<String>,
    executor: Option<Box<dyn TaskExecutor>>,
    parameters: ParameterSet,
    hook: Box<dyn RunHook>,
    outbox: Vec<CallbackRecord>,
}

impl TaskRunner {
    pub fn new(hook: impl RunHook + 'static) -> Self {
        Self {
            task: None,
            executor: None,
            parameters: ParameterSet::default(),
            hook: Box::new(hook),
            outbox: Vec::new(),
        }
    }

    pub fn with_arguments(arguments: Arguments) -> Self {
        Self::new(ArgumentsHook::new(arguments))
    }

    pub fn is_bound(&self) -> bool {
        self.executor.is_some()
    }

    /// Name of the bound task definition.
    pub fn task_name(&self) -> Option<&str> {
        self.task.as_deref()
    }

    /// Instantiates and binds the executor, then hands it to the run hook.
    pub fn run(&mut self, definition: &TaskDefinition, ctx: &mut ExecutionContext<'_>) -> Result<Progress, RunError> {
        if self.executor.is_some() {
            return Err(RunError::AlreadyBound);
        }
        let executor = self.executor.insert(definition.instantiate());
        self.task = Some(definition.name().to_string());
        self.parameters = executor.parameters();

        let progress = self.hook.do_run(executor.as_mut(), &self.parameters, ctx);
        self.collect(ctx)?;
        progress
    }

    pub fn tick(&mut self, ctx: &mut ExecutionContext<'_>) -> Result<Progress, RunError> {
        let executor = self.executor.as_mut().ok_or(RunError::NotBound)?;
        let progress = executor.tick(ctx);
        self.collect(ctx)?;
        Ok(progress?)
    }

    /// Passes a child's callback into the bound executor.
    pub fn child_callback(
        &mut self,
        child: Pid,
        name: &str,
        outputs: &Arguments,
        ctx: &mut ExecutionContext<'_>,
    ) -> Result<Progress, RunError> {
        let executor = self.executor.as_mut().ok_or(RunError::NotBound)?;
        let progress = executor.child_callback(child, name, outputs, ctx);
        self.collect(ctx)?;
        Ok(progress?)
    }

    /// Records a result for delivery to the process creator.
    pub fn callback(&mut self, name: impl Into<String>, outputs: Arguments) -> Result<(), RunError> {
        let name = name.into();
        self.parameters.check_callback(&name, &outputs)?;
        self.outbox.push(CallbackRecord { name, outputs });
        Ok(())
    }

    pub fn take_callbacks(&mut self) -> Vec<CallbackRecord> {
        std::mem::take(&mut self.outbox)
    }

    fn collect(&mut self, ctx: &mut ExecutionContext<'_>) -> Result<(), RunError> {
        for (name, outputs) in ctx.take_callbacks() {
            self.callback(name, outputs)?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for TaskRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskRunner")
            .field("task", &self.task)
            .field("bound", &self.executor.is_some())
            .field("pending_callbacks", &self.outbox.len())
            .finish()
    }
}
