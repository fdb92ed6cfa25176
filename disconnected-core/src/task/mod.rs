pub mod executor;
pub mod params;
pub mod runner;

pub use executor::{
    ExecutionContext, ExecutorFactory, LaunchRequest, Program, ProgramRegistry, Progress, StaticExecutor, StaticTask,
    TaskDefinition, TaskExecutor,
};
pub use params::{ArgKind, ArgValue, Arguments, CallbackDescriptor, InputParameter, ParameterSet};
pub use runner::{ArgumentsHook, CallbackRecord, RunHook, TaskRunner};
