//! Tick loop, demo world and event relay wiring for the `disconnected` binary.

pub mod actions;
pub mod app;
pub mod programs;
pub mod tick;
pub mod watchdog;

pub use actions::{EventRelayAction, InboxDrain, SchedulerSweep, Simulation};
pub use app::{build_context, build_engine, build_simulation, from_config, AppError};
pub use tick::{FnAction, RunningEngine, StopHandle, TickAction, TickEngine, TickError, TickStats, TickTiming};
pub use watchdog::Watchdog;
