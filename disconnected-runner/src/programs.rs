//! Programs and world tasks installed on the demo world.

use disconnected_core::process::FileRights;
use disconnected_core::schedule::{ScheduleTask, TaskContext};
use disconnected_core::task::{ArgKind, ExecutionContext, StaticTask};
use disconnected_core::{
    Arguments, ParameterSet, Pid, Program, ProgramRegistry, Progress, TaskDefinition, TaskError, TaskExecutor,
    WorldEvent,
};
use rand::rngs::StdRng;
use rand::Rng;

pub const NETUTILS: &str = "netutils";
pub const HARD_DRIVE: &str = "hard_drive";

/// Scans one port of `target` per tick and reports how many it went through.
pub struct PortScan {
    target: String,
    ports: i64,
    scanned: i64,
}

impl StaticTask for PortScan {
    fn descriptor() -> ParameterSet {
        ParameterSet::new()
            .required("target", ArgKind::Text)
            .optional("ports", ArgKind::Int, 3)
            .callback("found", &["target", "open"])
    }

    fn from_arguments(inputs: &Arguments) -> Result<Self, TaskError> {
        let ports = inputs.int("ports")?;
        if ports < 1 {
            return Err(TaskError::failed(format!("cannot scan {} ports", ports)));
        }
        Ok(Self { target: inputs.text("target")?.to_string(), ports, scanned: 0 })
    }

    fn run(&mut self, _ctx: &mut ExecutionContext<'_>) -> Result<Progress, TaskError> {
        Ok(Progress::Continue)
    }

    fn tick(&mut self, ctx: &mut ExecutionContext<'_>) -> Result<Progress, TaskError> {
        self.scanned += 1;
        if self.scanned < self.ports {
            return Ok(Progress::Continue);
        }
        ctx.callback("found", Arguments::new().with("target", self.target.as_str()).with("open", self.scanned));
        Ok(Progress::Finished)
    }
}

/// Starts a scan and relays its result upwards.
#[derive(Default)]
pub struct Shell;

impl TaskExecutor for Shell {
    fn parameters(&self) -> ParameterSet {
        ParameterSet::new()
            .required("target", ArgKind::Text)
            .optional("ports", ArgKind::Int, 3)
            .callback("report", &["target", "open"])
    }

    fn start(&mut self, inputs: &Arguments, ctx: &mut ExecutionContext<'_>) -> Result<Progress, TaskError> {
        let scan = Arguments::new().with("target", inputs.text("target")?).with("ports", inputs.int("ports")?);
        ctx.launch(NETUTILS, "scan", scan);
        Ok(Progress::Continue)
    }

    fn child_callback(
        &mut self,
        _child: Pid,
        name: &str,
        outputs: &Arguments,
        ctx: &mut ExecutionContext<'_>,
    ) -> Result<Progress, TaskError> {
        if name != "found" {
            return Err(TaskError::UnknownCallback(name.to_string()));
        }
        ctx.callback("report", outputs.clone());
        Ok(Progress::Finished)
    }
}

/// Background service that idles until interrupted.
#[derive(Default)]
pub struct Daemon;

impl TaskExecutor for Daemon {
    fn parameters(&self) -> ParameterSet {
        ParameterSet::new()
    }

    fn start(&mut self, _inputs: &Arguments, _ctx: &mut ExecutionContext<'_>) -> Result<Progress, TaskError> {
        Ok(Progress::Continue)
    }

    fn tick(&mut self, ctx: &mut ExecutionContext<'_>) -> Result<Progress, TaskError> {
        if ctx.is_interrupted() {
            return Ok(Progress::Finished);
        }
        Ok(Progress::Continue)
    }
}

pub fn demo_programs() -> ProgramRegistry {
    let mut programs = ProgramRegistry::new();
    programs.register(
        Program::new(NETUTILS, FileRights::public("root"))
            .with_task(TaskDefinition::of_static::<PortScan>("scan"))
            .with_task(TaskDefinition::new("shell", || Box::new(Shell)))
            .with_task(TaskDefinition::new("daemon", || Box::new(Daemon))),
    );
    programs
}

/// Periodic wear on a hard drive, raised as a `disk_wear` event.
pub struct DiskWear {
    wear: i64,
    rng: StdRng,
}

impl DiskWear {
    pub const KIND: &'static str = "disk.wear";
    pub const PERIOD: u32 = 10;

    pub fn new(wear: i64, rng: StdRng) -> Self {
        Self { wear, rng }
    }

    pub fn wear(&self) -> i64 {
        self.wear
    }
}

impl ScheduleTask for DiskWear {
    fn kind(&self) -> &str {
        Self::KIND
    }

    fn execute(&mut self, ctx: &mut TaskContext<'_>) -> Result<(), TaskError> {
        self.wear += self.rng.gen_range(1..=3);
        let drive = ctx
            .world()
            .tree()
            .get(ctx.owner())
            .map(|node| node.name().to_string())
            .unwrap_or_default();
        ctx.emit(WorldEvent::custom("disk_wear", Arguments::new().with("drive", drive).with("wear", self.wear)));
        Ok(())
    }

    fn save(&self) -> Arguments {
        Arguments::new().with("wear", self.wear)
    }
}
