use std::sync::{Arc, Mutex};

use disconnected_core::process::{FileRights, Rights, ROOT_PID};
use disconnected_core::task::{ArgKind, ExecutionContext};
use disconnected_core::{
    Arguments, EngineContext, LaunchError, LaunchOptions, NodeId, ParameterSet, Pid, ProcessError, ProcessEvent,
    ProcessState, Program, ProgramRegistry, Progress, RunError, TaskDefinition, TaskError, TaskExecutor, World,
    WorldEvent,
};

type Inbox = Arc<Mutex<Vec<(Pid, String, Arguments)>>>;

/// Counts down `steps` ticks, then reports `done`.
struct Countdown {
    steps: i64,
    left: i64,
}

impl TaskExecutor for Countdown {
    fn parameters(&self) -> ParameterSet {
        ParameterSet::new().required("steps", ArgKind::Int).callback("done", &["steps"])
    }

    fn start(&mut self, inputs: &Arguments, _ctx: &mut ExecutionContext<'_>) -> Result<Progress, TaskError> {
        self.steps = inputs.int("steps")?;
        self.left = self.steps;
        Ok(Progress::Continue)
    }

    fn tick(&mut self, ctx: &mut ExecutionContext<'_>) -> Result<Progress, TaskError> {
        self.left -= 1;
        if self.left > 0 {
            return Ok(Progress::Continue);
        }
        ctx.callback("done", Arguments::new().with("steps", self.steps));
        Ok(Progress::Finished)
    }
}

/// Launches a countdown child and finishes once it reports back.
struct Supervisor {
    inbox: Inbox,
}

impl TaskExecutor for Supervisor {
    fn parameters(&self) -> ParameterSet {
        ParameterSet::new().optional("steps", ArgKind::Int, 2)
    }

    fn start(&mut self, inputs: &Arguments, ctx: &mut ExecutionContext<'_>) -> Result<Progress, TaskError> {
        ctx.launch("tools", "countdown", Arguments::new().with("steps", inputs.int("steps")?));
        Ok(Progress::Continue)
    }

    fn child_callback(
        &mut self,
        child: Pid,
        name: &str,
        outputs: &Arguments,
        _ctx: &mut ExecutionContext<'_>,
    ) -> Result<Progress, TaskError> {
        self.inbox.lock().unwrap().push((child, name.to_string(), outputs.clone()));
        Ok(Progress::Finished)
    }
}

/// Runs until interrupted.
struct Daemon;

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

struct Crash;

impl TaskExecutor for Crash {
    fn parameters(&self) -> ParameterSet {
        ParameterSet::new()
    }

    fn start(&mut self, _inputs: &Arguments, _ctx: &mut ExecutionContext<'_>) -> Result<Progress, TaskError> {
        Ok(Progress::Continue)
    }

    fn tick(&mut self, _ctx: &mut ExecutionContext<'_>) -> Result<Progress, TaskError> {
        panic!("segfault in the simulation")
    }
}

fn setup() -> (World, NodeId, Inbox) {
    let inbox = Inbox::default();
    let supervisor_inbox = Arc::clone(&inbox);

    let tools = Program::new("tools", FileRights::public("root"))
        .with_task(TaskDefinition::new("countdown", || Box::new(Countdown { steps: 0, left: 0 })))
        .with_task(TaskDefinition::new("supervisor", move || {
            Box::new(Supervisor { inbox: Arc::clone(&supervisor_inbox) })
        }))
        .with_task(TaskDefinition::new("daemon", || Box::new(Daemon)))
        .with_task(TaskDefinition::new("crash", || Box::new(Crash)));
    let secret = Program::new("secret", FileRights::new("root", Rights::ALL, Rights::NONE))
        .with_task(TaskDefinition::new("daemon", || Box::new(Daemon)));

    let mut programs = ProgramRegistry::new();
    programs.register(tools);
    programs.register(secret);

    let mut world = World::new(Arc::new(EngineContext::with_defaults().with_programs(programs)));
    let root = world.root();
    let pc = world.add_computer(root, "pc", "root").unwrap();
    (world, pc, inbox)
}

fn process_events(world: &mut World) -> Vec<ProcessEvent> {
    world
        .drain_events()
        .into_iter()
        .filter_map(|e| match e {
            WorldEvent::Process { event, .. } => Some(event),
            _ => None,
        })
        .collect()
}

#[test]
fn child_callback_reaches_the_parent_and_both_get_reaped() {
    let (mut world, pc, inbox) = setup();
    let supervisor = world
        .computer_mut(pc)
        .unwrap()
        .launch(ROOT_PID, "root", "tools", "supervisor", LaunchOptions::default())
        .unwrap();
    let tree = world.processes(pc).unwrap();
    let children = tree.children_of(supervisor);
    assert_eq!(children.len(), 1);
    let worker = children[0];

    world.tick();
    assert!(inbox.lock().unwrap().is_empty());
    assert_eq!(world.processes(pc).unwrap().state(worker), Some(ProcessState::Running));

    world.tick();
    let received = inbox.lock().unwrap().clone();
    assert_eq!(received.len(), 1);
    assert_eq!((received[0].0, received[0].1.as_str()), (worker, "done"));
    assert_eq!(received[0].2.int("steps").unwrap(), 2);

    let tree = world.processes(pc).unwrap();
    assert_eq!(tree.len(), 1);
    assert!(!tree.contains(supervisor));

    let events = process_events(&mut world);
    assert!(events.contains(&ProcessEvent::Reaped { pid: worker }));
    assert!(events.contains(&ProcessEvent::Reaped { pid: supervisor }));
    assert!(events.iter().any(|e| matches!(e, ProcessEvent::Callback { pid, name, .. } if *pid == worker && name == "done")));
}

#[test]
fn launch_without_rights_leaves_nothing_behind() {
    let (mut world, pc, _) = setup();
    let tree = world.computer_mut(pc).unwrap();
    let err = tree.launch(ROOT_PID, "guest", "secret", "daemon", LaunchOptions::default()).unwrap_err();

    assert!(matches!(err, LaunchError::Rights(_)));
    assert_eq!(err.to_string(), "user 'guest' lacks r-x on 'secret'");
    assert_eq!(tree.len(), 1);
    assert!(tree.launch(ROOT_PID, "root", "secret", "daemon", LaunchOptions::default()).is_ok());

    let events = process_events(&mut world);
    assert!(events.iter().any(|e| matches!(e, ProcessEvent::LaunchRejected { program, .. } if program == "secret")));
}

#[test]
fn missing_argument_is_reported_and_the_process_discarded() {
    let (mut world, pc, _) = setup();
    let tree = world.computer_mut(pc).unwrap();
    let err = tree.launch(ROOT_PID, "root", "tools", "countdown", LaunchOptions::default()).unwrap_err();

    assert_eq!(err, LaunchError::Run(RunError::Task(TaskError::MissingArgument("steps".to_string()))));
    assert_eq!(tree.len(), 1);

    let events = process_events(&mut world);
    assert!(!events.iter().any(|e| matches!(e, ProcessEvent::Launched { .. })));
    assert!(events
        .iter()
        .any(|e| matches!(e, ProcessEvent::LaunchRejected { task, reason, .. } if task == "countdown" && reason.contains("steps"))));
}

#[test]
fn unknown_program_and_task_are_rejected() {
    let (mut world, pc, _) = setup();
    let tree = world.computer_mut(pc).unwrap();
    assert_eq!(
        tree.launch(ROOT_PID, "root", "nmap", "scan", LaunchOptions::default()),
        Err(LaunchError::UnknownProgram("nmap".to_string()))
    );
    assert!(matches!(
        tree.launch(ROOT_PID, "root", "tools", "scan", LaunchOptions::default()),
        Err(LaunchError::UnknownTask { .. })
    ));
}

#[test]
fn suspended_parent_cannot_launch() {
    let (mut world, pc, _) = setup();
    let tree = world.computer_mut(pc).unwrap();
    let daemon = tree.launch(ROOT_PID, "root", "tools", "daemon", LaunchOptions::default()).unwrap();
    tree.suspend(daemon).unwrap();

    assert_eq!(
        tree.launch(daemon, "root", "tools", "daemon", LaunchOptions::default()),
        Err(LaunchError::Process(ProcessError::ParentNotRunning { pid: daemon, state: ProcessState::Suspended }))
    );
}

#[test]
fn suspended_processes_do_not_tick() {
    let (mut world, pc, _) = setup();
    let tree = world.computer_mut(pc).unwrap();
    let args = Arguments::new().with("steps", 1);
    let worker = tree.launch(ROOT_PID, "root", "tools", "countdown", LaunchOptions::with_arguments(args)).unwrap();
    tree.suspend(worker).unwrap();

    world.tick();
    world.tick();
    assert_eq!(world.processes(pc).unwrap().state(worker), Some(ProcessState::Suspended));

    world.computer_mut(pc).unwrap().resume(worker).unwrap();
    world.tick();
    assert!(!world.processes(pc).unwrap().contains(worker));
}

#[test]
fn interrupt_stops_through_the_listener_or_the_task_itself() {
    let (mut world, pc, _) = setup();
    let tree = world.computer_mut(pc).unwrap();
    let listened = tree.launch(ROOT_PID, "root", "tools", "daemon", LaunchOptions::default()).unwrap();
    let manual = tree
        .launch(
            ROOT_PID,
            "root",
            "tools",
            "daemon",
            LaunchOptions { stop_on_interrupt: false, ..LaunchOptions::default() },
        )
        .unwrap();

    tree.interrupt(listened, false).unwrap();
    tree.interrupt(manual, false).unwrap();
    assert_eq!(tree.state(listened), Some(ProcessState::Stopped));
    assert_eq!(tree.state(manual), Some(ProcessState::Interrupted));

    world.tick();
    let tree = world.processes(pc).unwrap();
    assert!(!tree.contains(listened));
    assert!(!tree.contains(manual));
}

#[test]
fn crashing_process_is_stopped_without_hurting_its_siblings() {
    let (mut world, pc, _) = setup();
    let tree = world.computer_mut(pc).unwrap();
    let crash = tree.launch(ROOT_PID, "root", "tools", "crash", LaunchOptions::default()).unwrap();
    let daemon = tree.launch(ROOT_PID, "root", "tools", "daemon", LaunchOptions::default()).unwrap();
    tree.drain_journal();

    let report = tree.tick(1);
    assert_eq!((report.ticked, report.failed), (2, 1));
    assert_eq!(tree.state(crash), Some(ProcessState::Stopped));
    assert_eq!(tree.state(daemon), Some(ProcessState::Running));
    assert!(tree
        .drain_journal()
        .iter()
        .any(|e| matches!(e, ProcessEvent::Failed { pid, error } if *pid == crash && error.contains("segfault"))));
}

#[test]
fn recursive_interrupt_of_a_launched_subtree() {
    let (mut world, pc, _) = setup();
    let tree = world.computer_mut(pc).unwrap();
    let supervisor = tree.launch(ROOT_PID, "root", "tools", "supervisor", LaunchOptions::default()).unwrap();
    let worker = tree.children_of(supervisor)[0];

    tree.interrupt(supervisor, true).unwrap();
    assert_eq!(tree.state(supervisor), Some(ProcessState::Stopped));
    assert_eq!(tree.state(worker), Some(ProcessState::Stopped));
}
