use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use log::{debug, error, warn};
use serde::{Deserialize, Serialize};
use slotmap::{new_key_type, SlotMap};

use crate::error::{LaunchError, ProcessError, RestoreError, RunError, TaskError};
use crate::process::listener::{ProcessStateListener, StateChange, StopOnInterrupt};
use crate::process::rights::{Rights, RightsSource};
use crate::process::{Pid, ProcessState};
use crate::task::executor::{ExecutionContext, Progress, ProgramRegistry};
use crate::task::params::Arguments;
use crate::task::runner::{CallbackRecord, TaskRunner};

/// Pid of the process every tree starts with.
pub const ROOT_PID: Pid = 0;

new_key_type! {
    struct ProcessKey;
}

/// Which program task a process was launched from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskLabel {
    pub program: String,
    pub task: String,
}

pub struct Process {
    pid: Pid,
    state: ProcessState,
    user: String,
    parent: Option<ProcessKey>,
    children: Vec<ProcessKey>,
    label: Option<TaskLabel>,
    runner: Option<TaskRunner>,
    listeners: Vec<Box<dyn ProcessStateListener>>,
}

impl Process {
    fn new(pid: Pid, user: String, parent: Option<ProcessKey>) -> Self {
        Self {
            pid,
            state: ProcessState::Running,
            user,
            parent,
            children: Vec::new(),
            label: None,
            runner: None,
            listeners: Vec::new(),
        }
    }

    pub fn pid(&self) -> Pid {
        self.pid
    }

    pub fn state(&self) -> ProcessState {
        self.state
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn label(&self) -> Option<&TaskLabel> {
        self.label.as_ref()
    }

    pub fn runner(&self) -> Option<&TaskRunner> {
        self.runner.as_ref()
    }

    pub fn child_count(&self) -> usize {
        self.children.len()
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }
}

impl std::fmt::Debug for Process {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Process")
            .field("pid", &self.pid)
            .field("state", &self.state)
            .field("user", &self.user)
            .field("label", &self.label)
            .field("children", &self.children.len())
            .field("runner", &self.runner)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

/// Things that happened inside a tree, drained by the world each tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ProcessEvent {
    StateChanged(StateChange),
    Launched { pid: Pid, parent: Pid, program: String, task: String },
    LaunchRejected { parent: Pid, program: String, task: String, reason: String },
    Failed { pid: Pid, error: String },
    Callback { pid: Pid, name: String, outputs: Arguments },
    Reaped { pid: Pid },
}

#[derive(Debug, Clone)]
pub struct LaunchOptions {
    pub arguments: Arguments,
    /// Attach a [`StopOnInterrupt`] listener to the new process.
    pub stop_on_interrupt: bool,
}

impl LaunchOptions {
    pub fn with_arguments(arguments: Arguments) -> Self {
        Self { arguments, ..Self::default() }
    }
}

impl Default for LaunchOptions {
    fn default() -> Self {
        Self { arguments: Arguments::new(), stop_on_interrupt: true }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ProcessTickReport {
    pub ticked: usize,
    pub finished: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessSnapshot {
    pub pid: Pid,
    pub parent: Option<Pid>,
    pub state: ProcessState,
    pub user: String,
    pub label: Option<TaskLabel>,
}

/// Plain-data image of a tree; parents always precede their children.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessTreeSnapshot {
    pub next_pid: Pid,
    pub processes: Vec<ProcessSnapshot>,
}

/// All processes of one computer.
///
/// Parents own their children; the parent link is a non-owning key into
/// the same arena. Pids are unique among live processes of the tree.
#[derive(Debug)]
pub struct ProcessTree {
    processes: SlotMap<ProcessKey, Process>,
    by_pid: HashMap<Pid, ProcessKey>,
    root: ProcessKey,
    next_pid: Pid,
    tick: u64,
    programs: Arc<ProgramRegistry>,
    journal: Vec<ProcessEvent>,
}

impl ProcessTree {
    pub fn new(root_user: impl Into<String>) -> Self {
        Self::with_root(ROOT_PID, root_user.into(), ProcessState::Running, None)
    }

    fn with_root(pid: Pid, user: String, state: ProcessState, label: Option<TaskLabel>) -> Self {
        let mut processes = SlotMap::with_key();
        let mut root = Process::new(pid, user, None);
        root.state = state;
        root.label = label;
        let root = processes.insert(root);
        Self {
            processes,
            by_pid: HashMap::from([(pid, root)]),
            root,
            next_pid: pid.wrapping_add(1),
            tick: 0,
            programs: Arc::new(ProgramRegistry::new()),
            journal: Vec::new(),
        }
    }

    /// Programs that `launch` resolves names against.
    pub fn with_programs(mut self, programs: Arc<ProgramRegistry>) -> Self {
        self.programs = programs;
        self
    }

    pub fn root_pid(&self) -> Pid {
        self.processes[self.root].pid
    }

    pub fn get(&self, pid: Pid) -> Option<&Process> {
        self.by_pid.get(&pid).map(|key| &self.processes[*key])
    }

    pub fn state(&self, pid: Pid) -> Option<ProcessState> {
        self.get(pid).map(Process::state)
    }

    pub fn contains(&self, pid: Pid) -> bool {
        self.by_pid.contains_key(&pid)
    }

    pub fn len(&self) -> usize {
        self.processes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processes.is_empty()
    }

    pub fn next_pid(&self) -> Pid {
        self.next_pid
    }

    /// Moves the pid counter. Pids still in use are skipped on allocation.
    pub fn set_next_pid(&mut self, next: Pid) {
        self.next_pid = next;
    }

    pub fn parent_of(&self, pid: Pid) -> Option<Pid> {
        let process = self.get(pid)?;
        process.parent.map(|key| self.processes[key].pid)
    }

    pub fn children_of(&self, pid: Pid) -> Vec<Pid> {
        self.get(pid)
            .map(|p| p.children.iter().map(|key| self.processes[*key].pid).collect())
            .unwrap_or_default()
    }

    /// Every descendant of `pid`, pre-order, without `pid` itself.
    pub fn descendants(&self, pid: Pid) -> Vec<Pid> {
        match self.by_pid.get(&pid) {
            Some(key) => self.descendant_keys(*key).into_iter().map(|k| self.processes[k].pid).collect(),
            None => Vec::new(),
        }
    }

    /// All pids, root first, parents before children.
    pub fn pids(&self) -> Vec<Pid> {
        let mut pids = vec![self.root_pid()];
        pids.extend(self.descendants(self.root_pid()));
        pids
    }

    fn descendant_keys(&self, key: ProcessKey) -> Vec<ProcessKey> {
        let mut out = Vec::new();
        let mut stack: Vec<ProcessKey> = self.processes[key].children.iter().rev().copied().collect();
        while let Some(next) = stack.pop() {
            out.push(next);
            stack.extend(self.processes[next].children.iter().rev().copied());
        }
        out
    }

    fn key(&self, pid: Pid) -> Result<ProcessKey, ProcessError> {
        self.by_pid.get(&pid).copied().ok_or(ProcessError::UnknownProcess(pid))
    }

    fn allocate_pid(&mut self) -> Pid {
        loop {
            let pid = self.next_pid;
            self.next_pid = self.next_pid.wrapping_add(1);
            if !self.by_pid.contains_key(&pid) {
                return pid;
            }
        }
    }

    /// Creates a bare child process. Only running parents may spawn.
    pub fn create_child(&mut self, parent: Pid, user: impl Into<String>) -> Result<Pid, ProcessError> {
        let parent_key = self.key(parent)?;
        let state = self.processes[parent_key].state;
        if state != ProcessState::Running {
            return Err(ProcessError::ParentNotRunning { pid: parent, state });
        }

        let pid = self.allocate_pid();
        let key = self.processes.insert(Process::new(pid, user.into(), Some(parent_key)));
        self.processes[parent_key].children.push(key);
        self.by_pid.insert(pid, key);
        debug!("Process {} spawned child {}", parent, pid);
        Ok(pid)
    }

    pub fn add_listener(
        &mut self,
        pid: Pid,
        listener: impl ProcessStateListener + 'static,
    ) -> Result<(), ProcessError> {
        let key = self.key(pid)?;
        self.processes[key].listeners.push(Box::new(listener));
        Ok(())
    }

    pub fn set_state(&mut self, pid: Pid, next: ProcessState) -> Result<(), ProcessError> {
        let key = self.key(pid)?;
        self.transition(key, next)
    }

    pub fn suspend(&mut self, pid: Pid) -> Result<(), ProcessError> {
        self.set_state(pid, ProcessState::Suspended)
    }

    pub fn resume(&mut self, pid: Pid) -> Result<(), ProcessError> {
        self.set_state(pid, ProcessState::Running)
    }

    /// Requests a cooperative shutdown of `pid`, and of all its descendants
    /// when `recursive` is set.
    pub fn interrupt(&mut self, pid: Pid, recursive: bool) -> Result<(), ProcessError> {
        self.apply_to_tree(pid, recursive, ProcessState::Interrupted)
    }

    /// Stops `pid`, and all its descendants when `cascade` is set.
    pub fn stop(&mut self, pid: Pid, cascade: bool) -> Result<(), ProcessError> {
        self.apply_to_tree(pid, cascade, ProcessState::Stopped)
    }

    fn apply_to_tree(&mut self, pid: Pid, recursive: bool, state: ProcessState) -> Result<(), ProcessError> {
        let key = self.key(pid)?;
        self.transition(key, state)?;
        if recursive {
            for descendant in self.descendant_keys(key) {
                if self.processes[descendant].state.is_terminal() {
                    continue;
                }
                if let Err(err) = self.transition(descendant, state) {
                    warn!("Could not move descendant of {} to {:?}: {}", pid, state, err);
                }
            }
        }
        Ok(())
    }

    fn transition(&mut self, key: ProcessKey, next: ProcessState) -> Result<(), ProcessError> {
        let process = &mut self.processes[key];
        let (pid, old) = (process.pid, process.state);
        if old.is_terminal() {
            return Err(ProcessError::Terminal(pid));
        }
        if old == next {
            return Ok(());
        }
        if !old.can_transition_to(next) {
            return Err(ProcessError::InvalidTransition { pid, from: old, to: next });
        }

        process.state = next;
        let change = StateChange { pid, old, new: next };
        self.journal.push(ProcessEvent::StateChanged(change));

        let mut listeners = std::mem::take(&mut process.listeners);
        let mut follow_up = None;
        for listener in listeners.iter_mut() {
            if let Some(state) = listener.state_changed(&change) {
                follow_up.get_or_insert(state);
            }
        }
        self.processes[key].listeners = listeners;

        if let Some(state) = follow_up.filter(|s| *s != next) {
            if let Err(err) = self.transition(key, state) {
                warn!("Listener follow-up for process {} rejected: {}", pid, err);
            }
        }
        Ok(())
    }

    /// Starts `task` of `program` as a child of `parent`, running as `user`.
    ///
    /// The user needs read and execute rights on the program. On any failure
    /// no process is left behind and a `LaunchRejected` event is journaled.
    pub fn launch(
        &mut self,
        parent: Pid,
        user: &str,
        program: &str,
        task: &str,
        options: LaunchOptions,
    ) -> Result<Pid, LaunchError> {
        let result = self.try_launch(parent, user, program, task, options);
        if let Err(err) = &result {
            debug!("Launch of {}:{} under {} rejected: {}", program, task, parent, err);
            self.journal.push(ProcessEvent::LaunchRejected {
                parent,
                program: program.to_string(),
                task: task.to_string(),
                reason: err.to_string(),
            });
        }
        result
    }

    fn try_launch(
        &mut self,
        parent: Pid,
        user: &str,
        program_name: &str,
        task: &str,
        options: LaunchOptions,
    ) -> Result<Pid, LaunchError> {
        let programs = Arc::clone(&self.programs);
        let program = programs
            .get(program_name)
            .ok_or_else(|| LaunchError::UnknownProgram(program_name.to_string()))?;
        let definition = program.task(task).ok_or_else(|| LaunchError::UnknownTask {
            program: program_name.to_string(),
            task: task.to_string(),
        })?;
        program.check_rights(user, Rights::READ_EXECUTE)?;

        let pid = self.create_child(parent, user)?;
        let key = self.by_pid[&pid];
        let process = &mut self.processes[key];
        process.label = Some(TaskLabel { program: program_name.to_string(), task: task.to_string() });
        process.runner = Some(TaskRunner::with_arguments(options.arguments));
        if options.stop_on_interrupt {
            process.listeners.push(Box::new(StopOnInterrupt));
        }

        // Rolled back together with the child if its run fails.
        let journaled = self.journal.len();
        self.journal.push(ProcessEvent::Launched {
            pid,
            parent,
            program: program_name.to_string(),
            task: task.to_string(),
        });

        match self.drive(pid, |runner, ctx| runner.run(definition, ctx)) {
            Ok(progress) => {
                if progress == Progress::Finished {
                    self.stop_quietly(pid);
                }
                Ok(pid)
            }
            Err(err) => {
                self.journal.truncate(journaled);
                self.discard(key);
                Err(LaunchError::Run(err))
            }
        }
    }

    /// Ticks every active process that runs a task, parents first.
    pub fn tick(&mut self, tick: u64) -> ProcessTickReport {
        self.tick = tick;
        let mut report = ProcessTickReport::default();
        for pid in self.pids() {
            let eligible = self
                .get(pid)
                .is_some_and(|p| p.state.is_active() && p.runner.as_ref().is_some_and(TaskRunner::is_bound));
            if !eligible {
                continue;
            }
            report.ticked += 1;
            let outcome = self.drive(pid, |runner, ctx| runner.tick(ctx));
            match &outcome {
                Ok(Progress::Finished) => report.finished += 1,
                Err(_) => report.failed += 1,
                Ok(Progress::Continue) => {}
            }
            self.settle(pid, outcome);
        }
        report
    }

    /// Runs one call against the runner of `pid` and applies its side effects:
    /// callbacks travel to the parent, launch requests become children.
    /// Effects of a failed call are discarded.
    fn drive<F>(&mut self, pid: Pid, call: F) -> Result<Progress, RunError>
    where
        F: FnOnce(&mut TaskRunner, &mut ExecutionContext<'_>) -> Result<Progress, RunError>,
    {
        let key = self.by_pid.get(&pid).copied().ok_or(RunError::NotBound)?;
        let process = &mut self.processes[key];
        let mut runner = process.runner.take().ok_or(RunError::NotBound)?;
        let user = process.user.clone();
        let mut ctx = ExecutionContext::new(pid, &user, self.tick, process.state);

        let outcome = catch_unwind(AssertUnwindSafe(|| call(&mut runner, &mut ctx)))
            .unwrap_or_else(|payload| Err(RunError::Task(TaskError::from_panic(payload))));

        let callbacks = runner.take_callbacks();
        let launches = ctx.take_launches();
        if let Some(process) = self.processes.get_mut(key) {
            process.runner = Some(runner);
        }
        if outcome.is_err() {
            return outcome;
        }

        for record in callbacks {
            self.journal.push(ProcessEvent::Callback {
                pid,
                name: record.name.clone(),
                outputs: record.outputs.clone(),
            });
            self.deliver_to_parent(pid, &record);
        }
        for request in launches {
            // Rejections are journaled by launch itself.
            let _ = self.launch(
                pid,
                &user,
                &request.program,
                &request.task,
                LaunchOptions::with_arguments(request.arguments),
            );
        }
        outcome
    }

    fn deliver_to_parent(&mut self, child: Pid, record: &CallbackRecord) {
        let Some(parent) = self.parent_of(child) else {
            return;
        };
        let listening = self
            .get(parent)
            .is_some_and(|p| p.state.is_active() && p.runner.as_ref().is_some_and(TaskRunner::is_bound));
        if !listening {
            return;
        }
        let outcome = self.drive(parent, |runner, ctx| {
            runner.child_callback(child, &record.name, &record.outputs, ctx)
        });
        self.settle(parent, outcome);
    }

    fn settle(&mut self, pid: Pid, outcome: Result<Progress, RunError>) {
        match outcome {
            Ok(Progress::Continue) => {}
            Ok(Progress::Finished) => self.stop_quietly(pid),
            Err(err) => {
                error!("Process {} failed: {}", pid, err);
                self.journal.push(ProcessEvent::Failed { pid, error: err.to_string() });
                self.stop_quietly(pid);
            }
        }
    }

    fn stop_quietly(&mut self, pid: Pid) {
        if self.state(pid).is_some_and(|s| !s.is_terminal()) {
            let _ = self.set_state(pid, ProcessState::Stopped);
        }
    }

    /// Removes a process that never got going. It must not have children.
    fn discard(&mut self, key: ProcessKey) {
        if let Some(process) = self.processes.remove(key) {
            self.by_pid.remove(&process.pid);
            if let Some(parent) = process.parent.and_then(|p| self.processes.get_mut(p)) {
                parent.children.retain(|c| *c != key);
            }
        }
    }

    /// Removes stopped processes (never the root). Live children of a reaped
    /// process move to its parent.
    pub fn reap(&mut self) -> Vec<Pid> {
        let stopped: Vec<ProcessKey> = self
            .processes
            .iter()
            .filter(|(key, p)| *key != self.root && p.state.is_terminal())
            .map(|(key, _)| key)
            .collect();

        let mut reaped = Vec::with_capacity(stopped.len());
        for key in stopped {
            let Some(process) = self.processes.remove(key) else {
                continue;
            };
            self.by_pid.remove(&process.pid);
            // Non-root processes always have a parent.
            let parent_key = process.parent.unwrap_or(self.root);
            if let Some(parent) = self.processes.get_mut(parent_key) {
                parent.children.retain(|c| *c != key);
                parent.children.extend(process.children.iter().copied());
            }
            for child in &process.children {
                if let Some(child) = self.processes.get_mut(*child) {
                    child.parent = Some(parent_key);
                }
            }
            self.journal.push(ProcessEvent::Reaped { pid: process.pid });
            reaped.push(process.pid);
        }
        if !reaped.is_empty() {
            debug!("Reaped {} processes", reaped.len());
        }
        reaped
    }

    pub fn journal(&self) -> &[ProcessEvent] {
        &self.journal
    }

    pub fn drain_journal(&mut self) -> Vec<ProcessEvent> {
        std::mem::take(&mut self.journal)
    }

    pub fn snapshot(&self) -> ProcessTreeSnapshot {
        let processes = self
            .pids()
            .into_iter()
            .filter_map(|pid| {
                let p = self.get(pid)?;
                Some(ProcessSnapshot {
                    pid,
                    parent: self.parent_of(pid),
                    state: p.state,
                    user: p.user.clone(),
                    label: p.label.clone(),
                })
            })
            .collect();
        ProcessTreeSnapshot { next_pid: self.next_pid, processes }
    }

    /// Rebuilds the tree structure. Restored processes carry no runner or
    /// listeners; the caller re-attaches behavior.
    pub fn restore(snapshot: &ProcessTreeSnapshot) -> Result<Self, RestoreError> {
        let mut entries = snapshot.processes.iter();
        let root = entries
            .next()
            .ok_or_else(|| RestoreError::Inconsistent("no root process".to_string()))?;
        if root.parent.is_some() {
            return Err(RestoreError::Inconsistent(format!("root {} has a parent", root.pid)));
        }

        let mut tree = Self::with_root(root.pid, root.user.clone(), root.state, root.label.clone());
        for entry in entries {
            let parent = entry
                .parent
                .ok_or_else(|| RestoreError::Inconsistent(format!("second root {}", entry.pid)))?;
            let parent_key = *tree.by_pid.get(&parent).ok_or_else(|| {
                RestoreError::Inconsistent(format!("parent {} of {} not seen yet", parent, entry.pid))
            })?;
            if tree.by_pid.contains_key(&entry.pid) {
                return Err(RestoreError::Inconsistent(format!("duplicate pid {}", entry.pid)));
            }
            let mut process = Process::new(entry.pid, entry.user.clone(), Some(parent_key));
            process.state = entry.state;
            process.label = entry.label.clone();
            let key = tree.processes.insert(process);
            tree.processes[parent_key].children.push(key);
            tree.by_pid.insert(entry.pid, key);
        }
        tree.next_pid = snapshot.next_pid;
        Ok(tree)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::listener::FnListener;
    use std::sync::Mutex;

    #[test]
    fn pids_are_allocated_from_the_tree_counter() {
        let mut tree = ProcessTree::new("root");
        let a = tree.create_child(ROOT_PID, "root").unwrap();
        let b = tree.create_child(a, "root").unwrap();
        assert_eq!((a, b), (1, 2));
        assert_eq!(tree.parent_of(b), Some(a));
        assert_eq!(tree.children_of(ROOT_PID), vec![a]);
    }

    #[test]
    fn bumped_counter_is_used_next() {
        let mut tree = ProcessTree::new("root");
        for _ in 0..4 {
            tree.create_child(ROOT_PID, "root").unwrap();
        }
        assert_eq!(tree.next_pid(), 5);

        tree.set_next_pid(10);
        let pids: Vec<Pid> = (0..3).map(|_| tree.create_child(ROOT_PID, "root").unwrap()).collect();
        assert_eq!(pids, vec![10, 11, 12]);
    }

    #[test]
    fn allocation_skips_live_pids() {
        let mut tree = ProcessTree::new("root");
        let a = tree.create_child(ROOT_PID, "root").unwrap();
        tree.set_next_pid(0);
        let b = tree.create_child(ROOT_PID, "root").unwrap();
        assert_ne!(b, a);
        assert_ne!(b, ROOT_PID);
        assert_eq!(b, 2);
    }

    #[test]
    fn only_running_parents_spawn() {
        let mut tree = ProcessTree::new("root");
        let a = tree.create_child(ROOT_PID, "root").unwrap();
        tree.suspend(a).unwrap();
        assert!(matches!(
            tree.create_child(a, "root"),
            Err(ProcessError::ParentNotRunning { state: ProcessState::Suspended, .. })
        ));

        tree.interrupt(a, false).unwrap();
        assert!(tree.create_child(a, "root").is_err());
        assert!(matches!(tree.create_child(99, "root"), Err(ProcessError::UnknownProcess(99))));
    }

    #[test]
    fn recursive_interrupt_reaches_every_descendant() {
        let mut tree = ProcessTree::new("root");
        let a = tree.create_child(ROOT_PID, "root").unwrap();
        let b = tree.create_child(a, "root").unwrap();
        let c = tree.create_child(b, "root").unwrap();

        tree.interrupt(a, true).unwrap();
        for pid in [a, b, c] {
            assert_eq!(tree.state(pid), Some(ProcessState::Interrupted));
        }
        assert_eq!(tree.state(ROOT_PID), Some(ProcessState::Running));
    }

    #[test]
    fn flat_interrupt_leaves_children_running() {
        let mut tree = ProcessTree::new("root");
        let a = tree.create_child(ROOT_PID, "root").unwrap();
        let b = tree.create_child(a, "root").unwrap();

        tree.interrupt(a, false).unwrap();
        assert_eq!(tree.state(a), Some(ProcessState::Interrupted));
        assert_eq!(tree.state(b), Some(ProcessState::Running));
    }

    #[test]
    fn stopped_is_terminal() {
        let mut tree = ProcessTree::new("root");
        let a = tree.create_child(ROOT_PID, "root").unwrap();
        tree.stop(a, false).unwrap();

        for next in [ProcessState::Running, ProcessState::Suspended, ProcessState::Interrupted, ProcessState::Stopped] {
            assert_eq!(tree.set_state(a, next), Err(ProcessError::Terminal(a)));
        }
        assert_eq!(tree.interrupt(a, true), Err(ProcessError::Terminal(a)));
    }

    #[test]
    fn cascade_stop_skips_already_stopped_descendants() {
        let mut tree = ProcessTree::new("root");
        let a = tree.create_child(ROOT_PID, "root").unwrap();
        let b = tree.create_child(a, "root").unwrap();
        let c = tree.create_child(a, "root").unwrap();
        tree.stop(b, false).unwrap();

        tree.stop(a, true).unwrap();
        assert_eq!(tree.state(c), Some(ProcessState::Stopped));
    }

    #[test]
    fn listeners_see_every_transition_and_stop_on_interrupt_chains() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut tree = ProcessTree::new("root");
        let a = tree.create_child(ROOT_PID, "root").unwrap();

        let log = Arc::clone(&seen);
        tree.add_listener(a, FnListener(move |change: &StateChange| {
            log.lock().unwrap().push((change.old, change.new));
            None
        }))
        .unwrap();
        tree.add_listener(a, StopOnInterrupt).unwrap();

        tree.interrupt(a, false).unwrap();
        assert_eq!(tree.state(a), Some(ProcessState::Stopped));
        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                (ProcessState::Running, ProcessState::Interrupted),
                (ProcessState::Interrupted, ProcessState::Stopped),
            ]
        );
    }

    #[test]
    fn reaping_reparents_live_children() {
        let mut tree = ProcessTree::new("root");
        let a = tree.create_child(ROOT_PID, "root").unwrap();
        let b = tree.create_child(a, "root").unwrap();
        tree.stop(a, false).unwrap();

        assert_eq!(tree.reap(), vec![a]);
        assert!(!tree.contains(a));
        assert_eq!(tree.parent_of(b), Some(ROOT_PID));
        assert_eq!(tree.children_of(ROOT_PID), vec![b]);
        assert!(tree.drain_journal().contains(&ProcessEvent::Reaped { pid: a }));
    }

    #[test]
    fn reaping_never_removes_the_root() {
        let mut tree = ProcessTree::new("root");
        tree.stop(ROOT_PID, true).unwrap();
        assert!(tree.reap().is_empty());
        assert_eq!(tree.len(), 1);
    }

    #[test]
    fn snapshot_restores_structure_and_counter() {
        let mut tree = ProcessTree::new("root");
        let a = tree.create_child(ROOT_PID, "alice").unwrap();
        let b = tree.create_child(a, "alice").unwrap();
        tree.suspend(b).unwrap();
        tree.set_next_pid(40);

        let snapshot = tree.snapshot();
        let json = serde_json::to_string(&snapshot).unwrap();
        let restored = ProcessTree::restore(&serde_json::from_str(&json).unwrap()).unwrap();

        assert_eq!(restored.snapshot(), snapshot);
        assert_eq!(restored.state(b), Some(ProcessState::Suspended));
        assert_eq!(restored.get(a).unwrap().user(), "alice");
        assert_eq!(restored.next_pid(), 40);
    }

    #[test]
    fn restore_rejects_orphans() {
        let snapshot = ProcessTreeSnapshot {
            next_pid: 3,
            processes: vec![
                ProcessSnapshot { pid: 0, parent: None, state: ProcessState::Running, user: "root".into(), label: None },
                ProcessSnapshot { pid: 2, parent: Some(1), state: ProcessState::Running, user: "root".into(), label: None },
            ],
        };
        assert!(matches!(ProcessTree::restore(&snapshot), Err(RestoreError::Inconsistent(_))));
    }
}
