use std::collections::HashMap;
use std::sync::Arc;

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use slotmap::{new_key_type, SlotMap};

use crate::context::EngineContext;
use crate::error::{RestoreError, ScheduleError, WorldError};
use crate::event::WorldEvent;
use crate::process::{ProcessTree, ProcessTreeSnapshot};
use crate::schedule::registry::SchedulerRegistry;
use crate::schedule::scheduler::{ScheduleTaskContext, Scheduler, SchedulerSnapshot, UpdateReport};
use crate::schedule::task::ScheduleTask;

/// Kind of the node every world starts with.
pub const WORLD: &str = "world";
/// Kind of nodes that own a process tree.
pub const COMPUTER: &str = "computer";

new_key_type! {
    pub struct NodeId;
}

#[derive(Debug, Clone)]
pub struct Node {
    kind: String,
    name: String,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

impl Node {
    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }
}

/// The simulation object graph: computers, hardware, networks.
///
/// Detached nodes stay in the arena without a parent until removed.
#[derive(Debug)]
pub struct WorldTree {
    nodes: SlotMap<NodeId, Node>,
    root: NodeId,
}

impl WorldTree {
    pub fn new() -> Self {
        let mut nodes = SlotMap::with_key();
        let root = nodes.insert(Node {
            kind: WORLD.to_string(),
            name: WORLD.to_string(),
            parent: None,
            children: Vec::new(),
        });
        Self { nodes, root }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn get(&self, node: NodeId) -> Option<&Node> {
        self.nodes.get(node)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn add(&mut self, parent: NodeId, kind: impl Into<String>, name: impl Into<String>) -> Result<NodeId, WorldError> {
        if !self.nodes.contains_key(parent) {
            return Err(WorldError::UnknownNode);
        }
        let node = self.nodes.insert(Node {
            kind: kind.into(),
            name: name.into(),
            parent: Some(parent),
            children: Vec::new(),
        });
        self.nodes[parent].children.push(node);
        Ok(node)
    }

    /// Cuts `node` loose from its parent. The node and its subtree stay in the
    /// arena but are no longer reachable from the root.
    pub fn detach(&mut self, node: NodeId) -> Result<(), WorldError> {
        if node == self.root {
            return Err(WorldError::RootNode);
        }
        let parent = self.nodes.get_mut(node).ok_or(WorldError::UnknownNode)?.parent.take();
        if let Some(parent) = parent.and_then(|p| self.nodes.get_mut(p)) {
            parent.children.retain(|c| *c != node);
        }
        Ok(())
    }

    /// Deletes `node` and everything below it. Returns the deleted ids, `node` first.
    pub fn remove(&mut self, node: NodeId) -> Result<Vec<NodeId>, WorldError> {
        self.detach(node)?;
        let removed = self.subtree(node);
        for id in &removed {
            self.nodes.remove(*id);
        }
        Ok(removed)
    }

    /// `node` and its descendants, pre-order.
    pub fn subtree(&self, node: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![node];
        while let Some(next) = stack.pop() {
            let Some(n) = self.nodes.get(next) else {
                continue;
            };
            out.push(next);
            stack.extend(n.children.iter().rev().copied());
        }
        out
    }

    pub fn is_reachable(&self, node: NodeId) -> bool {
        let mut current = node;
        loop {
            if current == self.root {
                return true;
            }
            match self.nodes.get(current).and_then(|n| n.parent) {
                Some(parent) => current = parent,
                None => return false,
            }
        }
    }
}

impl Default for WorldTree {
    fn default() -> Self {
        Self::new()
    }
}

/// Counters for one world tick.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickReport {
    pub tick: u64,
    pub executed: usize,
    pub failed: usize,
    pub pruned: usize,
}

/// Everything the tick thread owns: the node tree, schedulers, process trees
/// and the outbox of events waiting to be relayed.
#[derive(Debug)]
pub struct World {
    context: Arc<EngineContext>,
    tree: WorldTree,
    schedulers: SchedulerRegistry,
    computers: HashMap<NodeId, ProcessTree>,
    outbox: Vec<WorldEvent>,
    tick: u64,
}

impl World {
    pub fn new(context: Arc<EngineContext>) -> Self {
        Self {
            context,
            tree: WorldTree::new(),
            schedulers: SchedulerRegistry::new(),
            computers: HashMap::new(),
            outbox: Vec::new(),
            tick: 0,
        }
    }

    pub fn context(&self) -> &Arc<EngineContext> {
        &self.context
    }

    pub fn tree(&self) -> &WorldTree {
        &self.tree
    }

    pub fn root(&self) -> NodeId {
        self.tree.root()
    }

    /// The tick being swept while [`tick`](Self::tick) runs, otherwise the
    /// last completed one.
    pub fn current_tick(&self) -> u64 {
        self.tick
    }

    pub fn add_node(&mut self, parent: NodeId, kind: &str, name: &str) -> Result<NodeId, WorldError> {
        self.tree.add(parent, kind, name)
    }

    /// Gives `node` a scheduler and schedules the templates registered for
    /// its kind. Does nothing if the node already has one.
    pub fn attach_scheduler(&mut self, node: NodeId) -> Result<(), WorldError> {
        let kind = self.tree.get(node).ok_or(WorldError::UnknownNode)?.kind.clone();
        if self.schedulers.contains(node) {
            return Ok(());
        }
        self.schedulers.register(node);
        let context = Arc::clone(&self.context);
        for template in context.templates().for_kind(&kind) {
            let queued = template.instantiate().and_then(|entry| self.schedulers.enqueue(node, entry));
            if let Err(err) = queued {
                warn!("Template for '{}' in group '{}' not scheduled: {}", kind, template.group(), err);
            }
        }
        Ok(())
    }

    /// Adds a computer with a fresh process tree and a scheduler.
    pub fn add_computer(&mut self, parent: NodeId, name: &str, root_user: &str) -> Result<NodeId, WorldError> {
        let node = self.tree.add(parent, COMPUTER, name)?;
        let processes = ProcessTree::new(root_user).with_programs(Arc::clone(self.context.programs()));
        self.computers.insert(node, processes);
        self.attach_scheduler(node)?;
        debug!("Added computer '{}'", name);
        Ok(node)
    }

    /// Detaches `node` from the world. Its schedulers are pruned on the next tick.
    pub fn detach(&mut self, node: NodeId) -> Result<(), WorldError> {
        self.tree.detach(node)
    }

    /// Deletes `node` and its subtree, dropping their schedulers and processes now.
    pub fn remove(&mut self, node: NodeId) -> Result<(), WorldError> {
        for id in self.tree.remove(node)? {
            self.schedulers.deregister(id);
            if let Some(mut processes) = self.computers.remove(&id) {
                self.forward_journal(id, &mut processes);
            }
            self.outbox.push(WorldEvent::NodeRemoved { node: id });
        }
        Ok(())
    }

    pub fn schedule(
        &mut self,
        owner: NodeId,
        task: impl ScheduleTask + 'static,
        group: &str,
        delay: u32,
    ) -> Result<(), ScheduleError> {
        self.schedule_boxed(owner, Box::new(task), group, delay, None)
    }

    pub fn schedule_periodic(
        &mut self,
        owner: NodeId,
        task: impl ScheduleTask + 'static,
        group: &str,
        delay: u32,
        period: u32,
    ) -> Result<(), ScheduleError> {
        self.schedule_boxed(owner, Box::new(task), group, delay, Some(period))
    }

    /// Schedules onto `owner`'s scheduler. Tasks added while that scheduler
    /// is being updated are held back until its pass is over.
    pub fn schedule_boxed(
        &mut self,
        owner: NodeId,
        task: Box<dyn ScheduleTask>,
        group: &str,
        delay: u32,
        period: Option<u32>,
    ) -> Result<(), ScheduleError> {
        if !self.context.groups().contains(group) {
            return Err(ScheduleError::UnknownGroup(group.to_string()));
        }
        let entry = ScheduleTaskContext::new(task, group, delay, period)?;
        self.schedulers.enqueue(owner, entry)
    }

    pub fn scheduler(&self, owner: NodeId) -> Option<&Scheduler> {
        self.schedulers.get(owner)
    }

    pub fn schedulers(&self) -> &SchedulerRegistry {
        &self.schedulers
    }

    pub fn processes(&self, computer: NodeId) -> Option<&ProcessTree> {
        self.computers.get(&computer)
    }

    pub fn processes_mut(&mut self, computer: NodeId) -> Option<&mut ProcessTree> {
        self.computers.get_mut(&computer)
    }

    /// Like [`processes_mut`](Self::processes_mut), telling unknown nodes
    /// apart from nodes that are not computers.
    pub fn computer_mut(&mut self, node: NodeId) -> Result<&mut ProcessTree, WorldError> {
        if self.tree.get(node).is_none() {
            return Err(WorldError::UnknownNode);
        }
        self.computers.get_mut(&node).ok_or(WorldError::NotAComputer)
    }

    pub fn computers(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.computers.keys().copied()
    }

    pub fn emit(&mut self, event: WorldEvent) {
        self.outbox.push(event);
    }

    /// Takes every pending event, including process journals.
    pub fn drain_events(&mut self) -> Vec<WorldEvent> {
        self.collect_process_events();
        std::mem::take(&mut self.outbox)
    }

    /// Runs one update of `group` on every live scheduler, in registration order.
    ///
    /// Each scheduler is taken out of the registry while it runs, so its tasks
    /// get the whole world mutably.
    pub fn update_group(&mut self, group: &str) -> UpdateReport {
        let mut report = UpdateReport::default();
        for key in self.schedulers.keys() {
            let Some(owner) = self.schedulers.owner(key) else {
                continue;
            };
            if !self.tree.is_reachable(owner) {
                continue;
            }
            let Some(mut scheduler) = self.schedulers.take(key) else {
                continue;
            };
            report += scheduler.update(group, self, owner);
            self.schedulers.put_back(key, scheduler);
        }
        report
    }

    /// Drops schedulers of nodes that are no longer reachable from the root.
    pub fn prune_schedulers(&mut self) -> usize {
        let tree = &self.tree;
        let pruned = self.schedulers.prune(|owner| tree.is_reachable(owner));
        let count = pruned.len();
        if count > 0 {
            self.outbox.push(WorldEvent::SchedulersPruned { owners: pruned });
        }
        count
    }

    /// Advances the world by one tick: prune orphans, then every group in
    /// priority order across all schedulers.
    pub fn tick(&mut self) -> TickReport {
        self.tick += 1;
        let mut report = TickReport { tick: self.tick, pruned: self.prune_schedulers(), ..TickReport::default() };

        let context = Arc::clone(&self.context);
        for group in context.groups().running_order() {
            let update = self.update_group(group);
            report.executed += update.executed;
            report.failed += update.failed;
        }
        self.collect_process_events();
        report
    }

    fn collect_process_events(&mut self) {
        let mut journals = Vec::new();
        for (node, processes) in self.computers.iter_mut() {
            for event in processes.drain_journal() {
                journals.push(WorldEvent::Process { computer: *node, event });
            }
        }
        self.outbox.extend(journals);
    }

    fn forward_journal(&mut self, node: NodeId, processes: &mut ProcessTree) {
        for event in processes.drain_journal() {
            self.outbox.push(WorldEvent::Process { computer: node, event });
        }
    }

    pub fn snapshot_scheduler(&self, owner: NodeId) -> Option<SchedulerSnapshot> {
        self.schedulers.get(owner).map(Scheduler::snapshot)
    }

    /// Replaces `owner`'s scheduler with one rebuilt from `snapshot`.
    pub fn restore_scheduler(&mut self, owner: NodeId, snapshot: &SchedulerSnapshot) -> Result<(), RestoreError> {
        if self.tree.get(owner).is_none() {
            return Err(RestoreError::Inconsistent("scheduler owner does not exist".to_string()));
        }
        let scheduler = Scheduler::restore(snapshot, self.context.catalog())?;
        self.schedulers.replace(owner, scheduler);
        Ok(())
    }

    pub fn snapshot_processes(&self, computer: NodeId) -> Option<ProcessTreeSnapshot> {
        self.computers.get(&computer).map(ProcessTree::snapshot)
    }

    pub fn restore_processes(&mut self, computer: NodeId, snapshot: &ProcessTreeSnapshot) -> Result<(), RestoreError> {
        if self.tree.get(computer).is_none() {
            return Err(RestoreError::Inconsistent("computer does not exist".to_string()));
        }
        let tree = ProcessTree::restore(snapshot)?.with_programs(Arc::clone(self.context.programs()));
        self.computers.insert(computer, tree);
        Ok(())
    }
}
