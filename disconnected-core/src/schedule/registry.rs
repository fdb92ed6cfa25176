use std::collections::HashMap;

use log::debug;
use slotmap::{new_key_type, SlotMap};

use crate::error::ScheduleError;
use crate::schedule::scheduler::{ScheduleTaskContext, Scheduler};
use crate::world::NodeId;

new_key_type! {
    pub struct SchedulerKey;
}

#[derive(Debug)]
struct SchedulerSlot {
    owner: NodeId,
    /// `None` while the scheduler is being updated.
    scheduler: Option<Scheduler>,
    /// Tasks scheduled while the scheduler was out of its slot.
    deferred: Vec<ScheduleTaskContext>,
    /// Installed while the scheduler was out; wins over it on `put_back`.
    replacement: Option<Scheduler>,
}

/// Explicit registry of live schedulers, one per owner node.
///
/// Owners register on creation and deregister on removal; detached owners
/// are dropped by [`prune`](Self::prune). Iteration follows registration order.
#[derive(Debug, Default)]
pub struct SchedulerRegistry {
    slots: SlotMap<SchedulerKey, SchedulerSlot>,
    by_owner: HashMap<NodeId, SchedulerKey>,
    order: Vec<SchedulerKey>,
}

impl SchedulerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an empty scheduler for `owner`, or returns the existing one's key.
    pub fn register(&mut self, owner: NodeId) -> SchedulerKey {
        self.install(owner, Scheduler::new(), false)
    }

    /// Puts `scheduler` in place for `owner`, replacing any previous one.
    pub fn replace(&mut self, owner: NodeId, scheduler: Scheduler) -> SchedulerKey {
        self.install(owner, scheduler, true)
    }

    fn install(&mut self, owner: NodeId, scheduler: Scheduler, overwrite: bool) -> SchedulerKey {
        if let Some(key) = self.by_owner.get(&owner).copied() {
            if overwrite {
                let slot = &mut self.slots[key];
                slot.deferred.clear();
                match slot.scheduler.as_mut() {
                    Some(current) => *current = scheduler,
                    None => slot.replacement = Some(scheduler),
                }
            }
            return key;
        }
        let key = self.slots.insert(SchedulerSlot {
            owner,
            scheduler: Some(scheduler),
            deferred: Vec::new(),
            replacement: None,
        });
        self.by_owner.insert(owner, key);
        self.order.push(key);
        key
    }

    pub fn deregister(&mut self, owner: NodeId) -> Option<Scheduler> {
        let key = self.by_owner.remove(&owner)?;
        self.order.retain(|k| *k != key);
        self.slots.remove(key).and_then(|slot| slot.scheduler)
    }

    pub fn contains(&self, owner: NodeId) -> bool {
        self.by_owner.contains_key(&owner)
    }

    pub fn key_of(&self, owner: NodeId) -> Option<SchedulerKey> {
        self.by_owner.get(&owner).copied()
    }

    pub fn owner(&self, key: SchedulerKey) -> Option<NodeId> {
        self.slots.get(key).map(|slot| slot.owner)
    }

    /// Scheduler of `owner`; `None` while it is being updated.
    pub fn get(&self, owner: NodeId) -> Option<&Scheduler> {
        let key = self.by_owner.get(&owner)?;
        self.slots.get(*key)?.scheduler.as_ref()
    }

    pub fn get_mut(&mut self, owner: NodeId) -> Option<&mut Scheduler> {
        let key = self.by_owner.get(&owner)?;
        self.slots.get_mut(*key)?.scheduler.as_mut()
    }

    /// Keys in registration order.
    pub fn keys(&self) -> Vec<SchedulerKey> {
        self.order.clone()
    }

    pub fn owners(&self) -> Vec<NodeId> {
        self.order.iter().map(|key| self.slots[*key].owner).collect()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Takes the scheduler out of its slot for an update.
    pub fn take(&mut self, key: SchedulerKey) -> Option<Scheduler> {
        self.slots.get_mut(key)?.scheduler.take()
    }

    /// Returns a scheduler after an update, appending everything that was
    /// scheduled onto it in the meantime. A scheduler installed with
    /// [`replace`](Self::replace) during the update takes its place. If the
    /// owner was deregistered during the update the scheduler is dropped.
    pub fn put_back(&mut self, key: SchedulerKey, scheduler: Scheduler) {
        match self.slots.get_mut(key) {
            Some(slot) => {
                let mut scheduler = slot.replacement.take().unwrap_or(scheduler);
                for entry in slot.deferred.drain(..) {
                    scheduler.push(entry);
                }
                slot.scheduler = Some(scheduler);
            }
            None => debug!("Dropping scheduler whose owner went away during its update"),
        }
    }

    /// Adds a pending task to `owner`'s scheduler, or to its deferred list
    /// while the scheduler is out for an update.
    pub fn enqueue(&mut self, owner: NodeId, entry: ScheduleTaskContext) -> Result<(), ScheduleError> {
        let key = self.by_owner.get(&owner).ok_or(ScheduleError::NoScheduler)?;
        let slot = &mut self.slots[*key];
        match slot.scheduler.as_mut() {
            Some(scheduler) => scheduler.push(entry),
            None => slot.deferred.push(entry),
        }
        Ok(())
    }

    /// Drops every scheduler whose owner fails `is_live`. Returns the dropped owners.
    pub fn prune(&mut self, mut is_live: impl FnMut(NodeId) -> bool) -> Vec<NodeId> {
        let dead: Vec<NodeId> = self
            .order
            .iter()
            .map(|key| self.slots[*key].owner)
            .filter(|owner| !is_live(*owner))
            .collect();
        for owner in &dead {
            self.deregister(*owner);
        }
        if !dead.is_empty() {
            debug!("Pruned {} orphaned schedulers", dead.len());
        }
        dead
    }
}
