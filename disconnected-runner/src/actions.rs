//! The per-tick steps of a running simulation.

use disconnected_bridge::EventRelay;
use disconnected_core::{CommandInbox, World};
use log::{debug, trace};

use crate::tick::{TickAction, TickError};

/// What the tick thread owns: the world and the queue feeding it.
pub struct Simulation {
    pub world: World,
    pub inbox: CommandInbox,
}

impl Simulation {
    pub fn new(world: World) -> Self {
        Self { world, inbox: CommandInbox::new() }
    }
}

/// Applies commands submitted from other threads.
pub struct InboxDrain;

impl TickAction<Simulation> for InboxDrain {
    fn update(&mut self, state: &mut Simulation, _tick: u64) -> Result<(), TickError> {
        let applied = state.inbox.apply(&mut state.world);
        if applied > 0 {
            debug!("Applied {} world commands", applied);
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "inbox"
    }
}

/// Runs every scheduler group once.
pub struct SchedulerSweep;

impl TickAction<Simulation> for SchedulerSweep {
    fn update(&mut self, state: &mut Simulation, _tick: u64) -> Result<(), TickError> {
        let report = state.world.tick();
        trace!(
            "World tick {}: {} executed, {} failed, {} pruned",
            report.tick,
            report.executed,
            report.failed,
            report.pruned
        );
        Ok(())
    }

    fn name(&self) -> &str {
        "schedulers"
    }
}

/// Drains world events into an [`EventRelay`].
pub struct EventRelayAction {
    relay: EventRelay,
}

impl EventRelayAction {
    pub fn new(relay: EventRelay) -> Self {
        Self { relay }
    }

    pub fn relay(&self) -> &EventRelay {
        &self.relay
    }
}

impl TickAction<Simulation> for EventRelayAction {
    fn update(&mut self, state: &mut Simulation, _tick: u64) -> Result<(), TickError> {
        let events = state.world.drain_events();
        let sent = self.relay.relay(state.world.current_tick(), events)?;
        if sent > 0 {
            trace!("Relayed {} events", sent);
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "relay"
    }
}
