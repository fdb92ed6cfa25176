//! Assembles an engine context, a demo world and the tick engine from config.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use disconnected_bridge::{EventRelay, TransportError};
use disconnected_config::{Config, ConfigError};
use disconnected_core::process::ROOT_PID;
use disconnected_core::schedule::{SchedulerGroups, CLEANUP, PROGRAM, SYSTEM};
use disconnected_core::{
    Arguments, EngineContext, LaunchError, LaunchOptions, ScheduleError, TaskTemplate, World, WorldError,
};
use log::{info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use thiserror::Error;

use crate::actions::{EventRelayAction, InboxDrain, SchedulerSweep, Simulation};
use crate::programs::{demo_programs, DiskWear, HARD_DRIVE, NETUTILS};
use crate::tick::{TickEngine, TickError, TickTiming};

#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("cannot build world: {0}")]
    World(#[from] WorldError),

    #[error("cannot start demo process: {0}")]
    Launch(#[from] LaunchError),

    #[error("bad scheduler setup: {0}")]
    Schedule(#[from] ScheduleError),

    #[error(transparent)]
    Tick(#[from] TickError),

    #[error("cannot install signal handler: {0}")]
    Signal(String),
}

/// `preferred` if configured, otherwise the first (or last) group in running order.
fn pick_group(groups: &SchedulerGroups, preferred: &str, last: bool) -> Option<String> {
    if groups.contains(preferred) {
        return Some(preferred.to_string());
    }
    let order = groups.running_order();
    let fallback = if last { order.last() } else { order.first() }?;
    warn!("No '{}' scheduler group configured, using '{}'", preferred, fallback);
    Some(fallback.clone())
}

pub fn build_context(config: &Config) -> Result<EngineContext, AppError> {
    let mut groups = SchedulerGroups::new();
    for group in &config.groups {
        groups.register(group.name.as_str(), group.priority);
    }
    let (Some(tick_group), Some(reap_group), Some(wear_group)) = (
        pick_group(&groups, PROGRAM, true),
        pick_group(&groups, CLEANUP, true),
        pick_group(&groups, SYSTEM, false),
    ) else {
        return Err(ConfigError::Validation("At least one scheduler group is required.".to_string()).into());
    };

    let mut context = EngineContext::new(groups).with_programs(demo_programs());
    context.install_process_tasks(&tick_group, &reap_group)?;

    let seeds = AtomicU64::new(config.world.seed.unwrap_or_else(rand::random));
    context.register_template(
        HARD_DRIVE,
        TaskTemplate::new(wear_group, DiskWear::PERIOD, move || {
            let rng = StdRng::seed_from_u64(seeds.fetch_add(1, Ordering::Relaxed));
            Box::new(DiskWear::new(0, rng))
        })
        .every(DiskWear::PERIOD),
    )?;
    context.catalog_mut().register(DiskWear::KIND, |state: &Arguments| {
        Ok(Box::new(DiskWear::new(state.int("wear")?, StdRng::from_entropy())))
    });
    Ok(context)
}

/// A network of `config.world.computers` computers, each with a hard drive,
/// a daemon and a shell scanning one of its peers.
pub fn build_simulation(config: &Config, context: Arc<EngineContext>) -> Result<Simulation, AppError> {
    let mut rng = match config.world.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let mut world = World::new(context);
    let root = world.root();
    let internet = world.add_node(root, "network", "internet")?;

    let mut computers = Vec::new();
    for index in 0..config.world.computers {
        let name = format!("pc-{:02}", index);
        let pc = world.add_computer(internet, &name, "root")?;
        let drive = world.add_node(pc, HARD_DRIVE, "hdd0")?;
        world.attach_scheduler(drive)?;
        computers.push((pc, name));
    }

    let count = computers.len();
    for (index, (pc, _)) in computers.iter().enumerate() {
        let processes = world.computer_mut(*pc)?;
        processes.launch(ROOT_PID, "root", NETUTILS, "daemon", LaunchOptions::default())?;
        if count < 2 {
            continue;
        }
        let peer = &computers[(index + rng.gen_range(1..count)) % count].1;
        let arguments = Arguments::new().with("target", peer.as_str()).with("ports", rng.gen_range(2..=5i64));
        processes.launch(ROOT_PID, "root", NETUTILS, "shell", LaunchOptions::with_arguments(arguments))?;
    }

    info!("Built world with {} computers", count);
    Ok(Simulation::new(world))
}

/// Commands first, then the scheduler sweep, then the event relay.
pub fn build_engine(config: &Config, simulation: Simulation, relay: EventRelay) -> TickEngine<Simulation> {
    let mut engine = TickEngine::new(simulation, TickTiming::from_settings(&config.tick));
    engine
        .add_action(InboxDrain)
        .add_action(SchedulerSweep)
        .add_action(EventRelayAction::new(relay));
    engine
}

pub fn from_config(config: &Config) -> Result<TickEngine<Simulation>, AppError> {
    let context = Arc::new(build_context(config)?);
    let simulation = build_simulation(config, context)?;
    let relay = EventRelay::from_config(&config.bridge)?;
    Ok(build_engine(config, simulation, relay))
}

#[cfg(test)]
mod tests {
    use super::*;
    use disconnected_config::GroupConfig;
    use disconnected_core::COMPUTER;

    #[test]
    fn missing_groups_fall_back_to_configured_ones() {
        let mut config = Config::default();
        config.groups = vec![
            GroupConfig { name: "fast".into(), priority: 10 },
            GroupConfig { name: "slow".into(), priority: 1 },
        ];
        let context = build_context(&config).unwrap();

        let computer: Vec<&str> = context.templates().for_kind(COMPUTER).iter().map(TaskTemplate::group).collect();
        assert_eq!(computer, vec!["slow", "slow"]);
        let drive: Vec<&str> = context.templates().for_kind(HARD_DRIVE).iter().map(TaskTemplate::group).collect();
        assert_eq!(drive, vec!["fast"]);
        assert!(context.catalog().contains(DiskWear::KIND));
    }

    #[test]
    fn lone_computer_only_runs_a_daemon() {
        let mut config = Config::default();
        config.world.computers = 1;
        config.world.seed = Some(3);
        let context = Arc::new(build_context(&config).unwrap());
        let simulation = build_simulation(&config, context).unwrap();

        let pc = simulation.world.computers().next().unwrap();
        assert_eq!(simulation.world.processes(pc).unwrap().len(), 2);
    }
}
