use std::sync::Arc;

use crossbeam_channel::Receiver;
use disconnected_bridge::{ChannelSender, EventBatch, EventRelay, JsonSerializer};
use disconnected_config::Config;
use disconnected_core::{ProcessEvent, WorldEvent};
use disconnected_runner::{build_context, build_engine, build_simulation, Simulation, TickEngine, TickStats};

fn engine(computers: u32) -> (TickEngine<Simulation>, Receiver<Vec<u8>>) {
    let mut config = Config::default();
    config.world.computers = computers;
    config.world.seed = Some(11);
    let context = Arc::new(build_context(&config).unwrap());
    let simulation = build_simulation(&config, context).unwrap();
    let (sender, frames) = ChannelSender::pair();
    let relay = EventRelay::new(Box::new(JsonSerializer), Box::new(sender), 1);
    (build_engine(&config, simulation, relay), frames)
}

fn run(engine: &mut TickEngine<Simulation>, ticks: u64) -> TickStats {
    let mut stats = TickStats::new().unwrap();
    for tick in 1..=ticks {
        engine.run_once(tick, &mut stats);
    }
    stats
}

fn batches(frames: &Receiver<Vec<u8>>) -> Vec<EventBatch> {
    frames.try_iter().map(|frame| serde_json::from_slice(&frame).unwrap()).collect()
}

fn callbacks(batches: &[EventBatch], wanted: &str) -> usize {
    batches
        .iter()
        .flat_map(|b| &b.events)
        .filter(|e| {
            matches!(e, WorldEvent::Process { event: ProcessEvent::Callback { name, .. }, .. } if name == wanted)
        })
        .count()
}

#[test]
fn every_shell_gets_its_scan_result() {
    let (mut engine, frames) = engine(3);
    let stats = run(&mut engine, 6);
    assert_eq!(stats.action_failures(), 0);

    let batches = batches(&frames);
    assert_eq!(batches[0].tick, 1);
    assert!(batches[0]
        .events
        .iter()
        .any(|e| matches!(e, WorldEvent::Process { event: ProcessEvent::Launched { task, .. }, .. } if task == "shell")));
    assert_eq!(callbacks(&batches, "found"), 3);
    assert_eq!(callbacks(&batches, "report"), 3);

    // Only the daemons are left besides the root processes.
    let world = &engine.state().world;
    for pc in world.computers() {
        assert_eq!(world.processes(pc).unwrap().len(), 2);
    }
}

#[test]
fn hard_drives_wear_on_their_period() {
    let (mut engine, frames) = engine(2);
    run(&mut engine, 10);

    let wear: Vec<(u64, i64)> = batches(&frames)
        .iter()
        .flat_map(|b| b.events.iter().map(move |e| (b.tick, e)))
        .filter_map(|(tick, e)| match e {
            WorldEvent::Custom { name, payload } if name == "disk_wear" => Some((tick, payload.int("wear").unwrap())),
            _ => None,
        })
        .collect();
    assert_eq!(wear.len(), 2);
    assert!(wear.iter().all(|&(tick, amount)| tick == 10 && (1..=3).contains(&amount)));
}

#[test]
fn commands_from_other_threads_apply_before_the_sweep() {
    let (mut engine, frames) = engine(2);
    let handle = engine.state().inbox.handle();
    let pc = engine.state().world.computers().next().unwrap();

    std::thread::spawn(move || {
        handle
            .submit(move |world| {
                world.detach(pc).unwrap();
            })
            .unwrap();
    })
    .join()
    .unwrap();

    run(&mut engine, 1);
    let batches = batches(&frames);
    assert!(batches[0]
        .events
        .iter()
        .any(|e| matches!(e, WorldEvent::SchedulersPruned { owners } if owners.contains(&pc))));
    assert!(engine.state().world.scheduler(pc).is_none());
}
