//! Fixed-rate tick loop running pluggable actions on a dedicated thread.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use disconnected_bridge::TransportError;
use disconnected_config::TickSettings;
use hdrhistogram::Histogram;
use log::{debug, error, info, warn};
use thiserror::Error;

use crate::watchdog::Watchdog;

#[derive(Error, Debug)]
pub enum TickError {
    #[error("{0}")]
    Failed(String),

    #[error("tick action panicked: {0}")]
    Panicked(String),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("cannot set up tick statistics: {0}")]
    Stats(String),

    #[error("cannot spawn tick thread: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("tick thread panicked")]
    ThreadPanicked,
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// One step of work run every tick, in registration order.
pub trait TickAction<S>: Send {
    fn update(&mut self, state: &mut S, tick: u64) -> Result<(), TickError>;

    /// Name used in logs.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// Closure-backed action.
pub struct FnAction<F> {
    name: String,
    run: F,
}

impl<F> FnAction<F> {
    pub fn new(name: impl Into<String>, run: F) -> Self {
        Self { name: name.into(), run }
    }
}

impl<S, F> TickAction<S> for FnAction<F>
where
    F: FnMut(&mut S, u64) -> Result<(), TickError> + Send,
{
    fn update(&mut self, state: &mut S, tick: u64) -> Result<(), TickError> {
        (self.run)(state, tick)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickTiming {
    pub interval: Duration,
    /// Overruns beyond this reset the schedule instead of catching up.
    pub overrun_slack: Duration,
    pub watchdog: Option<Duration>,
}

impl TickTiming {
    pub fn every(interval: Duration) -> Self {
        Self { interval, overrun_slack: Duration::from_millis(100), watchdog: None }
    }

    pub fn from_settings(settings: &TickSettings) -> Self {
        Self {
            interval: Duration::from_millis(settings.interval_ms),
            overrun_slack: Duration::from_millis(settings.overrun_slack_ms),
            watchdog: settings.watchdog_ms.map(Duration::from_millis),
        }
    }
}

/// Counters and a duration histogram (microseconds) of executed ticks.
#[derive(Debug, Clone)]
pub struct TickStats {
    ticks: u64,
    dropped: u64,
    action_failures: u64,
    stalls: u64,
    durations: Histogram<u64>,
}

impl TickStats {
    pub fn new() -> Result<Self, TickError> {
        let durations = Histogram::new(3).map_err(|e| TickError::Stats(e.to_string()))?;
        Ok(Self { ticks: 0, dropped: 0, action_failures: 0, stalls: 0, durations })
    }

    pub fn record(&mut self, duration: Duration) {
        self.ticks += 1;
        self.durations.saturating_record(duration.as_micros() as u64);
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Ticks skipped after overruns.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    pub fn action_failures(&self) -> u64 {
        self.action_failures
    }

    /// Ticks the watchdog flagged as too slow.
    pub fn stalls(&self) -> u64 {
        self.stalls
    }

    pub fn percentile_micros(&self, percentile: f64) -> u64 {
        self.durations.value_at_percentile(percentile)
    }

    pub fn max_micros(&self) -> u64 {
        self.durations.max()
    }

    pub fn log_summary(&self) {
        info!(
            "{} ticks ({} dropped, {} action failures, {} stalls); duration p50 {}us, p99 {}us, max {}us",
            self.ticks,
            self.dropped,
            self.action_failures,
            self.stalls,
            self.percentile_micros(50.0),
            self.percentile_micros(99.0),
            self.max_micros()
        );
    }
}

/// Owns the simulation state `S` and the actions that advance it.
///
/// [`start`](Self::start) moves the engine onto its own thread; stopping the
/// returned [`RunningEngine`] hands it back.
pub struct TickEngine<S> {
    timing: TickTiming,
    actions: Vec<Box<dyn TickAction<S>>>,
    state: S,
    tick: u64,
    max_ticks: Option<u64>,
}

impl<S: Send + 'static> TickEngine<S> {
    pub fn new(state: S, timing: TickTiming) -> Self {
        Self { timing, actions: Vec::new(), state, tick: 0, max_ticks: None }
    }

    pub fn add_action<A: TickAction<S> + 'static>(&mut self, action: A) -> &mut Self {
        self.actions.push(Box::new(action));
        self
    }

    /// Stops the loop on its own after `ticks` ticks of one run.
    pub fn with_max_ticks(mut self, ticks: Option<u64>) -> Self {
        self.max_ticks = ticks;
        self
    }

    pub fn timing(&self) -> TickTiming {
        self.timing
    }

    /// Ticks fired so far, across runs.
    pub fn ticks(&self) -> u64 {
        self.tick
    }

    pub fn action_count(&self) -> usize {
        self.actions.len()
    }

    pub fn state(&self) -> &S {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut S {
        &mut self.state
    }

    pub fn into_state(self) -> S {
        self.state
    }

    /// Runs every action once. Failing or panicking actions are logged and
    /// counted; the remaining actions still run.
    pub fn run_once(&mut self, tick: u64, stats: &mut TickStats) {
        for action in self.actions.iter_mut() {
            let state = &mut self.state;
            let result = catch_unwind(AssertUnwindSafe(|| action.update(state, tick)))
                .unwrap_or_else(|payload| Err(TickError::Panicked(panic_message(payload))));
            if let Err(err) = result {
                stats.action_failures += 1;
                error!("Tick action '{}' failed on tick {}: {}", action.name(), tick, err);
            }
        }
    }

    pub fn start(self) -> Result<RunningEngine<S>, TickError> {
        let stats = TickStats::new()?;
        let (stop_tx, stop_rx) = unbounded();
        let handle = thread::Builder::new()
            .name("tick".to_string())
            .spawn(move || self.run_loop(stop_rx, stats))?;
        info!("Tick engine started");
        Ok(RunningEngine { stop: stop_tx, handle })
    }

    fn run_loop(mut self, stop: Receiver<()>, mut stats: TickStats) -> (Self, TickStats) {
        let interval = self.timing.interval;
        let watchdog = self.timing.watchdog.map(Watchdog::spawn);
        let mut ran = 0u64;
        let mut next_fire = Instant::now();

        loop {
            if self.max_ticks.is_some_and(|max| ran >= max) {
                debug!("Reached {} ticks", ran);
                break;
            }
            let wait = next_fire.saturating_duration_since(Instant::now());
            match stop.recv_timeout(wait) {
                Err(RecvTimeoutError::Timeout) => {}
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            }

            self.tick += 1;
            ran += 1;
            let tick = self.tick;
            let started = Instant::now();
            if let Some(watchdog) = &watchdog {
                watchdog.started(tick);
            }
            self.run_once(tick, &mut stats);
            if let Some(watchdog) = &watchdog {
                watchdog.finished(tick);
            }
            stats.record(started.elapsed());

            next_fire += interval;
            let now = Instant::now();
            if now > next_fire + self.timing.overrun_slack {
                let behind = now - next_fire;
                let dropped = (behind.as_nanos() / interval.as_nanos().max(1)) as u64;
                warn!("Tick {} overran by {:?}; dropping {} ticks", tick, behind, dropped);
                stats.dropped += dropped;
                next_fire = now;
            }
        }

        if let Some(watchdog) = watchdog {
            stats.stalls = watchdog.stalls();
        }
        info!("Tick engine stopped after {} ticks", ran);
        (self, stats)
    }
}

/// Cloneable stop signal, e.g. for a Ctrl+C handler.
#[derive(Debug, Clone)]
pub struct StopHandle {
    tx: Sender<()>,
}

impl StopHandle {
    pub fn stop(&self) {
        let _ = self.tx.send(());
    }
}

pub struct RunningEngine<S> {
    stop: Sender<()>,
    handle: JoinHandle<(TickEngine<S>, TickStats)>,
}

impl<S> RunningEngine<S> {
    pub fn stopper(&self) -> StopHandle {
        StopHandle { tx: self.stop.clone() }
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Signals the loop and waits for it. The tick in flight completes first.
    pub fn stop(self) -> Result<(TickEngine<S>, TickStats), TickError> {
        let _ = self.stop.send(());
        self.join()
    }

    /// Waits until the loop ends on its own or through a [`StopHandle`].
    pub fn join(self) -> Result<(TickEngine<S>, TickStats), TickError> {
        let RunningEngine { stop, handle } = self;
        let result = handle.join().map_err(|_| TickError::ThreadPanicked);
        drop(stop);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type Log = Vec<(u64, &'static str)>;

    fn push(label: &'static str) -> FnAction<impl FnMut(&mut Log, u64) -> Result<(), TickError> + Send> {
        FnAction::new(label, move |log: &mut Log, tick: u64| -> Result<(), TickError> {
            log.push((tick, label));
            Ok(())
        })
    }

    #[test]
    fn actions_run_in_registration_order_and_survive_failures() {
        let mut engine = TickEngine::new(Log::new(), TickTiming::every(Duration::from_millis(10)));
        engine
            .add_action(push("inbox"))
            .add_action(FnAction::new("broken", |_: &mut Log, _: u64| -> Result<(), TickError> {
                Err(TickError::Failed("nope".into()))
            }))
            .add_action(FnAction::new("panicky", |_: &mut Log, _: u64| -> Result<(), TickError> {
                panic!("action blew up")
            }))
            .add_action(push("relay"));

        let mut stats = TickStats::new().unwrap();
        engine.run_once(1, &mut stats);
        engine.run_once(2, &mut stats);

        assert_eq!(engine.state(), &vec![(1, "inbox"), (1, "relay"), (2, "inbox"), (2, "relay")]);
        assert_eq!(stats.action_failures(), 4);
    }

    #[test]
    fn stats_track_durations() {
        let mut stats = TickStats::new().unwrap();
        stats.record(Duration::from_micros(100));
        stats.record(Duration::from_micros(300));
        assert_eq!(stats.ticks(), 2);
        assert!(stats.max_micros() >= 300);
        assert!(stats.percentile_micros(50.0) >= 100);
    }

    #[test]
    fn timing_comes_from_settings() {
        let timing = TickTiming::from_settings(&TickSettings { interval_ms: 20, overrun_slack_ms: 5, watchdog_ms: Some(40) });
        assert_eq!(timing.interval, Duration::from_millis(20));
        assert_eq!(timing.overrun_slack, Duration::from_millis(5));
        assert_eq!(timing.watchdog, Some(Duration::from_millis(40)));
    }
}
