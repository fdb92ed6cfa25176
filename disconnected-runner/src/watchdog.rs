use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use log::{error, warn};

enum Signal {
    Started(u64),
    Finished(u64),
}

/// Side thread that reports ticks running longer than `limit`.
pub struct Watchdog {
    tx: Option<Sender<Signal>>,
    stalls: Arc<AtomicU64>,
    handle: Option<JoinHandle<()>>,
}

impl Watchdog {
    pub fn spawn(limit: Duration) -> Self {
        let (tx, rx) = unbounded();
        let stalls = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&stalls);
        let handle = thread::Builder::new()
            .name("tick-watchdog".to_string())
            .spawn(move || watch(rx, limit, counter));
        let handle = match handle {
            Ok(handle) => Some(handle),
            Err(err) => {
                warn!("Watchdog disabled, cannot spawn its thread: {}", err);
                None
            }
        };
        Self { tx: Some(tx), stalls, handle }
    }

    pub fn started(&self, tick: u64) {
        self.send(Signal::Started(tick));
    }

    pub fn finished(&self, tick: u64) {
        self.send(Signal::Finished(tick));
    }

    pub fn stalls(&self) -> u64 {
        self.stalls.load(Ordering::Relaxed)
    }

    fn send(&self, signal: Signal) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(signal);
        }
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        self.tx.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn watch(rx: Receiver<Signal>, limit: Duration, stalls: Arc<AtomicU64>) {
    loop {
        let tick = match rx.recv() {
            Ok(Signal::Started(tick)) => tick,
            Ok(Signal::Finished(_)) => continue,
            Err(_) => return,
        };
        match rx.recv_timeout(limit) {
            Ok(_) => continue,
            Err(RecvTimeoutError::Disconnected) => return,
            Err(RecvTimeoutError::Timeout) => {
                stalls.fetch_add(1, Ordering::Relaxed);
                error!("Tick {} has been running for more than {:?}", tick, limit);
            }
        }
        // Wait out the slow tick before arming again.
        loop {
            match rx.recv() {
                Ok(Signal::Finished(done)) if done == tick => break,
                Ok(_) => {}
                Err(_) => return,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fast_ticks_are_not_flagged() {
        let watchdog = Watchdog::spawn(Duration::from_millis(200));
        for tick in 1..=5 {
            watchdog.started(tick);
            watchdog.finished(tick);
        }
        drop_and_count(watchdog, 0);
    }

    #[test]
    fn slow_tick_is_flagged_once() {
        let watchdog = Watchdog::spawn(Duration::from_millis(10));
        watchdog.started(1);
        thread::sleep(Duration::from_millis(80));
        watchdog.finished(1);
        watchdog.started(2);
        watchdog.finished(2);
        drop_and_count(watchdog, 1);
    }

    fn drop_and_count(watchdog: Watchdog, expected: u64) {
        let stalls = Arc::clone(&watchdog.stalls);
        drop(watchdog);
        assert_eq!(stalls.load(Ordering::Relaxed), expected);
    }
}
