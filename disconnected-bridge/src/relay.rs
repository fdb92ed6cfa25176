use disconnected_config::{BridgeConfig, SenderType, SerializerType};
use disconnected_core::WorldEvent;
use log::{debug, info, warn};

use crate::sender::{FileSender, NullSender, Sender, StdioSender};
use crate::serializer::{BinarySerializer, JsonSerializer, Serializer};
use crate::{EventBatch, TransportError};

/// Events kept queued while the sender keeps failing.
pub const DEFAULT_MAX_PENDING: usize = 10_000;

/// Buffers world events and ships them every `relay_every` ticks.
pub struct EventRelay {
    serializer: Box<dyn Serializer>,
    sender: Box<dyn Sender>,
    relay_every: u32,
    pending: Vec<WorldEvent>,
    max_pending: usize,
    batches_sent: u64,
}

impl EventRelay {
    pub fn new(serializer: Box<dyn Serializer>, sender: Box<dyn Sender>, relay_every: u32) -> Self {
        EventRelay {
            serializer,
            sender,
            relay_every: relay_every.max(1),
            pending: Vec::new(),
            max_pending: DEFAULT_MAX_PENDING,
            batches_sent: 0,
        }
    }

    /// Oldest events beyond `max_pending` are dropped.
    pub fn with_max_pending(mut self, max_pending: usize) -> Self {
        self.max_pending = max_pending.max(1);
        self
    }

    pub fn from_config(config: &BridgeConfig) -> Result<Self, TransportError> {
        let serializer: Box<dyn Serializer> = match config.serializer.serializer_type {
            SerializerType::Json => Box::new(JsonSerializer),
            SerializerType::Binary => Box::new(BinarySerializer),
        };
        let sender: Box<dyn Sender> = match config.sender.sender_type {
            SenderType::Stdio => Box::new(StdioSender::new()),
            SenderType::Null => Box::new(NullSender),
            SenderType::File => {
                let options = config
                    .sender
                    .get_file_options()
                    .ok_or_else(|| TransportError::Config("file sender needs a path".to_string()))?;
                info!("Relaying events to {}", options.path.display());
                Box::new(FileSender::open(&options.path, options.append)?)
            }
        };
        debug!(
            "Event relay: {:?} over {:?}, every {} ticks",
            config.serializer.serializer_type, config.sender.sender_type, config.relay_every
        );
        Ok(Self::new(serializer, sender, config.relay_every))
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    pub fn batches_sent(&self) -> u64 {
        self.batches_sent
    }

    /// Queues `events`; on ticks that are a multiple of `relay_every` sends
    /// everything queued as one batch. Empty batches are not sent.
    ///
    /// Returns the number of events sent. On error the queued events are
    /// kept, up to `max_pending` of the newest.
    pub fn relay(&mut self, tick: u64, events: Vec<WorldEvent>) -> Result<usize, TransportError> {
        self.pending.extend(events);
        self.trim(tick);
        if tick % u64::from(self.relay_every) != 0 || self.pending.is_empty() {
            return Ok(0);
        }
        self.flush(tick)
    }

    /// Sends everything queued right away.
    pub fn flush(&mut self, tick: u64) -> Result<usize, TransportError> {
        if self.pending.is_empty() {
            return Ok(0);
        }
        let batch = EventBatch { tick, events: std::mem::take(&mut self.pending) };
        let frame = match self.serializer.serialize(&batch) {
            Ok(frame) => frame,
            Err(err) => {
                self.requeue(tick, batch.events);
                return Err(err);
            }
        };
        if let Err(err) = self.sender.send(frame.as_bytes()) {
            self.requeue(tick, batch.events);
            return Err(err);
        }
        self.batches_sent += 1;
        Ok(batch.events.len())
    }

    fn requeue(&mut self, tick: u64, mut events: Vec<WorldEvent>) {
        events.append(&mut self.pending);
        self.pending = events;
        self.trim(tick);
    }

    fn trim(&mut self, tick: u64) {
        let excess = self.pending.len().saturating_sub(self.max_pending);
        if excess > 0 {
            warn!("Event relay backlog full on tick {}; dropping {} oldest events", tick, excess);
            self.pending.drain(..excess);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sender::ChannelSender;
    use disconnected_core::Arguments;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    /// Forwards to a channel unless `failing` is set.
    struct FlakySender {
        failing: Arc<AtomicBool>,
        inner: ChannelSender,
    }

    impl Sender for FlakySender {
        fn send(&mut self, data: &[u8]) -> Result<(), TransportError> {
            if self.failing.load(Ordering::SeqCst) {
                return Err(TransportError::ChannelClosed);
            }
            self.inner.send(data)
        }
    }

    fn event(n: i64) -> WorldEvent {
        WorldEvent::custom("n", Arguments::new().with("n", n))
    }

    #[test]
    fn batches_every_nth_tick() {
        let (sender, rx) = ChannelSender::pair();
        let mut relay = EventRelay::new(Box::new(JsonSerializer), Box::new(sender), 3);

        assert_eq!(relay.relay(1, vec![event(1)]).unwrap(), 0);
        assert_eq!(relay.relay(2, vec![event(2)]).unwrap(), 0);
        assert_eq!(relay.relay(3, vec![event(3)]).unwrap(), 3);
        assert_eq!(relay.relay(6, Vec::new()).unwrap(), 0);

        let frames: Vec<Vec<u8>> = rx.try_iter().collect();
        assert_eq!(frames.len(), 1);
        let batch: EventBatch = serde_json::from_slice(&frames[0]).unwrap();
        assert_eq!(batch.tick, 3);
        assert_eq!(batch.events, vec![event(1), event(2), event(3)]);
        assert_eq!(relay.batches_sent(), 1);
    }

    #[test]
    fn failed_send_keeps_events_queued() {
        let (sender, rx) = ChannelSender::pair();
        drop(rx);
        let mut relay = EventRelay::new(Box::new(BinarySerializer), Box::new(sender), 1);

        assert!(relay.relay(1, vec![event(1)]).is_err());
        assert_eq!(relay.pending(), 1);
        assert_eq!(relay.batches_sent(), 0);
    }

    #[test]
    fn failing_sender_keeps_only_the_newest_events() {
        let (inner, rx) = ChannelSender::pair();
        let failing = Arc::new(AtomicBool::new(true));
        let sender = FlakySender { failing: Arc::clone(&failing), inner };
        let mut relay = EventRelay::new(Box::new(JsonSerializer), Box::new(sender), 1).with_max_pending(3);

        for tick in 1..=4 {
            assert!(relay.relay(tick, vec![event(2 * tick as i64 - 1), event(2 * tick as i64)]).is_err());
            assert!(relay.pending() <= 3);
        }
        assert_eq!(relay.pending(), 3);

        failing.store(false, Ordering::SeqCst);
        assert_eq!(relay.relay(5, vec![event(9)]).unwrap(), 3);
        let frames: Vec<Vec<u8>> = rx.try_iter().collect();
        let batch: EventBatch = serde_json::from_slice(&frames[0]).unwrap();
        assert_eq!(batch.events, vec![event(7), event(8), event(9)]);
    }
}
