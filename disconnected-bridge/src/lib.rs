//! Relays world events from the tick thread to observers.

use disconnected_core::WorldEvent;
use serde::{Deserialize, Serialize};
use std::io;
use thiserror::Error;

pub mod relay;
pub mod sender;
pub mod serializer;

pub use relay::EventRelay;
pub use sender::{ChannelSender, FileSender, NullSender, Sender, StdioSender};
pub use serializer::{BinarySerializer, JsonSerializer, Serializer};

// --- Error Type ---
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("JSON serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("binary serialization failed: {0}")]
    Binary(#[from] bincode::Error),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("receiving side of the channel is gone")]
    ChannelClosed,

    #[error("bad transport config: {0}")]
    Config(String),
}

/// Events of one or more ticks, shipped as a unit.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct EventBatch {
    /// Tick at which the batch was sent.
    pub tick: u64,
    pub events: Vec<WorldEvent>,
}
