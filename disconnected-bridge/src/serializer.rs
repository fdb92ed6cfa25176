use crate::{EventBatch, TransportError};

/// Turns a batch of events into a text frame.
pub trait Serializer: Send + Sync {
    fn serialize(&self, batch: &EventBatch) -> Result<String, TransportError>;
}

/// One JSON object per batch.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSerializer;

impl Serializer for JsonSerializer {
    fn serialize(&self, batch: &EventBatch) -> Result<String, TransportError> {
        Ok(serde_json::to_string(batch)?)
    }
}

/// bincode, base64-encoded so text senders can carry it.
#[derive(Debug, Clone, Copy, Default)]
pub struct BinarySerializer;

impl BinarySerializer {
    pub fn decode(frame: &str) -> Result<EventBatch, TransportError> {
        let bytes = base64::decode(frame.trim()).map_err(|e| TransportError::Config(e.to_string()))?;
        Ok(bincode::deserialize(&bytes)?)
    }
}

impl Serializer for BinarySerializer {
    fn serialize(&self, batch: &EventBatch) -> Result<String, TransportError> {
        let buffer = bincode::serialize(batch)?;
        Ok(base64::encode(&buffer))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use disconnected_core::{Arguments, WorldEvent};

    fn batch() -> EventBatch {
        EventBatch {
            tick: 12,
            events: vec![WorldEvent::custom("login", Arguments::new().with("user", "alice"))],
        }
    }

    #[test]
    fn json_frame_is_readable() {
        let frame = JsonSerializer.serialize(&batch()).unwrap();
        assert!(frame.starts_with(r#"{"tick":12,"events":[{"Custom":{"name":"login""#));
        let parsed: EventBatch = serde_json::from_str(&frame).unwrap();
        assert_eq!(parsed, batch());
    }

    #[test]
    fn binary_frame_is_base64_text() {
        let frame = BinarySerializer.serialize(&batch()).unwrap();
        assert!(frame.chars().all(|c| c.is_ascii_alphanumeric() || "+/=".contains(c)));
        assert_eq!(BinarySerializer::decode(&frame).unwrap(), batch());
    }
}
