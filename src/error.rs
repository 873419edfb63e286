use crate::types::Channel;

/// Failures raised by a transport while establishing or running a link.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TransportError {
    #[error("no device selected")]
    NoDeviceSelected,
    #[error("service {0} is not available on the device")]
    ServiceUnavailable(String),
    #[error("characteristic {0} is not available on the device")]
    CharacteristicUnavailable(String),
    #[error("connection error: {0}")]
    Connection(String),
    #[error("timed out after {0} ms")]
    Timeout(u64),
    #[error("MQTT error: {0}")]
    Mqtt(String),
}

impl From<rumqttc::ClientError> for TransportError {
    fn from(e: rumqttc::ClientError) -> Self {
        TransportError::Mqtt(e.to_string())
    }
}

impl From<rumqttc::ConnectionError> for TransportError {
    fn from(e: rumqttc::ConnectionError) -> Self {
        TransportError::Connection(e.to_string())
    }
}

/// Per-frame and per-field decode problems. Never fatal.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DecodeError {
    #[error("expected at least 2 fields, found {found}")]
    TooFewFields { found: usize },
    #[error("{channel} field {raw:?} is not a number")]
    InvalidNumber { channel: Channel, raw: String },
}

/// A sample arrived while the link was not streaming.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("sample discarded while {state}")]
pub struct StateViolation {
    pub state: String,
}
