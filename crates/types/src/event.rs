//! Events published to the multicast group and their wire form
//!
//! On the wire an event is a single JSON object:
//!
//! ```text
//! { "domain_id": "1234", "domain_name": "host", "type": "sensor",
//!   "sensor_name": "cpu", "sensor_state": "healthy", "sensor_message": "" }
//! ```
//!
//! `domain_id` is a decimal string and every free-text field is
//! percent-encoded (see [`crate::encoding`]).

use crate::encoding::{percent_decode, percent_encode};
use crate::state::{MessageType, SensorState};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of the collector instance publishing events
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Domain {
    /// Persistent random identifier
    pub id: u64,
    /// Human-readable name (normally the host name)
    pub name: String,
}

impl Domain {
    pub fn new(id: u64, name: impl Into<String>) -> Self {
        Self { id, name: name.into() }
    }
}

/// Why a sensor was declared offline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OfflineReason {
    /// Backing file disappeared from the queue directory
    Removed,
    /// No update within the expected cadence window
    Overdue,
    /// The file started reporting a different sensor name
    Renamed,
}

impl fmt::Display for OfflineReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            OfflineReason::Removed => "removed",
            OfflineReason::Overdue => "overdue",
            OfflineReason::Renamed => "renamed",
        })
    }
}

/// Event produced by the collector pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// A sensor reported its current state
    Sensor {
        sensor_name: String,
        state: SensorState,
        message: String,
    },
    /// A sensor is no longer reporting
    ///
    /// The reason is kept for local logging only; it is not transmitted.
    Offline {
        sensor_name: String,
        reason: OfflineReason,
    },
}

impl Event {
    pub fn sensor_name(&self) -> &str {
        match self {
            Event::Sensor { sensor_name, .. } | Event::Offline { sensor_name, .. } => sensor_name,
        }
    }

    pub fn message_type(&self) -> MessageType {
        match self {
            Event::Sensor { .. } => MessageType::Sensor,
            Event::Offline { .. } => MessageType::Offline,
        }
    }
}

/// Errors raised while encoding or decoding wire events
#[derive(Debug, thiserror::Error)]
pub enum WireError {
    #[error("invalid event payload: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid domain id \"{0}\"")]
    DomainId(String),
    #[error("field {field} is not valid percent-encoded UTF-8")]
    Encoding { field: &'static str },
    #[error("{kind} event is missing field {field}")]
    MissingField { kind: MessageType, field: &'static str },
    #[error("unrecognized sensor state \"{0}\"")]
    State(String),
}

/// Raw JSON shape shared by every message type
#[derive(Debug, Serialize, Deserialize)]
struct WireEvent {
    domain_id: String,
    domain_name: String,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    sensor_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    sensor_state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    sensor_message: Option<String>,
}

/// Serialize an event into its datagram payload
pub fn encode_event(domain: &Domain, event: &Event) -> Result<Vec<u8>, WireError> {
    let mut wire = WireEvent {
        domain_id: domain.id.to_string(),
        domain_name: percent_encode(&domain.name),
        kind: event.message_type().as_str().to_string(),
        sensor_name: Some(percent_encode(event.sensor_name())),
        sensor_state: None,
        sensor_message: None,
    };

    if let Event::Sensor { state, message, .. } = event {
        wire.sensor_state = Some(state.as_str().to_string());
        wire.sensor_message = Some(percent_encode(message));
    }

    Ok(serde_json::to_vec(&wire)?)
}

/// An event as seen by a consumer of the multicast group
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedEvent {
    pub domain: Domain,
    pub kind: MessageType,
    pub sensor_name: Option<String>,
    pub sensor_state: Option<SensorState>,
    pub sensor_message: Option<String>,
}

fn decode_field(value: Option<String>, field: &'static str) -> Result<Option<String>, WireError> {
    value
        .map(|v| percent_decode(&v).map_err(|_| WireError::Encoding { field }))
        .transpose()
}

/// Parse a datagram payload
///
/// Returns `Ok(None)` for well-formed messages whose `type` is not one this
/// build understands; consumers skip those.
pub fn decode_event(payload: &[u8]) -> Result<Option<ReceivedEvent>, WireError> {
    let wire: WireEvent = serde_json::from_slice(payload)?;

    let kind = match wire.kind.parse::<MessageType>() {
        Ok(kind) => kind,
        Err(_) => {
            log::debug!("Ignoring event with unknown type \"{}\"", wire.kind);
            return Ok(None);
        }
    };

    let id = wire
        .domain_id
        .parse::<u64>()
        .map_err(|_| WireError::DomainId(wire.domain_id.clone()))?;
    let name = percent_decode(&wire.domain_name)
        .map_err(|_| WireError::Encoding { field: "domain_name" })?;

    let sensor_name = decode_field(wire.sensor_name, "sensor_name")?;
    let sensor_message = decode_field(wire.sensor_message, "sensor_message")?;
    let sensor_state = wire
        .sensor_state
        .map(|s| s.parse::<SensorState>().map_err(|e| WireError::State(e.0)))
        .transpose()?;

    if matches!(kind, MessageType::Sensor | MessageType::Offline) && sensor_name.is_none() {
        return Err(WireError::MissingField { kind, field: "sensor_name" });
    }
    if kind == MessageType::Sensor && sensor_state.is_none() {
        return Err(WireError::MissingField { kind, field: "sensor_state" });
    }

    Ok(Some(ReceivedEvent {
        domain: Domain { id, name },
        kind,
        sensor_name,
        sensor_state,
        sensor_message,
    }))
}
