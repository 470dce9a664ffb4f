//! Sensor state vocabulary and multicast message types

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A name that is not part of a fixed vocabulary
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unrecognized name \"{0}\"")]
pub struct UnknownName(pub String);

/// Health state reported for a sensor
///
/// `Undefined` and `Offline` are collector-internal: a sensor process never
/// writes them itself, but they are still part of the recognized vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SensorState {
    #[default]
    Undefined,
    Healthy,
    Poor,
    Critical,
    Deceased,
    Offline,
}

impl SensorState {
    /// All recognized states, in severity order
    pub const ALL: [SensorState; 6] = [
        SensorState::Undefined,
        SensorState::Healthy,
        SensorState::Poor,
        SensorState::Critical,
        SensorState::Deceased,
        SensorState::Offline,
    ];

    /// Lower-case wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            SensorState::Undefined => "undefined",
            SensorState::Healthy => "healthy",
            SensorState::Poor => "poor",
            SensorState::Critical => "critical",
            SensorState::Deceased => "deceased",
            SensorState::Offline => "offline",
        }
    }
}

impl fmt::Display for SensorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SensorState {
    type Err = UnknownName;

    /// Case-insensitive lookup
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.to_lowercase();
        SensorState::ALL
            .iter()
            .copied()
            .find(|state| state.as_str() == lowered)
            .ok_or(UnknownName(lowered))
    }
}

/// Kind of message carried on the multicast group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    /// Sensor data
    Sensor,
    /// Informational: sensor has gone offline
    Offline,
    Warning,
    Error,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::Sensor => "sensor",
            MessageType::Offline => "offline",
            MessageType::Warning => "warning",
            MessageType::Error => "error",
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageType {
    type Err = UnknownName;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sensor" => Ok(MessageType::Sensor),
            "offline" => Ok(MessageType::Offline),
            "warning" => Ok(MessageType::Warning),
            "error" => Ok(MessageType::Error),
            other => Err(UnknownName(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_parse_is_case_insensitive() {
        assert_eq!("Healthy".parse::<SensorState>(), Ok(SensorState::Healthy));
        assert_eq!("CRITICAL".parse::<SensorState>(), Ok(SensorState::Critical));
        assert_eq!("deceased".parse::<SensorState>(), Ok(SensorState::Deceased));
    }

    #[test]
    fn test_state_parse_rejects_unknown() {
        let err = "Sleepy".parse::<SensorState>().unwrap_err();
        assert_eq!(err, UnknownName("sleepy".to_string()));
    }

    #[test]
    fn test_state_serializes_lowercase() {
        let json = serde_json::to_string(&SensorState::Poor).unwrap();
        assert_eq!(json, "\"poor\"");
    }

    #[test]
    fn test_message_type_names() {
        for kind in [MessageType::Sensor, MessageType::Offline, MessageType::Warning, MessageType::Error] {
            assert_eq!(kind.as_str().parse::<MessageType>(), Ok(kind));
        }
        assert!("heartbeat".parse::<MessageType>().is_err());
    }
}
