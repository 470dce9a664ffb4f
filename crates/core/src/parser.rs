//! Sensor state file parser
//!
//! A sensor file is a JSON object written by an external sensor process:
//!
//! ```json
//! { "sensor_name": "cpu", "sensor_state": "Healthy", "sensor_message": "optional" }
//! ```

use crate::error::ParseError;
use dashd_types::SensorState;
use serde_json::{Map, Value};

/// A validated update read from a sensor file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedUpdate {
    pub sensor_name: String,
    pub state: SensorState,
    /// Empty when the sensor did not provide one
    pub message: String,
}

/// Required string field, absent when missing or not a string
fn string_field<'a>(fields: &'a Map<String, Value>, name: &'static str) -> Result<&'a str, ParseError> {
    fields
        .get(name)
        .and_then(Value::as_str)
        .ok_or(ParseError::MissingField(name))
}

/// Decode and validate the contents of a sensor file
pub fn parse_sensor_file(bytes: &[u8]) -> Result<ParsedUpdate, ParseError> {
    let fields = match serde_json::from_slice::<Value>(bytes)? {
        Value::Object(fields) => fields,
        other => {
            return Err(ParseError::MalformedInput(<serde_json::Error as serde::de::Error>::custom(format!(
                "expected a JSON object, found {}",
                json_kind(&other)
            ))))
        }
    };

    let sensor_name = string_field(&fields, "sensor_name")?.to_string();
    let raw_state = string_field(&fields, "sensor_state")?;

    let state = raw_state
        .parse::<SensorState>()
        .map_err(|e| ParseError::UnknownState {
            sensor: sensor_name.clone(),
            value: e.0,
        })?;

    Ok(ParsedUpdate {
        sensor_name,
        state,
        message: fields
            .get("sensor_message")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
    })
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
