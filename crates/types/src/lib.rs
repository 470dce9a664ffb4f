//! dashd-types: Shared wire and state types for the Dash'd collector.
//!
//! This crate holds the pure data types shared by the collector pipeline and
//! the network layer: the sensor state vocabulary, the message types that
//! travel on the multicast group, the wire encoding of those messages, and
//! the percent-encoding applied to free-text fields.

pub mod encoding;
pub mod event;
pub mod state;

// Re-export commonly used types at the crate root for convenience
pub use encoding::{percent_decode, percent_encode};
pub use event::{decode_event, encode_event, Domain, Event, OfflineReason, ReceivedEvent, WireError};
pub use state::{MessageType, SensorState, UnknownName};
