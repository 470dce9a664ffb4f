//! dashd-core: Sensor liveness and publish pipeline for the Dash'd collector.
//!
//! This crate contains everything between "a sensor state file changed" and
//! "an event was handed to the network": the file parser, the in-memory
//! sensor record store, the directory reconciler, the update debouncer, the
//! cadence-based offline detector, and the single-worker loop that serializes
//! them. Filesystem notification and datagram transmission are reached only
//! through the [`WatchRegistry`] and [`Publisher`] traits.

pub mod constants;
mod error;
mod parser;
pub mod pipeline;
mod publisher;
mod store;
mod watch;

pub use constants::{
    DEFAULT_HOUSEKEEPING_INTERVAL, DEFAULT_OFFLINE_MULTIPLIER, MIN_UPDATE_INTERVAL,
    SENSOR_FILE_EXTENSION,
};
pub use error::{ParseError, WatchError};
pub use parser::{parse_sensor_file, ParsedUpdate};
pub use pipeline::{is_sensor_file, spawn_housekeeping, Pipeline, PipelineConfig, PipelineEvent};
pub use publisher::Publisher;
pub use store::{SensorRecord, SensorSnapshot, SensorStore, SourceId};
pub use watch::WatchRegistry;

// Re-export the shared types used in this crate's signatures
pub use dashd_types::{Domain, Event, OfflineReason, SensorState};
