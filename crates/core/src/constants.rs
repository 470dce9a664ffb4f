//! Shared constants for the collector pipeline

use std::time::Duration;

/// Extension (without the dot) a queue file must carry to be treated as sensor data
pub const SENSOR_FILE_EXTENSION: &str = "json";

/// Change notifications arriving sooner than this after the last accepted
/// update of the same file are dropped without reparsing.
pub const MIN_UPDATE_INTERVAL: Duration = Duration::from_millis(1000);

/// A sensor is overdue once its silence reaches this many average cadences
pub const DEFAULT_OFFLINE_MULTIPLIER: u32 = 2;

/// Period of the housekeeping tick that drives offline detection
pub const DEFAULT_HOUSEKEEPING_INTERVAL: Duration = Duration::from_secs(30);
