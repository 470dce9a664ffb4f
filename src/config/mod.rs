//! Configuration management

mod settings;

pub use settings::{ConfigError, MulticastGroup, Settings, SettingsOverrides};
