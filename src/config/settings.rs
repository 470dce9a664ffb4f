//! Persisted collector settings

use anyhow::Result;
use dashd_core::constants::{DEFAULT_HOUSEKEEPING_INTERVAL, DEFAULT_OFFLINE_MULTIPLIER};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{AddrParseError, IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Port the collector publishes on unless told otherwise
pub const DEFAULT_PORT: u16 = 20856;

/// Current version of the settings format
const SETTINGS_VERSION: u32 = 1;

/// Reasons the multicast selection cannot be used
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Only one of IPv4 or IPv6 may be specified.")]
    BothGroups,

    #[error("An address for either IPv4 or IPv6 must be specified.")]
    NoGroup,

    #[error("\"{value}\" is not a valid address: {source}")]
    InvalidGroup {
        value: String,
        #[source]
        source: AddrParseError,
    },

    #[error("{0} is not a multicast address")]
    NotMulticast(IpAddr),

    #[error("Offline multiplier must be at least 1")]
    InvalidMultiplier,
}

/// The one multicast group events are sent to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MulticastGroup {
    V4(Ipv4Addr),
    V6(Ipv6Addr),
}

impl MulticastGroup {
    pub fn ip(&self) -> IpAddr {
        match self {
            MulticastGroup::V4(addr) => IpAddr::V4(*addr),
            MulticastGroup::V6(addr) => IpAddr::V6(*addr),
        }
    }

    pub fn socket_addr(&self, port: u16) -> SocketAddr {
        SocketAddr::new(self.ip(), port)
    }

    pub fn family(&self) -> &'static str {
        match self {
            MulticastGroup::V4(_) => "IPv4",
            MulticastGroup::V6(_) => "IPv6",
        }
    }
}

impl fmt::Display for MulticastGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} multicast {}", self.family(), self.ip())
    }
}

/// Collector settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Version of the settings format
    #[serde(default = "default_version")]
    pub version: u32,
    /// Identifier this host publishes under, stable across restarts
    pub domain_id: u64,
    #[serde(default)]
    pub ipv4_group: String,
    #[serde(default)]
    pub ipv6_group: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_queue_directory")]
    pub queue_directory: PathBuf,
    /// Log to `dash-d.log` in this directory instead of the console
    #[serde(default)]
    pub log_directory: Option<PathBuf>,
    #[serde(default)]
    pub clean_on_startup: bool,
    #[serde(default)]
    pub offline_detection_enabled: bool,
    #[serde(default = "default_offline_multiplier")]
    pub offline_multiplier: u32,
    #[serde(default = "default_housekeeping_interval_secs")]
    pub housekeeping_interval_secs: u64,
}

fn default_version() -> u32 {
    SETTINGS_VERSION
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_queue_directory() -> PathBuf {
    PathBuf::from("/tmp/dash-d")
}

fn default_offline_multiplier() -> u32 {
    DEFAULT_OFFLINE_MULTIPLIER
}

fn default_housekeeping_interval_secs() -> u64 {
    DEFAULT_HOUSEKEEPING_INTERVAL.as_secs()
}

/// Values given on the command line that take precedence over the stored ones
#[derive(Debug, Clone, Default)]
pub struct SettingsOverrides {
    pub queue_directory: Option<PathBuf>,
    pub log_directory: Option<PathBuf>,
    pub port: Option<u16>,
    pub ipv4_group: Option<String>,
    pub ipv6_group: Option<String>,
    pub clean_on_startup: bool,
    pub offline_detection: bool,
    pub offline_multiplier: Option<u32>,
}

impl Settings {
    /// Fresh settings with a random domain id and a random `239.x.y.z` group
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        let [b1, b2, b3]: [u8; 3] = rng.gen();

        Self {
            version: SETTINGS_VERSION,
            domain_id: rng.gen(),
            ipv4_group: format!("239.{}.{}.{}", b1, b2, b3),
            ipv6_group: String::new(),
            port: DEFAULT_PORT,
            queue_directory: default_queue_directory(),
            log_directory: None,
            clean_on_startup: false,
            offline_detection_enabled: false,
            offline_multiplier: DEFAULT_OFFLINE_MULTIPLIER,
            housekeeping_interval_secs: default_housekeeping_interval_secs(),
        }
    }

    /// Get the settings file path
    pub fn settings_path() -> Result<PathBuf> {
        let dirs = directories::ProjectDirs::from("com", "dash-d", "dash-d")
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;

        Ok(dirs.config_dir().join("settings.json"))
    }

    /// Load settings from `path`, generating and saving a new set if it does not exist
    pub fn load_or_init(path: &Path) -> Result<Self> {
        if !path.exists() {
            let settings = Self::generate();
            settings.save_to_path(path)?;
            log::info!("Created settings file \"{}\"", path.display());
            return Ok(settings);
        }

        Self::load_from_path(path)
    }

    /// Load settings from a specific file path
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let settings = serde_json::from_str(&content)?;
        Ok(settings)
    }

    /// Save settings to a specific file path
    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Merge command line values into these settings
    ///
    /// Naming one multicast family on the command line clears the stored
    /// address of the other, so a stored IPv4 group does not clash with
    /// `--ipv6`.
    pub fn apply(&mut self, overrides: SettingsOverrides) {
        if let Some(dir) = overrides.queue_directory {
            self.queue_directory = dir;
        }
        if let Some(dir) = overrides.log_directory {
            self.log_directory = Some(dir);
        }
        if let Some(port) = overrides.port {
            self.port = port;
        }
        match (overrides.ipv4_group, overrides.ipv6_group) {
            (Some(v4), Some(v6)) => {
                self.ipv4_group = v4;
                self.ipv6_group = v6;
            }
            (Some(v4), None) => {
                self.ipv4_group = v4;
                self.ipv6_group.clear();
            }
            (None, Some(v6)) => {
                self.ipv4_group.clear();
                self.ipv6_group = v6;
            }
            (None, None) => {}
        }
        if overrides.clean_on_startup {
            self.clean_on_startup = true;
        }
        if overrides.offline_detection {
            self.offline_detection_enabled = true;
        }
        if let Some(multiplier) = overrides.offline_multiplier {
            self.offline_multiplier = multiplier;
        }
    }

    /// The configured multicast group
    ///
    /// Exactly one of the IPv4 and IPv6 groups must be set, and it must be a
    /// multicast address of the matching family.
    pub fn multicast_group(&self) -> Result<MulticastGroup, ConfigError> {
        let v4 = self.ipv4_group.trim();
        let v6 = self.ipv6_group.trim();

        match (v4.is_empty(), v6.is_empty()) {
            (false, false) => Err(ConfigError::BothGroups),
            (true, true) => Err(ConfigError::NoGroup),
            (false, true) => {
                let addr: Ipv4Addr = v4.parse().map_err(|source| ConfigError::InvalidGroup {
                    value: v4.to_string(),
                    source,
                })?;
                if !addr.is_multicast() {
                    return Err(ConfigError::NotMulticast(IpAddr::V4(addr)));
                }
                Ok(MulticastGroup::V4(addr))
            }
            (true, false) => {
                let addr: Ipv6Addr = v6.parse().map_err(|source| ConfigError::InvalidGroup {
                    value: v6.to_string(),
                    source,
                })?;
                if !addr.is_multicast() {
                    return Err(ConfigError::NotMulticast(IpAddr::V6(addr)));
                }
                Ok(MulticastGroup::V6(addr))
            }
        }
    }

    /// Check everything the collector cannot run without
    pub fn validate(&self) -> Result<MulticastGroup, ConfigError> {
        if self.offline_multiplier == 0 {
            return Err(ConfigError::InvalidMultiplier);
        }
        self.multicast_group()
    }

    pub fn housekeeping_interval(&self) -> Duration {
        Duration::from_secs(self.housekeeping_interval_secs.max(1))
    }
}
