//! dash-d collector - watches a queue directory of sensor state files and
//! republishes sensor liveness on a multicast group
//!
//! The pipeline itself lives in `dashd-core`; this crate wires it to the
//! real world (settings on disk, UDP multicast, filesystem notifications).

pub mod config;
pub mod logging;
pub mod net;
pub mod queue;
pub mod signals;
pub mod watch;

pub use config::{ConfigError, MulticastGroup, Settings};
pub use net::{MulticastSender, Receiver};
pub use watch::NotifyWatchRegistry;
