//! Single-worker pipeline that turns queue-directory activity into events
//!
//! All reconciliation, parsing, cache mutation and offline detection run on
//! one task that drains a channel of [`PipelineEvent`]s. Because nothing else
//! touches the [`SensorStore`], a housekeeping sweep can never observe a
//! half-applied update.

mod offline;
mod reconcile;
mod update;

#[cfg(test)]
mod test_support;

use crate::constants::{DEFAULT_OFFLINE_MULTIPLIER, SENSOR_FILE_EXTENSION};
use crate::publisher::Publisher;
use crate::store::{SensorSnapshot, SensorStore, SourceId};
use crate::watch::WatchRegistry;
use chrono::{DateTime, Utc};
use dashd_types::{Event, OfflineReason};
use log::{debug, info, trace, warn};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

/// Signals consumed by the pipeline worker
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineEvent {
    /// Something in the queue directory was created, removed or renamed
    DirectoryChanged,
    /// A sensor file's contents changed
    FileChanged(PathBuf),
    /// Periodic housekeeping (offline detection)
    HousekeepingTick,
}

/// Runtime options for the pipeline
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Directory sensors drop their state files into
    pub queue_directory: PathBuf,
    /// Files last modified at or before this instant are left over from a previous run
    pub start_time: DateTime<Utc>,
    pub offline_detection: bool,
    pub offline_multiplier: u32,
}

impl PipelineConfig {
    pub fn new(queue_directory: impl Into<PathBuf>) -> Self {
        Self {
            queue_directory: queue_directory.into(),
            start_time: Utc::now(),
            offline_detection: false,
            offline_multiplier: DEFAULT_OFFLINE_MULTIPLIER,
        }
    }
}

/// The collector's worker state
pub struct Pipeline<P, W> {
    config: PipelineConfig,
    store: SensorStore,
    publisher: P,
    registry: W,
    /// Per-path modification time a file must exceed before it is treated as new again
    watermarks: HashMap<PathBuf, DateTime<Utc>>,
    /// Files being watched that have not yet parsed into a record
    unparsed: HashSet<PathBuf>,
}

impl<P: Publisher, W: WatchRegistry> Pipeline<P, W> {
    pub fn new(config: PipelineConfig, publisher: P, registry: W) -> Self {
        Self {
            config,
            store: SensorStore::new(),
            publisher,
            registry,
            watermarks: HashMap::new(),
            unparsed: HashSet::new(),
        }
    }

    /// Read-only copies of every known sensor
    pub fn snapshot(&self) -> Vec<SensorSnapshot> {
        self.store.snapshot()
    }

    /// Number of sensors currently tracked
    pub fn sensor_count(&self) -> usize {
        self.store.len()
    }

    /// Consume events until the channel closes or `shutdown` flips
    ///
    /// A batch already taken from the channel is always processed to the end
    /// before shutdown is honoured.
    pub async fn run(&mut self, mut events: mpsc::Receiver<PipelineEvent>, mut shutdown: watch::Receiver<bool>) {
        info!("Sensor pipeline running on {}", self.config.queue_directory.display());

        loop {
            if *shutdown.borrow() {
                break;
            }

            let first = tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                event = events.recv() => match event {
                    Some(event) => event,
                    None => break,
                },
            };

            let mut batch = vec![first];
            while let Ok(event) = events.try_recv() {
                batch.push(event);
            }

            self.handle_batch(batch, Utc::now());
        }

        info!("Sensor pipeline stopped ({} sensors tracked)", self.store.len());
    }

    /// Process one batch of queued events
    ///
    /// Any number of directory notifications collapse into one reconciliation
    /// pass, and repeated notifications for the same file into one check.
    pub fn handle_batch(&mut self, batch: Vec<PipelineEvent>, now: DateTime<Utc>) {
        let mut directory_changed = false;
        let mut tick = false;
        let mut files: Vec<PathBuf> = Vec::new();

        for event in batch {
            match event {
                PipelineEvent::DirectoryChanged => directory_changed = true,
                PipelineEvent::FileChanged(path) => {
                    if !files.contains(&path) {
                        files.push(path);
                    }
                }
                PipelineEvent::HousekeepingTick => tick = true,
            }
        }

        if directory_changed {
            self.reconcile_at(now);
        }

        for path in files {
            // The pass above already looked at every untracked file
            if directory_changed && self.store.id_for(&path).is_none() {
                continue;
            }
            self.file_changed(&path, now);
        }

        if tick {
            self.housekeeping(now);
        }
    }

    /// Periodic work driven by the housekeeping timer
    pub fn housekeeping(&mut self, now: DateTime<Utc>) {
        if self.config.offline_detection {
            let retired = self.sweep_offline(now);
            if retired > 0 {
                debug!("Offline sweep retired {} sensor(s)", retired);
            }
        }
        trace!("Housekeeping: {} sensor(s) tracked", self.store.len());
    }

    fn publish(&mut self, event: Event) {
        debug!("Publishing {} event for \"{}\"", event.message_type(), event.sensor_name());
        self.publisher.publish(&event);
    }

    /// Destroy a record, announcing the sensor as offline first
    fn retire(&mut self, id: SourceId, reason: OfflineReason) {
        let Some(record) = self.store.get(id) else {
            return;
        };
        let sensor_name = record.sensor_name().to_string();
        let path = record.path().to_path_buf();

        match reason {
            OfflineReason::Removed => warn!("Sensor data file \"{}\" has been removed.", path.display()),
            _ => warn!("Sensor \"{}\" is offline ({}).", sensor_name, reason),
        }

        self.publish(Event::Offline { sensor_name, reason });
        self.registry.unwatch(&path);
        self.store.remove(id);
    }
}

/// True for files the collector treats as sensor data
pub fn is_sensor_file(path: &Path) -> bool {
    path.extension().and_then(|ext| ext.to_str()) == Some(SENSOR_FILE_EXTENSION)
}

/// Modification time of a file as a UTC timestamp
pub(crate) fn file_modified(path: &Path) -> std::io::Result<DateTime<Utc>> {
    let modified = std::fs::metadata(path)?.modified()?;
    Ok(DateTime::<Utc>::from(modified))
}

/// Spawn the timer that feeds [`PipelineEvent::HousekeepingTick`] into the pipeline
///
/// The task ends when the pipeline's receiver is dropped.
pub fn spawn_housekeeping(events: mpsc::Sender<PipelineEvent>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        // The first tick completes immediately
        interval.tick().await;

        loop {
            interval.tick().await;
            if events.send(PipelineEvent::HousekeepingTick).await.is_err() {
                break;
            }
        }
    })
}
