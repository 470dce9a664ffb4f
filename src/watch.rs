//! Filesystem notifications via `notify`, bridged into the pipeline channel

use anyhow::{Context, Result};
use dashd_core::{is_sensor_file, PipelineEvent, WatchError, WatchRegistry};
use log::{debug, trace, warn};
use notify::event::ModifyKind;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc::{self, error::TrySendError};

/// Capacity of the channel between the notify thread and the pipeline
pub const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// [`WatchRegistry`] backed by the platform's recommended watcher
///
/// The queue directory is watched from construction until drop; sensor
/// files come and go through the registry interface.
pub struct NotifyWatchRegistry {
    watcher: RecommendedWatcher,
    watched: HashSet<PathBuf>,
}

impl NotifyWatchRegistry {
    /// Start watching `queue_directory`, forwarding notifications to `events`
    ///
    /// The notify callback never blocks: the pipeline calls back into the
    /// watcher while registering files, so a full channel drops the
    /// notification with a warning.
    pub fn new(queue_directory: &Path, events: mpsc::Sender<PipelineEvent>) -> Result<Self> {
        let queue = queue_directory.to_path_buf();

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) => {
                for pipeline_event in classify(&queue, &event) {
                    trace!("{:?} -> {:?}", event.kind, pipeline_event);
                    match events.try_send(pipeline_event) {
                        Ok(()) => {}
                        Err(TrySendError::Full(dropped)) => {
                            warn!("Pipeline event channel full, dropping {:?}", dropped)
                        }
                        Err(TrySendError::Closed(_)) => return,
                    }
                }
            }
            Err(e) => warn!("Filesystem watcher error: {}", e),
        })
        .context("Failed to create filesystem watcher")?;

        watcher
            .watch(queue_directory, RecursiveMode::NonRecursive)
            .with_context(|| format!("Failed to watch queue directory \"{}\"", queue_directory.display()))?;

        Ok(Self {
            watcher,
            watched: HashSet::new(),
        })
    }
}

impl WatchRegistry for NotifyWatchRegistry {
    fn watch(&mut self, path: &Path) -> Result<(), WatchError> {
        if self.watched.contains(path) {
            return Ok(());
        }
        self.watcher
            .watch(path, RecursiveMode::NonRecursive)
            .map_err(|e| WatchError::new(path, e))?;
        self.watched.insert(path.to_path_buf());
        debug!("Watching \"{}\"", path.display());
        Ok(())
    }

    fn unwatch(&mut self, path: &Path) {
        if !self.watched.remove(path) {
            return;
        }
        // The kernel drops the watch on its own when the file is deleted
        if let Err(e) = self.watcher.unwatch(path) {
            trace!("Unwatch of \"{}\" failed: {}", path.display(), e);
        }
    }
}

/// Map one notify event onto pipeline events
///
/// Anything that changes the set of files in the queue directory becomes a
/// [`PipelineEvent::DirectoryChanged`]; content and metadata changes on
/// sensor files become [`PipelineEvent::FileChanged`].
pub fn classify(queue_directory: &Path, event: &Event) -> Vec<PipelineEvent> {
    let relevant = |path: &PathBuf| is_sensor_file(path) || path == queue_directory;

    match event.kind {
        EventKind::Create(_) | EventKind::Remove(_) | EventKind::Modify(ModifyKind::Name(_)) => {
            if event.paths.iter().any(relevant) {
                vec![PipelineEvent::DirectoryChanged]
            } else {
                Vec::new()
            }
        }
        EventKind::Modify(_) => {
            let mut out: Vec<PipelineEvent> = Vec::new();
            for path in &event.paths {
                if path == queue_directory {
                    out.push(PipelineEvent::DirectoryChanged);
                } else if is_sensor_file(path) {
                    out.push(PipelineEvent::FileChanged(path.clone()));
                }
            }
            out.dedup();
            out
        }
        // Overflow and other backend-specific signals; rescan to be safe
        EventKind::Any | EventKind::Other => vec![PipelineEvent::DirectoryChanged],
        EventKind::Access(_) => Vec::new(),
    }
}
