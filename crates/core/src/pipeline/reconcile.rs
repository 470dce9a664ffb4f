//! Directory reconciliation: diff the queue directory against the store

use super::{file_modified, is_sensor_file, Pipeline};
use crate::publisher::Publisher;
use crate::store::SourceId;
use crate::watch::WatchRegistry;
use chrono::{DateTime, Utc};
use dashd_types::OfflineReason;
use log::{debug, info, warn};
use std::io;
use std::path::PathBuf;

impl<P: Publisher, W: WatchRegistry> Pipeline<P, W> {
    /// Run one reconciliation pass over the queue directory
    ///
    /// New sensor files get a watch (and a record once they parse), records
    /// whose file is gone are retired, and tracked files that were replaced
    /// behind their watch are reloaded. The pass only looks at current
    /// filesystem state, so running it again without changes on disk does
    /// nothing.
    pub fn reconcile(&mut self) {
        self.reconcile_at(Utc::now());
    }

    pub(super) fn reconcile_at(&mut self, now: DateTime<Utc>) {
        let listed = match self.list_sensor_files() {
            Ok(listed) => listed,
            Err(e) => {
                warn!(
                    "Failed to list queue directory \"{}\": {}",
                    self.config.queue_directory.display(),
                    e
                );
                return;
            }
        };

        for path in &listed {
            if let Some(id) = self.store.id_for(path) {
                self.refresh_tracked(id, path, now);
                continue;
            }

            let modified = match file_modified(path) {
                Ok(modified) => modified,
                Err(e) => {
                    // Listed, then gone before we could stat it
                    debug!("Skipping vanished file \"{}\": {}", path.display(), e);
                    continue;
                }
            };

            let watermark = self
                .watermarks
                .get(path)
                .copied()
                .unwrap_or(self.config.start_time)
                .max(self.config.start_time);
            if modified <= watermark {
                if !self.watermarks.contains_key(path) {
                    info!(
                        "Ignoring sensor data file \"{}\" last modified before startup.",
                        path.display()
                    );
                    self.watermarks.insert(path.clone(), self.config.start_time);
                }
                continue;
            }
            self.watermarks.remove(path);

            if self.unparsed.insert(path.clone()) {
                if let Err(e) = self.registry.watch(path) {
                    warn!("{}", e);
                }
            }
            if self.load(path, modified).is_some() {
                self.unparsed.remove(path);
            }
        }

        let removed: Vec<SourceId> = self
            .store
            .iter()
            .filter(|record| !record.path().exists())
            .map(|record| record.source_id())
            .collect();
        for id in removed {
            self.retire(id, OfflineReason::Removed);
        }

        let abandoned: Vec<PathBuf> = self
            .unparsed
            .iter()
            .filter(|path| !listed.contains(*path))
            .cloned()
            .collect();
        for path in abandoned {
            debug!("Unparsed sensor data file \"{}\" went away", path.display());
            self.registry.unwatch(&path);
            self.unparsed.remove(&path);
        }

        self.watermarks.retain(|path, _| listed.contains(path));
    }

    /// Sensor files currently present in the queue directory
    fn list_sensor_files(&self) -> io::Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        for entry in std::fs::read_dir(&self.config.queue_directory)? {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    debug!("Skipping unreadable directory entry: {}", e);
                    continue;
                }
            };
            let path = entry.path();
            let is_file = entry.file_type().map(|t| t.is_file()).unwrap_or(false);
            if is_file && is_sensor_file(&path) {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::Fixture;
    use super::super::PipelineEvent;
    use dashd_types::{Event, OfflineReason, SensorState};

    #[test]
    fn test_new_file_creates_record_and_watch() {
        let mut fx = Fixture::new();
        fx.write("cpu.json", r#"{"sensor_name":"cpu","sensor_state":"Healthy"}"#, 5);

        fx.pipeline.reconcile();

        assert_eq!(
            fx.events(),
            vec![Event::Sensor {
                sensor_name: "cpu".to_string(),
                state: SensorState::Healthy,
                message: String::new(),
            }]
        );
        assert!(fx.watched().contains(&fx.path("cpu.json")));
        let snapshot = fx.pipeline.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].update_count, 0);
    }

    #[test]
    fn test_reconcile_is_idempotent() {
        let mut fx = Fixture::new();
        fx.write("cpu.json", r#"{"sensor_name":"cpu","sensor_state":"healthy"}"#, 5);
        fx.write("disk.json", r#"{"sensor_name":"disk","sensor_state":"poor"}"#, 6);

        fx.pipeline.reconcile();
        let events_after_first = fx.events().len();
        let snapshot_after_first = fx.pipeline.snapshot();

        fx.pipeline.reconcile();

        assert_eq!(events_after_first, 2);
        assert_eq!(fx.events().len(), events_after_first);
        assert_eq!(fx.pipeline.snapshot(), snapshot_after_first);
    }

    #[test]
    fn test_files_from_before_startup_are_ignored() {
        let mut fx = Fixture::new();
        fx.write("old.json", r#"{"sensor_name":"old","sensor_state":"healthy"}"#, -60);
        fx.write("edge.json", r#"{"sensor_name":"edge","sensor_state":"healthy"}"#, 0);

        fx.pipeline.reconcile();
        fx.pipeline.reconcile();

        assert!(fx.events().is_empty());
        assert_eq!(fx.pipeline.sensor_count(), 0);

        // A fresh write makes it eligible
        fx.write("old.json", r#"{"sensor_name":"old","sensor_state":"poor"}"#, 3);
        fx.pipeline.reconcile();
        assert_eq!(fx.pipeline.sensor_count(), 1);
    }

    #[test]
    fn test_other_extensions_are_ignored() {
        let mut fx = Fixture::new();
        fx.write("notes.txt", r#"{"sensor_name":"x","sensor_state":"healthy"}"#, 5);
        fx.write("cpu.json.partial", r#"{"sensor_name":"y","sensor_state":"healthy"}"#, 5);
        std::fs::create_dir(fx.path("nested.json")).unwrap();

        fx.pipeline.reconcile();

        assert!(fx.events().is_empty());
    }

    #[test]
    fn test_removed_file_goes_offline_once() {
        let mut fx = Fixture::new();
        fx.write("cpu.json", r#"{"sensor_name":"cpu","sensor_state":"healthy"}"#, 5);
        fx.pipeline.reconcile();
        fx.clear_events();

        fx.remove("cpu.json");
        fx.pipeline.reconcile();
        fx.pipeline.reconcile();

        assert_eq!(
            fx.events(),
            vec![Event::Offline {
                sensor_name: "cpu".to_string(),
                reason: OfflineReason::Removed,
            }]
        );
        assert_eq!(fx.pipeline.sensor_count(), 0);
        assert!(!fx.watched().contains(&fx.path("cpu.json")));
    }

    #[test]
    fn test_malformed_file_leaves_no_record() {
        let mut fx = Fixture::new();
        fx.write("cpu.json", "", 5);
        fx.write("gpu.json", r#"{"sensor_name":"gpu","sensor_st"#, 5);

        fx.pipeline.reconcile();

        assert!(fx.events().is_empty());
        assert_eq!(fx.pipeline.sensor_count(), 0);
        assert!(fx.watched().contains(&fx.path("cpu.json")));
        assert!(fx.watched().contains(&fx.path("gpu.json")));

        // Completed on the next write, delivered through the file's own watch
        fx.write("cpu.json", r#"{"sensor_name":"cpu","sensor_state":"healthy"}"#, 6);
        fx.pipeline.file_changed(&fx.path("cpu.json"), fx.at(6_100));
        assert_eq!(fx.events().len(), 1);
        assert_eq!(fx.pipeline.sensor_count(), 1);

        // Never completed, then deleted: the watch goes with it
        fx.remove("gpu.json");
        fx.pipeline.reconcile();
        assert!(!fx.watched().contains(&fx.path("gpu.json")));
        assert!(fx.watched().contains(&fx.path("cpu.json")));
        assert_eq!(fx.events().len(), 1);
    }

    #[test]
    fn test_file_replaced_by_rename_is_reloaded() {
        let mut fx = Fixture::new();
        fx.write("cpu.json", r#"{"sensor_name":"cpu","sensor_state":"healthy"}"#, 5);
        fx.pipeline.reconcile();
        fx.clear_events();

        // Sensor writes a temp file and renames it over the tracked one
        fx.write("cpu.tmp", r#"{"sensor_name":"cpu","sensor_state":"critical"}"#, 20);
        std::fs::rename(fx.path("cpu.tmp"), fx.path("cpu.json")).unwrap();
        fx.pipeline.handle_batch(vec![PipelineEvent::DirectoryChanged], fx.at(20_100));

        assert_eq!(
            fx.events(),
            vec![Event::Sensor {
                sensor_name: "cpu".to_string(),
                state: SensorState::Critical,
                message: String::new(),
            }]
        );
        assert_eq!(fx.rewatched(), vec![fx.path("cpu.json")]);
        let snapshot = &fx.pipeline.snapshot()[0];
        assert_eq!(snapshot.update_count, 1);
        assert_eq!(snapshot.last_modified, fx.at(20_000));

        // The echo from the new watch is debounced
        fx.pipeline.file_changed(&fx.path("cpu.json"), fx.at(20_300));
        assert_eq!(fx.events().len(), 1);
    }

    #[test]
    fn test_replacement_inside_debounce_window_only_rewatches() {
        let mut fx = Fixture::new();
        fx.write_ms("cpu.json", r#"{"sensor_name":"cpu","sensor_state":"healthy"}"#, 5_000);
        fx.pipeline.reconcile();
        fx.clear_events();

        fx.write_ms("cpu.json", r#"{"sensor_name":"cpu","sensor_state":"poor"}"#, 5_400);
        fx.pipeline.handle_batch(vec![PipelineEvent::DirectoryChanged], fx.at(5_500));

        assert!(fx.events().is_empty());
        assert_eq!(fx.rewatched(), vec![fx.path("cpu.json")]);
    }

    #[test]
    fn test_missing_queue_directory_is_not_fatal() {
        let mut fx = Fixture::new();
        fx.write("cpu.json", r#"{"sensor_name":"cpu","sensor_state":"healthy"}"#, 5);
        fx.pipeline.reconcile();
        fx.clear_events();

        fx.pipeline.config.queue_directory = fx.path("does-not-exist");
        fx.pipeline.reconcile();

        assert!(fx.events().is_empty());
        assert_eq!(fx.pipeline.sensor_count(), 1);
    }
}
