//! Test fixture: a pipeline over a temporary queue directory

use super::{Pipeline, PipelineConfig};
use crate::error::WatchError;
use crate::publisher::Publisher;
use crate::watch::WatchRegistry;
use chrono::{DateTime, Duration, TimeZone, Utc};
use dashd_types::Event;
use std::collections::BTreeSet;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tempfile::TempDir;

#[derive(Debug, Default)]
pub struct RecordingPublisher {
    pub events: Vec<Event>,
}

impl Publisher for RecordingPublisher {
    fn publish(&mut self, event: &Event) {
        self.events.push(event.clone());
    }
}

#[derive(Debug, Default)]
pub struct RecordingRegistry {
    pub watched: BTreeSet<PathBuf>,
    pub rewatched: Vec<PathBuf>,
}

impl WatchRegistry for RecordingRegistry {
    fn watch(&mut self, path: &Path) -> Result<(), WatchError> {
        self.watched.insert(path.to_path_buf());
        Ok(())
    }

    fn unwatch(&mut self, path: &Path) {
        self.watched.remove(path);
    }

    fn rewatch(&mut self, path: &Path) -> Result<(), WatchError> {
        self.rewatched.push(path.to_path_buf());
        self.watch(path)
    }
}

pub struct Fixture {
    dir: TempDir,
    base: DateTime<Utc>,
    pub pipeline: Pipeline<RecordingPublisher, RecordingRegistry>,
}

impl Fixture {
    /// Pipeline whose start time is the fixture's base instant
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let base = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let mut config = PipelineConfig::new(dir.path());
        config.start_time = base;

        Self {
            dir,
            base,
            pipeline: Pipeline::new(config, RecordingPublisher::default(), RecordingRegistry::default()),
        }
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    /// Instant `offset_ms` after the start time
    pub fn at(&self, offset_ms: i64) -> DateTime<Utc> {
        self.base + Duration::milliseconds(offset_ms)
    }

    /// Write a file stamped `offset_secs` after the start time
    pub fn write(&self, name: &str, contents: &str, offset_secs: i64) {
        self.write_ms(name, contents, offset_secs * 1000);
    }

    pub fn write_ms(&self, name: &str, contents: &str, offset_ms: i64) {
        let mut file = File::create(self.path(name)).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file.set_modified(SystemTime::from(self.at(offset_ms))).unwrap();
    }

    pub fn remove(&self, name: &str) {
        std::fs::remove_file(self.path(name)).unwrap();
    }

    pub fn events(&self) -> Vec<Event> {
        self.pipeline.publisher.events.clone()
    }

    pub fn clear_events(&mut self) {
        self.pipeline.publisher.events.clear();
    }

    pub fn watched(&self) -> BTreeSet<PathBuf> {
        self.pipeline.registry.watched.clone()
    }

    pub fn rewatched(&self) -> Vec<PathBuf> {
        self.pipeline.registry.rewatched.clone()
    }

    /// A sensor with `updates` accepted updates one second apart, starting one second after startup
    pub fn seed_regular_sensor(&mut self, file: &str, sensor_name: &str, updates: i64) {
        let body = format!(r#"{{"sensor_name":"{}","sensor_state":"healthy"}}"#, sensor_name);
        self.write(file, &body, 1);
        self.pipeline.reconcile();

        for i in 2..=updates + 1 {
            self.write(file, &body, i);
            let path = self.path(file);
            let now = self.at(i * 1000 + 100);
            self.pipeline.file_changed(&path, now);
        }
    }
}
