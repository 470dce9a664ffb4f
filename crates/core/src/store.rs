//! In-memory cache of known sensors
//!
//! Every sensor file that produced at least one accepted update owns a
//! [`SensorRecord`]. Records are addressed by a [`SourceId`] handed out once
//! per record lifetime; a path index resolves change notifications to that
//! handle so the hot path never re-hashes paths more than once.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};

/// Stable handle for one sensor record
///
/// Handles are never reused: a file that disappears and comes back gets a new one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct SourceId(u64);

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Last known identity and cadence of one sensor source
#[derive(Debug, Clone)]
pub struct SensorRecord {
    source_id: SourceId,
    path: PathBuf,
    sensor_name: String,
    last_modified: DateTime<Utc>,
    update_count: u64,
    cumulative_interval_ms: u64,
}

impl SensorRecord {
    fn new(source_id: SourceId, path: PathBuf, sensor_name: String, modified: DateTime<Utc>) -> Self {
        Self {
            source_id,
            path,
            sensor_name,
            last_modified: modified,
            update_count: 0,
            cumulative_interval_ms: 0,
        }
    }

    pub fn source_id(&self) -> SourceId {
        self.source_id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn sensor_name(&self) -> &str {
        &self.sensor_name
    }

    pub fn last_modified(&self) -> DateTime<Utc> {
        self.last_modified
    }

    pub fn update_count(&self) -> u64 {
        self.update_count
    }

    pub fn cumulative_interval_ms(&self) -> u64 {
        self.cumulative_interval_ms
    }

    /// Record an accepted update stamped `modified`
    ///
    /// Returns `false` (and changes nothing) when `modified` is not newer than
    /// the last accepted update.
    pub fn record_update(&mut self, modified: DateTime<Utc>) -> bool {
        if modified <= self.last_modified {
            return false;
        }
        let delta = (modified - self.last_modified).num_milliseconds();
        self.cumulative_interval_ms += u64::try_from(delta).unwrap_or(0);
        self.update_count += 1;
        self.last_modified = modified;
        true
    }

    /// Start over as a different logical sensor on the same source
    ///
    /// Returns the previous name.
    pub fn restart(&mut self, sensor_name: String, modified: DateTime<Utc>) -> String {
        self.update_count = 0;
        self.cumulative_interval_ms = 0;
        self.last_modified = modified;
        std::mem::replace(&mut self.sensor_name, sensor_name)
    }

    /// Mean interval between accepted updates, once at least two exist
    pub fn average_cadence_ms(&self) -> Option<u64> {
        if self.update_count < 2 {
            return None;
        }
        Some(self.cumulative_interval_ms / self.update_count)
    }

    /// Milliseconds since the last accepted update (negative if `now` is behind the file clock)
    pub fn silence_ms(&self, now: DateTime<Utc>) -> i64 {
        (now - self.last_modified).num_milliseconds()
    }

    /// True once the silence reaches `multiplier` average cadences
    pub fn is_overdue(&self, now: DateTime<Utc>, multiplier: u32) -> bool {
        match self.average_cadence_ms() {
            Some(average) if average > 0 => {
                let threshold = average.saturating_mul(u64::from(multiplier));
                let silence = self.silence_ms(now);
                silence >= 0 && silence as u64 >= threshold
            }
            _ => false,
        }
    }

    pub fn snapshot(&self) -> SensorSnapshot {
        SensorSnapshot {
            source_id: self.source_id,
            path: self.path.clone(),
            sensor_name: self.sensor_name.clone(),
            last_modified: self.last_modified,
            update_count: self.update_count,
            average_cadence_ms: self.average_cadence_ms(),
        }
    }
}

/// Read-only copy of a record for use outside the pipeline worker
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SensorSnapshot {
    pub source_id: SourceId,
    pub path: PathBuf,
    pub sensor_name: String,
    pub last_modified: DateTime<Utc>,
    pub update_count: u64,
    pub average_cadence_ms: Option<u64>,
}

/// Sensor records keyed by handle, with a path index
#[derive(Debug, Default)]
pub struct SensorStore {
    records: BTreeMap<SourceId, SensorRecord>,
    by_path: HashMap<PathBuf, SourceId>,
    next_id: u64,
}

impl SensorStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a record for a newly seen source
    ///
    /// An existing record for the same path is replaced.
    pub fn insert(&mut self, path: &Path, sensor_name: &str, modified: DateTime<Utc>) -> SourceId {
        if let Some(old) = self.by_path.get(path).copied() {
            self.records.remove(&old);
        }

        let id = SourceId(self.next_id);
        self.next_id += 1;

        self.records.insert(
            id,
            SensorRecord::new(id, path.to_path_buf(), sensor_name.to_string(), modified),
        );
        self.by_path.insert(path.to_path_buf(), id);
        id
    }

    pub fn id_for(&self, path: &Path) -> Option<SourceId> {
        self.by_path.get(path).copied()
    }

    pub fn get(&self, id: SourceId) -> Option<&SensorRecord> {
        self.records.get(&id)
    }

    pub fn get_mut(&mut self, id: SourceId) -> Option<&mut SensorRecord> {
        self.records.get_mut(&id)
    }

    pub fn remove(&mut self, id: SourceId) -> Option<SensorRecord> {
        let record = self.records.remove(&id)?;
        self.by_path.remove(&record.path);
        Some(record)
    }

    pub fn iter(&self) -> impl Iterator<Item = &SensorRecord> {
        self.records.values()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn snapshot(&self) -> Vec<SensorSnapshot> {
        self.records.values().map(SensorRecord::snapshot).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    fn store_with(name: &str) -> (SensorStore, SourceId) {
        let mut store = SensorStore::new();
        let id = store.insert(Path::new("/q/cpu.json"), name, t0());
        (store, id)
    }

    #[test]
    fn test_new_record_has_no_history() {
        let (store, id) = store_with("cpu");
        let record = store.get(id).unwrap();
        assert_eq!(record.update_count(), 0);
        assert_eq!(record.cumulative_interval_ms(), 0);
        assert_eq!(record.last_modified(), t0());
        assert_eq!(record.average_cadence_ms(), None);
        assert_eq!(store.id_for(Path::new("/q/cpu.json")), Some(id));
    }

    #[test]
    fn test_cadence_is_mean_of_deltas() {
        let (mut store, id) = store_with("cpu");
        let deltas = [700, 1300, 1000, 2500, 500];
        let mut at = t0();
        for delta in deltas {
            at += Duration::milliseconds(delta);
            assert!(store.get_mut(id).unwrap().record_update(at));
        }

        let record = store.get(id).unwrap();
        assert_eq!(record.update_count(), deltas.len() as u64);
        assert_eq!(record.cumulative_interval_ms(), 6000);
        assert_eq!(record.average_cadence_ms(), Some(1200));
        assert_eq!(record.last_modified(), at);
    }

    #[test]
    fn test_single_update_has_no_average() {
        let (mut store, id) = store_with("cpu");
        store.get_mut(id).unwrap().record_update(t0() + Duration::seconds(5));
        assert_eq!(store.get(id).unwrap().average_cadence_ms(), None);
    }

    #[test]
    fn test_stale_timestamps_are_rejected() {
        let (mut store, id) = store_with("cpu");
        let record = store.get_mut(id).unwrap();
        assert!(!record.record_update(t0()));
        assert!(!record.record_update(t0() - Duration::seconds(3)));
        assert_eq!(record.update_count(), 0);
        assert_eq!(record.last_modified(), t0());
    }

    #[test]
    fn test_overdue_threshold() {
        let (mut store, id) = store_with("cpu");
        let record = store.get_mut(id).unwrap();
        for i in 1..=5 {
            record.record_update(t0() + Duration::milliseconds(1000 * i));
        }
        assert_eq!(record.update_count(), 5);
        assert_eq!(record.average_cadence_ms(), Some(1000));

        let last = record.last_modified();
        assert!(record.is_overdue(last + Duration::milliseconds(2500), 2));
        assert!(record.is_overdue(last + Duration::milliseconds(2000), 2));
        assert!(!record.is_overdue(last + Duration::milliseconds(1900), 2));
        assert!(!record.is_overdue(last - Duration::milliseconds(5000), 2));
    }

    #[test]
    fn test_restart_resets_statistics() {
        let (mut store, id) = store_with("cpu");
        let record = store.get_mut(id).unwrap();
        record.record_update(t0() + Duration::seconds(1));
        record.record_update(t0() + Duration::seconds(2));

        let old = record.restart("gpu".to_string(), t0() + Duration::seconds(3));
        assert_eq!(old, "cpu");
        assert_eq!(record.sensor_name(), "gpu");
        assert_eq!(record.update_count(), 0);
        assert_eq!(record.cumulative_interval_ms(), 0);
        assert_eq!(record.source_id(), id);
    }

    #[test]
    fn test_handles_are_not_reused() {
        let (mut store, first) = store_with("cpu");
        let removed = store.remove(first).unwrap();
        assert_eq!(removed.sensor_name(), "cpu");
        assert!(store.is_empty());
        assert_eq!(store.id_for(Path::new("/q/cpu.json")), None);

        let second = store.insert(Path::new("/q/cpu.json"), "cpu", t0());
        assert_ne!(first, second);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_snapshot_is_detached() {
        let (mut store, id) = store_with("cpu");
        let snapshot = store.snapshot();
        store.get_mut(id).unwrap().record_update(t0() + Duration::seconds(1));

        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].update_count, 0);
        assert_eq!(snapshot[0].sensor_name, "cpu");
    }
}
