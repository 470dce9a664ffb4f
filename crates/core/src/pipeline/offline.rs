//! Cadence-based offline detection
//!
//! A sensor that has established a rhythm (at least two accepted updates) is
//! presumed dead once its silence reaches `offline_multiplier` times its
//! average update interval. This is a heuristic: a sensor that deliberately
//! slows down will be reported offline too.

use super::Pipeline;
use crate::publisher::Publisher;
use crate::store::SourceId;
use crate::watch::WatchRegistry;
use chrono::{DateTime, Utc};
use dashd_types::OfflineReason;
use log::debug;

impl<P: Publisher, W: WatchRegistry> Pipeline<P, W> {
    /// Retire every sensor that is overdue at `now`
    ///
    /// Returns the number of sensors declared offline. A retired sensor's
    /// file is only picked up again once it is written with a newer timestamp.
    pub fn sweep_offline(&mut self, now: DateTime<Utc>) -> usize {
        let multiplier = self.config.offline_multiplier;

        let overdue: Vec<(SourceId, std::path::PathBuf, DateTime<Utc>)> = self
            .store
            .iter()
            .filter(|record| record.is_overdue(now, multiplier))
            .map(|record| (record.source_id(), record.path().to_path_buf(), record.last_modified()))
            .collect();

        for (id, path, last_modified) in &overdue {
            if let Some(record) = self.store.get(*id) {
                debug!(
                    "Sensor \"{}\" silent for {} ms (average cadence {:?} ms)",
                    record.sensor_name(),
                    record.silence_ms(now),
                    record.average_cadence_ms()
                );
            }
            self.retire(*id, OfflineReason::Overdue);
            self.watermarks.insert(path.clone(), *last_modified);
        }

        overdue.len()
    }
}
