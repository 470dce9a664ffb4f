//! Per-file updates: debounce change notifications and apply accepted updates

use super::{file_modified, is_sensor_file, Pipeline};
use crate::constants::MIN_UPDATE_INTERVAL;
use crate::parser::{parse_sensor_file, ParsedUpdate};
use crate::publisher::Publisher;
use crate::store::SourceId;
use crate::watch::WatchRegistry;
use chrono::{DateTime, Utc};
use dashd_types::{Event, OfflineReason};
use log::{debug, info, trace, warn};
use std::io::ErrorKind;
use std::path::Path;

impl<P: Publisher, W: WatchRegistry> Pipeline<P, W> {
    /// Handle a change notification for one sensor file
    ///
    /// Notifications within [`MIN_UPDATE_INTERVAL`] of the last accepted
    /// update are treated as echoes of the same write and dropped. A file the
    /// store does not know yet is handed to a reconciliation pass instead.
    pub fn file_changed(&mut self, path: &Path, now: DateTime<Utc>) {
        if !is_sensor_file(path) {
            return;
        }

        let Some(id) = self.store.id_for(path) else {
            debug!("Change on untracked file \"{}\", reconciling", path.display());
            self.reconcile_at(now);
            return;
        };

        if self.is_debounced(id, path, now) {
            return;
        }

        match file_modified(path) {
            Ok(modified) => {
                self.load(path, modified);
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                // Deleted under us; the removal path owns this case
                self.reconcile_at(now);
            }
            Err(e) => warn!("Failed to stat sensor data file \"{}\": {}", path.display(), e),
        }
    }

    /// Pick up a tracked file found newer than its record during a directory pass
    ///
    /// This is how a file replaced by rename is noticed: only the directory
    /// reports it, so its per-file watch is re-created as well.
    pub(super) fn refresh_tracked(&mut self, id: SourceId, path: &Path, now: DateTime<Utc>) {
        let Some(last_modified) = self.store.get(id).map(|record| record.last_modified()) else {
            return;
        };
        let Ok(modified) = file_modified(path) else {
            // Gone again; the removal sweep retires it
            return;
        };
        if modified <= last_modified {
            return;
        }

        if let Err(e) = self.registry.rewatch(path) {
            warn!("{}", e);
        }
        if self.is_debounced(id, path, now) {
            return;
        }
        debug!("Sensor data file \"{}\" replaced, reloading", path.display());
        self.load(path, modified);
    }

    /// True when `now` is too close to the record's last accepted update
    fn is_debounced(&self, id: SourceId, path: &Path, now: DateTime<Utc>) -> bool {
        let Some(record) = self.store.get(id) else {
            return false;
        };
        let silence = record.silence_ms(now);
        if silence < MIN_UPDATE_INTERVAL.as_millis() as i64 {
            trace!("Debounced change on \"{}\" ({} ms after last update)", path.display(), silence);
            return true;
        }
        false
    }

    /// Read, parse and apply a sensor file stamped `modified`
    ///
    /// Returns the record handle when the update was accepted.
    pub(super) fn load(&mut self, path: &Path, modified: DateTime<Utc>) -> Option<SourceId> {
        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("Sensor data file \"{}\" vanished before it could be read", path.display());
                return None;
            }
            Err(e) => {
                warn!("Failed to read sensor data file \"{}\": {}", path.display(), e);
                return None;
            }
        };

        match parse_sensor_file(&bytes) {
            Ok(update) => self.apply_update(path, update, modified),
            Err(e) if e.is_transient() => {
                // Most likely caught mid-write; the next notification retries it
                warn!("Failed to load sensor data file \"{}\": {}", path.display(), e);
                None
            }
            Err(e) => {
                warn!("Discarding update from \"{}\": {}", path.display(), e);
                None
            }
        }
    }

    /// Fold an accepted update into the store and publish it
    pub(super) fn apply_update(
        &mut self,
        path: &Path,
        update: ParsedUpdate,
        modified: DateTime<Utc>,
    ) -> Option<SourceId> {
        let id = match self.store.id_for(path) {
            None => {
                let id = self.store.insert(path, &update.sensor_name, modified);
                info!("Tracking sensor \"{}\" from \"{}\" ({})", update.sensor_name, path.display(), id);
                id
            }
            Some(id) => {
                let record = self.store.get_mut(id)?;

                if modified <= record.last_modified() {
                    debug!("Ignoring stale update for \"{}\"", path.display());
                    return None;
                }

                if record.sensor_name() != update.sensor_name {
                    warn!(
                        "Sensor file \"{}\" changed its name from \"{}\" to \"{}\"; treating it as a new sensor.",
                        path.display(),
                        record.sensor_name(),
                        update.sensor_name
                    );
                    let previous = record.restart(update.sensor_name.clone(), modified);
                    self.publish(Event::Offline {
                        sensor_name: previous,
                        reason: OfflineReason::Renamed,
                    });
                } else {
                    record.record_update(modified);
                }
                id
            }
        };

        self.publish(Event::Sensor {
            sensor_name: update.sensor_name,
            state: update.state,
            message: update.message,
        });
        Some(id)
    }
}
