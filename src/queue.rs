//! Queue directory preparation

use anyhow::{Context, Result};
use dashd_core::is_sensor_file;
use log::{info, warn};
use std::path::{Path, PathBuf};

/// Create the queue directory if needed and return its canonical path
pub fn prepare(queue_directory: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(queue_directory)
        .with_context(|| format!("Could not create queue directory \"{}\"", queue_directory.display()))?;
    let canonical = queue_directory
        .canonicalize()
        .with_context(|| format!("Could not resolve queue directory \"{}\"", queue_directory.display()))?;
    Ok(canonical)
}

/// Delete leftover sensor files from a previous run
///
/// Returns the files that were removed. Files that cannot be removed are
/// logged and left in place.
pub fn clean(queue_directory: &Path) -> Result<Vec<PathBuf>> {
    info!("Clear queue of older sensor data:");

    let mut removed = Vec::new();
    for entry in std::fs::read_dir(queue_directory)? {
        let path = entry?.path();
        if !path.is_file() || !is_sensor_file(&path) {
            continue;
        }
        match std::fs::remove_file(&path) {
            Ok(()) => {
                info!("\t{}", path.display());
                removed.push(path);
            }
            Err(e) => warn!("Failed to remove \"{}\": {}", path.display(), e),
        }
    }
    removed.sort();
    Ok(removed)
}
