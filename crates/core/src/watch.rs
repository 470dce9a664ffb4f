//! Interface to the filesystem notification subsystem

use crate::error::WatchError;
use std::path::Path;

/// Registry of paths that deliver per-file change notifications
///
/// The queue directory itself is watched for the lifetime of the collector;
/// individual sensor files are added once they produce a record and removed
/// when that record goes away.
pub trait WatchRegistry: Send {
    /// Start delivering change notifications for `path`
    fn watch(&mut self, path: &Path) -> Result<(), WatchError>;

    /// Stop delivering notifications for `path`; unknown paths are a no-op
    fn unwatch(&mut self, path: &Path);

    /// Drop and re-create the watch on `path`
    ///
    /// A file replaced by renaming another over it is a new inode; the old
    /// watch keeps following the unlinked one.
    fn rewatch(&mut self, path: &Path) -> Result<(), WatchError> {
        self.unwatch(path);
        self.watch(path)
    }
}

impl<W: WatchRegistry + ?Sized> WatchRegistry for Box<W> {
    fn watch(&mut self, path: &Path) -> Result<(), WatchError> {
        (**self).watch(path)
    }

    fn unwatch(&mut self, path: &Path) {
        (**self).unwatch(path)
    }

    fn rewatch(&mut self, path: &Path) -> Result<(), WatchError> {
        (**self).rewatch(path)
    }
}
