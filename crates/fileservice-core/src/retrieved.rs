//! Scoped handles to files fetched through a backend.
//!
//! A [`RetrievedFile`] pairs a local path with a release action chosen by
//! the backend that produced it. Local-origin handles point at the
//! canonical file and release is a no-op. Remote-origin handles point at a
//! throwaway download and release deletes it. Release happens on
//! [`RetrievedFile::release`] or, failing that, on drop.
//!
//! Temporary files are also tracked in a process-wide set so that
//! [`purge_temporary_files`] can remove anything a caller leaked (for
//! instance via `std::mem::forget`) before the process exits.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};

use tracing::{debug, warn};

use crate::error::FileServiceError;
use crate::Result;

/// What happens to the local file when its handle is released.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseAction {
    /// The path is the canonical file; leave it alone.
    Keep,
    /// The path is a temporary copy; delete it.
    Delete,
}

/// A local file produced by [`StorageBackend::get_file`](crate::StorageBackend::get_file).
#[derive(Debug)]
pub struct RetrievedFile {
    path: PathBuf,
    action: ReleaseAction,
    released: bool,
}

impl RetrievedFile {
    /// Wrap a durable local file. Releasing the handle keeps the file.
    pub fn durable(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            action: ReleaseAction::Keep,
            released: false,
        }
    }

    /// Wrap a temporary copy. Releasing the handle deletes the file.
    pub fn temporary(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        lock_pending().insert(path.clone());
        Self {
            path,
            action: ReleaseAction::Delete,
            released: false,
        }
    }

    /// The local path holding the object's bytes.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The release action bound at construction.
    pub fn release_action(&self) -> ReleaseAction {
        self.action
    }

    /// Whether a file currently exists at [`path`](RetrievedFile::path).
    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Release the handle, surfacing a failed delete.
    pub fn release(mut self) -> Result<()> {
        self.released = true;
        self.run_release()
    }

    fn run_release(&self) -> Result<()> {
        match self.action {
            ReleaseAction::Keep => Ok(()),
            ReleaseAction::Delete => {
                lock_pending().remove(&self.path);
                remove_if_present(&self.path).map_err(|e| {
                    FileServiceError::storage(
                        format!("Failed to delete temporary file {}", self.path.display()),
                        e,
                    )
                })
            }
        }
    }
}

impl AsRef<Path> for RetrievedFile {
    fn as_ref(&self) -> &Path {
        &self.path
    }
}

impl Drop for RetrievedFile {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Err(e) = self.run_release() {
            warn!(path = %self.path.display(), error = %e, "Release on drop failed");
        }
    }
}

/// Delete every temporary file whose handle has not been released yet.
///
/// Returns the number of files removed. Intended to run once at shutdown.
pub fn purge_temporary_files() -> usize {
    let paths: Vec<PathBuf> = lock_pending().drain().collect();
    let mut removed = 0;
    for path in paths {
        match std::fs::remove_file(&path) {
            Ok(()) => removed += 1,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %path.display(), error = %e, "Failed to purge temporary file"),
        }
    }
    debug!("Purged {} temporary files", removed);
    removed
}

fn pending() -> &'static Mutex<HashSet<PathBuf>> {
    static PENDING: OnceLock<Mutex<HashSet<PathBuf>>> = OnceLock::new();
    PENDING.get_or_init(|| Mutex::new(HashSet::new()))
}

fn lock_pending() -> std::sync::MutexGuard<'static, HashSet<PathBuf>> {
    pending().lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn remove_if_present(path: &Path) -> std::io::Result<()> {
    match std::fs::remove_file(path) {
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}
