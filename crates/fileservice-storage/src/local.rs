//! Filesystem-backed storage backend.
//!
//! [`LocalBackend`] implements the [`StorageBackend`] trait directly on the
//! host filesystem. Storage paths are native paths; relative ones resolve
//! against the backend's root. Writes from [`UploadBuffer`]s go to a
//! sibling temporary file that is renamed into place, so a failed save
//! never leaves a truncated file behind.

use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::{FutureExt, StreamExt, TryStreamExt};
use tokio::fs;
use tokio_util::io::ReaderStream;
use tracing::{debug, error, instrument, warn};

use fileservice_core::error::FileServiceError;
use fileservice_core::storage::{ByteStream, StorageBackend};
use fileservice_core::{Result, RetrievedFile, UploadBuffer};

/// A [`StorageBackend`] backed by the local filesystem.
///
/// Files handed out by [`get_file`](StorageBackend::get_file) are the
/// stored files themselves, so releasing them is a no-op.
#[derive(Debug, Clone)]
pub struct LocalBackend {
    root: PathBuf,
}

impl LocalBackend {
    /// Create a `LocalBackend` resolving relative paths against `root`.
    ///
    /// The directory is created if it does not exist.
    pub async fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = std::path::absolute(root.into()).map_err(|e| {
            FileServiceError::storage("Failed to resolve local root directory", e)
        })?;
        fs::create_dir_all(&root).await.map_err(|e| {
            FileServiceError::storage(
                format!("Failed to create root directory: {}", root.display()),
                e,
            )
        })?;
        debug!(root = %root.display(), "LocalBackend initialised");
        Ok(Self { root })
    }

    /// Create a `LocalBackend` rooted at the process working directory.
    pub fn in_working_dir() -> Result<Self> {
        let root = std::env::current_dir().map_err(|e| {
            FileServiceError::storage("Failed to determine working directory", e)
        })?;
        Ok(Self { root })
    }

    /// Return the directory relative paths resolve against.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Return the absolute filesystem path for a storage path.
    fn resolve(&self, path: &str) -> PathBuf {
        self.root.join(path)
    }

    /// Copy one file into place, creating parent directories.
    async fn copy_into(&self, source: &Path, target: &Path) -> Result<u64> {
        create_parent_dirs(target).await?;
        fs::copy(source, target).await.map_err(|e| {
            FileServiceError::storage(
                format!(
                    "Failed to copy {} to {}",
                    source.display(),
                    target.display()
                ),
                e,
            )
        })
    }

    /// Mirror `source` at `target`, logging and skipping failed items.
    fn copy_tree<'a>(&'a self, source: &'a Path, target: &'a Path) -> BoxFuture<'a, ()> {
        async move {
            let meta = match fs::metadata(source).await {
                Ok(meta) => meta,
                Err(e) => {
                    error!(source = %source.display(), error = %e, "Cannot stat copy source");
                    return;
                }
            };

            if meta.is_file() {
                if let Err(e) = self.copy_into(source, target).await {
                    error!(error = %e, "Skipping file during directory copy");
                }
                return;
            }

            if let Err(e) = fs::create_dir_all(target).await {
                error!(target = %target.display(), error = %e, "Cannot create directory");
                return;
            }

            let mut entries = match fs::read_dir(source).await {
                Ok(entries) => entries,
                Err(e) => {
                    error!(source = %source.display(), error = %e, "Cannot read directory");
                    return;
                }
            };
            loop {
                match entries.next_entry().await {
                    Ok(Some(entry)) => {
                        let child_target = target.join(entry.file_name());
                        self.copy_tree(&entry.path(), &child_target).await;
                    }
                    Ok(None) => break,
                    Err(e) => {
                        error!(source = %source.display(), error = %e, "Directory read interrupted");
                        break;
                    }
                }
            }
        }
        .boxed()
    }
}

#[async_trait]
impl StorageBackend for LocalBackend {
    #[instrument(skip(self), fields(path = %path))]
    async fn get_input_stream(&self, path: &str) -> Result<ByteStream> {
        let resolved = self.resolve(path);
        require_regular_file(&resolved, path).await?;
        let file = fs::File::open(&resolved).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                FileServiceError::not_found(path)
            } else {
                FileServiceError::storage(format!("Failed to open {}", resolved.display()), e)
            }
        })?;
        let display = resolved.display().to_string();
        let stream = ReaderStream::new(file)
            .map_err(move |e| FileServiceError::storage(format!("Failed to read {display}"), e));
        Ok(stream.boxed())
    }

    #[instrument(skip(self), fields(path = %path))]
    async fn get_file(&self, path: &str) -> Result<RetrievedFile> {
        let resolved = self.resolve(path);
        require_regular_file(&resolved, path).await?;
        Ok(RetrievedFile::durable(resolved))
    }

    #[instrument(skip(self, buffer), fields(path = %path, size = buffer.len()))]
    async fn save_file(&self, buffer: UploadBuffer, path: &str) -> Result<()> {
        let target = self.resolve(path);
        create_parent_dirs(&target).await?;
        let dir = target
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.root.clone());
        let size = buffer.len();

        let target_clone = target.clone();
        tokio::task::spawn_blocking(move || {
            // The temporary file is removed on every early return.
            let mut tmp = tempfile::NamedTempFile::new_in(&dir).map_err(|e| {
                FileServiceError::storage(
                    format!("Failed to create temporary file in {}", dir.display()),
                    e,
                )
            })?;
            tmp.write_all(buffer.as_slice())
                .and_then(|_| tmp.flush())
                .map_err(|e| {
                    FileServiceError::storage(
                        format!("Failed to write {}", target_clone.display()),
                        e,
                    )
                })?;
            tmp.persist(&target_clone).map_err(|e| {
                FileServiceError::storage(
                    format!("Failed to move file into {}", target_clone.display()),
                    e.error,
                )
            })?;
            Ok::<(), FileServiceError>(())
        })
        .await
        .map_err(|e| FileServiceError::Internal {
            message: format!("Blocking task panicked: {e}"),
        })??;

        debug!("Saved {} bytes to {}", size, target.display());
        Ok(())
    }

    #[instrument(skip(self), fields(source = %local_file.display(), path = %path))]
    async fn copy_file(&self, local_file: &Path, path: &str) -> Result<()> {
        let target = self.resolve(path);
        let copied = self.copy_into(local_file, &target).await?;
        debug!("Copied {} bytes to {}", copied, target.display());
        Ok(())
    }

    #[instrument(skip(self), fields(path = %path))]
    async fn try_list_files_from_folder(&self, path: &str) -> Result<Vec<String>> {
        let dir = self.resolve(path);
        let meta = match fs::metadata(&dir).await {
            Ok(meta) => meta,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("Folder {} does not exist", dir.display());
                return Ok(Vec::new());
            }
            Err(e) => {
                return Err(FileServiceError::storage(
                    format!("Failed to stat {}", dir.display()),
                    e,
                ))
            }
        };

        let mut files = Vec::new();
        if meta.is_file() {
            files.push(dir);
        } else {
            collect_files(&dir, &mut files).await.map_err(|e| {
                FileServiceError::storage(format!("Failed to walk {}", dir.display()), e)
            })?;
        }

        let listed: Vec<String> = files
            .into_iter()
            .map(|p| p.to_string_lossy().into_owned())
            .collect();
        debug!("Listed {} files under {}", listed.len(), path);
        Ok(listed)
    }

    #[instrument(skip(self), fields(path = %path))]
    async fn delete_file(&self, path: &str) {
        let target = self.resolve(path);
        match fs::remove_file(&target).await {
            Ok(()) => debug!("Deleted {}", target.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("Delete {}: already absent", target.display())
            }
            Err(e) => error!(path = %target.display(), error = %e, "Failed to delete file"),
        }
    }

    #[instrument(skip(self), fields(path = %path))]
    async fn is_file(&self, path: &str) -> bool {
        let target = self.resolve(path);
        let is_file = fs::metadata(&target)
            .await
            .map(|m| m.is_file())
            .unwrap_or(false);
        debug!("is_file {}: {}", target.display(), is_file);
        is_file
    }

    #[instrument(skip(self), fields(path = %path))]
    async fn clean_directory(&self, path: &str) {
        let dir = self.resolve(path);
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) => {
                debug!(error = %e, "Nothing to clean in {}", dir.display());
                return;
            }
        };

        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    warn!(path = %dir.display(), error = %e, "Directory read interrupted");
                    break;
                }
            };
            let child = entry.path();
            match entry.file_type().await {
                // Only empty subdirectories go; populated ones are left in place.
                Ok(ft) if ft.is_dir() => match fs::remove_dir(&child).await {
                    Ok(()) => debug!("Removed directory {}", child.display()),
                    Err(e) => {
                        error!(path = %child.display(), error = %e, "Failed to delete directory")
                    }
                },
                _ => self.delete_file(&child.to_string_lossy()).await,
            }
        }
    }

    #[instrument(skip(self), fields(source = %source_dir.display(), dest = %dest_dir))]
    async fn copy_directory(&self, source_dir: &Path, dest_dir: &str) {
        let target = self.resolve(dest_dir);
        self.copy_tree(source_dir, &target).await;
        debug!(
            "Copied directory {} to {}",
            source_dir.display(),
            target.display()
        );
    }
}

/// Fail with `NotFound` unless `resolved` is an existing regular file.
async fn require_regular_file(resolved: &Path, path: &str) -> Result<()> {
    match fs::metadata(resolved).await {
        Ok(meta) if meta.is_file() => Ok(()),
        Ok(_) => Err(FileServiceError::not_found(path)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(FileServiceError::not_found(path))
        }
        Err(e) => Err(FileServiceError::storage(
            format!("Failed to stat {}", resolved.display()),
            e,
        )),
    }
}

async fn create_parent_dirs(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await.map_err(|e| {
            FileServiceError::storage(
                format!(
                    "Failed to create parent directories for {}",
                    path.display()
                ),
                e,
            )
        })?;
    }
    Ok(())
}

/// Recursively collect every regular file under `dir`.
pub(crate) fn collect_files<'a>(
    dir: &'a Path,
    results: &'a mut Vec<PathBuf>,
) -> BoxFuture<'a, std::io::Result<()>> {
    async move {
        let mut entries = fs::read_dir(dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let file_type = entry.file_type().await?;
            if file_type.is_dir() {
                collect_files(&path, results).await?;
            } else if file_type.is_file() {
                results.push(path);
            } else if file_type.is_symlink() {
                // Follow links to files, not to directories.
                if fs::metadata(&path).await.map(|m| m.is_file()).unwrap_or(false) {
                    results.push(path);
                }
            }
        }
        Ok(())
    }
    .boxed()
}
