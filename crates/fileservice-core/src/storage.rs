//! The StorageBackend trait — the single interface for all file operations.
//!
//! Implementations are [`LocalBackend`](crate) (host filesystem) and
//! [`ObjectStoreBackend`](crate) (any S3-compatible bucket). Exactly one
//! backend is chosen at startup and shared as `Arc<dyn StorageBackend>`;
//! callers never touch the filesystem or the object store client directly.

use std::path::Path;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::stream::BoxStream;
use futures::TryStreamExt;
use tracing::warn;

use crate::buffer::UploadBuffer;
use crate::retrieved::RetrievedFile;
use crate::Result;

/// A readable byte stream positioned at offset 0 of a stored object.
pub type ByteStream = BoxStream<'static, Result<Bytes>>;

/// The uniform file operation set satisfied by every backend.
///
/// Single-object operations (`get_input_stream`, `get_file`, `save_file`,
/// `copy_file`) propagate failures. Bulk operations are best effort: item
/// failures are logged and the operation keeps going, so callers that need
/// a guarantee must re-check with [`is_file`](StorageBackend::is_file) or
/// [`list_files_from_folder`](StorageBackend::list_files_from_folder).
///
/// Concurrent writers to the same path race; the last write wins according
/// to the backend's native semantics.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Open a stream over an existing object.
    ///
    /// Returns [`FileServiceError::NotFound`](crate::FileServiceError::NotFound)
    /// if nothing is stored at `path`.
    async fn get_input_stream(&self, path: &str) -> Result<ByteStream>;

    /// Make the object available as a local file for the caller's scope.
    ///
    /// The returned handle deletes the file on release when it is a
    /// throwaway copy; local-origin handles leave the file in place.
    async fn get_file(&self, path: &str) -> Result<RetrievedFile>;

    /// Store the buffer's bytes at `path`, replacing any previous object.
    ///
    /// On failure no partially written object is visible at `path`.
    async fn save_file(&self, buffer: UploadBuffer, path: &str) -> Result<()>;

    /// Store the bytes of an existing local file at `path`.
    async fn copy_file(&self, local_file: &Path, path: &str) -> Result<()>;

    /// List every regular file nested under `path`, surfacing failures.
    ///
    /// A folder or prefix that does not exist lists as empty.
    async fn try_list_files_from_folder(&self, path: &str) -> Result<Vec<String>>;

    /// List every regular file nested under `path`.
    ///
    /// Best effort: a listing failure is logged and yields an empty vector.
    async fn list_files_from_folder(&self, path: &str) -> Vec<String> {
        match self.try_list_files_from_folder(path).await {
            Ok(files) => files,
            Err(e) => {
                warn!(path = %path, error = %e, "Listing failed, returning no files");
                Vec::new()
            }
        }
    }

    /// Remove the object at `path`. Absent objects are not an error;
    /// other failures are logged.
    async fn delete_file(&self, path: &str);

    /// Whether a regular file or object exists at `path`.
    async fn is_file(&self, path: &str) -> bool;

    /// Delete every file under `path`, logging and skipping failures.
    async fn clean_directory(&self, path: &str);

    /// Copy every file under the local `source_dir` to the same relative
    /// position under `dest_dir`. Partial progress is not rolled back.
    async fn copy_directory(&self, source_dir: &Path, dest_dir: &str);
}

/// Drain a [`ByteStream`] into a single contiguous buffer.
pub async fn read_to_bytes(stream: ByteStream) -> Result<Bytes> {
    let buf = stream
        .try_fold(BytesMut::new(), |mut acc, chunk| async move {
            acc.extend_from_slice(&chunk);
            Ok(acc)
        })
        .await?;
    Ok(buf.freeze())
}
