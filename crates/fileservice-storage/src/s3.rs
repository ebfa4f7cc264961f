//! S3-compatible object storage backend.
//!
//! [`ObjectStoreBackend`] implements the [`StorageBackend`] trait on top of
//! the `object_store` crate, so it works against AWS S3, MinIO, Ceph and any
//! other S3-compatible endpoint. Folders are emulated with `/`-delimited key
//! prefixes.
//!
//! Listing is drained page by page: each request is capped at
//! `list_page_size` entries and the next one resumes after the greatest key
//! seen so far, until a page comes back empty. This relies on the store
//! returning keys in lexicographic order, which S3 guarantees.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream;
use futures::{StreamExt, TryStreamExt};
use object_store::aws::AmazonS3Builder;
use object_store::path::Path as ObjectPath;
use object_store::{ObjectMeta, ObjectStore, PutPayload};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, error, info, instrument, warn};

use fileservice_core::config::ObjectStoreSettings;
use fileservice_core::error::FileServiceError;
use fileservice_core::storage::{ByteStream, StorageBackend};
use fileservice_core::{Result, RetrievedFile, UploadBuffer};

use crate::local::collect_files;

/// Entries requested per listing call; S3 caps pages at 1000 keys.
pub const DEFAULT_LIST_PAGE_SIZE: usize = 1000;

/// Uploads kept in flight by [`copy_directory`](StorageBackend::copy_directory).
const UPLOAD_CONCURRENCY: usize = 8;

/// Prefix for local copies created by [`get_file`](StorageBackend::get_file).
const TEMP_FILE_PREFIX: &str = "fileservice-";

/// A [`StorageBackend`] backed by a single bucket of S3-compatible storage.
///
/// The bucket is checked once at construction; a missing or unreachable
/// bucket is a [`FileServiceError::Config`] error. Files handed out by
/// [`get_file`](StorageBackend::get_file) are temporary downloads that are
/// deleted when the handle is released.
#[derive(Debug)]
pub struct ObjectStoreBackend {
    store: Arc<dyn ObjectStore>,
    bucket: String,
    list_page_size: usize,
}

impl ObjectStoreBackend {
    /// Build an S3 client from `settings` and verify the bucket exists.
    ///
    /// With `env_auth` set, credentials come from the standard `AWS_*`
    /// environment variables; otherwise the explicit key pair is used.
    /// Requests use path-style addressing so custom endpoints work.
    pub async fn connect(settings: &ObjectStoreSettings) -> Result<Self> {
        let mut builder = if settings.env_auth {
            AmazonS3Builder::from_env()
        } else {
            let access_key = settings.access_key.as_deref().unwrap_or_default();
            let secret_key = settings.secret_key.as_deref().unwrap_or_default();
            AmazonS3Builder::new()
                .with_access_key_id(access_key)
                .with_secret_access_key(secret_key)
        };
        builder = builder
            .with_bucket_name(&settings.bucket_name)
            .with_virtual_hosted_style_request(false)
            .with_allow_http(settings.allows_http());

        if let Some(region) = &settings.region {
            builder = builder.with_region(region);
        }
        if let Some(endpoint) = &settings.endpoint_url {
            builder = builder.with_endpoint(endpoint);
        }

        let store = builder.build().map_err(|e| {
            FileServiceError::config(format!(
                "Failed to create S3 client for bucket {}: {e}",
                settings.bucket_name
            ))
        })?;

        Self::from_store(Arc::new(store), &settings.bucket_name).await
    }

    /// Wrap an existing store and verify the bucket behind it is reachable.
    pub async fn from_store(store: Arc<dyn ObjectStore>, bucket: impl Into<String>) -> Result<Self> {
        let backend = Self {
            store,
            bucket: bucket.into(),
            list_page_size: DEFAULT_LIST_PAGE_SIZE,
        };
        backend.verify_bucket().await?;
        info!(bucket = %backend.bucket, "ObjectStoreBackend initialised");
        Ok(backend)
    }

    /// Cap each listing request at `page_size` entries (minimum 1).
    pub fn with_list_page_size(mut self, page_size: usize) -> Self {
        self.list_page_size = page_size.max(1);
        self
    }

    /// The bucket this backend reads and writes.
    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn verify_bucket(&self) -> Result<()> {
        self.store.list_with_delimiter(None).await.map_err(|e| {
            FileServiceError::config(format!(
                "S3 bucket doesn't exist or is unreachable: {} ({e})",
                self.bucket
            ))
        })?;
        Ok(())
    }

    /// Upload a local file's bytes to `key`, returning the size uploaded.
    async fn upload_file(&self, local_file: &Path, key: &str) -> Result<u64> {
        let data = fs::read(local_file).await.map_err(|e| {
            FileServiceError::storage(format!("Failed to read {}", local_file.display()), e)
        })?;
        let size = data.len() as u64;
        self.store
            .put(&location(key)?, PutPayload::from(Bytes::from(data)))
            .await
            .map_err(|e| {
                error!("Unable to upload file {}", key);
                FileServiceError::storage(format!("S3 put failed for {key}"), e)
            })?;
        Ok(size)
    }
}

#[async_trait]
impl StorageBackend for ObjectStoreBackend {
    #[instrument(skip(self), fields(key = %path))]
    async fn get_input_stream(&self, path: &str) -> Result<ByteStream> {
        let result = self.store.get(&location(path)?).await.map_err(|e| match e {
            object_store::Error::NotFound { .. } => {
                debug!("No object at {}", path);
                FileServiceError::not_found(path)
            }
            other => {
                error!("Unable to get file {}", path);
                FileServiceError::storage(format!("S3 get failed for {path}"), other)
            }
        })?;
        let key = path.to_string();
        let stream = result
            .into_stream()
            .map_err(move |e| FileServiceError::storage(format!("S3 read failed for {key}"), e));
        Ok(stream.boxed())
    }

    #[instrument(skip(self), fields(key = %path))]
    async fn get_file(&self, path: &str) -> Result<RetrievedFile> {
        let mut stream = self.get_input_stream(path).await?;

        let suffix = Path::new(path)
            .extension()
            .map(|ext| format!(".{}", ext.to_string_lossy()))
            .unwrap_or_default();
        let temp_path = tempfile::Builder::new()
            .prefix(TEMP_FILE_PREFIX)
            .suffix(&suffix)
            .tempfile()
            .map_err(|e| FileServiceError::storage("Failed to create temporary file", e))?
            .into_temp_path()
            .keep()
            .map_err(|e| FileServiceError::storage("Failed to keep temporary file", e))?;

        // From here on the handle owns the file; any early return deletes it.
        let handle = RetrievedFile::temporary(temp_path);
        let mut file = fs::File::create(handle.path()).await.map_err(|e| {
            FileServiceError::storage(format!("Failed to open {}", handle.path().display()), e)
        })?;
        let mut written = 0u64;
        while let Some(chunk) = stream.try_next().await? {
            file.write_all(&chunk).await.map_err(|e| {
                FileServiceError::storage(format!("Failed to write {}", handle.path().display()), e)
            })?;
            written += chunk.len() as u64;
        }
        file.flush().await.map_err(|e| {
            FileServiceError::storage(format!("Failed to flush {}", handle.path().display()), e)
        })?;

        debug!("Downloaded {} bytes from {} to {}", written, path, handle.path().display());
        Ok(handle)
    }

    #[instrument(skip(self, buffer), fields(key = %path, size = buffer.len()))]
    async fn save_file(&self, buffer: UploadBuffer, path: &str) -> Result<()> {
        let size = buffer.len();
        // The request's Content-Length is the payload length, i.e. exactly
        // the number of bytes written to the buffer.
        let payload = PutPayload::from(buffer.into_bytes());
        debug_assert_eq!(payload.content_length(), size);
        self.store
            .put(&location(path)?, payload)
            .await
            .map_err(|e| {
                error!("Unable to save file {}", path);
                FileServiceError::storage(format!("S3 put failed for {path}"), e)
            })?;
        debug!("Put {} bytes to {}", size, path);
        Ok(())
    }

    #[instrument(skip(self), fields(source = %local_file.display(), key = %path))]
    async fn copy_file(&self, local_file: &Path, path: &str) -> Result<()> {
        let size = self.upload_file(local_file, path).await?;
        debug!("Uploaded {} bytes to {}", size, path);
        Ok(())
    }

    #[instrument(skip(self), fields(prefix = %path))]
    async fn try_list_files_from_folder(&self, path: &str) -> Result<Vec<String>> {
        let folder = path.trim_end_matches('/');
        let prefix = if folder.is_empty() {
            None
        } else {
            Some(location(folder)?)
        };

        let mut keys = Vec::new();
        let mut offset: Option<ObjectPath> = None;
        loop {
            let listing = match &offset {
                Some(after) => self.store.list_with_offset(prefix.as_ref(), after),
                None => self.store.list(prefix.as_ref()),
            };
            let batch: Vec<ObjectMeta> = listing
                .take(self.list_page_size)
                .try_collect()
                .await
                .map_err(|e| {
                    FileServiceError::storage(format!("S3 list failed for prefix {path}"), e)
                })?;

            let Some(last) = batch.iter().map(|meta| &meta.location).max().cloned() else {
                break;
            };
            debug!("Listed batch of {} keys under {}", batch.len(), path);
            keys.extend(batch.into_iter().map(|meta| meta.location.as_ref().to_string()));
            offset = Some(last);
        }

        debug!("Listed {} keys under {}", keys.len(), path);
        Ok(keys)
    }

    #[instrument(skip(self), fields(key = %path))]
    async fn delete_file(&self, path: &str) {
        let target = match location(path) {
            Ok(target) => target,
            Err(e) => {
                error!(key = %path, error = %e, "Failed to delete object");
                return;
            }
        };
        match self.store.delete(&target).await {
            Ok(()) => debug!("Deleted {}", path),
            Err(object_store::Error::NotFound { .. }) => {
                debug!("Delete {}: already absent", path)
            }
            Err(e) => error!(key = %path, error = %e, "Failed to delete object"),
        }
    }

    #[instrument(skip(self), fields(key = %path))]
    async fn is_file(&self, path: &str) -> bool {
        let Ok(target) = location(path) else {
            debug!("Invalid key {}", path);
            return false;
        };
        match self.store.head(&target).await {
            Ok(_) => true,
            Err(object_store::Error::NotFound { .. }) => false,
            Err(e) => {
                warn!(key = %path, error = %e, "Existence check failed");
                false
            }
        }
    }

    #[instrument(skip(self), fields(prefix = %path))]
    async fn clean_directory(&self, path: &str) {
        let keys = self.list_files_from_folder(path).await;
        let total = keys.len();
        for key in keys {
            self.delete_file(&key).await;
        }
        debug!("Cleaned {} keys under {}", total, path);
    }

    #[instrument(skip(self), fields(source = %source_dir.display(), prefix = %dest_dir))]
    async fn copy_directory(&self, source_dir: &Path, dest_dir: &str) {
        let meta = match fs::metadata(source_dir).await {
            Ok(meta) => meta,
            Err(e) => {
                error!(source = %source_dir.display(), error = %e, "Cannot stat upload source");
                return;
            }
        };
        if meta.is_file() {
            if let Err(e) = self.copy_file(source_dir, dest_dir).await {
                error!(error = %e, "Exception while uploading file");
            }
            return;
        }

        let mut files = Vec::new();
        if let Err(e) = collect_files(source_dir, &mut files).await {
            error!(source = %source_dir.display(), error = %e, "Cannot walk upload source");
            return;
        }

        let prefix = dest_dir.trim_end_matches('/');
        let total = files.len();
        let uploads = files.into_iter().filter_map(|file| {
            let key = match relative_key(source_dir, &file) {
                Some(rel) if prefix.is_empty() => rel,
                Some(rel) => format!("{prefix}/{rel}"),
                None => {
                    error!(file = %file.display(), "File is outside the upload source");
                    return None;
                }
            };
            Some(async move {
                let result = self.upload_file(&file, &key).await;
                (key, result)
            })
        });

        let results: Vec<(String, Result<u64>)> = stream::iter(uploads)
            .buffer_unordered(UPLOAD_CONCURRENCY)
            .collect()
            .await;

        let mut transferred = 0usize;
        let mut bytes = 0u64;
        for (key, result) in results {
            match result {
                Ok(size) => {
                    transferred += 1;
                    bytes += size;
                }
                Err(e) => error!(key = %key, error = %e, "Upload failed"),
            }
        }
        info!(
            "Uploaded {}/{} files ({} bytes) from {} to prefix '{}'",
            transferred,
            total,
            bytes,
            source_dir.display(),
            prefix
        );
    }
}

/// Object location for a storage path, taken verbatim.
///
/// `ObjectPath::from` would percent-encode characters such as `%` or `#`,
/// so a key returned by a listing would no longer address its own object.
fn location(path: &str) -> Result<ObjectPath> {
    ObjectPath::parse(path)
        .map_err(|e| FileServiceError::storage(format!("Invalid object key {path}"), e))
}

/// Key of `file` relative to `base`, with `/` separators on every platform.
fn relative_key(base: &Path, file: &Path) -> Option<String> {
    let relative = file.strip_prefix(base).ok()?;
    Some(
        relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().to_string())
            .collect::<Vec<_>>()
            .join("/"),
    )
}
