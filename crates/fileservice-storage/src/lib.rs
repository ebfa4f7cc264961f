//! Storage backend implementations for the file service.
//!
//! This crate provides concrete implementations of the
//! [`StorageBackend`](fileservice_core::StorageBackend) trait:
//!
//! - [`LocalBackend`] — the host filesystem
//! - [`ObjectStoreBackend`] — a bucket in S3-compatible object storage
//!
//! and [`open_backend`], which picks one of them from configuration at
//! startup.

pub mod local;
pub mod s3;

use std::sync::Arc;

use tracing::info;

use fileservice_core::config::{Provider, StorageConfig};
use fileservice_core::error::FileServiceError;
use fileservice_core::storage::StorageBackend;
use fileservice_core::Result;

pub use local::LocalBackend;
pub use s3::ObjectStoreBackend;

/// Build the backend selected by `config`.
///
/// Called once at process start; the returned value is shared by every
/// caller for the lifetime of the process. For the object store this
/// fails with [`FileServiceError::Config`] if the bucket does not exist.
pub async fn open_backend(config: &StorageConfig) -> Result<Arc<dyn StorageBackend>> {
    config.validate()?;
    let backend: Arc<dyn StorageBackend> = match config.provider {
        Provider::Local => {
            let backend = match &config.local_root {
                Some(root) => LocalBackend::new(root.clone()).await?,
                None => LocalBackend::in_working_dir()?,
            };
            info!(root = %backend.root().display(), "Using local filesystem storage");
            Arc::new(backend)
        }
        Provider::ObjectStore => {
            let settings = config.object_store.as_ref().ok_or_else(|| {
                FileServiceError::config("Object store provider selected but no settings given")
            })?;
            let backend = ObjectStoreBackend::connect(settings).await?;
            info!(bucket = %backend.bucket(), "Using object storage");
            Arc::new(backend)
        }
    };
    Ok(backend)
}
