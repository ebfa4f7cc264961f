//! File service core: the storage contract and its supporting types.
//!
//! This crate provides the [`StorageBackend`] trait that every backend
//! implements, the [`UploadBuffer`] and [`RetrievedFile`] value types that
//! make the contract uniform across backends, storage configuration, and
//! the unified error type.

pub mod buffer;
pub mod config;
pub mod error;
pub mod retrieved;
pub mod storage;

pub use buffer::UploadBuffer;
pub use config::{ObjectStoreSettings, Provider, StorageConfig};
pub use error::FileServiceError;
pub use retrieved::{purge_temporary_files, ReleaseAction, RetrievedFile};
pub use storage::{read_to_bytes, ByteStream, StorageBackend};

/// Convenience Result type using [`FileServiceError`].
pub type Result<T> = std::result::Result<T, FileServiceError>;
