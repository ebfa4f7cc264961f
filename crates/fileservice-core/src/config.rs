//! Storage configuration.
//!
//! [`StorageConfig`] selects the backend (`local` or `objectstore`) and
//! carries the object-store connection settings. It is deserialised from
//! JSON or read from the environment, then checked with
//! [`StorageConfig::validate`] before any backend is built.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::FileServiceError;
use crate::Result;

/// Which backend serves file operations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// The host filesystem.
    Local,
    /// An S3-compatible object store.
    #[default]
    #[serde(alias = "s3")]
    ObjectStore,
}

impl std::str::FromStr for Provider {
    type Err = FileServiceError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "objectstore" | "s3" => Ok(Self::ObjectStore),
            other => Err(FileServiceError::config(format!(
                "Unknown file provider '{other}', expected 'local' or 'objectstore'"
            ))),
        }
    }
}

/// Connection settings for the object-store backend.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectStoreSettings {
    /// Custom endpoint, e.g. `http://localhost:9000` for MinIO.
    #[serde(default)]
    pub endpoint_url: Option<String>,

    /// Bucket holding every object.
    pub bucket_name: String,

    /// Signing region.
    #[serde(default)]
    pub region: Option<String>,

    /// Access key for explicit credentials.
    #[serde(default)]
    pub access_key: Option<String>,

    /// Secret key for explicit credentials.
    #[serde(default)]
    pub secret_key: Option<String>,

    /// Take credentials from the environment instead of the keys above.
    #[serde(default)]
    pub env_auth: bool,

    /// Permit plain-HTTP endpoints. Defaults to `true` for `http://` URLs.
    #[serde(default)]
    pub allow_http: Option<bool>,
}

impl ObjectStoreSettings {
    /// Whether plain HTTP is allowed for the configured endpoint.
    pub fn allows_http(&self) -> bool {
        self.allow_http.unwrap_or_else(|| {
            self.endpoint_url
                .as_deref()
                .is_some_and(|url| url.starts_with("http://"))
        })
    }
}

impl fmt::Debug for ObjectStoreSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectStoreSettings")
            .field("endpoint_url", &self.endpoint_url)
            .field("bucket_name", &self.bucket_name)
            .field("region", &self.region)
            .field("access_key", &self.access_key)
            .field("secret_key", &self.secret_key.as_ref().map(|_| "<redacted>"))
            .field("env_auth", &self.env_auth)
            .field("allow_http", &self.allow_http)
            .finish()
    }
}

/// Top-level storage configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Backend selection.
    #[serde(default)]
    pub provider: Provider,

    /// Root for relative local paths; the working directory if unset.
    #[serde(default)]
    pub local_root: Option<PathBuf>,

    /// Object-store settings, required when `provider` is `objectstore`.
    #[serde(default)]
    pub object_store: Option<ObjectStoreSettings>,
}

impl StorageConfig {
    /// Configuration for the local filesystem backend.
    pub fn local() -> Self {
        Self {
            provider: Provider::Local,
            local_root: None,
            object_store: None,
        }
    }

    /// Configuration for the object-store backend.
    pub fn object_store(settings: ObjectStoreSettings) -> Self {
        Self {
            provider: Provider::ObjectStore,
            local_root: None,
            object_store: Some(settings),
        }
    }

    /// Read configuration from process environment variables.
    ///
    /// | Variable | Field |
    /// |---|---|
    /// | `FILE_PROVIDER` | `provider` |
    /// | `FILE_LOCAL_ROOT` | `local_root` |
    /// | `S3_ENDPOINT_URL` | `endpoint_url` |
    /// | `S3_BUCKET_NAME` | `bucket_name` |
    /// | `S3_REGION` | `region` |
    /// | `S3_ACCESS_KEY` | `access_key` |
    /// | `S3_SECRET_KEY` | `secret_key` |
    /// | `S3_ENV_AUTH` | `env_auth` |
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let provider = match lookup("FILE_PROVIDER") {
            Some(value) => value.parse()?,
            None => Provider::default(),
        };
        let local_root = lookup("FILE_LOCAL_ROOT").map(PathBuf::from);

        let object_store = match lookup("S3_BUCKET_NAME") {
            Some(bucket_name) => {
                let env_auth = match lookup("S3_ENV_AUTH") {
                    Some(value) => parse_bool("S3_ENV_AUTH", &value)?,
                    None => false,
                };
                Some(ObjectStoreSettings {
                    endpoint_url: lookup("S3_ENDPOINT_URL"),
                    bucket_name,
                    region: lookup("S3_REGION"),
                    access_key: lookup("S3_ACCESS_KEY"),
                    secret_key: lookup("S3_SECRET_KEY"),
                    env_auth,
                    allow_http: None,
                })
            }
            None => None,
        };

        Ok(Self {
            provider,
            local_root,
            object_store,
        })
    }

    /// Check that the selected backend has everything it needs.
    pub fn validate(&self) -> Result<()> {
        if self.provider == Provider::Local {
            return Ok(());
        }
        let settings = self.object_store.as_ref().ok_or_else(|| {
            FileServiceError::config("Object store provider selected but no settings given")
        })?;
        if settings.bucket_name.trim().is_empty() {
            return Err(FileServiceError::config("Bucket name must not be empty"));
        }
        if !settings.env_auth {
            let has = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.is_empty());
            if !has(&settings.access_key) || !has(&settings.secret_key) {
                return Err(FileServiceError::config(
                    "Access key and secret key are required unless env_auth is set",
                ));
            }
        }
        Ok(())
    }
}

fn parse_bool(name: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Ok(true),
        "0" | "false" | "no" | "" => Ok(false),
        other => Err(FileServiceError::config(format!(
            "{name} must be a boolean, got '{other}'"
        ))),
    }
}
