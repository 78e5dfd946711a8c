//! Versioned JSON files under `<config_dir>/.storage/`
//!
//! ```json
//! { "version": 1, "minor_version": 1, "key": "core.config_entries", "data": { ... } }
//! ```

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::fs;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed storage file: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{key} is stored as version {from}, expected {to}")]
    MigrationRequired { key: String, from: u32, to: u32 },
}

pub type StorageResult<T> = Result<T, StorageError>;

/// The envelope around persisted data
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageFile<T> {
    pub version: u32,
    pub minor_version: u32,
    pub key: String,
    pub data: T,
}

/// Data persisted under a fixed key
///
/// Bumping `VERSION` makes older files unreadable. A `MINOR_VERSION` bump
/// must only add fields with defaults.
pub trait Storable: Serialize + DeserializeOwned {
    const KEY: &'static str;
    const VERSION: u32;
    const MINOR_VERSION: u32;
}

#[derive(Debug, Clone)]
pub struct Storage {
    dir: PathBuf,
}

impl Storage {
    pub fn new(config_dir: impl AsRef<Path>) -> Self {
        Self {
            dir: config_dir.as_ref().join(".storage"),
        }
    }

    pub fn path_of<T: Storable>(&self) -> PathBuf {
        self.dir.join(T::KEY)
    }

    /// `None` until something was saved under `T::KEY`
    pub async fn load<T: Storable>(&self) -> StorageResult<Option<T>> {
        let content = match fs::read(self.path_of::<T>()).await {
            Ok(content) => content,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let file: StorageFile<T> = serde_json::from_slice(&content)?;

        if file.version != T::VERSION {
            return Err(StorageError::MigrationRequired {
                key: file.key,
                from: file.version,
                to: T::VERSION,
            });
        }
        if file.minor_version < T::MINOR_VERSION {
            warn!(
                "{} was written as minor version {}, reading it as {}",
                T::KEY,
                file.minor_version,
                T::MINOR_VERSION
            );
        }
        Ok(Some(file.data))
    }

    /// Written beside the target, then renamed over it
    pub async fn save<T: Storable>(&self, data: &T) -> StorageResult<()> {
        let envelope = StorageFile {
            version: T::VERSION,
            minor_version: T::MINOR_VERSION,
            key: T::KEY.to_string(),
            data,
        };
        let json = serde_json::to_vec_pretty(&envelope)?;

        fs::create_dir_all(&self.dir).await?;
        let path = self.path_of::<T>();
        let partial = self.dir.join(format!("{}.partial", T::KEY));
        fs::write(&partial, json).await?;
        fs::rename(&partial, &path).await?;

        debug!("Wrote {}", path.display());
        Ok(())
    }
}
