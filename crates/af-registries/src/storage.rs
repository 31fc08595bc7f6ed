//! Storage abstraction for JSON persistence
//!
//! Implements the `.storage/` directory pattern with versioned file envelopes.

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tracing::debug;

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Storage file not found: {key}")]
    NotFound { key: String },

    #[error("Version mismatch for {key}: expected {expected}, found {found}")]
    VersionMismatch {
        key: String,
        expected: u32,
        found: u32,
    },
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Storage file wrapper with version tracking
///
/// JSON format:
/// ```json
/// {
///   "version": 1,
///   "minor_version": 1,
///   "key": "autoflow.apps",
///   "data": { ... }
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageFile<T> {
    /// Major version - breaking changes
    pub version: u32,
    /// Minor version - migrations within major version
    pub minor_version: u32,
    /// Storage key (file identifier)
    pub key: String,
    /// The actual data
    pub data: T,
}

impl<T> StorageFile<T> {
    /// Create a new storage file
    pub fn new(key: impl Into<String>, data: T, version: u32, minor_version: u32) -> Self {
        Self {
            version,
            minor_version,
            key: key.into(),
            data,
        }
    }
}

/// Storage manager for handling the `.storage/` directory
#[derive(Debug, Clone)]
pub struct Storage {
    /// Path to the `.storage/` directory
    storage_dir: PathBuf,
}

impl Storage {
    /// Create a new storage manager rooted at the given config directory
    pub fn new(config_dir: impl AsRef<Path>) -> Self {
        Self {
            storage_dir: config_dir.as_ref().join(".storage"),
        }
    }

    /// Get the storage directory path
    pub fn storage_dir(&self) -> &Path {
        &self.storage_dir
    }

    /// Ensure the storage directory exists
    pub async fn ensure_dir(&self) -> StorageResult<()> {
        if !self.storage_dir.exists() {
            fs::create_dir_all(&self.storage_dir).await?;
            debug!("Created storage directory: {:?}", self.storage_dir);
        }
        Ok(())
    }

    /// Get the file path for a storage key
    pub fn file_path(&self, key: &str) -> PathBuf {
        self.storage_dir.join(key)
    }

    /// Check if a storage key exists
    pub async fn exists(&self, key: &str) -> bool {
        self.file_path(key).exists()
    }

    /// Load data from storage
    ///
    /// Returns None if the file doesn't exist.
    pub async fn load<T>(&self, key: &str) -> StorageResult<Option<StorageFile<T>>>
    where
        T: DeserializeOwned,
    {
        let path = self.file_path(key);

        if !path.exists() {
            debug!("Storage file not found: {}", key);
            return Ok(None);
        }

        let content = fs::read_to_string(&path).await?;
        let storage_file: StorageFile<T> = serde_json::from_str(&content)?;

        debug!(
            "Loaded storage file: {} (v{}.{})",
            key, storage_file.version, storage_file.minor_version
        );

        Ok(Some(storage_file))
    }

    /// Load data from storage, returning an error if not found
    pub async fn load_required<T>(&self, key: &str) -> StorageResult<StorageFile<T>>
    where
        T: DeserializeOwned,
    {
        self.load(key).await?.ok_or_else(|| StorageError::NotFound {
            key: key.to_string(),
        })
    }

    /// Save data to storage
    ///
    /// Writes atomically by first writing to a temp file, then renaming.
    pub async fn save<T>(&self, storage_file: &StorageFile<T>) -> StorageResult<()>
    where
        T: Serialize,
    {
        self.ensure_dir().await?;

        let path = self.file_path(&storage_file.key);
        let temp_path = self.file_path(&format!("{}.tmp", storage_file.key));

        let content = serde_json::to_string_pretty(storage_file)?;

        fs::write(&temp_path, &content).await?;
        fs::rename(&temp_path, &path).await?;

        debug!(
            "Saved storage file: {} (v{}.{})",
            storage_file.key, storage_file.version, storage_file.minor_version
        );

        Ok(())
    }

    /// Delete a storage file
    pub async fn delete(&self, key: &str) -> StorageResult<()> {
        let path = self.file_path(key);

        if path.exists() {
            fs::remove_file(&path).await?;
            debug!("Deleted storage file: {}", key);
        }

        Ok(())
    }
}

/// Helper trait for types that can be stored
pub trait Storable: Serialize + DeserializeOwned {
    /// Storage key for this type
    const KEY: &'static str;
    /// Current major version
    const VERSION: u32;
    /// Current minor version
    const MINOR_VERSION: u32;

    /// Create a storage file wrapper
    fn to_storage_file(&self) -> StorageFile<Self>
    where
        Self: Clone,
    {
        StorageFile::new(Self::KEY, self.clone(), Self::VERSION, Self::MINOR_VERSION)
    }
}
