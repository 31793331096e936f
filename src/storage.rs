//! Storage abstraction layer for Lumina.
//!
//! The vector index never touches the filesystem directly; it reads and writes
//! named files through the [`Storage`] trait. File and memory backends can be
//! swapped without touching the index code, which keeps the persistence tests
//! fast and lets the on-disk layout stay an internal detail.
//!
//! # Storage Types
//!
//! ## FileStorage
//! - Disk-based persistent storage rooted at one directory
//! - Buffered writes, optional sync after every write
//! - `rename_file` maps to an atomic filesystem rename
//!
//! ## MemoryStorage
//! - In-memory storage for testing
//! - Fast but non-persistent
//!
//! # Example
//!
//! ```
//! use lumina::storage::{StorageConfig, StorageFactory};
//! use lumina::storage::memory::MemoryStorageConfig;
//!
//! # fn main() -> lumina::error::Result<()> {
//! let storage = StorageFactory::create(StorageConfig::Memory(MemoryStorageConfig::default()))?;
//! assert!(!storage.file_exists("manifest.json"));
//! # Ok(())
//! # }
//! ```

use std::io::{Read, Write};
use std::sync::Arc;

use crate::error::{LuminaError, Result};

pub mod file;
pub mod memory;

/// A trait for storage backends that can store and retrieve named files.
pub trait Storage: Send + Sync + std::fmt::Debug {
    /// Open a file for reading.
    ///
    /// The file must exist, or this will return a [`StorageError::FileNotFound`]
    /// converted into a storage error.
    fn open_input(&self, name: &str) -> Result<Box<dyn StorageInput>>;

    /// Create a file for writing, truncating any previous content.
    fn create_output(&self, name: &str) -> Result<Box<dyn StorageOutput>>;

    /// Check if a file exists.
    fn file_exists(&self, name: &str) -> bool;

    /// Delete a file. Deleting a missing file is not an error.
    fn delete_file(&self, name: &str) -> Result<()>;

    /// List all files in the storage, sorted by name.
    fn list_files(&self) -> Result<Vec<String>>;

    /// Atomically renames a file from `old_name` to `new_name`.
    ///
    /// An existing `new_name` is replaced. Writers create a temporary file,
    /// sync it, then rename it to the final name so readers never see
    /// partial data.
    fn rename_file(&self, old_name: &str, new_name: &str) -> Result<()>;

    /// Sync all pending metadata changes (e.g. renames) to storage.
    fn sync(&self) -> Result<()>;
}

/// A trait for reading data from storage.
pub trait StorageInput: Read + Send + std::fmt::Debug {
    /// Get the size of the input stream.
    fn size(&self) -> Result<u64>;
}

/// A trait for writing data to storage.
pub trait StorageOutput: Write + Send + std::fmt::Debug {
    /// Flush and sync the output to storage.
    fn flush_and_sync(&mut self) -> Result<()>;

    /// Close the output stream, flushing everything that was written.
    fn close(&mut self) -> Result<()>;
}

/// Storage backend configuration.
#[derive(Debug, Clone)]
pub enum StorageConfig {
    /// File-based storage configuration (includes path)
    File(file::FileStorageConfig),

    /// Memory-based storage configuration
    Memory(memory::MemoryStorageConfig),
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig::Memory(memory::MemoryStorageConfig::default())
    }
}

/// A factory for creating storage instances.
pub struct StorageFactory;

impl StorageFactory {
    /// Create a new storage instance with the given configuration.
    pub fn create(config: StorageConfig) -> Result<Arc<dyn Storage>> {
        match config {
            StorageConfig::Memory(mem_config) => {
                let storage = memory::MemoryStorage::new(mem_config);
                Ok(Arc::new(storage))
            }
            StorageConfig::File(file_config) => {
                let path = file_config.path.clone();
                let storage = file::FileStorage::new(&path, file_config)?;
                Ok(Arc::new(storage))
            }
        }
    }
}

/// Error types specific to storage operations.
#[derive(Debug, Clone)]
pub enum StorageError {
    /// File not found.
    FileNotFound(String),

    /// I/O error.
    IoError(String),
}

impl std::fmt::Display for StorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageError::FileNotFound(name) => write!(f, "File not found: {name}"),
            StorageError::IoError(msg) => write!(f, "I/O error: {msg}"),
        }
    }
}

impl std::error::Error for StorageError {}

impl From<StorageError> for LuminaError {
    fn from(err: StorageError) -> Self {
        LuminaError::storage(err.to_string())
    }
}

/// Read a whole file into memory.
pub fn read_all(storage: &dyn Storage, name: &str) -> Result<Vec<u8>> {
    let mut input = storage.open_input(name)?;
    let mut buffer = Vec::with_capacity(input.size()? as usize);
    input.read_to_end(&mut buffer)?;
    Ok(buffer)
}

/// Write `bytes` to `name` through a temporary file and an atomic rename.
///
/// The temporary name is unique per call so concurrent writers of different
/// files never share a scratch file.
pub fn write_atomic(storage: &dyn Storage, name: &str, bytes: &[u8]) -> Result<()> {
    let tmp_name = format!("{name}.{}.tmp", uuid::Uuid::new_v4().simple());
    let written = write_file(storage, &tmp_name, bytes)
        .and_then(|_| storage.rename_file(&tmp_name, name));

    if written.is_err() {
        storage.delete_file(&tmp_name).ok();
    }
    written
}

fn write_file(storage: &dyn Storage, name: &str, bytes: &[u8]) -> Result<()> {
    let mut output = storage.create_output(name)?;
    output.write_all(bytes)?;
    output.flush_and_sync()?;
    output.close()
}
