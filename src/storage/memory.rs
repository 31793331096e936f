//! In-memory storage implementation for testing.

use std::collections::HashMap;
use std::io::{Cursor, Read, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

use crate::error::{LuminaError, Result};
use crate::storage::{Storage, StorageError, StorageInput, StorageOutput};

type FileMap = Arc<Mutex<HashMap<String, Arc<[u8]>>>>;

/// Configuration for memory-based storage.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorageConfig {
    /// Reject every write, as a full or read-only disk would.
    pub read_only: bool,
}

/// An in-memory storage implementation.
///
/// Files only become visible once their output is closed, which mirrors the
/// write-then-rename discipline of the file backend.
#[derive(Debug)]
pub struct MemoryStorage {
    files: FileMap,
    read_only: Arc<AtomicBool>,
}

impl MemoryStorage {
    /// Create a new memory storage.
    pub fn new(config: MemoryStorageConfig) -> Self {
        MemoryStorage {
            files: Arc::new(Mutex::new(HashMap::new())),
            read_only: Arc::new(AtomicBool::new(config.read_only)),
        }
    }

    /// Create a new memory storage with default configuration.
    pub fn new_default() -> Self {
        Self::new(MemoryStorageConfig::default())
    }

    /// Toggle write rejection at runtime.
    pub fn set_read_only(&self, read_only: bool) {
        self.read_only.store(read_only, Ordering::SeqCst);
    }

    /// Get the number of files stored.
    pub fn file_count(&self) -> usize {
        self.files.lock().len()
    }

    /// Replace the content of a file without going through an output stream.
    pub fn put_file(&self, name: &str, data: &[u8]) {
        self.files.lock().insert(name.to_string(), Arc::from(data));
    }

    fn check_writable(&self, name: &str) -> Result<()> {
        if self.read_only.load(Ordering::SeqCst) {
            Err(StorageError::IoError(format!("storage is read-only, cannot write {name}")).into())
        } else {
            Ok(())
        }
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new_default()
    }
}

impl Storage for MemoryStorage {
    fn open_input(&self, name: &str) -> Result<Box<dyn StorageInput>> {
        let files = self.files.lock();
        let data = files
            .get(name)
            .ok_or_else(|| StorageError::FileNotFound(name.to_string()))?;

        Ok(Box::new(MemoryInput::new(data.clone())))
    }

    fn create_output(&self, name: &str) -> Result<Box<dyn StorageOutput>> {
        self.check_writable(name)?;

        Ok(Box::new(MemoryOutput::new(
            name.to_string(),
            Arc::clone(&self.files),
            Arc::clone(&self.read_only),
        )))
    }

    fn file_exists(&self, name: &str) -> bool {
        self.files.lock().contains_key(name)
    }

    fn delete_file(&self, name: &str) -> Result<()> {
        self.check_writable(name)?;
        self.files.lock().remove(name);
        Ok(())
    }

    fn list_files(&self) -> Result<Vec<String>> {
        let files = self.files.lock();
        let mut file_names: Vec<String> = files.keys().cloned().collect();
        file_names.sort();
        Ok(file_names)
    }

    fn rename_file(&self, old_name: &str, new_name: &str) -> Result<()> {
        self.check_writable(new_name)?;

        let mut files = self.files.lock();
        let data = files
            .remove(old_name)
            .ok_or_else(|| StorageError::FileNotFound(old_name.to_string()))?;

        files.insert(new_name.to_string(), data);
        Ok(())
    }

    fn sync(&self) -> Result<()> {
        Ok(())
    }
}

/// A memory-based input implementation.
#[derive(Debug)]
pub struct MemoryInput {
    cursor: Cursor<Arc<[u8]>>,
    size: u64,
}

impl MemoryInput {
    fn new(data: Arc<[u8]>) -> Self {
        let size = data.len() as u64;
        MemoryInput {
            cursor: Cursor::new(data),
            size,
        }
    }
}

impl Read for MemoryInput {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.cursor.read(buf)
    }
}

impl StorageInput for MemoryInput {
    fn size(&self) -> Result<u64> {
        Ok(self.size)
    }
}

/// A memory-based output implementation.
#[derive(Debug)]
pub struct MemoryOutput {
    name: String,
    buffer: Vec<u8>,
    files: FileMap,
    read_only: Arc<AtomicBool>,
    closed: bool,
}

impl MemoryOutput {
    fn new(name: String, files: FileMap, read_only: Arc<AtomicBool>) -> Self {
        MemoryOutput {
            name,
            buffer: Vec::new(),
            files,
            read_only,
            closed: false,
        }
    }
}

impl Write for MemoryOutput {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        if self.closed {
            return Err(std::io::Error::other("Output is closed"));
        }
        if self.read_only.load(Ordering::SeqCst) {
            return Err(std::io::Error::other("storage is read-only"));
        }

        self.buffer.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl StorageOutput for MemoryOutput {
    fn flush_and_sync(&mut self) -> Result<()> {
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if !self.closed {
            if self.read_only.load(Ordering::SeqCst) {
                return Err(LuminaError::storage(format!(
                    "storage is read-only, cannot close {}",
                    self.name
                )));
            }
            let mut files = self.files.lock();
            files.insert(self.name.clone(), Arc::from(std::mem::take(&mut self.buffer)));
            self.closed = true;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_and_read_file() {
        let storage = MemoryStorage::new_default();

        let mut output = storage.create_output("test.bin").unwrap();
        output.write_all(b"Hello, World!").unwrap();
        // Not visible until closed.
        assert!(!storage.file_exists("test.bin"));
        output.close().unwrap();

        let mut input = storage.open_input("test.bin").unwrap();
        let mut buffer = Vec::new();
        input.read_to_end(&mut buffer).unwrap();

        assert_eq!(buffer, b"Hello, World!");
        assert_eq!(input.size().unwrap(), 13);
    }

    #[test]
    fn test_rename_and_delete() {
        let storage = MemoryStorage::new_default();
        storage.put_file("a.tmp", b"data");

        storage.rename_file("a.tmp", "a.bin").unwrap();
        assert!(!storage.file_exists("a.tmp"));
        assert!(storage.file_exists("a.bin"));

        storage.delete_file("a.bin").unwrap();
        assert_eq!(storage.file_count(), 0);
        assert!(storage.rename_file("missing", "other").is_err());
    }

    #[test]
    fn test_read_only_rejects_writes() {
        let storage = MemoryStorage::new_default();
        storage.set_read_only(true);

        assert!(storage.create_output("x.bin").is_err());
        assert!(storage.delete_file("x.bin").is_err());

        storage.set_read_only(false);
        assert!(storage.create_output("x.bin").is_ok());
    }
}
