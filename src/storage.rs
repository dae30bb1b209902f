//! Pluggable storage backends.
//!
//! All persistence in vdb goes through the [`Storage`] trait. File names are
//! relative, `/`-separated paths; backends create intermediate directories
//! on demand.
//!
//! - [`file::FileStorage`] - files under a root directory (the default)
//! - [`memory::MemoryStorage`] - process-local, used heavily in tests
//! - [`prefixed::PrefixedStorage`] - a sub-directory view over another backend

pub mod file;
pub mod memory;
pub mod prefixed;
pub mod retry;

use std::fmt::Debug;
use std::io::{Read, Seek, Write};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{Result, VdbError};

use self::file::{FileStorage, FileStorageConfig};
use self::memory::{MemoryStorage, MemoryStorageConfig};

/// A readable, seekable handle on a stored file.
pub trait StorageInput: Read + Seek + Send + Debug {
    /// Total size of the file in bytes.
    fn size(&self) -> Result<u64>;
}

/// A writable handle on a stored file.
pub trait StorageOutput: Write + Send + Debug {
    /// Flush buffered bytes and force them to durable media.
    fn flush_and_sync(&mut self) -> Result<()>;

    /// Flush and release the handle.
    fn close(&mut self) -> Result<()>;
}

/// A minimal file-system abstraction.
pub trait Storage: Send + Sync + Debug {
    /// Open an existing file for reading.
    fn open_input(&self, name: &str) -> Result<Box<dyn StorageInput>>;

    /// Create (or truncate) a file for writing.
    fn create_output(&self, name: &str) -> Result<Box<dyn StorageOutput>>;

    /// Open a file for appending, creating it if needed.
    fn create_output_append(&self, name: &str) -> Result<Box<dyn StorageOutput>>;

    fn file_exists(&self, name: &str) -> bool;

    fn file_size(&self, name: &str) -> Result<u64>;

    fn delete_file(&self, name: &str) -> Result<()>;

    /// Rename a file, replacing the destination if it exists.
    fn rename_file(&self, from: &str, to: &str) -> Result<()>;

    /// Cut a file down to `len` bytes.
    fn truncate_file(&self, name: &str, len: u64) -> Result<()>;

    /// List every file below this storage, as relative paths.
    fn list_files(&self) -> Result<Vec<String>>;

    /// Remove a directory and everything below it. Missing directories are
    /// not an error.
    fn delete_dir(&self, name: &str) -> Result<()>;

    /// Read a whole file into memory.
    fn read_all(&self, name: &str) -> Result<Vec<u8>> {
        let mut input = self.open_input(name)?;
        let mut bytes = Vec::with_capacity(input.size()? as usize);
        input.read_to_end(&mut bytes)?;
        Ok(bytes)
    }

    /// Replace `name` with `bytes` so readers see either the old or the new
    /// content, never a mix.
    fn write_atomic(&self, name: &str, bytes: &[u8]) -> Result<()> {
        let tmp_name = format!("{name}.tmp");
        let mut output = self.create_output(&tmp_name)?;
        output.write_all(bytes)?;
        output.flush_and_sync()?;
        output.close()?;
        self.rename_file(&tmp_name, name)
    }
}

/// Storage backend selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "options", rename_all = "snake_case")]
pub enum StorageConfig {
    File(FileStorageConfig),
    Memory(MemoryStorageConfig),
}

/// Builds [`Storage`] instances from a [`StorageConfig`].
pub struct StorageFactory;

impl StorageFactory {
    /// Create the storage, creating its root if it does not exist yet.
    pub fn create(config: StorageConfig) -> Result<Arc<dyn Storage>> {
        match config {
            StorageConfig::File(config) => Ok(Arc::new(FileStorage::create(config)?)),
            StorageConfig::Memory(config) => Ok(Arc::new(MemoryStorage::new(config))),
        }
    }

    /// Open an existing storage; fails with `NotFound` if its root is absent.
    pub fn open(config: StorageConfig) -> Result<Arc<dyn Storage>> {
        match config {
            StorageConfig::File(config) => {
                if !config.path.is_dir() {
                    return Err(VdbError::not_found(format!(
                        "storage root {} does not exist",
                        config.path.display()
                    )));
                }
                Ok(Arc::new(FileStorage::create(config)?))
            }
            StorageConfig::Memory(config) => Ok(Arc::new(MemoryStorage::new(config))),
        }
    }
}

/// Validate a relative storage path: non-empty, no absolute or parent
/// components.
pub(crate) fn check_name(name: &str) -> Result<()> {
    if name.is_empty()
        || name.starts_with('/')
        || name.split('/').any(|part| part.is_empty() || part == "." || part == "..")
    {
        return Err(VdbError::invalid_argument(format!(
            "invalid storage path '{name}'"
        )));
    }
    Ok(())
}
