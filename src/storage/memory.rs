//! In-memory storage.

use std::collections::BTreeMap;
use std::io::{self, Cursor, Read, Seek, SeekFrom, Write};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};

use crate::error::{Result, VdbError};
use crate::storage::{Storage, StorageInput, StorageOutput, check_name};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryStorageConfig {}

type FileBuffer = Arc<Mutex<Vec<u8>>>;

/// Storage that keeps every file in a process-local map.
///
/// Cloning the `Arc<dyn Storage>` shares the files, which is how tests
/// simulate reopening an engine on the same data.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    files: RwLock<BTreeMap<String, FileBuffer>>,
}

impl MemoryStorage {
    pub fn new(_config: MemoryStorageConfig) -> Self {
        Self::default()
    }

    fn buffer(&self, name: &str) -> Result<FileBuffer> {
        self.files
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| VdbError::not_found(format!("file {name}")))
    }
}

impl Storage for MemoryStorage {
    fn open_input(&self, name: &str) -> Result<Box<dyn StorageInput>> {
        check_name(name)?;
        let bytes = self.buffer(name)?.lock().clone();
        Ok(Box::new(MemoryInput {
            cursor: Cursor::new(bytes),
        }))
    }

    fn create_output(&self, name: &str) -> Result<Box<dyn StorageOutput>> {
        check_name(name)?;
        let buffer: FileBuffer = Arc::new(Mutex::new(Vec::new()));
        self.files.write().insert(name.to_string(), buffer.clone());
        Ok(Box::new(MemoryOutput { buffer }))
    }

    fn create_output_append(&self, name: &str) -> Result<Box<dyn StorageOutput>> {
        check_name(name)?;
        let buffer = self
            .files
            .write()
            .entry(name.to_string())
            .or_default()
            .clone();
        Ok(Box::new(MemoryOutput { buffer }))
    }

    fn file_exists(&self, name: &str) -> bool {
        self.files.read().contains_key(name)
    }

    fn file_size(&self, name: &str) -> Result<u64> {
        Ok(self.buffer(name)?.lock().len() as u64)
    }

    fn delete_file(&self, name: &str) -> Result<()> {
        self.files.write().remove(name);
        Ok(())
    }

    fn rename_file(&self, from: &str, to: &str) -> Result<()> {
        check_name(to)?;
        let mut files = self.files.write();
        let buffer = files
            .remove(from)
            .ok_or_else(|| VdbError::not_found(format!("file {from}")))?;
        files.insert(to.to_string(), buffer);
        Ok(())
    }

    fn truncate_file(&self, name: &str, len: u64) -> Result<()> {
        self.buffer(name)?.lock().truncate(len as usize);
        Ok(())
    }

    fn list_files(&self) -> Result<Vec<String>> {
        Ok(self.files.read().keys().cloned().collect())
    }

    fn delete_dir(&self, name: &str) -> Result<()> {
        let prefix = format!("{}/", name.trim_end_matches('/'));
        self.files.write().retain(|k, _| !k.starts_with(&prefix));
        Ok(())
    }
}

#[derive(Debug)]
struct MemoryInput {
    cursor: Cursor<Vec<u8>>,
}

impl Read for MemoryInput {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.cursor.read(buf)
    }
}

impl Seek for MemoryInput {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.cursor.seek(pos)
    }
}

impl StorageInput for MemoryInput {
    fn size(&self) -> Result<u64> {
        Ok(self.cursor.get_ref().len() as u64)
    }
}

#[derive(Debug)]
struct MemoryOutput {
    buffer: FileBuffer,
}

impl Write for MemoryOutput {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl StorageOutput for MemoryOutput {
    fn flush_and_sync(&mut self) -> Result<()> {
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shared_buffers() {
        let storage = MemoryStorage::default();
        let mut out = storage.create_output_append("a/log").unwrap();
        out.write_all(b"12").unwrap();

        let mut again = storage.create_output_append("a/log").unwrap();
        again.write_all(b"34").unwrap();

        assert_eq!(storage.read_all("a/log").unwrap(), b"1234");
        assert_eq!(storage.file_size("a/log").unwrap(), 4);
    }

    #[test]
    fn test_delete_dir_only_removes_prefix() {
        let storage = MemoryStorage::default();
        storage.create_output("tables/a/records.log").unwrap();
        storage.create_output("tables/ab/records.log").unwrap();

        storage.delete_dir("tables/a").unwrap();
        assert_eq!(
            storage.list_files().unwrap(),
            vec!["tables/ab/records.log".to_string()]
        );
    }
}
