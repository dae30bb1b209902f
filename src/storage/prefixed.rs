//! A storage view that places every file under a fixed directory prefix.

use std::sync::Arc;

use crate::error::Result;
use crate::storage::{Storage, StorageInput, StorageOutput, check_name};

/// Wraps another [`Storage`] and transparently prefixes every path.
///
/// Each table owns a `PrefixedStorage` over `tables/<name>` so table code
/// only ever sees its own files.
#[derive(Debug, Clone)]
pub struct PrefixedStorage {
    prefix: String,
    inner: Arc<dyn Storage>,
}

impl PrefixedStorage {
    pub fn new(prefix: impl Into<String>, inner: Arc<dyn Storage>) -> Result<Self> {
        let prefix = prefix.into().trim_end_matches('/').to_string();
        check_name(&prefix)?;
        Ok(Self { prefix, inner })
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    fn path(&self, name: &str) -> String {
        format!("{}/{}", self.prefix, name)
    }
}

impl Storage for PrefixedStorage {
    fn open_input(&self, name: &str) -> Result<Box<dyn StorageInput>> {
        self.inner.open_input(&self.path(name))
    }

    fn create_output(&self, name: &str) -> Result<Box<dyn StorageOutput>> {
        self.inner.create_output(&self.path(name))
    }

    fn create_output_append(&self, name: &str) -> Result<Box<dyn StorageOutput>> {
        self.inner.create_output_append(&self.path(name))
    }

    fn file_exists(&self, name: &str) -> bool {
        self.inner.file_exists(&self.path(name))
    }

    fn file_size(&self, name: &str) -> Result<u64> {
        self.inner.file_size(&self.path(name))
    }

    fn delete_file(&self, name: &str) -> Result<()> {
        self.inner.delete_file(&self.path(name))
    }

    fn rename_file(&self, from: &str, to: &str) -> Result<()> {
        self.inner.rename_file(&self.path(from), &self.path(to))
    }

    fn truncate_file(&self, name: &str, len: u64) -> Result<()> {
        self.inner.truncate_file(&self.path(name), len)
    }

    fn list_files(&self) -> Result<Vec<String>> {
        let prefix = format!("{}/", self.prefix);
        Ok(self
            .inner
            .list_files()?
            .into_iter()
            .filter_map(|name| name.strip_prefix(&prefix).map(str::to_string))
            .collect())
    }

    fn delete_dir(&self, name: &str) -> Result<()> {
        self.inner.delete_dir(&self.path(name))
    }
}
