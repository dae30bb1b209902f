#![allow(dead_code)]

use std::fmt;
use std::io::{self, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot::Mutex;

use vdb::Result;
use vdb::storage::memory::{MemoryStorage, MemoryStorageConfig};
use vdb::storage::{Storage, StorageInput, StorageOutput};

type Hook = Arc<dyn Fn() + Send + Sync>;

/// Storage that fails a configurable number of upcoming writes.
///
/// A failing write first lets half of its buffer through, like a disk that
/// fills up mid-frame.
pub struct FaultyStorage {
    inner: Arc<dyn Storage>,
    faults: Arc<AtomicU32>,
    target: Mutex<Option<String>>,
    before_delete_dir: Mutex<Option<Hook>>,
}

impl fmt::Debug for FaultyStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FaultyStorage")
            .field("inner", &self.inner)
            .field("faults", &self.faults)
            .field("target", &self.target)
            .finish_non_exhaustive()
    }
}

impl FaultyStorage {
    pub fn new(inner: Arc<dyn Storage>) -> Self {
        Self {
            inner,
            faults: Arc::new(AtomicU32::new(0)),
            target: Mutex::new(None),
            before_delete_dir: Mutex::new(None),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStorage::new(MemoryStorageConfig::default())))
    }

    /// Fail the next `n` writes.
    pub fn fail_next_writes(&self, n: u32) {
        *self.target.lock() = None;
        self.faults.store(n, Ordering::SeqCst);
    }

    /// Fail the next `n` writes to files whose path contains `pattern`.
    pub fn fail_writes_to(&self, pattern: &str, n: u32) {
        *self.target.lock() = Some(pattern.to_string());
        self.faults.store(n, Ordering::SeqCst);
    }

    /// Run `hook` at the start of every `delete_dir`.
    pub fn before_delete_dir(&self, hook: impl Fn() + Send + Sync + 'static) {
        *self.before_delete_dir.lock() = Some(Arc::new(hook));
    }

    pub fn inner(&self) -> Arc<dyn Storage> {
        self.inner.clone()
    }

    fn wrap(&self, name: &str, output: Box<dyn StorageOutput>) -> Box<dyn StorageOutput> {
        let armed = match self.target.lock().as_deref() {
            Some(pattern) => name.contains(pattern),
            None => true,
        };
        let faults = if armed {
            self.faults.clone()
        } else {
            Arc::new(AtomicU32::new(0))
        };
        Box::new(FaultyOutput {
            inner: output,
            faults,
        })
    }
}

impl Storage for FaultyStorage {
    fn open_input(&self, name: &str) -> Result<Box<dyn StorageInput>> {
        self.inner.open_input(name)
    }

    fn create_output(&self, name: &str) -> Result<Box<dyn StorageOutput>> {
        Ok(self.wrap(name, self.inner.create_output(name)?))
    }

    fn create_output_append(&self, name: &str) -> Result<Box<dyn StorageOutput>> {
        Ok(self.wrap(name, self.inner.create_output_append(name)?))
    }

    fn file_exists(&self, name: &str) -> bool {
        self.inner.file_exists(name)
    }

    fn file_size(&self, name: &str) -> Result<u64> {
        self.inner.file_size(name)
    }

    fn delete_file(&self, name: &str) -> Result<()> {
        self.inner.delete_file(name)
    }

    fn rename_file(&self, from: &str, to: &str) -> Result<()> {
        self.inner.rename_file(from, to)
    }

    fn truncate_file(&self, name: &str, len: u64) -> Result<()> {
        self.inner.truncate_file(name, len)
    }

    fn list_files(&self) -> Result<Vec<String>> {
        self.inner.list_files()
    }

    fn delete_dir(&self, name: &str) -> Result<()> {
        let hook = self.before_delete_dir.lock().clone();
        if let Some(hook) = hook {
            hook();
        }
        self.inner.delete_dir(name)
    }
}

#[derive(Debug)]
struct FaultyOutput {
    inner: Box<dyn StorageOutput>,
    faults: Arc<AtomicU32>,
}

impl Write for FaultyOutput {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let fail = self
            .faults
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if fail {
            self.inner.write_all(&buf[..buf.len() / 2])?;
            return Err(io::Error::other("injected write failure"));
        }
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl StorageOutput for FaultyOutput {
    fn flush_and_sync(&mut self) -> Result<()> {
        self.inner.flush_and_sync()
    }

    fn close(&mut self) -> Result<()> {
        self.inner.close()
    }
}

/// Deterministic pseudo-random vectors.
pub fn random_vectors(count: usize, dimension: usize, seed: u64) -> Vec<Vec<f32>> {
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    let mut rng = StdRng::seed_from_u64(seed);
    (0..count)
        .map(|_| (0..dimension).map(|_| rng.random_range(-1.0..1.0)).collect())
        .collect()
}
