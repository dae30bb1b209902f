//! File-system backed storage.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, VdbError};
use crate::storage::{Storage, StorageInput, StorageOutput, check_name};

/// Configuration for [`FileStorage`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileStorageConfig {
    /// Root directory.
    pub path: PathBuf,
    /// Call `fsync` on every `flush_and_sync`, and on directories after
    /// entries are created, renamed or removed. Turning this off trades
    /// durability for speed and is only sensible for scratch data.
    #[serde(default = "default_sync")]
    pub sync: bool,
}

fn default_sync() -> bool {
    true
}

impl FileStorageConfig {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            sync: default_sync(),
        }
    }
}

/// Storage rooted at a directory on the local file system.
#[derive(Debug)]
pub struct FileStorage {
    root: PathBuf,
    sync: bool,
}

impl FileStorage {
    /// Create the storage, creating the root directory if needed.
    pub fn create(config: FileStorageConfig) -> Result<Self> {
        fs::create_dir_all(&config.path)?;
        Ok(Self {
            root: config.path,
            sync: config.sync,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, name: &str) -> Result<PathBuf> {
        check_name(name)?;
        Ok(self.root.join(name))
    }

    /// Create the parent directories of `path`, syncing each new directory
    /// and the existing ancestor that now holds them.
    fn ensure_parent(&self, path: &Path) -> Result<()> {
        let Some(parent) = path.parent() else {
            return Ok(());
        };
        if parent.is_dir() {
            return Ok(());
        }
        let mut anchor = parent;
        while !anchor.is_dir() {
            match anchor.parent() {
                Some(up) => anchor = up,
                None => break,
            }
        }
        fs::create_dir_all(parent)?;
        for dir in parent.ancestors() {
            self.sync_dir(dir)?;
            if dir == anchor {
                break;
            }
        }
        Ok(())
    }

    fn sync_parent(&self, path: &Path) -> Result<()> {
        match path.parent() {
            Some(parent) => self.sync_dir(parent),
            None => Ok(()),
        }
    }

    /// Directory entries only become durable once the directory is synced.
    fn sync_dir(&self, dir: &Path) -> Result<()> {
        if self.sync && cfg!(unix) {
            File::open(dir)?.sync_all()?;
        }
        Ok(())
    }

    fn collect_files(&self, dir: &Path, files: &mut Vec<String>) -> Result<()> {
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let path = entry.path();
            if entry.file_type()?.is_dir() {
                self.collect_files(&path, files)?;
            } else if let Ok(relative) = path.strip_prefix(&self.root) {
                let name = relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");
                files.push(name);
            }
        }
        Ok(())
    }
}

impl Storage for FileStorage {
    fn open_input(&self, name: &str) -> Result<Box<dyn StorageInput>> {
        let path = self.resolve(name)?;
        let file = File::open(&path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => VdbError::not_found(format!("file {name}")),
            _ => VdbError::Io(e),
        })?;
        Ok(Box::new(FileInput { file }))
    }

    fn create_output(&self, name: &str) -> Result<Box<dyn StorageOutput>> {
        let path = self.resolve(name)?;
        self.ensure_parent(&path)?;
        let existed = path.exists();
        let file = File::create(&path)?;
        if !existed {
            self.sync_parent(&path)?;
        }
        Ok(Box::new(FileOutput::new(file, self.sync)))
    }

    fn create_output_append(&self, name: &str) -> Result<Box<dyn StorageOutput>> {
        let path = self.resolve(name)?;
        self.ensure_parent(&path)?;
        let existed = path.exists();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        if !existed {
            self.sync_parent(&path)?;
        }
        Ok(Box::new(FileOutput::new(file, self.sync)))
    }

    fn file_exists(&self, name: &str) -> bool {
        self.resolve(name).map(|p| p.is_file()).unwrap_or(false)
    }

    fn file_size(&self, name: &str) -> Result<u64> {
        Ok(fs::metadata(self.resolve(name)?)?.len())
    }

    fn delete_file(&self, name: &str) -> Result<()> {
        let path = self.resolve(name)?;
        match fs::remove_file(&path) {
            Ok(()) => self.sync_parent(&path),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn rename_file(&self, from: &str, to: &str) -> Result<()> {
        let from_path = self.resolve(from)?;
        let to_path = self.resolve(to)?;
        self.ensure_parent(&to_path)?;
        fs::rename(&from_path, &to_path)?;
        self.sync_parent(&to_path)?;
        if from_path.parent() != to_path.parent() {
            self.sync_parent(&from_path)?;
        }
        Ok(())
    }

    fn truncate_file(&self, name: &str, len: u64) -> Result<()> {
        let file = OpenOptions::new().write(true).open(self.resolve(name)?)?;
        file.set_len(len)?;
        if self.sync {
            file.sync_all()?;
        }
        Ok(())
    }

    fn list_files(&self) -> Result<Vec<String>> {
        let mut files = Vec::new();
        if self.root.is_dir() {
            self.collect_files(&self.root, &mut files)?;
        }
        files.sort();
        Ok(files)
    }

    fn delete_dir(&self, name: &str) -> Result<()> {
        let path = self.resolve(name)?;
        match fs::remove_dir_all(&path) {
            Ok(()) => self.sync_parent(&path),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[derive(Debug)]
struct FileInput {
    file: File,
}

impl Read for FileInput {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file.read(buf)
    }
}

impl Seek for FileInput {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.file.seek(pos)
    }
}

impl StorageInput for FileInput {
    fn size(&self) -> Result<u64> {
        Ok(self.file.metadata()?.len())
    }
}

#[derive(Debug)]
struct FileOutput {
    writer: BufWriter<File>,
    sync: bool,
}

impl FileOutput {
    fn new(file: File, sync: bool) -> Self {
        Self {
            writer: BufWriter::new(file),
            sync,
        }
    }
}

impl Write for FileOutput {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.writer.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

impl StorageOutput for FileOutput {
    fn flush_and_sync(&mut self) -> Result<()> {
        self.writer.flush()?;
        if self.sync {
            self.writer.get_ref().sync_data()?;
        }
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.flush_and_sync()
    }
}
