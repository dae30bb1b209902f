//! The engine façade.
//!
//! An [`Engine`] binds a storage root to its tables. It is `Send + Sync`
//! and meant to be shared behind an `Arc`; tables lock independently.
//!
//! Layout below the root:
//!
//! ```text
//! catalog.json
//! tables/<name>/records.log   source of truth
//! tables/<name>/index.snap    rebuildable
//! ```

pub mod catalog;
pub mod config;
pub mod query;
pub mod response;
pub mod table;

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use log::{debug, info, warn};
use parking_lot::{Mutex, RwLock};

use crate::embedding::Embedder;
use crate::error::{Result, VdbError};
use crate::storage::file::FileStorageConfig;
use crate::storage::prefixed::PrefixedStorage;
use crate::storage::{Storage, StorageConfig, StorageFactory};
use crate::store::{LOG_FILE, TableMeta, validate_table_name};
use crate::vector::{RecordId, VectorRecord};

use self::catalog::{Catalog, discover_tables, table_dir};
use self::config::EngineConfig;
use self::response::{QueryResult, Response};
use self::table::{Table, TableOptions, TableStats};

/// Process-wide entry point to a vector database root.
#[derive(Debug)]
pub struct Engine {
    storage: Arc<dyn Storage>,
    config: EngineConfig,
    tables: RwLock<BTreeMap<String, Arc<Table>>>,
    /// Serializes catalog rewrites.
    catalog_lock: Mutex<()>,
    closed: AtomicBool,
}

impl Engine {
    /// Open the database rooted at `root`.
    ///
    /// A missing root is created when `create_if_missing` is set and is
    /// `NotFound` otherwise.
    pub fn open<P: AsRef<Path>>(root: P, config: EngineConfig) -> Result<Self> {
        let storage_config = StorageConfig::File(FileStorageConfig {
            path: root.as_ref().to_path_buf(),
            sync: config.sync,
        });
        let storage = if config.create_if_missing {
            StorageFactory::create(storage_config)?
        } else {
            StorageFactory::open(storage_config)?
        };
        Self::open_with_storage(storage, config)
    }

    /// Open the database on an arbitrary storage backend.
    pub fn open_with_storage(storage: Arc<dyn Storage>, config: EngineConfig) -> Result<Self> {
        config.validate()?;

        let catalog = Catalog::load(storage.as_ref())?;
        let mut on_disk = discover_tables(storage.as_ref())?;

        let mut tables = BTreeMap::new();
        for meta in &catalog.tables {
            if !on_disk.remove(&meta.name) {
                return Err(VdbError::storage_corrupt(format!(
                    "table {} is listed in the catalog but has no record log",
                    meta.name
                )));
            }
            let table = Self::open_table(&storage, &config, &meta.name, Some(meta))?;
            tables.insert(meta.name.clone(), Arc::new(table));
        }

        let adopted = !on_disk.is_empty();
        for name in on_disk {
            if let Err(e) = validate_table_name(&name) {
                warn!("ignoring table directory {name}: {e}");
                continue;
            }
            let log_path = format!("{}/{LOG_FILE}", table_dir(&name));
            if storage.file_size(&log_path)? == 0 {
                // A creation that failed before its first frame committed.
                warn!("removing table directory {name} with an empty record log");
                storage.delete_dir(&table_dir(&name))?;
                continue;
            }
            info!("adopting table {name} missing from the catalog");
            let table = Self::open_table(&storage, &config, &name, None)?;
            tables.insert(name, Arc::new(table));
        }

        info!("opened vdb with {} table(s)", tables.len());
        let engine = Self {
            storage,
            config,
            tables: RwLock::new(tables),
            catalog_lock: Mutex::new(()),
            closed: AtomicBool::new(false),
        };
        if adopted {
            engine.save_catalog()?;
        }
        Ok(engine)
    }

    fn open_table(
        storage: &Arc<dyn Storage>,
        config: &EngineConfig,
        name: &str,
        known: Option<&TableMeta>,
    ) -> Result<Table> {
        let table_storage: Arc<dyn Storage> =
            Arc::new(PrefixedStorage::new(table_dir(name), storage.clone())?);
        Table::open(table_storage, config.retry, name, known)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    fn check_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(VdbError::storage_unavailable("engine is closed"));
        }
        Ok(())
    }

    fn table(&self, name: &str) -> Result<Arc<Table>> {
        self.check_open()?;
        self.tables
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| VdbError::table_not_found(name))
    }

    fn save_catalog(&self) -> Result<()> {
        let tables = self.tables.read();
        self.save_catalog_locked(&tables)
    }

    /// Rewrite the catalog from `tables`, which the caller keeps locked.
    /// Lock order is `tables`, then `catalog_lock`.
    fn save_catalog_locked(&self, tables: &BTreeMap<String, Arc<Table>>) -> Result<()> {
        let _guard = self.catalog_lock.lock();
        let metas = tables.values().map(|t| t.meta()).collect();
        Catalog::new(metas).save(self.storage.as_ref(), self.config.retry)
    }

    // ── Table administration ──────────────────────────────────────────

    /// Create a table. Unset options fall back to the engine configuration.
    pub fn create_table(&self, name: &str, options: TableOptions) -> Result<TableMeta> {
        self.check_open()?;
        let mut tables = self.tables.write();
        if tables.contains_key(name) {
            return Err(VdbError::invalid_argument(format!(
                "table {name} already exists"
            )));
        }
        Ok(self.register_table(&mut tables, name, options)?.meta())
    }

    /// Create a table's files, add it to `tables` and record it in the
    /// catalog. On failure nothing of the table is left behind.
    fn register_table(
        &self,
        tables: &mut BTreeMap<String, Arc<Table>>,
        name: &str,
        options: TableOptions,
    ) -> Result<Arc<Table>> {
        validate_table_name(name)?;

        let mut meta = TableMeta::new(
            name,
            options.metric.unwrap_or(self.config.default_metric),
            options
                .index
                .unwrap_or_else(|| self.config.default_index.clone()),
        );
        meta.dimension = options.dimension;
        meta.normalize = options.normalize;

        // Leftovers of a table dropped while its files were in use.
        self.storage.delete_dir(&table_dir(name))?;
        let table_storage: Arc<dyn Storage> =
            Arc::new(PrefixedStorage::new(table_dir(name), self.storage.clone())?);
        let table = match Table::create(table_storage, self.config.retry, meta) {
            Ok(table) => Arc::new(table),
            Err(e) => {
                self.remove_table_files(name);
                return Err(e);
            }
        };

        tables.insert(name.to_string(), table.clone());
        if let Err(e) = self.save_catalog_locked(tables) {
            tables.remove(name);
            if let Err(drop_err) = table.mark_dropped() {
                warn!("failed to close table {name} after a catalog error: {drop_err}");
            }
            self.remove_table_files(name);
            return Err(e);
        }
        Ok(table)
    }

    fn remove_table_files(&self, name: &str) {
        if let Err(e) = self.storage.delete_dir(&table_dir(name)) {
            warn!("failed to remove files of table {name}: {e}");
        }
    }

    /// Drop a table and delete its files. Returns false if it did not exist.
    ///
    /// The catalog forgets the table before its files go. If deleting them
    /// fails the table is adopted again on the next open.
    pub fn drop_table(&self, name: &str) -> Result<bool> {
        self.check_open()?;
        // Held until the files are gone, so a concurrent create of the same
        // name cannot write into the directory being deleted.
        let mut tables = self.tables.write();
        let Some(table) = tables.remove(name) else {
            return Ok(false);
        };
        if let Err(e) = self.save_catalog_locked(&tables) {
            tables.insert(name.to_string(), table);
            return Err(e);
        }
        if let Err(e) = table.mark_dropped() {
            warn!("failed to close record log of dropped table {name}: {e}");
        }
        self.storage.delete_dir(&table_dir(name))?;
        info!("dropped table {name}");
        Ok(true)
    }

    /// Table names in ascending order.
    pub fn tables(&self) -> Result<Vec<String>> {
        self.check_open()?;
        Ok(self.tables.read().keys().cloned().collect())
    }

    pub fn table_meta(&self, name: &str) -> Result<TableMeta> {
        Ok(self.table(name)?.meta())
    }

    pub fn table_stats(&self, name: &str) -> Result<TableStats> {
        Ok(self.table(name)?.stats())
    }

    // ── Records ───────────────────────────────────────────────────────

    fn table_for_insert(&self, name: &str) -> Result<Arc<Table>> {
        self.check_open()?;
        if let Some(table) = self.tables.read().get(name) {
            return Ok(table.clone());
        }
        if !self.config.create_if_missing {
            return Err(VdbError::table_not_found(name));
        }
        let mut tables = self.tables.write();
        if let Some(table) = tables.get(name) {
            return Ok(table.clone());
        }
        self.register_table(&mut tables, name, TableOptions::default())
    }

    /// Durably insert a record and return its id.
    ///
    /// The table is created on first insert when `create_if_missing` is set.
    pub fn insert(&self, table: &str, vector: Vec<f32>, payload: Option<Vec<u8>>) -> Result<RecordId> {
        self.table_for_insert(table)?.insert(vector, payload)
    }

    pub fn get(&self, table: &str, id: RecordId) -> Result<VectorRecord> {
        let record = self.table(table)?.get(id)?;
        Ok(VectorRecord::clone(&record))
    }

    /// Delete a record. Deleting an absent id returns `Ok(false)`.
    pub fn delete(&self, table: &str, id: RecordId) -> Result<bool> {
        self.table(table)?.delete(id)
    }

    // ── Queries ───────────────────────────────────────────────────────

    /// The `limit` nearest neighbors of `vector` in `table`.
    ///
    /// Never fails: errors are reported through the response code with an
    /// empty result list. Queries never create tables.
    pub fn knn(&self, table: &str, vector: &[f32], limit: usize) -> Response {
        self.respond(table, || {
            self.table(table)?
                .knn(vector, limit, self.config.oversampling)
        })
    }

    /// KNN around the stored vector of record `id`, which is itself part of
    /// the result. A missing id is reported as `InvalidArgument`.
    pub fn knn_by_id(&self, table: &str, id: RecordId, limit: usize) -> Response {
        self.respond(table, || {
            self.table(table)?
                .knn_by_id(id, limit, self.config.oversampling)
        })
    }

    /// Embed `text` and run [`Engine::knn`] with the result.
    pub fn knn_text(
        &self,
        table: &str,
        embedder: &dyn Embedder,
        text: &str,
        limit: usize,
    ) -> Response {
        self.respond(table, || {
            let table_ref = self.table(table)?;
            let vector = embedder.embed(text)?;
            table_ref.knn(&vector, limit, self.config.oversampling)
        })
    }

    fn respond<F>(&self, table: &str, query: F) -> Response
    where
        F: FnOnce() -> Result<Vec<QueryResult>>,
    {
        match query() {
            Ok(results) => Response::ok(results),
            Err(e) => {
                debug!("query on table {table} failed: {e}");
                Response::from(e)
            }
        }
    }

    // ── Maintenance ───────────────────────────────────────────────────

    /// Rebuild a table's index from its live records.
    pub fn rebuild_index(&self, table: &str) -> Result<()> {
        self.table(table)?.rebuild_index()
    }

    /// Write every index snapshot and the catalog.
    pub fn persist(&self) -> Result<()> {
        self.check_open()?;
        // A drop waits for this, so no snapshot lands in a deleted directory.
        let tables = self.tables.read();
        for table in tables.values() {
            table.persist()?;
        }
        self.save_catalog_locked(&tables)
    }

    /// Persist and release every file handle. Later calls fail with
    /// `StorageUnavailable`; closing twice is a no-op.
    pub fn close(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Ok(());
        }
        self.persist()?;
        self.closed.store(true, Ordering::Release);
        for table in self.tables.read().values() {
            table.close()?;
        }
        info!("closed vdb");
        Ok(())
    }
}
