//! A named table: record log, live records and distance index.
//!
//! Writes are serialized by the writer mutex, which owns the record log.
//! The log append (and its fsync) happens before the state lock is taken;
//! the in-memory store and index are then updated under a short write
//! lock. Queries hold the read lock for the whole ranking, so they never
//! observe a half-applied write.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use log::{debug, info};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};

use crate::engine::query;
use crate::engine::response::QueryResult;
use crate::error::{Result, VdbError};
use crate::index::{IndexKind, IndexOption, VectorIndex, snapshot};
use crate::storage::Storage;
use crate::storage::retry::RetryPolicy;
use crate::store::{LogEntry, RecordLog, RecordStore, TableMeta};
use crate::vector::{DistanceMetric, RecordId, VectorRecord, normalize};

/// Options for [`Engine::create_table`](crate::Engine::create_table).
///
/// Unset fields fall back to the engine configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableOptions {
    #[serde(default)]
    pub dimension: Option<usize>,
    #[serde(default)]
    pub metric: Option<DistanceMetric>,
    #[serde(default)]
    pub index: Option<IndexOption>,
    /// L2-normalize vectors at insert and query time.
    #[serde(default)]
    pub normalize: bool,
}

impl TableOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dimension(mut self, dimension: usize) -> Self {
        self.dimension = Some(dimension);
        self
    }

    pub fn metric(mut self, metric: DistanceMetric) -> Self {
        self.metric = Some(metric);
        self
    }

    pub fn index(mut self, index: IndexOption) -> Self {
        self.index = Some(index);
        self
    }

    pub fn normalize(mut self, normalize: bool) -> Self {
        self.normalize = normalize;
        self
    }
}

/// Point-in-time statistics of a table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableStats {
    pub name: String,
    pub dimension: Option<usize>,
    pub metric: DistanceMetric,
    pub index: IndexKind,
    pub records: usize,
    pub indexed: usize,
    pub next_id: RecordId,
    pub log_seq: u64,
    pub log_bytes: u64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug)]
struct TableState {
    records: RecordStore,
    index: Box<dyn VectorIndex>,
}

#[derive(Debug)]
pub struct Table {
    meta: TableMeta,
    storage: Arc<dyn Storage>,
    retry: RetryPolicy,
    writer: Mutex<RecordLog>,
    state: RwLock<TableState>,
    dropped: AtomicBool,
}

impl Table {
    /// Create a new, empty table in `storage`.
    pub fn create(storage: Arc<dyn Storage>, retry: RetryPolicy, meta: TableMeta) -> Result<Self> {
        if meta.dimension == Some(0) {
            return Err(VdbError::invalid_argument("dimension must be positive"));
        }
        let index = meta.index.create(meta.metric)?;
        let log = RecordLog::create(storage.clone(), retry, &meta)?;
        info!(
            "created table {} (metric {}, index {:?})",
            meta.name,
            meta.metric,
            meta.index.kind()
        );
        Ok(Self {
            state: RwLock::new(TableState {
                records: RecordStore::new(meta.dimension),
                index,
            }),
            meta,
            storage,
            retry,
            writer: Mutex::new(log),
            dropped: AtomicBool::new(false),
        })
    }

    /// Open an existing table by replaying its record log.
    ///
    /// `known` is the catalog entry, if any. A log whose creation entry was
    /// lost is re-seeded from it.
    pub fn open(
        storage: Arc<dyn Storage>,
        retry: RetryPolicy,
        name: &str,
        known: Option<&TableMeta>,
    ) -> Result<Self> {
        let (log, entries) = RecordLog::open(storage.clone(), retry)?;

        let mut entries = entries.into_iter();
        let (mut meta, log) = match entries.next() {
            Some(first) => match first.entry {
                LogEntry::Create { meta } => (meta, log),
                other => {
                    return Err(VdbError::storage_corrupt(format!(
                        "record log of table {name} starts with {other:?} instead of Create"
                    )));
                }
            },
            None => match known {
                Some(meta) => {
                    let log = RecordLog::create(storage.clone(), retry, meta)?;
                    (meta.clone(), log)
                }
                None => {
                    return Err(VdbError::storage_corrupt(format!(
                        "record log of table {name} is empty"
                    )));
                }
            },
        };
        if meta.name != name {
            return Err(VdbError::storage_corrupt(format!(
                "record log in directory {name} belongs to table {}",
                meta.name
            )));
        }
        if meta.dimension.is_none() {
            meta.dimension = known.and_then(|k| k.dimension);
        }

        let mut records = RecordStore::new(meta.dimension);
        for record in entries {
            match record.entry {
                LogEntry::Insert(vector_record) => records.insert(Arc::new(vector_record))?,
                LogEntry::Delete { id } => {
                    if records.delete(id).is_none() {
                        return Err(VdbError::storage_corrupt(format!(
                            "tombstone for id {id} which is not live (seq {})",
                            record.seq
                        )));
                    }
                }
                LogEntry::Create { .. } => {
                    return Err(VdbError::storage_corrupt(format!(
                        "second Create entry in record log of table {name} (seq {})",
                        record.seq
                    )));
                }
            }
        }

        let index = Self::load_index(storage.as_ref(), &meta, &records, log.last_seq())?;
        debug!(
            "opened table {name}: {} records, log seq {}",
            records.len(),
            log.last_seq()
        );

        Ok(Self {
            meta,
            storage,
            retry,
            writer: Mutex::new(log),
            state: RwLock::new(TableState { records, index }),
            dropped: AtomicBool::new(false),
        })
    }

    fn load_index(
        storage: &dyn Storage,
        meta: &TableMeta,
        records: &RecordStore,
        log_seq: u64,
    ) -> Result<Box<dyn VectorIndex>> {
        if let Some(snap) = snapshot::load(storage, log_seq) {
            match meta
                .index
                .restore(meta.metric, snap, &|id| records.get(id))
            {
                Ok(index) if index.len() == records.len() => return Ok(index),
                Ok(index) => info!(
                    "index snapshot of table {} covers {} of {} records",
                    meta.name,
                    index.len(),
                    records.len()
                ),
                Err(e) => info!("index snapshot of table {} unusable: {e}", meta.name),
            }
        }
        info!(
            "rebuilding index of table {} from {} records",
            meta.name,
            records.len()
        );
        Self::build_index(meta, records)
    }

    fn build_index(meta: &TableMeta, records: &RecordStore) -> Result<Box<dyn VectorIndex>> {
        let mut index = meta.index.create(meta.metric)?;
        index.build(records.scan().collect())?;
        Ok(index)
    }

    pub fn name(&self) -> &str {
        &self.meta.name
    }

    pub fn meta(&self) -> TableMeta {
        let mut meta = self.meta.clone();
        meta.dimension = self.state.read().records.dimension();
        meta
    }

    pub fn stats(&self) -> TableStats {
        let log = self.writer.lock();
        let state = self.state.read();
        TableStats {
            name: self.meta.name.clone(),
            dimension: state.records.dimension(),
            metric: self.meta.metric,
            index: state.index.kind(),
            records: state.records.len(),
            indexed: state.index.len(),
            next_id: state.records.next_id(),
            log_seq: log.last_seq(),
            log_bytes: log.size(),
            created_at: self.meta.created_at,
        }
    }

    fn check_live(&self) -> Result<()> {
        if self.dropped.load(Ordering::Acquire) {
            return Err(VdbError::table_not_found(self.meta.name.clone()));
        }
        Ok(())
    }

    /// Durably insert a record and return its id.
    pub fn insert(&self, mut vector: Vec<f32>, payload: Option<Vec<u8>>) -> Result<RecordId> {
        let mut log = self.writer.lock();
        self.check_live()?;

        let id = {
            let state = self.state.read();
            state.records.check_vector(&vector)?;
            state.records.next_id()
        };
        if self.meta.normalize {
            normalize(&mut vector);
        }

        let record = VectorRecord::new(id, vector, payload);
        log.append(LogEntry::Insert(record.clone()))?;

        let record = Arc::new(record);
        let mut state = self.state.write();
        state.records.insert(record.clone())?;
        state.index.add(record)?;
        Ok(id)
    }

    pub fn get(&self, id: RecordId) -> Result<Arc<VectorRecord>> {
        self.check_live()?;
        self.state.read().records.get(id).ok_or_else(|| {
            VdbError::not_found(format!("record {id} in table {}", self.meta.name))
        })
    }

    /// Delete a record. Returns false if it was not live.
    pub fn delete(&self, id: RecordId) -> Result<bool> {
        let mut log = self.writer.lock();
        self.check_live()?;

        if !self.state.read().records.contains(id) {
            return Ok(false);
        }
        log.append(LogEntry::Delete { id })?;

        let mut state = self.state.write();
        state.records.delete(id);
        state.index.remove(id);
        Ok(true)
    }

    pub fn knn(&self, vector: &[f32], limit: usize, oversampling: usize) -> Result<Vec<QueryResult>> {
        self.check_live()?;
        let mut query = vector.to_vec();
        if self.meta.normalize {
            normalize(&mut query);
        }
        let state = self.state.read();
        query::knn(
            &state.records,
            state.index.as_ref(),
            self.meta.metric,
            &query,
            limit,
            oversampling,
        )
    }

    /// KNN around an existing record. The record itself is part of the
    /// result at distance zero.
    pub fn knn_by_id(
        &self,
        id: RecordId,
        limit: usize,
        oversampling: usize,
    ) -> Result<Vec<QueryResult>> {
        self.check_live()?;
        let state = self.state.read();
        let record = state.records.get(id).ok_or_else(|| {
            VdbError::not_found(format!("record {id} in table {}", self.meta.name))
        })?;
        query::knn(
            &state.records,
            state.index.as_ref(),
            self.meta.metric,
            &record.vector,
            limit,
            oversampling,
        )
    }

    /// Throw the index away and rebuild it from the live records.
    pub fn rebuild_index(&self) -> Result<()> {
        let _log = self.writer.lock();
        self.check_live()?;
        let mut state = self.state.write();
        state.index = Self::build_index(&self.meta, &state.records)?;
        info!(
            "rebuilt index of table {} ({} records)",
            self.meta.name,
            state.index.len()
        );
        Ok(())
    }

    /// Write an index snapshot tagged with the current log sequence.
    pub fn persist(&self) -> Result<()> {
        let log = self.writer.lock();
        self.check_live()?;
        let state = self.state.read();
        snapshot::save(
            self.storage.as_ref(),
            self.retry,
            log.last_seq(),
            state.index.snapshot(),
        )?;
        debug!(
            "persisted index snapshot of table {} at seq {}",
            self.meta.name,
            log.last_seq()
        );
        Ok(())
    }

    pub fn close(&self) -> Result<()> {
        self.writer.lock().close()
    }

    /// Refuse every further operation. Waits for an in-flight write.
    pub(crate) fn mark_dropped(&self) -> Result<()> {
        let mut log = self.writer.lock();
        self.dropped.store(true, Ordering::Release);
        log.close()
    }
}
