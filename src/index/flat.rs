//! Flat index for exact search.
//!
//! Stores a handle to every record and computes the distance to each of
//! them on every query.

use std::collections::HashMap;
use std::sync::Arc;

use rayon::prelude::*;

use crate::error::{Result, VdbError};
use crate::index::snapshot::IndexSnapshot;
use crate::index::{Candidate, IndexKind, PARALLEL_THRESHOLD, VectorIndex, select_top};
use crate::vector::{DistanceMetric, RecordId, VectorRecord};

#[derive(Debug)]
pub struct FlatIndex {
    metric: DistanceMetric,
    entries: Vec<Arc<VectorRecord>>,
    positions: HashMap<RecordId, usize>,
}

impl FlatIndex {
    pub fn new(metric: DistanceMetric) -> Self {
        Self {
            metric,
            entries: Vec::new(),
            positions: HashMap::new(),
        }
    }

    pub(crate) fn restore(
        metric: DistanceMetric,
        ids: Vec<RecordId>,
        lookup: &dyn Fn(RecordId) -> Option<Arc<VectorRecord>>,
    ) -> Result<Self> {
        let mut index = Self::new(metric);
        for id in ids {
            let record = lookup(id).ok_or_else(|| {
                VdbError::storage_corrupt(format!("index snapshot references unknown id {id}"))
            })?;
            index.add(record)?;
        }
        Ok(index)
    }
}

/// Exact distances from `query` to every record in `entries`.
pub(crate) fn score_all(
    metric: DistanceMetric,
    query: &[f32],
    entries: &[Arc<VectorRecord>],
) -> Vec<Candidate> {
    let score = |record: &Arc<VectorRecord>| Candidate {
        id: record.id,
        distance: metric.distance_unchecked(query, &record.vector),
    };
    if entries.len() >= PARALLEL_THRESHOLD {
        entries.par_iter().map(score).collect()
    } else {
        entries.iter().map(score).collect()
    }
}

impl VectorIndex for FlatIndex {
    fn kind(&self) -> IndexKind {
        IndexKind::Flat
    }

    fn metric(&self) -> DistanceMetric {
        self.metric
    }

    fn build(&mut self, records: Vec<Arc<VectorRecord>>) -> Result<()> {
        self.entries.clear();
        self.positions.clear();
        for record in records {
            self.add(record)?;
        }
        Ok(())
    }

    fn add(&mut self, record: Arc<VectorRecord>) -> Result<()> {
        if let Some(&pos) = self.positions.get(&record.id) {
            self.entries[pos] = record;
            return Ok(());
        }
        self.positions.insert(record.id, self.entries.len());
        self.entries.push(record);
        Ok(())
    }

    fn remove(&mut self, id: RecordId) -> bool {
        let Some(pos) = self.positions.remove(&id) else {
            return false;
        };
        self.entries.swap_remove(pos);
        if let Some(moved) = self.entries.get(pos) {
            self.positions.insert(moved.id, pos);
        }
        true
    }

    fn search(&self, query: &[f32], over_fetch: usize) -> Result<Vec<Candidate>> {
        Ok(select_top(
            score_all(self.metric, query, &self.entries),
            over_fetch,
        ))
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn snapshot(&self) -> IndexSnapshot {
        let mut ids: Vec<RecordId> = self.entries.iter().map(|r| r.id).collect();
        ids.sort_unstable();
        IndexSnapshot::Flat { ids }
    }
}
