//! Live records of a table.

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::Arc;

use crate::error::{Result, VdbError};
use crate::vector::{RecordId, VectorRecord, validate_components};

/// In-memory view of the live records, rebuilt from the record log.
///
/// Ids are never reused: `next_id` only moves forward, also across deletes
/// of the highest id.
#[derive(Debug, Default)]
pub struct RecordStore {
    dimension: Option<usize>,
    records: BTreeMap<RecordId, Arc<VectorRecord>>,
    next_id: RecordId,
}

impl RecordStore {
    pub fn new(dimension: Option<usize>) -> Self {
        Self {
            dimension,
            records: BTreeMap::new(),
            next_id: 0,
        }
    }

    pub fn dimension(&self) -> Option<usize> {
        self.dimension
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// The id the next insert will receive.
    pub fn next_id(&self) -> RecordId {
        self.next_id
    }

    /// Check a vector against the table before it is logged.
    pub fn check_vector(&self, vector: &[f32]) -> Result<()> {
        validate_components(vector)?;
        match self.dimension {
            Some(expected) if expected != vector.len() => {
                Err(VdbError::dimension_mismatch(expected, vector.len()))
            }
            _ => Ok(()),
        }
    }

    /// Add a record that is already durable.
    ///
    /// Fails with `StorageCorrupt` if the id is live, is behind `next_id`,
    /// or the dimension disagrees; these only happen on a damaged log.
    pub fn insert(&mut self, record: Arc<VectorRecord>) -> Result<()> {
        if record.id < self.next_id {
            return Err(VdbError::storage_corrupt(format!(
                "record id {} is not newer than {}",
                record.id,
                self.next_id.saturating_sub(1)
            )));
        }
        match self.dimension {
            Some(expected) if expected != record.dimension() => {
                return Err(VdbError::storage_corrupt(format!(
                    "record {} has dimension {}, table has {expected}",
                    record.id,
                    record.dimension()
                )));
            }
            None => self.dimension = Some(record.dimension()),
            _ => {}
        }
        self.next_id = record.id + 1;
        self.records.insert(record.id, record);
        Ok(())
    }

    pub fn get(&self, id: RecordId) -> Option<Arc<VectorRecord>> {
        self.records.get(&id).cloned()
    }

    pub fn contains(&self, id: RecordId) -> bool {
        self.records.contains_key(&id)
    }

    /// Remove a live record, returning it.
    pub fn delete(&mut self, id: RecordId) -> Option<Arc<VectorRecord>> {
        self.records.remove(&id)
    }

    /// Iterate over live records in ascending id order.
    pub fn scan(&self) -> RecordScan<'_> {
        RecordScan {
            records: &self.records,
            cursor: Bound::Unbounded,
        }
    }
}

/// Lazy cursor over live records in ascending id order.
///
/// Each step looks up the next id after the cursor, so the scan is finite
/// and can be restarted from the beginning with [`RecordScan::restart`].
#[derive(Debug, Clone)]
pub struct RecordScan<'a> {
    records: &'a BTreeMap<RecordId, Arc<VectorRecord>>,
    cursor: Bound<RecordId>,
}

impl RecordScan<'_> {
    pub fn restart(&mut self) {
        self.cursor = Bound::Unbounded;
    }
}

impl Iterator for RecordScan<'_> {
    type Item = Arc<VectorRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        let (&id, record) = self.records.range((self.cursor, Bound::Unbounded)).next()?;
        self.cursor = Bound::Excluded(id);
        Some(record.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: RecordId, vector: Vec<f32>) -> Arc<VectorRecord> {
        Arc::new(VectorRecord::new(id, vector, None))
    }

    #[test]
    fn test_first_insert_fixes_dimension() {
        let mut store = RecordStore::new(None);
        assert!(store.check_vector(&[1.0, 2.0, 3.0]).is_ok());
        store.insert(record(0, vec![1.0, 2.0, 3.0])).unwrap();
        assert_eq!(store.dimension(), Some(3));

        let err = store.check_vector(&[1.0, 2.0, 3.0, 4.0]).unwrap_err();
        assert!(matches!(
            err,
            VdbError::DimensionMismatch {
                expected: 3,
                actual: 4
            }
        ));
        assert!(matches!(
            store.check_vector(&[1.0, f32::INFINITY, 0.0]),
            Err(VdbError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_ids_are_not_reused() {
        let mut store = RecordStore::new(Some(1));
        store.insert(record(0, vec![0.0])).unwrap();
        store.insert(record(1, vec![1.0])).unwrap();
        assert!(store.delete(1).is_some());
        assert!(store.delete(1).is_none());
        assert_eq!(store.next_id(), 2);

        let err = store.insert(record(1, vec![1.0])).unwrap_err();
        assert!(matches!(err, VdbError::StorageCorrupt(_)));
    }

    #[test]
    fn test_scan_is_ordered_and_restartable() {
        let mut store = RecordStore::new(None);
        for id in [0, 1, 2, 3] {
            store.insert(record(id, vec![id as f32])).unwrap();
        }
        store.delete(2);

        let mut scan = store.scan();
        let first: Vec<_> = scan.by_ref().map(|r| r.id).collect();
        assert_eq!(first, vec![0, 1, 3]);
        assert!(scan.next().is_none());

        scan.restart();
        assert_eq!(scan.next().map(|r| r.id), Some(0));
    }
}
