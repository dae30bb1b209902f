//! KNN ranking.
//!
//! The index only proposes candidates. Every candidate is re-scored against
//! the stored vector with the table's metric, so the final order is exact
//! over the candidate set whatever the index family.

use log::debug;

use crate::engine::response::QueryResult;
use crate::error::{Result, VdbError};
use crate::index::{Candidate, IndexKind, VectorIndex};
use crate::store::RecordStore;
use crate::vector::{DistanceMetric, validate_components};

/// Candidate count requested from the index: `max(limit * k, limit)`, with
/// `k = 1` for exact indexes.
pub fn over_fetch(kind: IndexKind, limit: usize, oversampling: usize) -> usize {
    let k = match kind {
        IndexKind::Flat => 1,
        IndexKind::Ivf => oversampling.max(1),
    };
    limit.saturating_mul(k).max(limit)
}

/// Rank the `limit` nearest live records to `query`.
///
/// Results are ordered by ascending distance, ties by ascending id.
pub fn knn(
    records: &RecordStore,
    index: &dyn VectorIndex,
    metric: DistanceMetric,
    query: &[f32],
    limit: usize,
    oversampling: usize,
) -> Result<Vec<QueryResult>> {
    if limit == 0 {
        return Err(VdbError::invalid_argument("limit must be positive"));
    }
    let Some(dimension) = records.dimension() else {
        return Ok(Vec::new());
    };
    if query.len() != dimension {
        return Err(VdbError::dimension_mismatch(dimension, query.len()));
    }
    validate_components(query)?;

    let candidates = index.search(query, over_fetch(index.kind(), limit, oversampling))?;

    let mut scored: Vec<_> = candidates
        .into_iter()
        .filter_map(|candidate| {
            let record = records.get(candidate.id);
            if record.is_none() {
                debug!("index proposed id {} which is not live", candidate.id);
            }
            record
        })
        .map(|record| {
            let distance = metric.distance_unchecked(query, &record.vector);
            (
                Candidate {
                    id: record.id,
                    distance,
                },
                record,
            )
        })
        .collect();

    scored.sort_by(|(a, _), (b, _)| a.cmp_rank(b));
    scored.truncate(limit);

    Ok(scored
        .into_iter()
        .map(|(candidate, record)| QueryResult::from_record(&record, candidate.distance))
        .collect())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::index::IndexOption;
    use crate::vector::{RecordId, VectorRecord};

    fn setup(vectors: &[[f32; 3]]) -> (RecordStore, Box<dyn VectorIndex>) {
        let mut store = RecordStore::new(None);
        let mut index = IndexOption::Flat.create(DistanceMetric::Euclidean).unwrap();
        for (id, v) in vectors.iter().enumerate() {
            let record = Arc::new(VectorRecord::new(
                id as RecordId,
                v.to_vec(),
                Some(format!("doc-{id}").into_bytes()),
            ));
            store.insert(record.clone()).unwrap();
            index.add(record).unwrap();
        }
        (store, index)
    }

    #[test]
    fn test_basic_ranking() {
        let (store, index) = setup(&[[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.9, 0.1, 0.0]]);
        let results = knn(
            &store,
            index.as_ref(),
            DistanceMetric::Euclidean,
            &[1.0, 0.0, 0.0],
            2,
            4,
        )
        .unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].id, 0);
        assert_eq!(results[0].distance, 0.0);
        assert_eq!(results[1].id, 2);
        assert!((results[1].distance - 0.141_421_35).abs() < 1e-5);
        assert_eq!(results[1].payload.as_deref(), Some(&b"doc-2"[..]));
    }

    #[test]
    fn test_ties_break_by_id() {
        let (store, index) = setup(&[[0.0, 1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, 1.0]]);
        let results = knn(
            &store,
            index.as_ref(),
            DistanceMetric::Euclidean,
            &[0.0, 0.0, 0.0],
            2,
            1,
        )
        .unwrap();
        let ids: Vec<_> = results.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![0, 1]);
    }

    #[test]
    fn test_limit_and_dimension_errors() {
        let (store, index) = setup(&[[1.0, 0.0, 0.0]]);
        let metric = DistanceMetric::Euclidean;

        let err = knn(&store, index.as_ref(), metric, &[1.0, 0.0, 0.0], 0, 4).unwrap_err();
        assert!(matches!(err, VdbError::InvalidArgument(_)));

        let err = knn(&store, index.as_ref(), metric, &[1.0, 0.0, 0.0, 0.0], 1, 4).unwrap_err();
        assert!(matches!(
            err,
            VdbError::DimensionMismatch {
                expected: 3,
                actual: 4
            }
        ));

        let err = knn(&store, index.as_ref(), metric, &[f32::NAN, 0.0, 0.0], 1, 4).unwrap_err();
        assert!(matches!(err, VdbError::InvalidArgument(_)));
    }

    #[test]
    fn test_empty_table_and_large_limit() {
        let store = RecordStore::new(None);
        let index = IndexOption::Flat.create(DistanceMetric::Euclidean).unwrap();
        let results = knn(
            &store,
            index.as_ref(),
            DistanceMetric::Euclidean,
            &[1.0],
            5,
            4,
        )
        .unwrap();
        assert!(results.is_empty());

        let (store, index) = setup(&[[1.0, 0.0, 0.0], [0.0, 1.0, 0.0]]);
        let results = knn(
            &store,
            index.as_ref(),
            DistanceMetric::Euclidean,
            &[1.0, 0.0, 0.0],
            100,
            4,
        )
        .unwrap();
        assert_eq!(results.len(), 2);
    }

    #[test]
    fn test_over_fetch() {
        assert_eq!(over_fetch(IndexKind::Flat, 5, 4), 5);
        assert_eq!(over_fetch(IndexKind::Ivf, 5, 4), 20);
        assert_eq!(over_fetch(IndexKind::Ivf, 5, 0), 5);
        assert_eq!(over_fetch(IndexKind::Ivf, usize::MAX, 4), usize::MAX);
    }
}
