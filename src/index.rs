//! Distance indexes.
//!
//! An index is a derived projection of a table's record store. It proposes
//! candidate ids for a query; the query engine re-ranks them exactly. Every
//! index can be rebuilt from a full scan of the store at any time.
//!
//! # Families
//!
//! - [`flat::FlatIndex`] - exhaustive, exact
//! - [`ivf::IvfIndex`] - inverted file over k-means centroids, approximate

pub mod flat;
pub mod ivf;
pub mod snapshot;

use std::cmp::Ordering;
use std::fmt::{self, Debug};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{Result, VdbError};
use crate::vector::{DistanceMetric, RecordId, VectorRecord};

use self::flat::FlatIndex;
use self::ivf::{IvfIndex, IvfOption};
use self::snapshot::IndexSnapshot;

/// Above this many vectors, distance computation fans out over rayon.
pub(crate) const PARALLEL_THRESHOLD: usize = 4096;

/// A candidate proposed by an index, with the index's distance estimate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    pub id: RecordId,
    pub distance: f32,
}

impl Candidate {
    /// Ascending by distance, then by id.
    pub fn cmp_rank(&self, other: &Self) -> Ordering {
        self.distance
            .total_cmp(&other.distance)
            .then_with(|| self.id.cmp(&other.id))
    }
}

/// The type of index a table uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexKind {
    Flat,
    Ivf,
}

impl fmt::Display for IndexKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            IndexKind::Flat => "flat",
            IndexKind::Ivf => "ivf",
        })
    }
}

/// Index options, fixed at table creation.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "type", content = "options", rename_all = "snake_case")]
pub enum IndexOption {
    /// Exhaustive exact search.
    #[default]
    Flat,
    /// Inverted file index.
    Ivf(IvfOption),
}

impl IndexOption {
    pub fn kind(&self) -> IndexKind {
        match self {
            IndexOption::Flat => IndexKind::Flat,
            IndexOption::Ivf(_) => IndexKind::Ivf,
        }
    }

    pub fn validate(&self) -> Result<()> {
        match self {
            IndexOption::Flat => Ok(()),
            IndexOption::Ivf(option) => option.validate(),
        }
    }

    /// Create an empty index for the given metric.
    pub fn create(&self, metric: DistanceMetric) -> Result<Box<dyn VectorIndex>> {
        self.validate()?;
        Ok(match self {
            IndexOption::Flat => Box::new(FlatIndex::new(metric)),
            IndexOption::Ivf(option) => Box::new(IvfIndex::new(metric, option.clone())),
        })
    }

    /// Recreate an index from a snapshot, resolving ids through `lookup`.
    ///
    /// Fails with `StorageCorrupt` if the snapshot does not match the
    /// options or references an id `lookup` cannot resolve.
    pub fn restore(
        &self,
        metric: DistanceMetric,
        snapshot: IndexSnapshot,
        lookup: &dyn Fn(RecordId) -> Option<Arc<VectorRecord>>,
    ) -> Result<Box<dyn VectorIndex>> {
        self.validate()?;
        match (self, snapshot) {
            (IndexOption::Flat, IndexSnapshot::Flat { ids }) => {
                Ok(Box::new(FlatIndex::restore(metric, ids, lookup)?))
            }
            (IndexOption::Ivf(option), IndexSnapshot::Ivf { centroids, lists }) => Ok(Box::new(
                IvfIndex::restore(metric, option.clone(), centroids, lists, lookup)?,
            )),
            (option, snapshot) => Err(VdbError::storage_corrupt(format!(
                "index snapshot of kind {:?} does not match configured {:?}",
                snapshot.kind(),
                option.kind()
            ))),
        }
    }
}

/// Contract shared by all index families.
///
/// Mutation happens only under the owning table's write lock; searches run
/// concurrently under its read lock.
pub trait VectorIndex: Send + Sync + Debug {
    fn kind(&self) -> IndexKind;

    fn metric(&self) -> DistanceMetric;

    /// Replace the whole content with `records`.
    fn build(&mut self, records: Vec<Arc<VectorRecord>>) -> Result<()>;

    /// Incorporate one new record.
    fn add(&mut self, record: Arc<VectorRecord>) -> Result<()>;

    /// Remove an id. Returns false if it was not indexed.
    fn remove(&mut self, id: RecordId) -> bool;

    /// Candidate ids ordered by estimated distance, then id.
    ///
    /// At least `min(over_fetch, len)` candidates are returned; candidates
    /// tied with the last admitted estimate are all passed through.
    fn search(&self, query: &[f32], over_fetch: usize) -> Result<Vec<Candidate>>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Structure-only snapshot; vectors are resolved from the store on
    /// restore.
    fn snapshot(&self) -> IndexSnapshot;
}

/// Keep the best `n` candidates plus any candidates tied with the n-th
/// distance, sorted by rank.
pub(crate) fn select_top(mut candidates: Vec<Candidate>, n: usize) -> Vec<Candidate> {
    if n == 0 {
        return Vec::new();
    }
    if candidates.len() > n {
        candidates.select_nth_unstable_by(n - 1, Candidate::cmp_rank);
        let boundary = candidates[n - 1].distance;
        let tail = candidates.split_off(n);
        candidates.extend(tail.into_iter().filter(|c| c.distance == boundary));
    }
    candidates.sort_by(Candidate::cmp_rank);
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cand(id: RecordId, distance: f32) -> Candidate {
        Candidate { id, distance }
    }

    #[test]
    fn test_select_top_orders_and_truncates() {
        let selected = select_top(
            vec![cand(3, 0.5), cand(1, 0.1), cand(2, 0.9), cand(0, 0.3)],
            2,
        );
        assert_eq!(selected, vec![cand(1, 0.1), cand(0, 0.3)]);
    }

    #[test]
    fn test_select_top_passes_ties_through() {
        let selected = select_top(
            vec![cand(4, 0.2), cand(1, 0.2), cand(2, 0.2), cand(0, 0.1)],
            2,
        );
        let ids: Vec<_> = selected.iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![0, 1, 2, 4]);
    }

    #[test]
    fn test_select_top_edge_sizes() {
        assert!(select_top(vec![cand(0, 0.0)], 0).is_empty());
        assert_eq!(select_top(vec![cand(0, 0.0)], 5), vec![cand(0, 0.0)]);
    }

    #[test]
    fn test_restore_kind_mismatch() {
        let err = IndexOption::Flat
            .restore(
                DistanceMetric::Euclidean,
                IndexSnapshot::Ivf {
                    centroids: vec![],
                    lists: vec![],
                },
                &|_| None,
            )
            .unwrap_err();
        assert!(matches!(err, VdbError::StorageCorrupt(_)));
    }

    #[test]
    fn test_index_option_serde() {
        let json = serde_json::to_string(&IndexOption::Flat).unwrap();
        assert_eq!(json, r#"{"type":"flat"}"#);

        let ivf: IndexOption =
            serde_json::from_str(r#"{"type":"ivf","options":{"n_lists":8}}"#).unwrap();
        match ivf {
            IndexOption::Ivf(option) => {
                assert_eq!(option.n_lists, 8);
                assert_eq!(option.n_probe, IvfOption::default().n_probe);
            }
            other => panic!("unexpected option {other:?}"),
        }
    }
}
