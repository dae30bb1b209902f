//! Inverted file index.
//!
//! Records are partitioned into posting lists around k-means centroids and a
//! query only scores the lists whose centroids are nearest. Until enough
//! records exist to train `n_lists` centroids, the index keeps a single list
//! and answers exactly.

use std::collections::HashMap;
use std::sync::Arc;

use log::debug;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{Result, VdbError};
use crate::index::flat::score_all;
use crate::index::snapshot::IndexSnapshot;
use crate::index::{Candidate, IndexKind, VectorIndex, select_top};
use crate::vector::{DistanceMetric, RecordId, VectorRecord};

/// Records needed per list before the index trains itself.
pub const TRAIN_FACTOR: usize = 4;

/// Options for an IVF index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IvfOption {
    #[serde(default = "default_n_lists")]
    pub n_lists: usize,
    #[serde(default = "default_n_probe")]
    pub n_probe: usize,
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
    #[serde(default = "default_seed")]
    pub seed: u64,
}

fn default_n_lists() -> usize {
    16
}

fn default_n_probe() -> usize {
    2
}

fn default_max_iterations() -> usize {
    10
}

fn default_seed() -> u64 {
    42
}

impl Default for IvfOption {
    fn default() -> Self {
        Self {
            n_lists: default_n_lists(),
            n_probe: default_n_probe(),
            max_iterations: default_max_iterations(),
            seed: default_seed(),
        }
    }
}

impl IvfOption {
    pub fn validate(&self) -> Result<()> {
        if self.n_lists == 0 {
            return Err(VdbError::invalid_argument("n_lists must be at least 1"));
        }
        if self.n_probe == 0 {
            return Err(VdbError::invalid_argument("n_probe must be at least 1"));
        }
        Ok(())
    }

    /// Number of records at which training kicks in.
    pub fn train_threshold(&self) -> usize {
        self.n_lists.saturating_mul(TRAIN_FACTOR)
    }
}

#[derive(Debug)]
pub struct IvfIndex {
    metric: DistanceMetric,
    option: IvfOption,
    /// Empty while untrained.
    centroids: Vec<Vec<f32>>,
    lists: Vec<Vec<Arc<VectorRecord>>>,
    assignments: HashMap<RecordId, usize>,
}

impl IvfIndex {
    pub fn new(metric: DistanceMetric, option: IvfOption) -> Self {
        Self {
            metric,
            option,
            centroids: Vec::new(),
            lists: vec![Vec::new()],
            assignments: HashMap::new(),
        }
    }

    pub(crate) fn restore(
        metric: DistanceMetric,
        option: IvfOption,
        centroids: Vec<Vec<f32>>,
        lists: Vec<Vec<RecordId>>,
        lookup: &dyn Fn(RecordId) -> Option<Arc<VectorRecord>>,
    ) -> Result<Self> {
        let expected_lists = centroids.len().max(1);
        if lists.len() != expected_lists {
            return Err(VdbError::storage_corrupt(format!(
                "ivf snapshot has {} lists for {} centroids",
                lists.len(),
                centroids.len()
            )));
        }

        let mut index = Self::new(metric, option);
        index.centroids = centroids;
        index.lists = Vec::with_capacity(lists.len());
        for (list_no, ids) in lists.into_iter().enumerate() {
            let mut list = Vec::with_capacity(ids.len());
            for id in ids {
                let record = lookup(id).ok_or_else(|| {
                    VdbError::storage_corrupt(format!("index snapshot references unknown id {id}"))
                })?;
                index.assignments.insert(id, list_no);
                list.push(record);
            }
            index.lists.push(list);
        }

        let dimension = index
            .lists
            .iter()
            .flatten()
            .next()
            .map(|r| r.vector.len())
            .or_else(|| index.centroids.first().map(Vec::len));
        if let Some(dimension) = dimension {
            if let Some(bad) = index.centroids.iter().find(|c| c.len() != dimension) {
                return Err(VdbError::storage_corrupt(format!(
                    "ivf snapshot has a centroid of dimension {} for vectors of dimension {dimension}",
                    bad.len()
                )));
            }
        }
        Ok(index)
    }

    pub fn is_trained(&self) -> bool {
        !self.centroids.is_empty()
    }

    fn nearest_list(&self, vector: &[f32]) -> usize {
        nearest_centroid(self.metric, &self.centroids, vector)
    }

    /// Re-partition every indexed record around freshly trained centroids.
    fn train(&mut self) {
        let mut records: Vec<Arc<VectorRecord>> = self.lists.drain(..).flatten().collect();
        records.sort_by_key(|r| r.id);
        self.assignments.clear();

        if records.len() < self.option.n_lists {
            self.centroids.clear();
            self.lists = vec![Vec::new()];
            for record in records {
                self.assignments.insert(record.id, 0);
                self.lists[0].push(record);
            }
            return;
        }

        self.centroids = kmeans(
            self.metric,
            &records,
            self.option.n_lists,
            self.option.max_iterations,
            self.option.seed,
        );
        let assignment: Vec<usize> = records
            .par_iter()
            .map(|r| nearest_centroid(self.metric, &self.centroids, &r.vector))
            .collect();

        self.lists = vec![Vec::new(); self.centroids.len()];
        for (record, list_no) in records.into_iter().zip(assignment) {
            self.assignments.insert(record.id, list_no);
            self.lists[list_no].push(record);
        }
        debug!(
            "trained ivf index: {} lists over {} records",
            self.lists.len(),
            self.assignments.len()
        );
    }
}

impl VectorIndex for IvfIndex {
    fn kind(&self) -> IndexKind {
        IndexKind::Ivf
    }

    fn metric(&self) -> DistanceMetric {
        self.metric
    }

    fn build(&mut self, records: Vec<Arc<VectorRecord>>) -> Result<()> {
        self.centroids.clear();
        self.assignments.clear();
        self.lists = vec![Vec::new()];
        for record in records {
            self.assignments.insert(record.id, 0);
            self.lists[0].push(record);
        }
        if self.assignments.len() >= self.option.train_threshold() {
            self.train();
        }
        Ok(())
    }

    fn add(&mut self, record: Arc<VectorRecord>) -> Result<()> {
        self.remove(record.id);
        let list_no = if self.is_trained() {
            self.nearest_list(&record.vector)
        } else {
            0
        };
        self.assignments.insert(record.id, list_no);
        self.lists[list_no].push(record);

        if !self.is_trained() && self.assignments.len() >= self.option.train_threshold() {
            self.train();
        }
        Ok(())
    }

    fn remove(&mut self, id: RecordId) -> bool {
        let Some(list_no) = self.assignments.remove(&id) else {
            return false;
        };
        let list = &mut self.lists[list_no];
        if let Some(pos) = list.iter().position(|r| r.id == id) {
            list.swap_remove(pos);
        }
        true
    }

    fn search(&self, query: &[f32], over_fetch: usize) -> Result<Vec<Candidate>> {
        if !self.is_trained() {
            return Ok(select_top(
                score_all(self.metric, query, &self.lists[0]),
                over_fetch,
            ));
        }

        let mut order: Vec<Candidate> = self
            .centroids
            .iter()
            .enumerate()
            .map(|(list_no, centroid)| Candidate {
                id: list_no as RecordId,
                distance: self.metric.distance_unchecked(query, centroid),
            })
            .collect();
        order.sort_by(Candidate::cmp_rank);

        // Probe beyond n_probe while the probed lists cannot fill over_fetch.
        let mut candidates = Vec::new();
        for (probed, list) in order.iter().enumerate() {
            if probed >= self.option.n_probe && candidates.len() >= over_fetch {
                break;
            }
            candidates.extend(score_all(
                self.metric,
                query,
                &self.lists[list.id as usize],
            ));
        }
        Ok(select_top(candidates, over_fetch))
    }

    fn len(&self) -> usize {
        self.assignments.len()
    }

    fn snapshot(&self) -> IndexSnapshot {
        let lists = self
            .lists
            .iter()
            .map(|list| {
                let mut ids: Vec<RecordId> = list.iter().map(|r| r.id).collect();
                ids.sort_unstable();
                ids
            })
            .collect();
        IndexSnapshot::Ivf {
            centroids: self.centroids.clone(),
            lists,
        }
    }
}

fn nearest_centroid(metric: DistanceMetric, centroids: &[Vec<f32>], vector: &[f32]) -> usize {
    let mut best = 0;
    let mut best_distance = f32::INFINITY;
    for (i, centroid) in centroids.iter().enumerate() {
        let d = metric.distance_unchecked(vector, centroid);
        if d < best_distance {
            best = i;
            best_distance = d;
        }
    }
    best
}

/// Lloyd's k-means with seeded initial centroids.
///
/// `records` must be non-empty and sorted by id so the result depends only
/// on the record set and `seed`.
fn kmeans(
    metric: DistanceMetric,
    records: &[Arc<VectorRecord>],
    k: usize,
    max_iterations: usize,
    seed: u64,
) -> Vec<Vec<f32>> {
    let k = k.min(records.len());
    let mut rng = StdRng::seed_from_u64(seed);
    let mut seeds: Vec<usize> = rand::seq::index::sample(&mut rng, records.len(), k)
        .into_iter()
        .collect();
    seeds.sort_unstable();
    let mut centroids: Vec<Vec<f32>> = seeds
        .into_iter()
        .map(|i| records[i].vector.clone())
        .collect();
    let dimension = records[0].vector.len();

    for _ in 0..max_iterations {
        let assignment: Vec<usize> = records
            .par_iter()
            .map(|r| nearest_centroid(metric, &centroids, &r.vector))
            .collect();

        let mut sums = vec![vec![0.0f32; dimension]; k];
        let mut counts = vec![0usize; k];
        for (record, &c) in records.iter().zip(&assignment) {
            counts[c] += 1;
            for (sum, x) in sums[c].iter_mut().zip(&record.vector) {
                *sum += x;
            }
        }

        let mut moved = false;
        for ((centroid, sum), count) in centroids.iter_mut().zip(sums).zip(counts) {
            // An empty cluster keeps its previous centroid.
            if count == 0 {
                continue;
            }
            let mean: Vec<f32> = sum.into_iter().map(|s| s / count as f32).collect();
            if mean != *centroid {
                *centroid = mean;
                moved = true;
            }
        }
        if !moved {
            break;
        }
    }
    centroids
}
