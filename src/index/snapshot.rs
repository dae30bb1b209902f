//! Persisted index snapshots.
//!
//! A snapshot stores only the index structure (ids, centroids). It is
//! tagged with the log sequence it was taken at and is ignored whenever
//! that sequence no longer matches the log, in which case the index is
//! rebuilt from the record store.

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::index::IndexKind;
use crate::storage::Storage;
use crate::storage::retry::RetryPolicy;
use crate::vector::RecordId;

pub const SNAPSHOT_FILE: &str = "index.snap";

const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IndexSnapshot {
    Flat {
        ids: Vec<RecordId>,
    },
    Ivf {
        centroids: Vec<Vec<f32>>,
        lists: Vec<Vec<RecordId>>,
    },
}

impl IndexSnapshot {
    pub fn kind(&self) -> IndexKind {
        match self {
            IndexSnapshot::Flat { .. } => IndexKind::Flat,
            IndexSnapshot::Ivf { .. } => IndexKind::Ivf,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct SnapshotFile {
    version: u32,
    log_seq: u64,
    snapshot: IndexSnapshot,
}

/// Write the snapshot atomically.
pub fn save(
    storage: &dyn Storage,
    retry: RetryPolicy,
    log_seq: u64,
    snapshot: IndexSnapshot,
) -> Result<()> {
    let file = SnapshotFile {
        version: SNAPSHOT_VERSION,
        log_seq,
        snapshot,
    };
    let bytes = serde_json::to_vec(&file)?;
    retry.run(
        "write index snapshot",
        || storage.write_atomic(SNAPSHOT_FILE, &bytes),
        || Ok(()),
    )
}

/// Load the snapshot if it exists, decodes and was taken at `log_seq`.
///
/// Any other outcome yields `None`; the caller rebuilds the index.
pub fn load(storage: &dyn Storage, log_seq: u64) -> Option<IndexSnapshot> {
    if !storage.file_exists(SNAPSHOT_FILE) {
        return None;
    }
    let bytes = match storage.read_all(SNAPSHOT_FILE) {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!("failed to read index snapshot: {e}");
            return None;
        }
    };
    let file: SnapshotFile = match serde_json::from_slice(&bytes) {
        Ok(file) => file,
        Err(e) => {
            warn!("ignoring undecodable index snapshot: {e}");
            return None;
        }
    };
    if file.version != SNAPSHOT_VERSION {
        info!(
            "ignoring index snapshot with version {} (expected {SNAPSHOT_VERSION})",
            file.version
        );
        return None;
    }
    if file.log_seq != log_seq {
        info!(
            "index snapshot is stale (snapshot seq {}, log seq {log_seq})",
            file.log_seq
        );
        return None;
    }
    Some(file.snapshot)
}
