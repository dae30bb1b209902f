//! The table catalog (`catalog.json`).
//!
//! The catalog is a convenience listing; each table's record log remains
//! authoritative for its metadata. Table directories that hold a log but
//! are missing from the catalog are adopted on open.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::error::{Result, VdbError};
use crate::storage::Storage;
use crate::storage::retry::RetryPolicy;
use crate::store::{LOG_FILE, TableMeta};

pub const CATALOG_FILE: &str = "catalog.json";
pub const TABLES_DIR: &str = "tables";

const CATALOG_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Catalog {
    pub version: u32,
    #[serde(default)]
    pub tables: Vec<TableMeta>,
}

impl Default for Catalog {
    fn default() -> Self {
        Self {
            version: CATALOG_VERSION,
            tables: Vec::new(),
        }
    }
}

impl Catalog {
    pub fn new(tables: Vec<TableMeta>) -> Self {
        Self {
            version: CATALOG_VERSION,
            tables,
        }
    }

    /// Load the catalog. A missing file is an empty catalog; an unreadable
    /// one is `StorageCorrupt`.
    pub fn load(storage: &dyn Storage) -> Result<Self> {
        if !storage.file_exists(CATALOG_FILE) {
            return Ok(Self::default());
        }
        let bytes = storage.read_all(CATALOG_FILE)?;
        let catalog: Catalog = serde_json::from_slice(&bytes)
            .map_err(|e| VdbError::storage_corrupt(format!("undecodable catalog: {e}")))?;
        if catalog.version != CATALOG_VERSION {
            return Err(VdbError::storage_corrupt(format!(
                "unsupported catalog version {}",
                catalog.version
            )));
        }
        Ok(catalog)
    }

    /// Atomically replace the catalog file, retrying transient failures.
    pub fn save(&self, storage: &dyn Storage, retry: RetryPolicy) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(self)?;
        retry.run(
            "write catalog",
            || storage.write_atomic(CATALOG_FILE, &bytes),
            || Ok(()),
        )
    }
}

/// Storage prefix of a table's directory.
pub fn table_dir(name: &str) -> String {
    format!("{TABLES_DIR}/{name}")
}

/// Names of the table directories that contain a record log.
pub fn discover_tables(storage: &dyn Storage) -> Result<BTreeSet<String>> {
    let suffix = format!("/{LOG_FILE}");
    Ok(storage
        .list_files()?
        .into_iter()
        .filter_map(|path| {
            let rest = path.strip_prefix(TABLES_DIR)?.strip_prefix('/')?;
            let name = rest.strip_suffix(&suffix)?;
            (!name.contains('/')).then(|| name.to_string())
        })
        .collect())
}
