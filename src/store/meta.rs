use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, VdbError};
use crate::index::IndexOption;
use crate::vector::DistanceMetric;

/// Metadata of a table.
///
/// `metric`, `index` and `normalize` are fixed at creation. `dimension` is
/// fixed either at creation or by the first insert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableMeta {
    pub name: String,
    #[serde(default)]
    pub dimension: Option<usize>,
    #[serde(default)]
    pub metric: DistanceMetric,
    #[serde(default)]
    pub index: IndexOption,
    #[serde(default)]
    pub normalize: bool,
    pub created_at: DateTime<Utc>,
}

impl TableMeta {
    pub fn new(name: impl Into<String>, metric: DistanceMetric, index: IndexOption) -> Self {
        Self {
            name: name.into(),
            dimension: None,
            metric,
            index,
            normalize: false,
            created_at: Utc::now(),
        }
    }
}

/// Table names are non-empty, made of `[A-Za-z0-9_.-]` and do not start
/// with a dot.
pub fn validate_table_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(VdbError::invalid_argument("table name must not be empty"));
    }
    if name.starts_with('.') {
        return Err(VdbError::invalid_argument(format!(
            "table name '{name}' must not start with '.'"
        )));
    }
    if let Some(c) = name
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.')))
    {
        return Err(VdbError::invalid_argument(format!(
            "table name '{name}' contains invalid character '{c}'"
        )));
    }
    Ok(())
}
