use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, VdbError};
use crate::index::IndexOption;
use crate::storage::retry::RetryPolicy;
use crate::vector::DistanceMetric;

/// Configuration for an [`Engine`](crate::Engine).
///
/// Every field has a default, so a TOML file only needs the keys it
/// changes:
///
/// ```toml
/// oversampling = 8
/// default_metric = "cosine"
///
/// [default_index]
/// type = "ivf"
/// options = { n_lists = 32, n_probe = 4 }
///
/// [retry]
/// max_attempts = 5
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Create the root directory (and tables on first insert) when missing.
    #[serde(default = "default_true")]
    pub create_if_missing: bool,
    /// Metric for tables created implicitly or without an explicit metric.
    #[serde(default)]
    pub default_metric: DistanceMetric,
    /// Index for tables created implicitly or without an explicit index.
    #[serde(default)]
    pub default_index: IndexOption,
    /// Candidate over-fetch factor for approximate indexes.
    #[serde(default = "default_oversampling")]
    pub oversampling: usize,
    /// `fsync` on every durability barrier. Disable only for scratch data.
    #[serde(default = "default_true")]
    pub sync: bool,
    #[serde(default)]
    pub retry: RetryPolicy,
}

fn default_true() -> bool {
    true
}

fn default_oversampling() -> usize {
    4
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            create_if_missing: true,
            default_metric: DistanceMetric::default(),
            default_index: IndexOption::default(),
            oversampling: default_oversampling(),
            sync: true,
            retry: RetryPolicy::default(),
        }
    }
}

impl EngineConfig {
    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder::default()
    }

    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(s).map_err(|e| VdbError::config(format!("invalid config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| {
            VdbError::config(format!("failed to read config {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<()> {
        if self.oversampling == 0 {
            return Err(VdbError::config("oversampling must be at least 1"));
        }
        self.default_index
            .validate()
            .map_err(|e| VdbError::config(format!("default_index: {e}")))
    }
}

#[derive(Debug, Default)]
pub struct EngineConfigBuilder {
    config: EngineConfig,
}

impl EngineConfigBuilder {
    pub fn create_if_missing(mut self, create_if_missing: bool) -> Self {
        self.config.create_if_missing = create_if_missing;
        self
    }

    pub fn default_metric(mut self, metric: DistanceMetric) -> Self {
        self.config.default_metric = metric;
        self
    }

    pub fn default_index(mut self, index: IndexOption) -> Self {
        self.config.default_index = index;
        self
    }

    pub fn oversampling(mut self, oversampling: usize) -> Self {
        self.config.oversampling = oversampling;
        self
    }

    pub fn sync(mut self, sync: bool) -> Self {
        self.config.sync = sync;
        self
    }

    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.config.retry = retry;
        self
    }

    pub fn build(self) -> EngineConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::ivf::IvfOption;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert!(config.create_if_missing);
        assert_eq!(config.default_metric, DistanceMetric::Euclidean);
        assert_eq!(config.default_index, IndexOption::Flat);
        assert_eq!(config.oversampling, 4);
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.retry.initial_backoff_ms, 10);
        assert_eq!(config.retry.max_backoff_ms, 200);

        assert_eq!(EngineConfig::from_toml_str("").unwrap(), config);
    }

    #[test]
    fn test_from_toml() {
        let config = EngineConfig::from_toml_str(
            r#"
            create_if_missing = false
            oversampling = 8
            default_metric = "cosine"

            [default_index]
            type = "ivf"
            options = { n_lists = 32, n_probe = 4 }

            [retry]
            max_attempts = 5
            "#,
        )
        .unwrap();

        assert!(!config.create_if_missing);
        assert_eq!(config.oversampling, 8);
        assert_eq!(config.default_metric, DistanceMetric::Cosine);
        assert_eq!(
            config.default_index,
            IndexOption::Ivf(IvfOption {
                n_lists: 32,
                n_probe: 4,
                ..IvfOption::default()
            })
        );
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.initial_backoff_ms, 10);
    }

    #[test]
    fn test_invalid_config() {
        assert!(matches!(
            EngineConfig::from_toml_str("oversampling = 0"),
            Err(VdbError::Config(_))
        ));
        assert!(matches!(
            EngineConfig::from_toml_str("default_metric = \"manhattan\""),
            Err(VdbError::Config(_))
        ));
    }

    #[test]
    fn test_builder_and_file() {
        let config = EngineConfig::builder()
            .create_if_missing(false)
            .oversampling(2)
            .retry(RetryPolicy::none())
            .build();
        assert!(!config.create_if_missing);
        assert_eq!(config.oversampling, 2);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vdb.toml");
        std::fs::write(&path, "oversampling = 3\n").unwrap();
        assert_eq!(EngineConfig::from_toml_file(&path).unwrap().oversampling, 3);
        assert!(EngineConfig::from_toml_file(dir.path().join("missing.toml")).is_err());
    }
}
