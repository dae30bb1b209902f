//! # vdb
//!
//! An embedded vector database: named tables of vectors with optional
//! payloads, durable append-only storage and exact or approximate
//! k-nearest-neighbor queries.
//!
//! ## Features
//!
//! - Crash-recoverable record log with checksummed frames
//! - Flat (exact) and IVF (approximate) indexes
//! - Euclidean, cosine and inner-product metrics with SIMD kernels
//! - Pluggable storage backends
//! - Optional client for an external graph service (`graph-client`)
//!
//! ```no_run
//! use vdb::{Engine, EngineConfig};
//!
//! let engine = Engine::open("./data", EngineConfig::default())?;
//! engine.insert("t", vec![1.0, 0.0, 0.0], Some(b"first".to_vec()))?;
//! let (code, results) = engine.knn("t", &[1.0, 0.0, 0.0], 2).into_parts();
//! assert_eq!(code, 0);
//! for result in &results {
//!     println!("{}", result.to_display_string());
//! }
//! # Ok::<(), vdb::VdbError>(())
//! ```

pub mod embedding;
pub mod engine;
mod error;
#[cfg(feature = "graph-client")]
pub mod graph;
pub mod index;
pub mod storage;
pub mod store;
pub mod vector;

// Re-exports for the public API
pub use embedding::{Embedder, PrecomputedEmbedder};
pub use engine::Engine;
pub use engine::config::{EngineConfig, EngineConfigBuilder};
pub use engine::response::{QueryResult, Response, ResponseCode};
pub use engine::table::{TableOptions, TableStats};
pub use error::{Result, VdbError};
pub use index::ivf::IvfOption;
pub use index::{IndexKind, IndexOption};
pub use storage::retry::RetryPolicy;
pub use storage::{Storage, StorageConfig, StorageFactory};
pub use store::TableMeta;
pub use vector::{DistanceMetric, RecordId, VectorRecord};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
