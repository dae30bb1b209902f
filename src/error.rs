//! Error types for vdb.
//!
//! Every fallible operation inside the library returns [`Result`]. At the
//! query boundary the error is folded into a [`ResponseCode`] so callers of
//! [`Engine::knn`](crate::Engine::knn) never see a Rust error at all.

use std::io;

use thiserror::Error;

use crate::engine::response::ResponseCode;

/// The main error type for vdb operations.
#[derive(Error, Debug)]
pub enum VdbError {
    /// The named table does not exist.
    #[error("table not found: {0}")]
    TableNotFound(String),

    /// A vector does not have the dimension of its table.
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Bad caller input (limit, table name, non-finite component, ...).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A record or storage root that was asked for is absent.
    #[error("not found: {0}")]
    NotFound(String),

    /// I/O kept failing after the retry policy was exhausted, or the engine
    /// was already closed.
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    /// Persisted data failed verification.
    #[error("storage corrupt: {0}")]
    StorageCorrupt(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("config error: {0}")]
    Config(String),

    /// Failure reported by the external graph service.
    #[error("graph service error: {0}")]
    Graph(String),
}

impl VdbError {
    pub fn table_not_found<S: Into<String>>(name: S) -> Self {
        VdbError::TableNotFound(name.into())
    }

    pub fn dimension_mismatch(expected: usize, actual: usize) -> Self {
        VdbError::DimensionMismatch { expected, actual }
    }

    pub fn invalid_argument<S: Into<String>>(msg: S) -> Self {
        VdbError::InvalidArgument(msg.into())
    }

    pub fn not_found<S: Into<String>>(msg: S) -> Self {
        VdbError::NotFound(msg.into())
    }

    pub fn storage_unavailable<S: Into<String>>(msg: S) -> Self {
        VdbError::StorageUnavailable(msg.into())
    }

    pub fn storage_corrupt<S: Into<String>>(msg: S) -> Self {
        VdbError::StorageCorrupt(msg.into())
    }

    pub fn config<S: Into<String>>(msg: S) -> Self {
        VdbError::Config(msg.into())
    }

    pub fn graph<S: Into<String>>(msg: S) -> Self {
        VdbError::Graph(msg.into())
    }

    /// Map this error onto the response code reported across the engine
    /// boundary.
    pub fn code(&self) -> ResponseCode {
        match self {
            VdbError::TableNotFound(_) => ResponseCode::TableNotFound,
            VdbError::DimensionMismatch { .. } => ResponseCode::DimensionMismatch,
            VdbError::InvalidArgument(_)
            | VdbError::NotFound(_)
            | VdbError::Config(_)
            | VdbError::Graph(_) => ResponseCode::InvalidArgument,
            VdbError::StorageUnavailable(_) | VdbError::Io(_) => {
                ResponseCode::StorageUnavailable
            }
            VdbError::StorageCorrupt(_) | VdbError::Json(_) => ResponseCode::StorageCorrupt,
        }
    }
}

/// Result type alias for vdb operations.
pub type Result<T> = std::result::Result<T, VdbError>;
