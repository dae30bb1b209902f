//! Text embedding seam.
//!
//! The engine never owns a model. Callers construct an [`Embedder`] and pass
//! it to [`Engine::knn_text`](crate::Engine::knn_text) explicitly.

use std::collections::HashMap;
use std::fmt::Debug;

use crate::error::{Result, VdbError};

/// Turns text into a vector.
pub trait Embedder: Send + Sync + Debug {
    fn name(&self) -> &str;

    /// Dimension of every vector this embedder produces.
    fn dimension(&self) -> usize;

    fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// Embedder backed by a fixed text-to-vector table.
#[derive(Debug, Clone)]
pub struct PrecomputedEmbedder {
    dimension: usize,
    vectors: HashMap<String, Vec<f32>>,
}

impl PrecomputedEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            vectors: HashMap::new(),
        }
    }

    pub fn insert(&mut self, text: impl Into<String>, vector: Vec<f32>) -> Result<()> {
        if vector.len() != self.dimension {
            return Err(VdbError::dimension_mismatch(self.dimension, vector.len()));
        }
        self.vectors.insert(text.into(), vector);
        Ok(())
    }

    pub fn with(mut self, text: impl Into<String>, vector: Vec<f32>) -> Result<Self> {
        self.insert(text, vector)?;
        Ok(self)
    }
}

impl Embedder for PrecomputedEmbedder {
    fn name(&self) -> &str {
        "precomputed"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.vectors
            .get(text)
            .cloned()
            .ok_or_else(|| VdbError::invalid_argument(format!("no embedding for text '{text}'")))
    }
}
