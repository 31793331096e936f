//! Embedding value type.

use serde::{Deserialize, Serialize};

use crate::error::{LuminaError, Result};
use crate::vector::core::similarity::{dot_product, l2_norm};

/// Opaque caller-assigned identifier of a gallery image.
pub type ImageId = i64;

/// Dimension of the embeddings produced by the visual feature extractor.
pub const EMBEDDING_DIMENSION: usize = 768;

/// A fixed-length image embedding.
///
/// Embeddings are immutable once created. Those produced by
/// [`Embedding::normalized`] have unit L2 norm, or are the zero vector when
/// the raw features were all zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding {
    data: Vec<f32>,
}

impl Embedding {
    /// Wrap raw values without normalizing them.
    pub fn new(data: Vec<f32>) -> Self {
        Self { data }
    }

    /// L2-normalize `raw`. A zero-norm input is returned unchanged.
    pub fn normalized(mut raw: Vec<f32>) -> Self {
        let norm = l2_norm(&raw);
        if norm > 0.0 {
            for value in &mut raw {
                *value /= norm;
            }
        }
        Self { data: raw }
    }

    /// Component-wise arithmetic mean of `embeddings`.
    ///
    /// The result is not normalized; see [`Embedding::mean_direction`].
    pub fn mean(embeddings: &[Embedding]) -> Result<Embedding> {
        let first = embeddings
            .first()
            .ok_or_else(|| LuminaError::invalid_argument("cannot average zero embeddings"))?;

        let dimension = first.dimension();
        let mut sum = vec![0.0f64; dimension];
        for embedding in embeddings {
            if embedding.dimension() != dimension {
                return Err(LuminaError::dimension_mismatch(
                    dimension,
                    embedding.dimension(),
                ));
            }
            for (acc, value) in sum.iter_mut().zip(&embedding.data) {
                *acc += f64::from(*value);
            }
        }

        let count = embeddings.len() as f64;
        Ok(Self::new(
            sum.into_iter().map(|v| (v / count) as f32).collect(),
        ))
    }

    /// Mean of `embeddings`, L2-normalized with the zero-norm fallback.
    pub fn mean_direction(embeddings: &[Embedding]) -> Result<Embedding> {
        Ok(Self::normalized(Self::mean(embeddings)?.into_vec()))
    }

    /// The embedding values.
    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    /// Consume the embedding and return its values.
    pub fn into_vec(self) -> Vec<f32> {
        self.data
    }

    /// Get the dimensionality of this embedding.
    pub fn dimension(&self) -> usize {
        self.data.len()
    }

    /// Calculate the L2 norm (magnitude) of this embedding.
    pub fn norm(&self) -> f32 {
        l2_norm(&self.data)
    }

    /// Whether every component is exactly zero.
    pub fn is_zero(&self) -> bool {
        self.data.iter().all(|v| *v == 0.0)
    }

    /// Check that no component is NaN or infinite.
    pub fn is_finite(&self) -> bool {
        self.data.iter().all(|v| v.is_finite())
    }

    /// Inner product with another embedding of the same dimension.
    pub fn dot(&self, other: &Embedding) -> Result<f32> {
        if self.dimension() != other.dimension() {
            return Err(LuminaError::dimension_mismatch(
                self.dimension(),
                other.dimension(),
            ));
        }
        Ok(dot_product(&self.data, &other.data))
    }

    /// Validate dimension and finiteness before the embedding enters an index.
    pub fn validate(&self, expected_dimension: usize) -> Result<()> {
        if self.dimension() != expected_dimension {
            return Err(LuminaError::dimension_mismatch(
                expected_dimension,
                self.dimension(),
            ));
        }
        if !self.is_finite() {
            return Err(LuminaError::InvalidVector(
                "embedding contains NaN or infinite values".to_string(),
            ));
        }
        Ok(())
    }
}
