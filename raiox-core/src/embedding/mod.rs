//! Image embeddings.
//!
//! Every image that takes part in similarity search is reduced to an
//! [`Embedding`]: a fixed-length, L2-normalized `f32` vector. Because all
//! embeddings have unit norm, cosine similarity between two of them is a plain
//! inner product.
//!
//! ## Backends
//!
//! - **Raster** - grid descriptor computed with the `image` crate (default)
//! - **Mock** - deterministic vectors derived from the input bytes (testing only)
//!
//! ## Quick Start
//!
//! ```no_run
//! use raiox_core::embedding::{EmbedderConfig, EmbedderFactory};
//!
//! # fn example() -> raiox_core::Result<()> {
//! let embedder = EmbedderFactory::create(EmbedderConfig::default())?;
//! let bytes = std::fs::read("xray.png").unwrap();
//! let embedding = embedder.embed(&bytes)?;
//! assert_eq!(embedding.len(), raiox_core::EMBEDDING_DIM);
//! # Ok(())
//! # }
//! ```

mod mock;
#[cfg(feature = "raster")]
mod raster;

pub use mock::MockEmbedder;
#[cfg(feature = "raster")]
pub use raster::{RasterEmbedder, GRID_SIZE};

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{RaioxError, Result};

/// Number of components in every embedding.
pub const EMBEDDING_DIM: usize = 512;

/// Accepted deviation from unit norm for vectors that claim to be normalized.
pub const NORM_TOLERANCE: f64 = 1e-3;

/// A unit-norm vector of exactly [`EMBEDDING_DIM`] components.
///
/// The constructors are the only way to obtain one, so holding an `Embedding`
/// means both invariants have been checked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<f32>", into = "Vec<f32>")]
pub struct Embedding(Vec<f32>);

impl Embedding {
    /// Normalize raw features into an embedding.
    ///
    /// Fails with `DimensionMismatch` on a wrong length and with `ModelError`
    /// when the features are non-finite or have zero norm.
    pub fn from_features(mut features: Vec<f32>) -> Result<Self> {
        check_dimension(features.len())?;

        if features.iter().any(|v| !v.is_finite()) {
            return Err(RaioxError::ModelError(
                "feature vector contains non-finite values".into(),
            ));
        }

        let norm = l2_norm(&features);
        if norm == 0.0 {
            return Err(RaioxError::ModelError(
                "feature vector has zero norm".into(),
            ));
        }

        for v in features.iter_mut() {
            *v = (f64::from(*v) / norm) as f32;
        }

        Ok(Self(features))
    }

    /// Wrap a vector that is expected to already have unit norm.
    pub fn from_unit(values: Vec<f32>) -> Result<Self> {
        check_dimension(values.len())?;

        let norm = l2_norm(&values);
        if !norm.is_finite() || (norm - 1.0).abs() > NORM_TOLERANCE {
            return Err(RaioxError::InvalidArgument(format!(
                "vector is not normalized (norm = {norm:.6})"
            )));
        }

        Ok(Self(values))
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    pub fn into_vec(self) -> Vec<f32> {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Euclidean norm, 1.0 up to floating-point error.
    pub fn norm(&self) -> f64 {
        l2_norm(&self.0)
    }

    /// Inner product, accumulated in `f64`.
    pub fn dot(&self, other: &Self) -> f64 {
        self.0
            .iter()
            .zip(other.0.iter())
            .map(|(a, b)| f64::from(*a) * f64::from(*b))
            .sum()
    }

    /// Cosine distance: 0 for identical direction, 1 for orthogonal, 2 for opposite.
    pub fn cosine_distance(&self, other: &Self) -> f64 {
        1.0 - self.dot(other)
    }
}

impl TryFrom<Vec<f32>> for Embedding {
    type Error = RaioxError;

    fn try_from(values: Vec<f32>) -> Result<Self> {
        Self::from_features(values)
    }
}

impl From<Embedding> for Vec<f32> {
    fn from(embedding: Embedding) -> Self {
        embedding.0
    }
}

fn check_dimension(actual: usize) -> Result<()> {
    if actual != EMBEDDING_DIM {
        return Err(RaioxError::DimensionMismatch {
            expected: EMBEDDING_DIM,
            actual,
        });
    }
    Ok(())
}

fn l2_norm(values: &[f32]) -> f64 {
    values
        .iter()
        .map(|v| f64::from(*v) * f64::from(*v))
        .sum::<f64>()
        .sqrt()
}

/// Maps encoded image bytes to an [`Embedding`].
///
/// Implementations hold only read-only model state and must be safe to call
/// from several threads at once. Inference is CPU-bound and synchronous;
/// async callers should run it on a blocking thread.
pub trait ImageEmbedder: Send + Sync {
    /// Compute the embedding of an encoded image (JPEG, PNG, GIF or WebP).
    ///
    /// Returns `DecodeError` if the bytes are not a valid raster image and
    /// `ModelError` if feature extraction fails.
    fn embed(&self, image_bytes: &[u8]) -> Result<Embedding>;

    /// Identifier of the model, recorded in logs.
    fn model_id(&self) -> &str;
}

/// Configuration for creating embedding backends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EmbedderConfig {
    /// Grid descriptor over decoded pixels
    #[cfg(feature = "raster")]
    Raster,

    /// Deterministic vectors from the input bytes (testing only)
    Mock { seed: u64 },
}

impl Default for EmbedderConfig {
    #[cfg(feature = "raster")]
    fn default() -> Self {
        Self::Raster
    }

    #[cfg(not(feature = "raster"))]
    fn default() -> Self {
        Self::Mock { seed: 0 }
    }
}

impl EmbedderConfig {
    /// Parse a backend name as given in configuration (`raster` or `mock`).
    pub fn from_name(name: &str) -> Result<Self> {
        match name.trim().to_lowercase().as_str() {
            #[cfg(feature = "raster")]
            "raster" => Ok(Self::Raster),
            "mock" => Ok(Self::Mock { seed: 0 }),
            other => Err(RaioxError::InvalidArgument(format!(
                "unknown embedding backend '{other}'"
            ))),
        }
    }
}

/// Factory for embedding backends.
pub struct EmbedderFactory;

impl EmbedderFactory {
    /// Create an embedder from configuration.
    pub fn create(config: EmbedderConfig) -> Result<Arc<dyn ImageEmbedder>> {
        match config {
            #[cfg(feature = "raster")]
            EmbedderConfig::Raster => Ok(Arc::new(RasterEmbedder::new())),
            EmbedderConfig::Mock { seed } => {
                tracing::warn!("Using mock embedder - similarity scores are meaningless");
                Ok(Arc::new(MockEmbedder::new(seed)))
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// Unit vector along `axis`, optionally negated.
    pub fn axis(axis: usize, sign: f32) -> Embedding {
        let mut v = vec![0.0; EMBEDDING_DIM];
        v[axis] = sign;
        Embedding::from_unit(v).unwrap()
    }
}
