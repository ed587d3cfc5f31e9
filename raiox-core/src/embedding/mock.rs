//! Mock embedder for testing.

use sha3::{Digest, Sha3_256};

use super::{Embedding, ImageEmbedder, EMBEDDING_DIM};
use crate::error::{RaioxError, Result};

/// Mock embedder for testing.
/// WARNING: Do not use in production - vectors carry no visual meaning!
///
/// Identical input bytes always map to the same embedding; different bytes
/// map to effectively unrelated directions. Empty input is treated as an
/// undecodable image.
pub struct MockEmbedder {
    seed: u64,
    fixed: Option<Embedding>,
}

impl MockEmbedder {
    pub fn new(seed: u64) -> Self {
        Self { seed, fixed: None }
    }

    /// An embedder that returns `embedding` for every non-empty input.
    pub fn fixed(embedding: Embedding) -> Self {
        Self {
            seed: 0,
            fixed: Some(embedding),
        }
    }

    fn derive(&self, image_bytes: &[u8]) -> Result<Embedding> {
        let mut features = Vec::with_capacity(EMBEDDING_DIM);
        let mut block: u32 = 0;

        while features.len() < EMBEDDING_DIM {
            let mut hasher = Sha3_256::new();
            hasher.update(self.seed.to_le_bytes());
            hasher.update(block.to_le_bytes());
            hasher.update(image_bytes);
            let digest = hasher.finalize();

            for pair in digest.chunks_exact(2) {
                if features.len() == EMBEDDING_DIM {
                    break;
                }
                let raw = u16::from_le_bytes([pair[0], pair[1]]);
                features.push(f32::from(raw) / 32767.5 - 1.0);
            }
            block += 1;
        }

        Embedding::from_features(features)
    }
}

impl Default for MockEmbedder {
    fn default() -> Self {
        Self::new(0x5EED_CAFE)
    }
}

impl ImageEmbedder for MockEmbedder {
    fn embed(&self, image_bytes: &[u8]) -> Result<Embedding> {
        if image_bytes.is_empty() {
            return Err(RaioxError::DecodeError("empty image payload".into()));
        }

        match &self.fixed {
            Some(embedding) => Ok(embedding.clone()),
            None => self.derive(image_bytes),
        }
    }

    fn model_id(&self) -> &str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::test_support::axis;

    #[test]
    fn test_mock_embedder_deterministic() {
        let a = MockEmbedder::new(42).embed(b"xray").unwrap();
        let b = MockEmbedder::new(42).embed(b"xray").unwrap();
        assert_eq!(a, b, "Same seed and bytes should produce same embedding");
    }

    #[test]
    fn test_mock_embedder_different_inputs() {
        let embedder = MockEmbedder::default();
        let a = embedder.embed(b"first").unwrap();
        let b = embedder.embed(b"second").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_mock_embedder_unit_norm() {
        let embedding = MockEmbedder::default().embed(b"payload").unwrap();
        assert_eq!(embedding.len(), EMBEDDING_DIM);
        assert!((embedding.norm() - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_mock_embedder_rejects_empty() {
        let err = MockEmbedder::default().embed(b"").unwrap_err();
        assert!(matches!(err, RaioxError::DecodeError(_)));
    }

    #[test]
    fn test_fixed_embedder() {
        let target = axis(5, 1.0);
        let embedder = MockEmbedder::fixed(target.clone());
        assert_eq!(embedder.embed(b"anything").unwrap(), target);
    }
}
