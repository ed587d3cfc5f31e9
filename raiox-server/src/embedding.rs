//! Embedding model lifecycle.
//!
//! The backend is created once at startup and shared through application
//! state. Inference is CPU-bound, so each call runs on the blocking pool and
//! a semaphore caps how many run at once.

use std::sync::Arc;

use raiox_core::{EmbedderConfig, EmbedderFactory, Embedding, ImageEmbedder, RaioxError, Result};
use tokio::sync::Semaphore;

/// Shared handle to the embedding backend.
#[derive(Clone)]
pub struct EmbeddingService {
    embedder: Arc<dyn ImageEmbedder>,
    permits: Arc<Semaphore>,
    max_concurrency: usize,
}

impl EmbeddingService {
    /// Build the configured backend.
    pub fn initialize(config: EmbedderConfig, max_concurrency: usize) -> Result<Self> {
        let embedder = EmbedderFactory::create(config)?;
        Ok(Self::new(embedder, max_concurrency))
    }

    /// Wrap an existing backend. A concurrency of 0 is treated as 1.
    pub fn new(embedder: Arc<dyn ImageEmbedder>, max_concurrency: usize) -> Self {
        let max_concurrency = max_concurrency.max(1);
        tracing::info!(
            model = embedder.model_id(),
            max_concurrency,
            "Embedding service initialized"
        );
        Self {
            embedder,
            permits: Arc::new(Semaphore::new(max_concurrency)),
            max_concurrency,
        }
    }

    pub fn model_id(&self) -> &str {
        self.embedder.model_id()
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    /// Whether [`EmbeddingService::shutdown`] has been called.
    pub fn is_shut_down(&self) -> bool {
        self.permits.is_closed()
    }

    /// Embed `bytes`, waiting for a free inference slot.
    pub async fn embed(&self, bytes: Vec<u8>) -> Result<Embedding> {
        let _permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| RaioxError::ModelError("embedding service is shut down".into()))?;

        let embedder = self.embedder.clone();
        tokio::task::spawn_blocking(move || embedder.embed(&bytes))
            .await
            .map_err(|e| RaioxError::ModelError(format!("embedding task failed: {e}")))?
    }

    /// Stop accepting work. Calls already holding a slot finish normally.
    pub fn shutdown(&self) {
        self.permits.close();
        tracing::info!(model = self.embedder.model_id(), "Embedding service shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use raiox_core::MockEmbedder;

    #[tokio::test]
    async fn test_embed_runs_backend() {
        let service = EmbeddingService::new(Arc::new(MockEmbedder::default()), 2);
        let embedding = service.embed(b"xray".to_vec()).await.unwrap();
        assert_eq!(embedding.len(), raiox_core::EMBEDDING_DIM);
        assert_eq!(service.model_id(), "mock");
    }

    #[tokio::test]
    async fn test_backend_errors_pass_through() {
        let service = EmbeddingService::new(Arc::new(MockEmbedder::default()), 1);
        let err = service.embed(Vec::new()).await.unwrap_err();
        assert!(matches!(err, RaioxError::DecodeError(_)));
    }

    #[tokio::test]
    async fn test_shutdown_rejects_new_work() {
        let service = EmbeddingService::new(Arc::new(MockEmbedder::default()), 1);
        service.shutdown();
        assert!(service.is_shut_down());

        let err = service.embed(b"xray".to_vec()).await.unwrap_err();
        assert!(matches!(err, RaioxError::ModelError(_)));
    }

    #[tokio::test]
    async fn test_zero_concurrency_is_serialized() {
        let service = EmbeddingService::new(Arc::new(MockEmbedder::default()), 0);
        assert_eq!(service.max_concurrency(), 1);
        assert!(service.embed(b"a".to_vec()).await.is_ok());
    }

    #[tokio::test]
    async fn test_initialize_mock_backend() {
        let service = EmbeddingService::initialize(EmbedderConfig::Mock { seed: 7 }, 4).unwrap();
        assert_eq!(service.model_id(), "mock");
    }
}
