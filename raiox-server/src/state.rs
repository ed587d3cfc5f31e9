//! Application state module
//!
//! Defines shared state accessible across all request handlers.

use std::sync::Arc;

use crate::blob::BlobStore;
use crate::embedding::EmbeddingService;
use crate::fetch::ImageFetcher;
use crate::pipeline::IngestionPipeline;
use crate::store::IngestStore;

/// Application state containing shared resources.
#[derive(Clone)]
pub struct AppState {
    /// Catalog, submissions and results
    pub store: Arc<dyn IngestStore>,
    /// Embedding backend, initialized once at startup
    pub embedder: EmbeddingService,
    /// Embed → store → rank → record
    pub pipeline: IngestionPipeline,
    /// Destination for raw uploads
    pub blobs: Arc<dyn BlobStore>,
    /// Downloads webhook images
    pub fetcher: Arc<dyn ImageFetcher>,
    /// Maximum accepted image size in bytes
    pub max_file_size: usize,
}

impl AppState {
    pub fn new(
        store: Arc<dyn IngestStore>,
        embedder: EmbeddingService,
        blobs: Arc<dyn BlobStore>,
        fetcher: Arc<dyn ImageFetcher>,
        result_limit: usize,
        max_file_size: usize,
    ) -> Self {
        let pipeline = IngestionPipeline::new(embedder.clone(), store.clone(), result_limit);
        Self {
            store,
            embedder,
            pipeline,
            blobs,
            fetcher,
            max_file_size,
        }
    }
}
