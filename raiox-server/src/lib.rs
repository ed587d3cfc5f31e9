//! Raiox Server Library - REST API components for X-ray implant identification
//!
//! This library exposes the server components for use in integration tests.
//! The main binary uses these same components.

pub mod blob;
pub mod config;
pub mod embedding;
pub mod error;
pub mod fetch;
pub mod handlers;
pub mod multipart;
pub mod openapi;
pub mod pipeline;
pub mod routes;
pub mod state;
pub mod store;
pub mod validation;

pub use blob::{BlobError, BlobStore, HttpBlobStore, MemoryBlobStore};
pub use config::{Config, SpacesConfig};
pub use embedding::EmbeddingService;
pub use error::ApiError;
pub use fetch::{FetchConfig, FetchError, FetchedImage, HttpImageFetcher, ImageFetcher};
pub use openapi::ApiDoc;
pub use pipeline::{IngestRequest, IngestResponse, IngestStage, IngestionPipeline, RankedMatch};
pub use routes::{create_router, create_router_with_config};
pub use state::AppState;
pub use store::{IngestStore, IngestTransaction, MemoryStore, PostgresStore};
