//! Raiox Core - Image embeddings and similarity ranking for implant identification
//!
//! This crate turns X-ray images into fixed-length embeddings and ranks a
//! catalog of reference implants by cosine similarity to them.
//!
//! # Features
//!
//! - L2-normalized 512-dimensional embeddings with enforced invariants
//! - Pluggable embedding backends behind the [`ImageEmbedder`] trait
//! - [`VectorStore`] contract with an exact, deterministic cosine scan
//! - Similarity ranking with percentage scores
//!
//! # Example
//!
//! ```no_run
//! use raiox_core::{EmbedderConfig, EmbedderFactory};
//!
//! # fn example() -> raiox_core::Result<()> {
//! let embedder = EmbedderFactory::create(EmbedderConfig::default())?;
//!
//! let a = embedder.embed(&std::fs::read("query.png").unwrap())?;
//! let b = embedder.embed(&std::fs::read("reference.png").unwrap())?;
//!
//! let distance = a.cosine_distance(&b);
//! println!("similarity: {:.1}%", raiox_core::similarity_percent(distance));
//! # Ok(())
//! # }
//! ```

pub mod embedding;
pub mod error;
pub mod ranking;
pub mod store;

// Re-export main types for convenience
pub use embedding::{
    EmbedderConfig, EmbedderFactory, Embedding, ImageEmbedder, MockEmbedder, EMBEDDING_DIM,
};
#[cfg(feature = "raster")]
pub use embedding::RasterEmbedder;
pub use error::{RaioxError, Result};
pub use ranking::{rank, similarity_percent, RankedImplant, DEFAULT_RESULT_LIMIT};
pub use store::{nearest, ImplantSummary, Neighbor, VectorKey, VectorStore};
