//! Subcommand implementations.

use std::path::Path;

use anyhow::{Context, Result};
use raiox_core::{Embedding, ImageEmbedder};
use tracing::{debug, info};

pub mod compare;
pub mod embed;
pub mod rank;

/// Read an input file.
pub fn read_input(path: &Path) -> Result<Vec<u8>> {
    let bytes =
        std::fs::read(path).with_context(|| format!("Failed to read file: {}", path.display()))?;
    info!(path = %path.display(), bytes = bytes.len(), "Read file");
    Ok(bytes)
}

/// Embed already-read image bytes, naming the file on failure.
pub fn embed_bytes(embedder: &dyn ImageEmbedder, path: &Path, bytes: &[u8]) -> Result<Embedding> {
    let embedding = embedder
        .embed(bytes)
        .with_context(|| format!("Failed to embed {}", path.display()))?;
    debug!(path = %path.display(), model = embedder.model_id(), "Embedded image");
    Ok(embedding)
}

/// Read and embed an image file.
pub fn embed_file(embedder: &dyn ImageEmbedder, path: &Path) -> Result<Embedding> {
    let bytes = read_input(path)?;
    embed_bytes(embedder, path, &bytes)
}
