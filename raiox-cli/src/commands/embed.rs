//! Embed command implementation.

use std::path::PathBuf;

use anyhow::{Context, Result};
use colored::Colorize;
use raiox_core::ImageEmbedder;
use sha3::{Digest, Sha3_256};

use super::{embed_bytes, read_input};
use crate::OutputFormat;

/// Components shown in the summary view.
const PREVIEW_COMPONENTS: usize = 8;

/// Execute the embed command.
pub fn execute(
    embedder: &dyn ImageEmbedder,
    file: PathBuf,
    format: OutputFormat,
    quiet: bool,
) -> Result<()> {
    let bytes = read_input(&file)?;
    let file_hash = hex::encode(Sha3_256::digest(&bytes));
    let embedding = embed_bytes(embedder, &file, &bytes)?;

    match format {
        OutputFormat::Json => {
            let report = serde_json::json!({
                "file": file.display().to_string(),
                "model": embedder.model_id(),
                "sha3_256": file_hash,
                "dimension": embedding.len(),
                "norm": embedding.norm(),
                "vector": embedding.as_slice(),
            });
            let json = serde_json::to_string_pretty(&report)
                .context("Failed to serialize embedding to JSON")?;
            println!("{json}");
        }
        OutputFormat::Summary if !quiet => {
            let preview: Vec<String> = embedding
                .as_slice()
                .iter()
                .take(PREVIEW_COMPONENTS)
                .map(|v| format!("{v:+.4}"))
                .collect();

            println!();
            println!("{}", "Embedding computed".green().bold());
            println!();
            println!("   {} {}", "File:".dimmed(), file.display());
            println!("   {} {}", "SHA3-256:".dimmed(), file_hash);
            println!("   {} {}", "Model:".dimmed(), embedder.model_id());
            println!("   {} {}", "Dimension:".dimmed(), embedding.len());
            println!("   {} {:.6}", "Norm:".dimmed(), embedding.norm());
            println!("   {} [{} ...]", "Vector:".dimmed(), preview.join(", "));
        }
        OutputFormat::Summary => {}
    }

    Ok(())
}
