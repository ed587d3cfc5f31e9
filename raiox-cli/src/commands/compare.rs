//! Compare command implementation.

use std::path::PathBuf;

use anyhow::{Context, Result};
use colored::Colorize;
use raiox_core::{similarity_percent, ImageEmbedder};
use tracing::info;

use super::embed_file;
use crate::OutputFormat;

/// Execute the compare command.
pub fn execute(
    embedder: &dyn ImageEmbedder,
    a: PathBuf,
    b: PathBuf,
    format: OutputFormat,
    quiet: bool,
) -> Result<()> {
    let first = embed_file(embedder, &a)?;
    let second = embed_file(embedder, &b)?;

    let distance = first.cosine_distance(&second);
    let similarity = similarity_percent(distance);
    info!(distance, similarity, "Compared images");

    match format {
        OutputFormat::Json => {
            let report = serde_json::json!({
                "a": a.display().to_string(),
                "b": b.display().to_string(),
                "model": embedder.model_id(),
                "distance": distance,
                "similarity_percent": similarity,
            });
            let json = serde_json::to_string_pretty(&report)
                .context("Failed to serialize comparison to JSON")?;
            println!("{json}");
        }
        OutputFormat::Summary if !quiet => {
            println!();
            println!("   {} {}", "A:".dimmed(), a.display());
            println!("   {} {}", "B:".dimmed(), b.display());
            println!("   {} {:.6}", "Cosine distance:".dimmed(), distance);
            println!(
                "   {} {}",
                "Similarity:".dimmed(),
                colorize_similarity(similarity)
            );
        }
        OutputFormat::Summary => {}
    }

    Ok(())
}

pub(crate) fn colorize_similarity(similarity: f64) -> colored::ColoredString {
    let text = format!("{similarity:.2}%");
    if similarity >= 90.0 {
        text.green().bold()
    } else if similarity >= 70.0 {
        text.yellow()
    } else {
        text.red()
    }
}
