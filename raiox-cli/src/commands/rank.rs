//! Rank command implementation.
//!
//! Ranks a set of reference images against a query the same way the server
//! ranks its catalog, without a database.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use colored::Colorize;
use raiox_core::store::check_k;
use raiox_core::{nearest, Embedding, ImageEmbedder, ImplantSummary, RankedImplant};
use tracing::{info, warn};

use super::{compare::colorize_similarity, embed_file};
use crate::OutputFormat;

/// Catalog entry for a reference file: numbered from 1 in argument order,
/// named by file name, manufacturer taken from the parent directory.
fn summary_for(index: usize, path: &Path) -> ImplantSummary {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("reference")
        .to_string();
    let manufacturer = path
        .parent()
        .and_then(|p| p.file_name())
        .and_then(|n| n.to_str())
        .unwrap_or("unknown")
        .to_string();

    ImplantSummary {
        id: index as i64 + 1,
        name,
        manufacturer,
        image_url: Some(path.display().to_string()),
    }
}

/// Execute the rank command.
pub fn execute(
    embedder: &dyn ImageEmbedder,
    query: PathBuf,
    references: Vec<PathBuf>,
    limit: usize,
    format: OutputFormat,
    quiet: bool,
) -> Result<()> {
    check_k(limit)?;

    let query_embedding = embed_file(embedder, &query)?;

    let mut catalog: Vec<(ImplantSummary, Embedding)> = Vec::with_capacity(references.len());
    for (index, path) in references.iter().enumerate() {
        let embedding = embed_file(embedder, path)?;
        catalog.push((summary_for(index, path), embedding));
    }

    let ranked: Vec<RankedImplant> = nearest(
        &query_embedding,
        catalog.iter().map(|(summary, embedding)| (summary, embedding)),
        limit,
    )
    .into_iter()
    .map(RankedImplant::from)
    .collect();

    if ranked.len() < limit {
        warn!(
            requested = limit,
            available = ranked.len(),
            "Fewer references than requested matches"
        );
    }
    info!(references = catalog.len(), matches = ranked.len(), "Ranked references");

    match format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(&ranked)
                .context("Failed to serialize ranking to JSON")?;
            println!("{json}");
        }
        OutputFormat::Summary if !quiet => {
            println!();
            println!(
                "{} {}",
                "Best matches for".bold(),
                query.display().to_string().bold()
            );
            println!();
            for (position, implant) in ranked.iter().enumerate() {
                println!(
                    "   {:>2}. {:>8}  {} {}",
                    position + 1,
                    colorize_similarity(implant.similarity_percent),
                    implant.name,
                    format!("({})", implant.manufacturer).dimmed()
                );
            }
        }
        OutputFormat::Summary => {}
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_for_uses_parent_as_manufacturer() {
        let summary = summary_for(0, Path::new("catalog/Straumann/blt-4.1.png"));
        assert_eq!(summary.id, 1);
        assert_eq!(summary.name, "blt-4.1.png");
        assert_eq!(summary.manufacturer, "Straumann");
    }

    #[test]
    fn test_summary_for_bare_file_name() {
        let summary = summary_for(4, Path::new("ref.png"));
        assert_eq!(summary.id, 5);
        assert_eq!(summary.manufacturer, "unknown");
    }
}
