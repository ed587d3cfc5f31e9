//! Similarity ranking of catalog implants against a query embedding.

use serde::{Deserialize, Serialize};

use crate::embedding::Embedding;
use crate::error::{RaioxError, Result};
use crate::store::{Neighbor, VectorStore};

/// Result-set size used by ingestion unless configured otherwise.
pub const DEFAULT_RESULT_LIMIT: usize = 3;

/// One ranked catalog match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedImplant {
    pub implant_id: i64,
    pub name: String,
    pub manufacturer: String,
    pub image_url: Option<String>,
    /// Cosine similarity in percent: 100 for identical direction, 0 for
    /// orthogonal, -100 for opposite.
    pub similarity_percent: f64,
}

impl From<Neighbor> for RankedImplant {
    fn from(neighbor: Neighbor) -> Self {
        Self {
            implant_id: neighbor.implant.id,
            name: neighbor.implant.name,
            manufacturer: neighbor.implant.manufacturer,
            image_url: neighbor.implant.image_url,
            similarity_percent: similarity_percent(neighbor.distance),
        }
    }
}

/// Convert a cosine distance into a similarity percentage.
///
/// This is the cosine similarity `1 - d` scaled by 100, so the unit-vector
/// distance range `[0, 2]` maps onto `[100, -100]`. No clamping is applied.
pub fn similarity_percent(distance: f64) -> f64 {
    (1.0 - distance) * 100.0
}

/// Rank the catalog by similarity to `query`, best match first.
///
/// At most `limit` entries are returned; `limit == 0` is an
/// `InvalidArgument`. Store errors are propagated unchanged.
pub async fn rank<S>(store: &mut S, query: &Embedding, limit: usize) -> Result<Vec<RankedImplant>>
where
    S: VectorStore + ?Sized,
{
    if limit == 0 {
        return Err(RaioxError::InvalidArgument(
            "result limit must be at least 1".into(),
        ));
    }

    let neighbors = store.query(query, limit).await?;
    let ranked: Vec<RankedImplant> = neighbors.into_iter().map(RankedImplant::from).collect();

    tracing::debug!(
        limit,
        matches = ranked.len(),
        best = ranked.first().map(|r| r.similarity_percent),
        "Catalog ranked"
    );

    Ok(ranked)
}
