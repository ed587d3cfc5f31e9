//! Vector persistence and nearest-neighbor lookup.
//!
//! [`VectorStore`] is the seam between ranking and persistence. Backends
//! live in the server crate (PostgreSQL, in-memory); this module provides the
//! contract and the exact cosine scan they share.

use std::cmp::Ordering;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::embedding::Embedding;
use crate::error::{RaioxError, Result};

/// Entity a stored vector belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VectorKey {
    /// Catalog implant. Only these are candidates for [`VectorStore::query`].
    Implant(i64),
    /// Submitted query image. Written once, never searched.
    Image(i64),
}

impl std::fmt::Display for VectorKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Implant(id) => write!(f, "implant:{id}"),
            Self::Image(id) => write!(f, "image:{id}"),
        }
    }
}

/// Catalog fields returned alongside a neighbor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImplantSummary {
    pub id: i64,
    pub name: String,
    pub manufacturer: String,
    pub image_url: Option<String>,
}

/// One nearest-neighbor hit.
#[derive(Debug, Clone, PartialEq)]
pub struct Neighbor {
    pub implant: ImplantSummary,
    /// Cosine distance from the query, in `[0, 2]` for unit vectors.
    pub distance: f64,
}

/// Persistence and exact nearest-neighbor search over embeddings.
///
/// Methods take `&mut self` so a database transaction can implement the
/// trait directly: reads and writes issued through one value share its
/// isolation scope.
#[async_trait]
pub trait VectorStore: Send {
    /// Store `vector` for `key`, replacing any previous vector.
    ///
    /// Repeating the same call leaves the store unchanged. An unknown entity
    /// is a `PersistenceError`.
    async fn put(&mut self, key: VectorKey, vector: &Embedding) -> Result<()>;

    /// Up to `k` catalog implants ordered by ascending cosine distance, ties
    /// broken by ascending implant id.
    ///
    /// `k == 0` is an `InvalidArgument`. An unreachable backend is a
    /// `StoreUnavailable`; it is never retried here.
    async fn query(&mut self, vector: &Embedding, k: usize) -> Result<Vec<Neighbor>>;
}

/// Reject a zero result-set size.
pub fn check_k(k: usize) -> Result<()> {
    if k == 0 {
        return Err(RaioxError::InvalidArgument(
            "k must be at least 1".into(),
        ));
    }
    Ok(())
}

/// Exact k-nearest scan over `candidates` by cosine distance.
///
/// Ordering is total and deterministic: distance ascending, then implant id
/// ascending.
pub fn nearest<'a, I>(query: &Embedding, candidates: I, k: usize) -> Vec<Neighbor>
where
    I: IntoIterator<Item = (&'a ImplantSummary, &'a Embedding)>,
{
    let mut scored: Vec<Neighbor> = candidates
        .into_iter()
        .map(|(implant, vector)| Neighbor {
            implant: implant.clone(),
            distance: query.cosine_distance(vector),
        })
        .collect();

    scored.sort_by(compare_neighbors);
    scored.truncate(k);
    scored
}

fn compare_neighbors(a: &Neighbor, b: &Neighbor) -> Ordering {
    a.distance
        .total_cmp(&b.distance)
        .then_with(|| a.implant.id.cmp(&b.implant.id))
}
