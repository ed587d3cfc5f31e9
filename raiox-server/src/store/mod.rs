//! Ingestion persistence
//!
//! Storage for the implant catalog, submitted images and their ranked
//! results. Every ingestion runs inside one [`IngestTransaction`], which is
//! also the [`VectorStore`] the ranker queries, so the write of the submitted
//! image, the ranking read and the result rows share one isolation scope.
//!
//! Two backends are provided:
//! - [`PostgresStore`] - sqlx + PostgreSQL, used when `DATABASE_URL` is set
//! - [`MemoryStore`] - in-process fallback for development and tests

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PostgresStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use raiox_core::{RaioxError, RankedImplant, Result, VectorStore};

/// A submitted image about to be recorded.
#[derive(Debug, Clone)]
pub struct NewSubmittedImage {
    pub submission_id: String,
    pub client_id: String,
    pub file_name: String,
    /// Object key in blob storage
    pub file_path: String,
    pub file_url: String,
    pub metadata: serde_json::Value,
}

/// Catalog implant as returned by catalog reads.
#[derive(Debug, Clone, PartialEq)]
pub struct ImplantRecord {
    pub id: i64,
    pub name: String,
    pub manufacturer: String,
    pub image_path: Option<String>,
    pub image_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Recorded submitted image.
#[derive(Debug, Clone, PartialEq)]
pub struct SubmittedImageRecord {
    pub id: i64,
    pub submission_id: String,
    pub client_id: String,
    pub file_name: String,
    pub file_path: String,
    pub file_url: String,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

/// One recorded match, joined with its catalog entry.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultRecord {
    pub rank: i32,
    pub implant_id: i64,
    pub name: String,
    pub manufacturer: String,
    pub image_url: Option<String>,
    pub similarity: f64,
}

/// A fully recorded submission with its results ordered by rank.
#[derive(Debug, Clone, PartialEq)]
pub struct SubmissionRecord {
    pub image: SubmittedImageRecord,
    pub results: Vec<ResultRecord>,
}

/// Backend entry point shared through application state.
#[async_trait]
pub trait IngestStore: Send + Sync {
    /// Open a unit of work. Dropping it without [`IngestTransaction::commit`]
    /// discards every write made through it.
    async fn begin(&self) -> Result<Box<dyn IngestTransaction>>;

    /// Catalog page ordered by id.
    async fn list_implants(&self, skip: i64, limit: i64) -> Result<Vec<ImplantRecord>>;

    async fn get_implant(&self, id: i64) -> Result<Option<ImplantRecord>>;

    /// Committed submission for a client, if any.
    async fn find_submission(
        &self,
        client_id: &str,
        submission_id: &str,
    ) -> Result<Option<SubmissionRecord>>;

    /// Succeeds when the backend answers.
    async fn check_health(&self) -> Result<()>;

    /// Backend name for logs and health output.
    fn backend(&self) -> &'static str;
}

/// One ingestion's writes, plus vector search over the catalog as seen from
/// inside the transaction.
#[async_trait]
pub trait IngestTransaction: VectorStore {
    /// Insert the submitted image row and return its id. A duplicate
    /// `(client_id, submission_id)` is a `PersistenceError`.
    async fn insert_image(&mut self, image: &NewSubmittedImage) -> Result<i64>;

    /// Insert one result row per entry, rank = 1-based position, and mark the
    /// image processed.
    async fn record_results(
        &mut self,
        image_id: i64,
        submission_id: &str,
        results: &[RankedImplant],
    ) -> Result<()>;

    async fn commit(self: Box<Self>) -> Result<()>;
}

/// Map a sqlx error onto the core taxonomy.
///
/// Connectivity failures are `StoreUnavailable`; everything the database
/// itself rejected is a `PersistenceError`.
pub(crate) fn classify_sqlx(context: &str, err: sqlx::Error) -> RaioxError {
    match err {
        sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::WorkerCrashed => {
            RaioxError::StoreUnavailable(format!("{context}: {err}"))
        }
        other => RaioxError::PersistenceError(format!("{context}: {other}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_connectivity_errors() {
        assert!(matches!(
            classify_sqlx("query", sqlx::Error::PoolTimedOut),
            RaioxError::StoreUnavailable(_)
        ));
        assert!(matches!(
            classify_sqlx("query", sqlx::Error::PoolClosed),
            RaioxError::StoreUnavailable(_)
        ));
    }

    #[test]
    fn test_classify_rejections() {
        let err = classify_sqlx("insert image", sqlx::Error::RowNotFound);
        match err {
            RaioxError::PersistenceError(msg) => assert!(msg.starts_with("insert image")),
            other => panic!("unexpected {other:?}"),
        }
    }
}
