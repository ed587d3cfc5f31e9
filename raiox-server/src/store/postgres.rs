//! PostgreSQL implementation of the ingestion store.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use raiox_core::store::check_k;
use raiox_core::{
    nearest, Embedding, ImplantSummary, Neighbor, RaioxError, RankedImplant, Result, VectorKey,
    VectorStore,
};
use sqlx::postgres::{PgPoolOptions, Postgres};
use sqlx::{FromRow, PgExecutor, PgPool, Transaction};

use super::{
    classify_sqlx, ImplantRecord, IngestStore, IngestTransaction, NewSubmittedImage,
    ResultRecord, SubmissionRecord, SubmittedImageRecord,
};

/// PostgreSQL-backed store.
///
/// Vectors are kept as `REAL[]` columns and searched with an exact scan.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

#[derive(FromRow)]
struct ImplantRow {
    id: i64,
    name: String,
    manufacturer: String,
    image_path: Option<String>,
    image_url: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<ImplantRow> for ImplantRecord {
    fn from(row: ImplantRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            manufacturer: row.manufacturer,
            image_path: row.image_path,
            image_url: row.image_url,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(FromRow)]
struct CandidateRow {
    id: i64,
    name: String,
    manufacturer: String,
    image_url: Option<String>,
    vector: Vec<f32>,
}

#[derive(FromRow)]
struct ImageRow {
    id: i64,
    submission_id: String,
    client_id: String,
    file_name: String,
    file_path: String,
    file_url: String,
    metadata: serde_json::Value,
    created_at: DateTime<Utc>,
    processed_at: Option<DateTime<Utc>>,
}

impl From<ImageRow> for SubmittedImageRecord {
    fn from(row: ImageRow) -> Self {
        Self {
            id: row.id,
            submission_id: row.submission_id,
            client_id: row.client_id,
            file_name: row.file_name,
            file_path: row.file_path,
            file_url: row.file_url,
            metadata: row.metadata,
            created_at: row.created_at,
            processed_at: row.processed_at,
        }
    }
}

#[derive(FromRow)]
struct ResultRow {
    rank: i32,
    implant_id: i64,
    name: String,
    manufacturer: String,
    image_url: Option<String>,
    similarity: f64,
}

impl From<ResultRow> for ResultRecord {
    fn from(row: ResultRow) -> Self {
        Self {
            rank: row.rank,
            implant_id: row.implant_id,
            name: row.name,
            manufacturer: row.manufacturer,
            image_url: row.image_url,
            similarity: row.similarity,
        }
    }
}

impl PostgresStore {
    /// Connect with the given database URL.
    ///
    /// Runs migrations automatically on connection.
    pub async fn new(database_url: &str, max_connections: u32, min_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(Duration::from_secs(5))
            .connect(database_url)
            .await
            .map_err(|e| RaioxError::StoreUnavailable(format!("connect: {e}")))?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| RaioxError::PersistenceError(format!("migrations: {e}")))?;

        tracing::info!(max_connections, "Postgres store connected and migrations applied");

        Ok(Self { pool })
    }

    /// Create a store from an existing pool (for testing).
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }
}

async fn put_vector<'e, E>(executor: E, key: VectorKey, vector: &Embedding) -> Result<()>
where
    E: PgExecutor<'e>,
{
    let statement = match key {
        VectorKey::Implant(_) => "UPDATE implants SET vector = $1, updated_at = NOW() WHERE id = $2",
        VectorKey::Image(_) => "UPDATE images SET vector = $1 WHERE id = $2",
    };
    let id = match key {
        VectorKey::Implant(id) | VectorKey::Image(id) => id,
    };

    let affected = sqlx::query(statement)
        .bind(vector.as_slice())
        .bind(id)
        .execute(executor)
        .await
        .map_err(|e| classify_sqlx("store vector", e))?
        .rows_affected();

    if affected == 0 {
        return Err(RaioxError::PersistenceError(format!("no entity for {key}")));
    }

    tracing::debug!(key = %key, "Vector stored");
    Ok(())
}

async fn query_nearest<'e, E>(executor: E, vector: &Embedding, k: usize) -> Result<Vec<Neighbor>>
where
    E: PgExecutor<'e>,
{
    check_k(k)?;

    let rows: Vec<CandidateRow> = sqlx::query_as(
        r#"
        SELECT id, name, manufacturer, image_url, vector
        FROM implants
        WHERE vector IS NOT NULL
        "#,
    )
    .fetch_all(executor)
    .await
    .map_err(|e| classify_sqlx("load catalog vectors", e))?;

    let candidates: Vec<(ImplantSummary, Embedding)> = rows
        .into_iter()
        .filter_map(|row| match Embedding::from_features(row.vector) {
            Ok(embedding) => Some((
                ImplantSummary {
                    id: row.id,
                    name: row.name,
                    manufacturer: row.manufacturer,
                    image_url: row.image_url,
                },
                embedding,
            )),
            Err(e) => {
                tracing::warn!(implant_id = row.id, error = %e, "Skipping implant with invalid vector");
                None
            }
        })
        .collect();

    Ok(nearest(vector, candidates.iter().map(|(i, v)| (i, v)), k))
}

#[async_trait]
impl VectorStore for PostgresStore {
    async fn put(&mut self, key: VectorKey, vector: &Embedding) -> Result<()> {
        put_vector(&self.pool, key, vector).await
    }

    async fn query(&mut self, vector: &Embedding, k: usize) -> Result<Vec<Neighbor>> {
        query_nearest(&self.pool, vector, k).await
    }
}

#[async_trait]
impl IngestStore for PostgresStore {
    async fn begin(&self) -> Result<Box<dyn IngestTransaction>> {
        let txn = self
            .pool
            .begin()
            .await
            .map_err(|e| classify_sqlx("begin transaction", e))?;
        Ok(Box::new(PgIngestTransaction { txn }))
    }

    async fn list_implants(&self, skip: i64, limit: i64) -> Result<Vec<ImplantRecord>> {
        let rows: Vec<ImplantRow> = sqlx::query_as(
            r#"
            SELECT id, name, manufacturer, image_path, image_url, created_at, updated_at
            FROM implants
            ORDER BY id
            OFFSET $1
            LIMIT $2
            "#,
        )
        .bind(skip)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| classify_sqlx("list implants", e))?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn get_implant(&self, id: i64) -> Result<Option<ImplantRecord>> {
        let row: Option<ImplantRow> = sqlx::query_as(
            r#"
            SELECT id, name, manufacturer, image_path, image_url, created_at, updated_at
            FROM implants
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| classify_sqlx("get implant", e))?;

        Ok(row.map(Into::into))
    }

    async fn find_submission(
        &self,
        client_id: &str,
        submission_id: &str,
    ) -> Result<Option<SubmissionRecord>> {
        let image: Option<ImageRow> = sqlx::query_as(
            r#"
            SELECT id, submission_id, client_id, file_name, file_path, file_url,
                   metadata, created_at, processed_at
            FROM images
            WHERE client_id = $1 AND submission_id = $2
            "#,
        )
        .bind(client_id)
        .bind(submission_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| classify_sqlx("find submission", e))?;

        let Some(image) = image else {
            return Ok(None);
        };

        let results: Vec<ResultRow> = sqlx::query_as(
            r#"
            SELECT r.rank, r.implant_id, i.name, i.manufacturer, i.image_url, r.similarity
            FROM results r
            JOIN implants i ON i.id = r.implant_id
            WHERE r.image_id = $1
            ORDER BY r.rank
            "#,
        )
        .bind(image.id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| classify_sqlx("load results", e))?;

        Ok(Some(SubmissionRecord {
            image: image.into(),
            results: results.into_iter().map(Into::into).collect(),
        }))
    }

    async fn check_health(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| classify_sqlx("health check", e))?;
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "postgres"
    }
}

/// One ingestion inside a database transaction.
///
/// Rolled back by sqlx when dropped before [`IngestTransaction::commit`].
pub struct PgIngestTransaction {
    txn: Transaction<'static, Postgres>,
}

#[async_trait]
impl VectorStore for PgIngestTransaction {
    async fn put(&mut self, key: VectorKey, vector: &Embedding) -> Result<()> {
        put_vector(&mut *self.txn, key, vector).await
    }

    async fn query(&mut self, vector: &Embedding, k: usize) -> Result<Vec<Neighbor>> {
        query_nearest(&mut *self.txn, vector, k).await
    }
}

#[async_trait]
impl IngestTransaction for PgIngestTransaction {
    async fn insert_image(&mut self, image: &NewSubmittedImage) -> Result<i64> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO images (submission_id, client_id, file_name, file_path, file_url, metadata)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id
            "#,
        )
        .bind(&image.submission_id)
        .bind(&image.client_id)
        .bind(&image.file_name)
        .bind(&image.file_path)
        .bind(&image.file_url)
        .bind(&image.metadata)
        .fetch_one(&mut *self.txn)
        .await
        .map_err(|e| classify_sqlx("insert image", e))?;

        tracing::debug!(image_id = id, submission_id = %image.submission_id, "Image row inserted");
        Ok(id)
    }

    async fn record_results(
        &mut self,
        image_id: i64,
        submission_id: &str,
        results: &[RankedImplant],
    ) -> Result<()> {
        for (position, result) in results.iter().enumerate() {
            let rank = i32::try_from(position + 1)
                .map_err(|_| RaioxError::InvalidArgument("too many results".into()))?;

            sqlx::query(
                r#"
                INSERT INTO results (submission_id, image_id, implant_id, similarity, rank)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(submission_id)
            .bind(image_id)
            .bind(result.implant_id)
            .bind(result.similarity_percent)
            .bind(rank)
            .execute(&mut *self.txn)
            .await
            .map_err(|e| classify_sqlx("insert result", e))?;
        }

        let affected = sqlx::query("UPDATE images SET processed_at = NOW() WHERE id = $1")
            .bind(image_id)
            .execute(&mut *self.txn)
            .await
            .map_err(|e| classify_sqlx("mark image processed", e))?
            .rows_affected();

        if affected == 0 {
            return Err(RaioxError::PersistenceError(format!(
                "image {image_id} vanished before results were recorded"
            )));
        }

        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.txn
            .commit()
            .await
            .map_err(|e| classify_sqlx("commit", e))
    }
}
