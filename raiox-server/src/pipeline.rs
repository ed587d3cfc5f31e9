//! Ingestion pipeline
//!
//! Runs one submission through embed → store → rank → record as a single
//! unit of work:
//!
//! ```text
//! Received → Embedded → Stored → Ranked → Recorded
//!     └──────────┴─────────┴────────┴──────────→ Failed
//! ```
//!
//! Everything after embedding happens inside one store transaction. Any
//! failure drops the transaction uncommitted, so either the submitted image
//! and all of its results become visible together or nothing does. The
//! outcome is always returned as an [`IngestResponse`]; errors never escape
//! as panics or framework errors.

use std::fmt;
use std::sync::Arc;

use raiox_core::{rank, RaioxError, RankedImplant, VectorKey, VectorStore};
use serde::{Deserialize, Serialize};
use tracing::Instrument;
use utoipa::ToSchema;

use crate::embedding::EmbeddingService;
use crate::error::raiox_client_message;
use crate::store::{IngestStore, NewSubmittedImage};

/// Lifecycle of one ingestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestStage {
    Received,
    Embedded,
    Stored,
    Ranked,
    Recorded,
    Failed,
}

impl IngestStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::Embedded => "embedded",
            Self::Stored => "stored",
            Self::Ranked => "ranked",
            Self::Recorded => "recorded",
            Self::Failed => "failed",
        }
    }

    /// What the pipeline was doing when it left this stage.
    fn activity(&self) -> &'static str {
        match self {
            Self::Received => "generating the embedding",
            Self::Embedded => "storing the image",
            Self::Stored => "ranking the catalog",
            Self::Ranked => "recording results",
            Self::Recorded | Self::Failed => "finishing",
        }
    }
}

impl fmt::Display for IngestStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A submission ready for ingestion. The image is already in blob storage.
#[derive(Debug, Clone)]
pub struct IngestRequest {
    pub client_id: String,
    pub submission_id: String,
    pub file_name: String,
    /// Object key in blob storage
    pub file_path: String,
    pub file_url: String,
    pub metadata: serde_json::Value,
    pub bytes: Vec<u8>,
}

/// One ranked catalog match in an ingestion response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct RankedMatch {
    #[schema(example = 42)]
    pub implant_id: i64,
    #[schema(example = "Straumann BLT 4.1")]
    pub name: String,
    #[schema(example = "Straumann")]
    pub manufacturer: String,
    #[schema(example = "https://raiox.nyc3.digitaloceanspaces.com/implants/42.png")]
    pub image_url: Option<String>,
    /// Cosine similarity in percent: 100 for identical direction, 0 for orthogonal, -100 for opposite
    #[schema(example = 93.4)]
    pub similarity_percent: f64,
}

impl From<RankedImplant> for RankedMatch {
    fn from(r: RankedImplant) -> Self {
        Self {
            implant_id: r.implant_id,
            name: r.name,
            manufacturer: r.manufacturer,
            image_url: r.image_url,
            similarity_percent: r.similarity_percent,
        }
    }
}

/// Structured outcome of an ingestion.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct IngestResponse {
    #[schema(example = true)]
    pub success: bool,
    #[schema(example = "Image processed successfully")]
    pub message: String,
    /// Submission id the outcome belongs to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schema(example = "upload_clinic-7_4f1c2a9e")]
    pub submission_id: Option<String>,
    /// Matches ordered by descending similarity, present on success
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub results: Option<Vec<RankedMatch>>,
}

impl IngestResponse {
    pub fn succeeded(submission_id: impl Into<String>, results: Vec<RankedImplant>) -> Self {
        Self {
            success: true,
            message: "Image processed successfully".to_string(),
            submission_id: Some(submission_id.into()),
            results: Some(results.into_iter().map(RankedMatch::from).collect()),
        }
    }

    pub fn failed(submission_id: Option<String>, message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            submission_id,
            results: None,
        }
    }
}

struct IngestFailure {
    /// Last stage reached before the failure
    stage: IngestStage,
    error: RaioxError,
}

impl IngestFailure {
    fn at(stage: IngestStage) -> impl FnOnce(RaioxError) -> Self {
        move |error| Self { stage, error }
    }
}

/// Embed → store → rank → record.
#[derive(Clone)]
pub struct IngestionPipeline {
    embedder: EmbeddingService,
    store: Arc<dyn IngestStore>,
    result_limit: usize,
}

impl IngestionPipeline {
    pub fn new(embedder: EmbeddingService, store: Arc<dyn IngestStore>, result_limit: usize) -> Self {
        Self {
            embedder,
            store,
            result_limit,
        }
    }

    pub fn result_limit(&self) -> usize {
        self.result_limit
    }

    /// Run one submission. Never fails; failures are reported in the response.
    pub async fn ingest(&self, request: IngestRequest) -> IngestResponse {
        let span = tracing::info_span!(
            "ingest",
            client_id = %request.client_id,
            submission_id = %request.submission_id,
        );
        let submission_id = request.submission_id.clone();

        match self.run(request).instrument(span.clone()).await {
            Ok(results) => {
                span.in_scope(|| {
                    tracing::info!(
                        stage = %IngestStage::Recorded,
                        matches = results.len(),
                        "Ingestion complete"
                    );
                });
                IngestResponse::succeeded(submission_id, results)
            }
            Err(failure) => {
                span.in_scope(|| {
                    tracing::warn!(
                        stage = %IngestStage::Failed,
                        failed_after = %failure.stage,
                        error = %failure.error,
                        retryable = failure.error.is_retryable(),
                        "Ingestion failed"
                    );
                });
                IngestResponse::failed(
                    Some(submission_id),
                    format!(
                        "Ingestion failed while {}: {}",
                        failure.stage.activity(),
                        raiox_client_message(&failure.error)
                    ),
                )
            }
        }
    }

    async fn run(&self, request: IngestRequest) -> Result<Vec<RankedImplant>, IngestFailure> {
        tracing::debug!(stage = %IngestStage::Received, size = request.bytes.len(), "Stage reached");

        let IngestRequest {
            client_id,
            submission_id,
            file_name,
            file_path,
            file_url,
            metadata,
            bytes,
        } = request;

        let embedding = self
            .embedder
            .embed(bytes)
            .await
            .map_err(IngestFailure::at(IngestStage::Received))?;
        tracing::debug!(stage = %IngestStage::Embedded, model = self.embedder.model_id(), "Stage reached");

        let mut txn = self
            .store
            .begin()
            .await
            .map_err(IngestFailure::at(IngestStage::Embedded))?;

        let image = NewSubmittedImage {
            submission_id: submission_id.clone(),
            client_id,
            file_name,
            file_path,
            file_url,
            metadata,
        };
        let image_id = txn
            .insert_image(&image)
            .await
            .map_err(IngestFailure::at(IngestStage::Embedded))?;
        txn.put(VectorKey::Image(image_id), &embedding)
            .await
            .map_err(IngestFailure::at(IngestStage::Embedded))?;
        tracing::debug!(stage = %IngestStage::Stored, image_id, "Stage reached");

        let ranked = rank(&mut *txn, &embedding, self.result_limit)
            .await
            .map_err(IngestFailure::at(IngestStage::Stored))?;
        tracing::debug!(stage = %IngestStage::Ranked, matches = ranked.len(), "Stage reached");

        txn.record_results(image_id, &submission_id, &ranked)
            .await
            .map_err(IngestFailure::at(IngestStage::Ranked))?;
        txn.commit()
            .await
            .map_err(IngestFailure::at(IngestStage::Ranked))?;

        Ok(ranked)
    }
}
