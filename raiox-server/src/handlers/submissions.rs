//! Submission lookup handler
//!
//! Only committed ingestions are visible; a failed or in-flight ingestion
//! answers 404.

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Serialize;
use utoipa::ToSchema;

use crate::error::ApiError;
use crate::state::AppState;
use crate::store::{ResultRecord, SubmissionRecord};

/// One recorded match.
#[derive(Debug, Serialize, ToSchema)]
pub struct SubmissionResult {
    /// 1-based position, best match first
    #[schema(example = 1)]
    pub rank: i32,
    #[schema(example = 42)]
    pub implant_id: i64,
    #[schema(example = "Straumann BLT 4.1")]
    pub name: String,
    #[schema(example = "Straumann")]
    pub manufacturer: String,
    pub image_url: Option<String>,
    #[schema(example = 93.4)]
    pub similarity_percent: f64,
}

impl From<ResultRecord> for SubmissionResult {
    fn from(r: ResultRecord) -> Self {
        Self {
            rank: r.rank,
            implant_id: r.implant_id,
            name: r.name,
            manufacturer: r.manufacturer,
            image_url: r.image_url,
            similarity_percent: r.similarity,
        }
    }
}

/// A recorded submission with its ranked results.
#[derive(Debug, Serialize, ToSchema)]
pub struct SubmissionResponse {
    #[schema(example = "upload_clinic-7_4f1c2a9e")]
    pub submission_id: String,
    #[schema(example = "clinic-7")]
    pub client_id: String,
    #[schema(example = "xray.png")]
    pub file_name: String,
    #[schema(example = "https://raiox.nyc3.digitaloceanspaces.com/uploads/clinic-7/exam-1/xray.png")]
    pub file_url: String,
    #[schema(value_type = Object)]
    pub metadata: serde_json::Value,
    #[schema(example = "2026-10-14T09:30:00Z")]
    pub created_at: String,
    #[schema(example = "2026-10-14T09:30:01Z")]
    pub processed_at: Option<String>,
    pub results: Vec<SubmissionResult>,
}

impl From<SubmissionRecord> for SubmissionResponse {
    fn from(record: SubmissionRecord) -> Self {
        let image = record.image;
        Self {
            submission_id: image.submission_id,
            client_id: image.client_id,
            file_name: image.file_name,
            file_url: image.file_url,
            metadata: image.metadata,
            created_at: image.created_at.to_rfc3339(),
            processed_at: image.processed_at.map(|t| t.to_rfc3339()),
            results: record.results.into_iter().map(Into::into).collect(),
        }
    }
}

/// Get a recorded submission.
#[utoipa::path(
    get,
    path = "/api/v1/submissions/{client_id}/{submission_id}",
    tag = "Submissions",
    params(
        ("client_id" = String, Path, description = "Client that owns the submission"),
        ("submission_id" = String, Path, description = "Submission id")
    ),
    responses(
        (status = 200, description = "Recorded submission", body = SubmissionResponse),
        (status = 404, description = "Submission not found"),
        (status = 503, description = "Store unavailable")
    )
)]
pub async fn get_submission_handler(
    State(state): State<AppState>,
    Path((client_id, submission_id)): Path<(String, String)>,
) -> Result<Json<SubmissionResponse>, ApiError> {
    state
        .store
        .find_submission(&client_id, &submission_id)
        .await?
        .map(|record| Json(record.into()))
        .ok_or_else(|| ApiError::not_found(format!("Submission '{submission_id}' not found")))
}
