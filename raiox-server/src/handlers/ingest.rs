//! Ingestion handlers
//!
//! `POST /webhook` downloads an image by URL, `POST /upload` accepts it as a
//! multipart file. Both store the raw bytes in blob storage and run the
//! ingestion pipeline. Pipeline outcomes, successful or not, are answered
//! with 200 and an [`IngestResponse`]; malformed requests get an error body.

use axum::{
    extract::{Multipart, State},
    http::HeaderMap,
    Json,
};
use serde::Deserialize;
use utoipa::ToSchema;

use crate::blob::object_key;
use crate::error::ApiError;
use crate::fetch::{parse_image_url, FetchError};
use crate::multipart::MultipartFields;
use crate::pipeline::{IngestRequest, IngestResponse};
use crate::state::AppState;
use crate::validation::validate_identifier;

/// Request body for `POST /webhook`.
#[derive(Debug, Deserialize, ToSchema)]
pub struct WebhookRequest {
    /// Client that owns the submission
    #[schema(example = "clinic-7")]
    pub client_id: String,
    /// Absolute http(s) URL of the X-ray image
    #[schema(example = "https://cdn.example.com/scans/xray-17.jpg")]
    pub image_url: String,
    /// Submission id; generated when omitted
    #[serde(default)]
    #[schema(example = "exam-2026-10-14-001")]
    pub submission_id: Option<String>,
    /// Free-form metadata stored with the image
    #[serde(default)]
    #[schema(value_type = Option<Object>)]
    pub metadata: Option<serde_json::Value>,
}

/// How a submission reached the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    Webhook,
    Upload,
}

impl Source {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Webhook => "webhook",
            Self::Upload => "upload",
        }
    }
}

/// `{source}_{client_id}_{uuid}`
pub fn generate_submission_id(source: Source, client_id: &str) -> String {
    format!(
        "{}_{}_{}",
        source.as_str(),
        client_id,
        uuid::Uuid::new_v4().simple()
    )
}

fn resolve_submission_id(
    source: Source,
    client_id: &str,
    supplied: Option<&str>,
) -> Result<String, ApiError> {
    match supplied.map(str::trim).filter(|s| !s.is_empty()) {
        Some(id) => {
            validate_identifier("submission_id", id)?;
            Ok(id.to_string())
        }
        None => Ok(generate_submission_id(source, client_id)),
    }
}

/// Read a header by its dashed name, falling back to the underscore spelling.
fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .or_else(|| headers.get(name.replace('-', "_").as_str()))
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

struct Submission {
    source: Source,
    client_id: String,
    submission_id: String,
    file_name: String,
    content_type: String,
    bytes: Vec<u8>,
    origin_url: Option<String>,
    client_metadata: Option<serde_json::Value>,
}

/// Store the raw image, then run the pipeline.
async fn submit(state: &AppState, submission: Submission) -> IngestResponse {
    let Submission {
        source,
        client_id,
        submission_id,
        file_name,
        content_type,
        bytes,
        origin_url,
        client_metadata,
    } = submission;

    let file_path = object_key(&client_id, &submission_id, &file_name);
    let file_url = match state.blobs.store(&bytes, &file_path, &content_type).await {
        Ok(url) => url,
        Err(e) => {
            tracing::error!(
                error = %e,
                backend = state.blobs.backend(),
                object_key = %file_path,
                "Blob upload failed"
            );
            return IngestResponse::failed(Some(submission_id), "Failed to store the image");
        }
    };

    let mut metadata = serde_json::json!({
        "source": source.as_str(),
        "content_type": content_type,
        "size_bytes": bytes.len(),
    });
    if let Some(url) = origin_url {
        metadata["origin_url"] = serde_json::Value::String(url);
    }
    if let Some(extra) = client_metadata {
        metadata["client"] = extra;
    }

    state
        .pipeline
        .ingest(IngestRequest {
            client_id,
            submission_id,
            file_name,
            file_path,
            file_url,
            metadata,
            bytes,
        })
        .await
}

/// Ingest an image by URL
///
/// Downloads the image, stores it and records its closest catalog implants.
#[utoipa::path(
    post,
    path = "/webhook",
    tag = "Ingestion",
    request_body = WebhookRequest,
    responses(
        (status = 200, description = "Ingestion outcome", body = IngestResponse),
        (status = 400, description = "Invalid client id, submission id or URL")
    )
)]
pub async fn webhook_handler(
    State(state): State<AppState>,
    Json(request): Json<WebhookRequest>,
) -> Result<Json<IngestResponse>, ApiError> {
    let client_id = request.client_id.trim().to_string();
    validate_identifier("client_id", &client_id)?;
    let submission_id =
        resolve_submission_id(Source::Webhook, &client_id, request.submission_id.as_deref())?;
    parse_image_url(&request.image_url).map_err(|e| ApiError::bad_request(e.to_string()))?;

    tracing::info!(client_id = %client_id, submission_id = %submission_id, "Webhook received");

    let fetched = match state.fetcher.fetch(&request.image_url).await {
        Ok(fetched) => fetched,
        Err(FetchError::InvalidUrl(msg)) => return Err(ApiError::bad_request(msg)),
        Err(e) => {
            tracing::warn!(error = %e, client_id = %client_id, "Image download failed");
            return Ok(Json(IngestResponse::failed(
                Some(submission_id),
                "Could not download the image from the provided URL",
            )));
        }
    };

    let response = submit(
        &state,
        Submission {
            source: Source::Webhook,
            client_id,
            submission_id,
            file_name: fetched.file_name,
            content_type: fetched
                .content_type
                .unwrap_or_else(|| "application/octet-stream".to_string()),
            bytes: fetched.bytes,
            origin_url: Some(request.image_url),
            client_metadata: request.metadata,
        },
    )
    .await;

    Ok(Json(response))
}

/// Ingest an uploaded image
///
/// Accepts multipart/form-data with:
/// - file: the X-ray image
/// - metadata (optional): JSON object stored with the image
///
/// The `client-id` header is required; `submission-id` is optional.
#[utoipa::path(
    post,
    path = "/upload",
    tag = "Ingestion",
    params(
        ("client-id" = String, Header, description = "Client that owns the submission"),
        ("submission-id" = Option<String>, Header, description = "Submission id; generated when omitted")
    ),
    request_body(content_type = "multipart/form-data", description = "Image file in the 'file' field"),
    responses(
        (status = 200, description = "Ingestion outcome", body = IngestResponse),
        (status = 400, description = "Missing client-id header, no file, unsupported type or file too large")
    )
)]
pub async fn upload_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<Json<IngestResponse>, ApiError> {
    let client_id = header_value(&headers, "client-id")
        .ok_or_else(|| ApiError::bad_request("Header client_id is required"))?
        .to_string();
    validate_identifier("client_id", &client_id)?;
    let submission_id = resolve_submission_id(
        Source::Upload,
        &client_id,
        header_value(&headers, "submission-id"),
    )?;

    let mut fields = MultipartFields::parse(&mut multipart, state.max_file_size).await?;
    let file = fields.take_file()?;
    let client_metadata: Option<serde_json::Value> = fields.get_json("metadata")?;

    tracing::info!(
        client_id = %client_id,
        submission_id = %submission_id,
        size = file.data.len(),
        "Upload received"
    );

    let response = submit(
        &state,
        Submission {
            source: Source::Upload,
            client_id,
            submission_id,
            file_name: file.file_name.unwrap_or_else(|| "image".to_string()),
            content_type: file
                .content_type
                .unwrap_or_else(|| "application/octet-stream".to_string()),
            bytes: file.data,
            origin_url: None,
            client_metadata,
        },
    )
    .await;

    Ok(Json(response))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_generated_submission_id_format() {
        let id = generate_submission_id(Source::Upload, "clinic-7");
        let suffix = id.strip_prefix("upload_clinic-7_").unwrap();
        assert_eq!(suffix.len(), 32);
        assert!(suffix.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(id, generate_submission_id(Source::Upload, "clinic-7"));
    }

    #[test]
    fn test_supplied_submission_id_wins() {
        let id = resolve_submission_id(Source::Webhook, "c1", Some(" exam-1 ")).unwrap();
        assert_eq!(id, "exam-1");

        let generated = resolve_submission_id(Source::Webhook, "c1", Some("")).unwrap();
        assert!(generated.starts_with("webhook_c1_"));

        assert!(resolve_submission_id(Source::Webhook, "c1", Some("a/b")).is_err());
    }

    #[test]
    fn test_header_value_accepts_both_spellings() {
        let mut headers = HeaderMap::new();
        headers.insert("client_id", HeaderValue::from_static("clinic-7"));
        assert_eq!(header_value(&headers, "client-id"), Some("clinic-7"));

        let mut headers = HeaderMap::new();
        headers.insert("client-id", HeaderValue::from_static(" clinic-8 "));
        assert_eq!(header_value(&headers, "client-id"), Some("clinic-8"));

        assert_eq!(header_value(&HeaderMap::new(), "client-id"), None);
    }
}
