//! Catalog read handlers

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::error::ApiError;
use crate::state::AppState;
use crate::store::ImplantRecord;

/// Default and maximum page size for catalog listing
pub const MAX_PAGE_SIZE: i64 = 100;

/// Pagination for `GET /implants`.
#[derive(Debug, Deserialize, IntoParams)]
pub struct ListImplantsQuery {
    /// Entries to skip (default: 0)
    #[serde(default)]
    pub skip: Option<i64>,
    /// Page size (default and maximum: 100)
    #[serde(default)]
    pub limit: Option<i64>,
}

/// One catalog implant.
#[derive(Debug, Serialize, ToSchema)]
pub struct ImplantResponse {
    #[schema(example = 42)]
    pub id: i64,
    #[schema(example = "Straumann BLT 4.1")]
    pub name: String,
    #[schema(example = "Straumann")]
    pub manufacturer: String,
    #[schema(example = "implants/42.png")]
    pub image_path: Option<String>,
    #[schema(example = "https://raiox.nyc3.digitaloceanspaces.com/implants/42.png")]
    pub image_url: Option<String>,
    #[schema(example = "2026-01-07T10:00:00Z")]
    pub created_at: String,
    #[schema(example = "2026-01-07T10:00:00Z")]
    pub updated_at: String,
}

impl From<ImplantRecord> for ImplantResponse {
    fn from(record: ImplantRecord) -> Self {
        Self {
            id: record.id,
            name: record.name,
            manufacturer: record.manufacturer,
            image_path: record.image_path,
            image_url: record.image_url,
            created_at: record.created_at.to_rfc3339(),
            updated_at: record.updated_at.to_rfc3339(),
        }
    }
}

/// Clamp pagination to `skip >= 0` and `1 <= limit <= 100`.
pub fn page_bounds(query: &ListImplantsQuery) -> (i64, i64) {
    let skip = query.skip.unwrap_or(0).max(0);
    let limit = query.limit.unwrap_or(MAX_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
    (skip, limit)
}

/// List catalog implants ordered by id.
#[utoipa::path(
    get,
    path = "/api/v1/implants",
    tag = "Catalog",
    params(ListImplantsQuery),
    responses(
        (status = 200, description = "Catalog page", body = [ImplantResponse]),
        (status = 503, description = "Store unavailable")
    )
)]
pub async fn list_implants_handler(
    State(state): State<AppState>,
    Query(query): Query<ListImplantsQuery>,
) -> Result<Json<Vec<ImplantResponse>>, ApiError> {
    let (skip, limit) = page_bounds(&query);
    let records = state.store.list_implants(skip, limit).await?;
    Ok(Json(records.into_iter().map(Into::into).collect()))
}

/// Get one catalog implant.
#[utoipa::path(
    get,
    path = "/api/v1/implants/{id}",
    tag = "Catalog",
    params(("id" = i64, Path, description = "Implant id")),
    responses(
        (status = 200, description = "Implant", body = ImplantResponse),
        (status = 404, description = "Implant not found"),
        (status = 503, description = "Store unavailable")
    )
)]
pub async fn get_implant_handler(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<ImplantResponse>, ApiError> {
    state
        .store
        .get_implant(id)
        .await?
        .map(|record| Json(record.into()))
        .ok_or_else(|| ApiError::not_found(format!("Implant {id} not found")))
}
