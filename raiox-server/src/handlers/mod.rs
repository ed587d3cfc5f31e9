//! HTTP request handlers
//!
//! This module contains all the request handlers for the API endpoints.

pub mod health;
pub mod implants;
pub mod ingest;
pub mod submissions;

pub use crate::state::AppState;
pub use health::{health, ready, HealthResponse, ReadyResponse};
pub use implants::{
    get_implant_handler, list_implants_handler, ImplantResponse, ListImplantsQuery,
};
pub use ingest::{upload_handler, webhook_handler, WebhookRequest};
pub use submissions::{get_submission_handler, SubmissionResponse, SubmissionResult};
