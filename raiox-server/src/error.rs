//! API error handling module
//!
//! Provides a unified error type for all API endpoints with structured error variants.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use raiox_core::RaioxError;
use thiserror::Error;

/// API error type with structured variants for different error categories
#[derive(Debug, Error)]
pub enum ApiError {
    /// Bad request - client provided invalid input
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Not found - requested resource does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Internal server error - unexpected server-side failure
    #[error("Internal error: {0}")]
    Internal(String),

    /// Service unavailable - required service is not configured or available
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    /// Raiox core error - error from embedding, ranking or persistence
    #[error("Raiox error: {0}")]
    Raiox(#[from] RaioxError),
}

impl ApiError {
    /// Create a bad request error
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    /// Create a not found error
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    /// Create an internal server error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Create a service unavailable error
    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::ServiceUnavailable(message.into())
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Raiox(ref e) => match e {
                // Client-provided invalid input → 400
                RaioxError::DecodeError(_) | RaioxError::InvalidArgument(_) => {
                    StatusCode::BAD_REQUEST
                }

                // Backend unreachable → 503
                RaioxError::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,

                // Internal processing failures → 500
                RaioxError::ModelError(_)
                | RaioxError::DimensionMismatch { .. }
                | RaioxError::PersistenceError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    /// Get the error code for programmatic error handling
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::BadRequest(_) => "INVALID_INPUT",
            Self::NotFound(_) => "NOT_FOUND",
            Self::Internal(_) => "INTERNAL_ERROR",
            Self::ServiceUnavailable(_) => "SERVICE_UNAVAILABLE",
            Self::Raiox(ref e) => raiox_error_code(e),
        }
    }

    /// Get sanitized error message for client response
    pub fn client_message(&self) -> String {
        match self {
            Self::Raiox(ref e) => raiox_client_message(e),
            _ => self.to_string(),
        }
    }

    /// Get the error category for logging
    fn error_category(&self) -> &'static str {
        match self {
            Self::BadRequest(_) => "bad_request",
            Self::NotFound(_) => "not_found",
            Self::Internal(_) => "internal",
            Self::ServiceUnavailable(_) => "service_unavailable",
            Self::Raiox(_) => "raiox",
        }
    }
}

/// Stable code for a core error, shared by error bodies and pipeline logs.
pub fn raiox_error_code(error: &RaioxError) -> &'static str {
    match error {
        RaioxError::DecodeError(_) => "DECODE_ERROR",
        RaioxError::ModelError(_) => "MODEL_ERROR",
        RaioxError::InvalidArgument(_) => "INVALID_ARGUMENT",
        RaioxError::DimensionMismatch { .. } => "DIMENSION_MISMATCH",
        RaioxError::StoreUnavailable(_) => "STORE_UNAVAILABLE",
        RaioxError::PersistenceError(_) => "PERSISTENCE_ERROR",
    }
}

/// Client-facing description of a core error, without backend details.
pub fn raiox_client_message(error: &RaioxError) -> String {
    match error {
        RaioxError::DecodeError(_) => "The uploaded file could not be decoded as an image".into(),
        RaioxError::ModelError(_) => "Embedding generation failed".into(),
        RaioxError::InvalidArgument(msg) => format!("Invalid argument: {msg}"),
        RaioxError::DimensionMismatch { expected, actual } => {
            format!("Embedding has {actual} components, expected {expected}")
        }
        RaioxError::StoreUnavailable(_) => "Vector store is unavailable".into(),
        RaioxError::PersistenceError(_) => "Failed to persist the submission".into(),
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let category = self.error_category();
        let code = self.error_code();
        let internal_message = self.to_string();
        let client_message = self.client_message();

        // Log based on severity, always including internal details
        match &self {
            Self::BadRequest(_) | Self::NotFound(_) => {
                tracing::warn!(
                    status = %status,
                    category = category,
                    code = code,
                    error = %internal_message,
                    "Client error"
                );
            }
            Self::ServiceUnavailable(_) => {
                tracing::warn!(
                    status = %status,
                    category = category,
                    code = code,
                    error = %internal_message,
                    "Service unavailable"
                );
            }
            Self::Internal(_) => {
                tracing::error!(
                    status = %status,
                    category = category,
                    code = code,
                    error = %internal_message,
                    "Server error"
                );
            }
            Self::Raiox(_) => {
                tracing::error!(
                    status = %status,
                    category = category,
                    code = code,
                    error = %internal_message,
                    client_message = %client_message,
                    "Raiox error (internal details logged)"
                );
            }
        }

        let body = serde_json::json!({
            "error": client_message,
            "code": code,
        });

        (status, Json(body)).into_response()
    }
}
