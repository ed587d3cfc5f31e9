use thiserror::Error;

#[derive(Error, Debug)]
pub enum RaioxError {
    #[error("Decode error: {0}")]
    DecodeError(String),

    #[error("Model error: {0}")]
    ModelError(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Dimension mismatch: expected {expected} components, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Persistence error: {0}")]
    PersistenceError(String),
}

impl RaioxError {
    /// Whether a fresh attempt with the same input may succeed once the
    /// underlying resource recovers.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ModelError(_) | Self::StoreUnavailable(_))
    }
}

pub type Result<T> = std::result::Result<T, RaioxError>;
