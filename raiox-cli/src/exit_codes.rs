//! Exit codes following sysexits.h conventions.
//!
//! Scripts can tell an unreadable file from an undecodable one, and both
//! from a model failure, without parsing stderr.

use raiox_core::RaioxError;

/// General error (catch-all).
pub const GENERAL_ERROR: i32 = 1;

/// Command line usage error (invalid arguments).
/// Maps to EX_USAGE from sysexits.h.
pub const USAGE_ERROR: i32 = 64;

/// Input is not a decodable image.
/// Maps to EX_DATAERR from sysexits.h.
pub const DATA_ERROR: i32 = 65;

/// Cannot open input file.
/// Maps to EX_NOINPUT from sysexits.h.
pub const INPUT_ERROR: i32 = 66;

/// Embedding model failure.
/// Maps to EX_SOFTWARE from sysexits.h.
pub const SOFTWARE_ERROR: i32 = 70;

/// Represents an exit code with optional error context.
pub struct ExitCode {
    pub code: i32,
    pub message: Option<String>,
}

impl ExitCode {
    pub fn from_anyhow(err: &anyhow::Error) -> Self {
        let message = format!("{err:#}");

        let raiox = err.chain().find_map(|cause| cause.downcast_ref::<RaioxError>());
        let code = match raiox {
            Some(RaioxError::DecodeError(_)) => DATA_ERROR,
            Some(RaioxError::InvalidArgument(_)) => USAGE_ERROR,
            Some(RaioxError::ModelError(_) | RaioxError::DimensionMismatch { .. }) => {
                SOFTWARE_ERROR
            }
            Some(_) => GENERAL_ERROR,
            None if err
                .chain()
                .any(|cause| cause.downcast_ref::<std::io::Error>().is_some()) =>
            {
                INPUT_ERROR
            }
            None => GENERAL_ERROR,
        };

        Self {
            code,
            message: Some(message),
        }
    }
}
