//! Error taxonomy for the claims pipeline and the result store.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while turning an upload into predictions.
///
/// `Date`, `NegativeStay`, `UnknownCategory` and `InvalidNumber` are
/// row-scoped and end up in a [`RowRejection`]; everything else aborts
/// the run.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("missing required column '{column}'")]
    Schema { column: String },

    #[error("row {row}: cannot parse '{value}' in column '{column}' as a date")]
    Date {
        row: usize,
        column: String,
        value: String,
    },

    #[error("row {row}: discharged on {discharged} before admission on {admitted}")]
    NegativeStay {
        row: usize,
        admitted: String,
        discharged: String,
    },

    #[error("row {row}: unrecognised value '{value}' in column '{column}'")]
    UnknownCategory {
        row: usize,
        column: String,
        value: String,
    },

    #[error("row {row}: '{value}' in column '{column}' is not a number")]
    InvalidNumber {
        row: usize,
        column: String,
        value: String,
    },

    #[error("{artifact} not found at {}", path.display())]
    ArtifactMissing { artifact: String, path: PathBuf },

    #[error("{artifact} at {} is unreadable or incompatible: {reason}", path.display())]
    ArtifactCorrupt {
        artifact: String,
        path: PathBuf,
        reason: String,
    },

    #[error("{artifact} does not fit the claim features: {reason}")]
    IncompatibleArtifact { artifact: String, reason: String },

    #[error("model inference failed: {0}")]
    ModelInference(String),

    #[error("malformed CSV: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    /// Whether the error only disqualifies a single row.
    pub fn is_row_scoped(&self) -> bool {
        matches!(
            self,
            PipelineError::Date { .. }
                | PipelineError::NegativeStay { .. }
                | PipelineError::UnknownCategory { .. }
                | PipelineError::InvalidNumber { .. }
        )
    }

    pub(crate) fn artifact_missing(artifact: &str, path: impl Into<PathBuf>) -> Self {
        PipelineError::ArtifactMissing {
            artifact: artifact.to_string(),
            path: path.into(),
        }
    }

    pub(crate) fn artifact_corrupt(
        artifact: &str,
        path: impl Into<PathBuf>,
        reason: impl ToString,
    ) -> Self {
        PipelineError::ArtifactCorrupt {
            artifact: artifact.to_string(),
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

/// A row excluded from scoring, with the reason.
#[derive(Debug)]
pub struct RowRejection {
    /// 1-based data row number (header excluded)
    pub row: usize,
    pub patient_id: String,
    pub reason: PipelineError,
}

/// Errors from the result store, authentication and analytics layers.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("database still locked after {attempts} attempts")]
    Locked { attempts: u32 },

    #[error("hospital name '{0}' already exists")]
    DuplicateHospital(String),

    #[error("invalid hospital name or password")]
    InvalidCredentials,

    #[error("stored password hash for '{0}' is not valid base64")]
    CorruptPasswordHash(String),

    #[error("new passwords do not match")]
    PasswordMismatch,

    #[error("{0} must not be empty")]
    EmptyField(&'static str),

    #[error("'{viewer}' is not allowed to access {resource}")]
    AccessDenied { viewer: String, resource: String },

    #[error("{0} not found")]
    NotFound(String),

    #[error("password hashing failed: {0}")]
    Hashing(#[from] bcrypt::BcryptError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}
