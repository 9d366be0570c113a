//! Error handling.

use serde::{Deserialize, Serialize};
use std::error::Error;
use thiserror::Error;
use tracing::{event, Level};

/// Ray variance aggregation error type
///
/// This type encapsulates the various errors that may occur while building a partial result
/// index, merging rays and reporting. Each variant has a [Severity] which tells the driver
/// whether only the affected ray or the whole run must be abandoned.
#[derive(Debug, Error)]
pub enum AggregationError {
    /// Mismatching covariance for an already accumulated grid point pair (strict mode only)
    #[error(
        "covariance mismatch for pair ({row}, {col}): stored {stored}, received {received}"
    )]
    CovarianceMismatch {
        row: u32,
        col: u32,
        stored: f64,
        received: f64,
    },

    /// The same fragment was delivered more than once
    #[error("fragment {path} was already delivered (content digest {digest})")]
    DuplicateDelivery { path: String, digest: String },

    /// Attempt to register a ray that is already present in the catalog
    #[error("attempt to insert a previously defined ray: {ray}")]
    DuplicateRay { ray: String },

    /// An influence weight map needed by a merge was never set
    #[error("{endpoint} influence weights are not set for ray {ray}")]
    InfluenceWeightsUnset { ray: String, endpoint: &'static str },

    /// Error reading or writing a serialised index or report
    #[error("I/O error")]
    Io(#[from] std::io::Error),

    /// Error (de)serialising JSON ray definitions or reports
    #[error("invalid JSON document")]
    Json(#[from] serde_json::Error),

    /// A serialised index record could not be decoded
    #[error("malformed partial result record: {reason}")]
    MalformedRecord { reason: String },

    /// Error registering or encoding metrics
    #[error("metrics error")]
    Metrics(#[from] prometheus::Error),

    /// Error validating a ray definition (single error)
    #[error("ray definition is not valid")]
    RayDefinitionValidationSingle(#[from] validator::ValidationError),

    /// Error validating a ray definition (multiple errors)
    #[error("ray definition is not valid")]
    RayDefinitionValidation(#[from] validator::ValidationErrors),

    /// Resolved source does not belong to the ray
    #[error("source {received} cannot be resolved for ray {ray}")]
    SourceMismatch { ray: String, received: i64 },

    /// Merging a receiver-pair ray before its source was resolved
    #[error("source is not resolved for receiver-pair ray {ray}")]
    SourceUnresolved { ray: String },

    /// Error building the rayon thread pool
    #[error("failed to build thread pool")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    /// Error converting between integer types
    #[error(transparent)]
    TryFromInt(#[from] std::num::TryFromIntError),

    /// Unknown seismic phase name
    #[error("unknown seismic phase {name}")]
    UnknownPhase { name: String },
}

/// How far an error propagates through an aggregation run.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Only the affected ray is abandoned.
    Ray,
    /// The whole run is aborted.
    Run,
}

impl AggregationError {
    /// Returns the [Severity] of this error.
    pub fn severity(&self) -> Severity {
        match self {
            // Ray
            AggregationError::CovarianceMismatch { .. }
            | AggregationError::InfluenceWeightsUnset { .. }
            | AggregationError::SourceMismatch { .. }
            | AggregationError::SourceUnresolved { .. } => Severity::Ray,

            // Run
            AggregationError::DuplicateDelivery { .. }
            | AggregationError::DuplicateRay { .. }
            | AggregationError::Io(_)
            | AggregationError::Json(_)
            | AggregationError::MalformedRecord { .. }
            | AggregationError::Metrics(_)
            | AggregationError::RayDefinitionValidationSingle(_)
            | AggregationError::RayDefinitionValidation(_)
            | AggregationError::ThreadPool(_)
            | AggregationError::TryFromInt(_)
            | AggregationError::UnknownPhase { .. } => Severity::Run,
        }
    }

    /// Shorthand for a [AggregationError::MalformedRecord].
    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        AggregationError::MalformedRecord {
            reason: reason.into(),
        }
    }
}

/// Serialisable description of an error and its causes
///
/// Implements serde (de)serialise.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct ErrorReport {
    /// Main error message
    pub message: String,

    /// Severity of the error
    pub severity: Severity,

    /// Optional list of causes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub caused_by: Option<Vec<String>>,
}

impl From<&AggregationError> for ErrorReport {
    /// Convert from an `AggregationError` into an `ErrorReport`.
    fn from(error: &AggregationError) -> Self {
        let message = error.to_string();
        let mut caused_by = None;
        let mut current = error.source();
        while let Some(source) = current {
            let mut causes: Vec<String> = caused_by.unwrap_or_default();
            causes.push(source.to_string());
            caused_by = Some(causes);
            current = source.source();
        }
        // Remove duplicate entries.
        if let Some(caused_by) = caused_by.as_mut() {
            caused_by.dedup()
        }
        ErrorReport {
            message,
            severity: error.severity(),
            caused_by,
        }
    }
}

/// Log an error and its chain of causes.
///
/// Run-level errors are logged at ERROR, ray-level errors at WARN.
pub fn log_error_chain(error: &AggregationError) {
    match error.severity() {
        Severity::Run => {
            event!(Level::ERROR, "{}", error.to_string());
            let mut current = error.source();
            while let Some(source) = current {
                event!(Level::ERROR, "Caused by: {}", source.to_string());
                current = source.source();
            }
        }
        Severity::Ray => {
            event!(Level::WARN, "{}", error.to_string());
            let mut current = error.source();
            while let Some(source) = current {
                event!(Level::WARN, "Caused by: {}", source.to_string());
                current = source.source();
            }
        }
    }
}
