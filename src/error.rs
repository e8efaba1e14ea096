use thiserror::Error;

use crate::qstash::QstashError;
use crate::sequence::ValidationError;

/// Errors surfaced by the CLI paths (trigger, validate).
///
/// The HTTP handler maps its own failures to status codes in `server`; tick
/// failures never reach this type.
#[derive(Debug, Error)]
pub enum StepflowError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("QStash error: {0}")]
    Qstash(#[from] QstashError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
