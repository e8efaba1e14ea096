use thiserror::Error;

#[derive(Debug, Error)]
pub enum QstashError {
    #[error("QStash returned status {status}: {message}")]
    ApiError { status: u16, message: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("failed to parse QStash response: {0}")]
    ParseError(String),
}
