//! Error taxonomy shared by the generation and captioning paths.
//!
//! Nothing in the crate recovers from or retries these; they propagate
//! unchanged to whatever boundary invoked the operation.

use std::fmt::Display;
use std::path::PathBuf;

pub type Result<T, E = DiaryError> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum DiaryError {
    /// No caption survived sanitization, so there is nothing to summarize.
    #[error("no usable captions to summarize")]
    EmptyInput,

    /// The configured model directory does not exist.
    #[error("narrative model directory not found: {}", .0.display())]
    ModelNotFound(PathBuf),

    /// The model directory exists but its artifacts could not be loaded.
    #[error("failed to load narrative model: {0}")]
    ModelLoad(String),

    #[error("inference failed: {0}")]
    Inference(String),

    /// The caller abandoned the request while generation was in flight.
    #[error("generation cancelled")]
    Cancelled,

    #[error("API credential not configured: ${0} is unset")]
    MissingCredential(String),

    #[error("external service error: {0}")]
    ExternalService(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl DiaryError {
    pub fn inference(err: impl Display) -> Self {
        Self::Inference(err.to_string())
    }

    pub fn external(err: impl Display) -> Self {
        Self::ExternalService(err.to_string())
    }

    /// `true` when the caller should report "nothing found" rather than a failure.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::EmptyInput)
    }
}
