//! Request-level errors shared by every pipeline stage.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AnalysisError {
    /// Bad user input. Surfaced verbatim, never retried.
    #[error("validation error: {0}")]
    Validation(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AnalysisError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}

pub type AnalysisResult<T> = std::result::Result<T, AnalysisError>;
