//! Error types for the retrieval pipeline

use thiserror::Error;

/// Result type alias using [`PipelineError`]
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Error type alias for convenience
pub type Error = PipelineError;

/// Main error type for the retrieval pipeline.
///
/// Only the fatal paths named in spec (original-query embedding failure,
/// primary/fan-out dense search failure, context cancellation) construct a
/// `Stage` value that escapes a stage function. Non-fatal failures
/// (expansion, tag search, additional embeddings, BM25, reranking) are
/// caught inside their stage, logged via `tracing::warn!`, and converted
/// into empty contributions — they never reach this type.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// A stage's required sub-task failed. `stage` names the stage that
    /// raised it so callers can tell which required capability broke
    /// without parsing the message.
    #[error("{stage}: {message}")]
    Stage {
        stage: &'static str,
        message: String,
    },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("external service error: {0}")]
    ExternalError(String),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl PipelineError {
    pub fn stage(stage: &'static str, message: impl Into<String>) -> Self {
        PipelineError::Stage {
            stage,
            message: message.into(),
        }
    }
}

/// Wrap a stage failure with the top-level envelope callers see:
/// `"retrieval failed: <cause>"`.
pub fn retrieval_failed(err: PipelineError) -> PipelineError {
    PipelineError::Stage {
        stage: "retrieval failed",
        message: err.to_string(),
    }
}
