use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Pipeline aborted: {0}")]
    Abort(#[from] PipelineAbort),

    #[error("Run '{run_id}' not found")]
    RunNotFound { run_id: String },

    #[error("{column} value {value} does not fit an SQLite integer")]
    CountOverflow { column: &'static str, value: u64 },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type PipelineResult<T> = Result<T, PipelineError>;

/// Batch-level failures. Raising one of these publishes no output tables.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum PipelineAbort {
    #[error("{batch} batch is empty")]
    EmptyBatch { batch: String },

    #[error("{batch} batch has no usable rows ({rejected} rejected)")]
    NoUsableRows { batch: String, rejected: usize },
}

/// Per-row normalization failure. Never aborts the batch.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "error", rename_all = "snake_case")]
pub enum NormalizationError {
    #[error("missing primary key (ack_id)")]
    MissingPrimaryKey,
}

impl NormalizationError {
    pub fn code(&self) -> &'static str {
        match self {
            NormalizationError::MissingPrimaryKey => "missing_primary_key",
        }
    }
}
