use std::path::PathBuf;

use orderline_core::OrderError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("import file {} does not exist", .0.display())]
    MissingFile(PathBuf),

    #[error(transparent)]
    Order(#[from] OrderError),

    #[error("malformed job payload: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("primary store write failed: {0:#}")]
    Store(anyhow::Error),

    #[error("ledger mirror write failed: {0:#}")]
    Mirror(anyhow::Error),

    #[error("primary store and ledger mirror both failed: store: {store:#}; mirror: {mirror:#}")]
    Both {
        store: anyhow::Error,
        mirror: anyhow::Error,
    },

    #[error("import service failed: {0:#}")]
    Import(anyhow::Error),
}

impl PipelineError {
    /// Whether running the same job again could succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            PipelineError::Order(err) => !err.is_permanent(),
            PipelineError::Payload(_) | PipelineError::MissingFile(_) => false,
            _ => true,
        }
    }
}
