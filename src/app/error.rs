use thiserror::Error;

use crate::infra::gateway::GatewayError;

/// Service-level failure taxonomy. Per-token delivery failures are not
/// errors; they are converted into token-health updates and counted in the
/// dispatch result.
#[derive(Debug, Error)]
pub enum SendError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    NotFound(String),
    /// The transport failed before producing per-token outcomes. The caller
    /// may retry the whole dispatch; no token health was mutated.
    #[error("gateway unavailable: {0}")]
    Gateway(#[from] GatewayError),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl SendError {
    pub fn validation(message: impl Into<String>) -> Self {
        SendError::Validation(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        SendError::NotFound(message.into())
    }
}
