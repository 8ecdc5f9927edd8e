//! Error taxonomy shared by every decommission step.

use serde::{Deserialize, Serialize};

/// Errors surfaced by control-plane, host and local operations.
///
/// The variant decides how a caller reacts: `NotFound` means the target is
/// already gone (success), `Timeout` and `Remote` are retried within the owning
/// step's budget, `Local` aborts the node's workflow.
#[derive(Debug, thiserror::Error, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub enum VacateError {
    #[error("not_found: {0}")]
    NotFound(String),
    #[error("deadline exceeded: {0}")]
    Timeout(String),
    #[error("remote: {0}")]
    Remote(String),
    #[error("local: {0}")]
    Local(String),
    #[error("config: {0}")]
    Config(String),
    #[error("cancelled")]
    Cancelled,
}

pub type VacateResult<T> = Result<T, VacateError>;

impl VacateError {
    pub fn is_not_found(&self) -> bool { matches!(self, VacateError::NotFound(_)) }

    /// Transient failures worth another attempt.
    pub fn is_retryable(&self) -> bool { matches!(self, VacateError::Timeout(_) | VacateError::Remote(_)) }

    pub fn is_permanent(&self) -> bool { matches!(self, VacateError::Local(_) | VacateError::Config(_)) }
}

impl From<std::io::Error> for VacateError {
    fn from(e: std::io::Error) -> Self {
        VacateError::Local(e.to_string())
    }
}

impl From<tokio::time::error::Elapsed> for VacateError {
    fn from(e: tokio::time::error::Elapsed) -> Self {
        VacateError::Timeout(e.to_string())
    }
}
