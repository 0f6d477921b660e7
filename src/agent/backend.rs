use async_trait::async_trait;
use thiserror::Error;

use super::prompt::Prompt;

/// Failure of a single delivery attempt.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    /// Worth retrying: connection problems, overload, empty answers
    #[error("{0}")]
    Transient(String),

    /// The backend refused the request itself; retrying cannot help
    #[error("{0}")]
    Rejected(String),
}

/// Transport to the planning agent.
///
/// Implementations deliver one prompt per call and know nothing about
/// retries, timeouts or auditing; [`super::AgentInterface`] owns those.
#[async_trait]
pub trait AgentBackend: Send + Sync {
    /// Short name recorded in the audit trail.
    fn name(&self) -> &'static str;

    async fn complete(&self, prompt: &Prompt) -> Result<String, BackendError>;
}
