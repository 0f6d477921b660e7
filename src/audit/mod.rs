//! Interaction audit trail.
//!
//! Every attempt to reach the planning agent, successful or not, produces one
//! [`AuditEntry`] appended to `.bridge/logs/interactions.jsonl`.

pub mod logger;

pub use logger::AuditLog;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::context::QueryType;
use crate::util::excerpt;

/// Maximum characters kept from a query or response.
pub const EXCERPT_CHARS: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    Success,
    /// Transient failure, eligible for retry
    Failed,
    TimedOut,
    /// Rejected by the backend, never retried
    Rejected,
}

impl std::fmt::Display for AttemptOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AttemptOutcome::Success => write!(f, "success"),
            AttemptOutcome::Failed => write!(f, "failed"),
            AttemptOutcome::TimedOut => write!(f, "timed_out"),
            AttemptOutcome::Rejected => write!(f, "rejected"),
        }
    }
}

/// One line of the audit trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub actor: String,
    pub backend: String,
    pub query_type: QueryType,
    /// 1-based attempt number within one `send`
    pub attempt: u32,
    pub outcome: AttemptOutcome,
    pub query_excerpt: String,
    /// Response text on success, failure reason otherwise
    pub response_excerpt: String,
    pub context_used: Vec<String>,
    pub context_digest: String,
}

impl AuditEntry {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        actor: &str,
        backend: &str,
        query_type: QueryType,
        attempt: u32,
        outcome: AttemptOutcome,
        query: &str,
        response: &str,
        context_used: Vec<String>,
        context_digest: &str,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            actor: actor.to_string(),
            backend: backend.to_string(),
            query_type,
            attempt,
            outcome,
            query_excerpt: excerpt(query, EXCERPT_CHARS),
            response_excerpt: excerpt(response, EXCERPT_CHARS),
            context_used,
            context_digest: context_digest.to_string(),
        }
    }
}
