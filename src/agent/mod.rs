//! Communication with the planning agent.
//!
//! [`AgentInterface`] wraps a pluggable [`AgentBackend`] with the retry
//! policy, per-attempt timeout and audit trail. Backends:
//!
//! | Backend | Transport |
//! |---|---|
//! | [`StubBackend`] | canned answers, no network |
//! | [`RelayBackend`] | a human copies the prompt over and pastes the answer back |
//! | [`HttpBackend`] | generative-language HTTP API |

mod backend;
pub mod http;
mod prompt;
pub mod relay;
mod retry;
pub mod stub;

pub use backend::{AgentBackend, BackendError};
pub use http::HttpBackend;
pub use prompt::{PLANNING_AGENT_PERSONA, Prompt, PromptKind};
pub use relay::RelayBackend;
pub use retry::RetryPolicy;
pub use stub::{Scripted, ScriptedBackend, StubBackend};

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::audit::{AttemptOutcome, AuditEntry, AuditLog};
use crate::bridge_config::BackendKind;
use crate::config::Config;
use crate::context::{ContextPackage, Query, QueryType};
use crate::errors::AgentError;
use crate::ledger::ProgressRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    Success,
    Failure,
}

/// Answer from the planning agent. The payload is opaque text.
#[derive(Debug, Clone, Serialize)]
pub struct AgentResponse {
    pub status: ResponseStatus,
    #[serde(rename = "response")]
    pub payload: String,
    pub context_used: Vec<String>,
    pub timestamp: DateTime<Utc>,
    pub attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AgentResponse {
    /// Structured rendering of a failed call, for machine-readable output.
    pub fn failure(error: &AgentError, context: &ContextPackage) -> Self {
        let attempts = match error {
            AgentError::Unreachable { attempts, .. } | AgentError::Timeout { attempts, .. } => {
                *attempts
            }
            _ => 0,
        };
        Self {
            status: ResponseStatus::Failure,
            payload: String::new(),
            context_used: context.document_names(),
            timestamp: Utc::now(),
            attempts,
            error: Some(error.to_string()),
        }
    }
}

/// Build the backend selected in configuration.
pub fn build_backend(config: &Config) -> Result<Box<dyn AgentBackend>, AgentError> {
    let agent = &config.settings.agent;
    Ok(match agent.backend {
        BackendKind::Stub => Box::new(StubBackend),
        BackendKind::Relay => Box::new(RelayBackend::stdio()),
        BackendKind::Http => Box::new(HttpBackend::from_section(agent)?),
    })
}

/// Delivers requests to the planning agent, one at a time.
pub struct AgentInterface {
    backend: Box<dyn AgentBackend>,
    policy: RetryPolicy,
    timeout: Duration,
    audit: AuditLog,
    actor: String,
}

impl AgentInterface {
    pub fn new(
        backend: Box<dyn AgentBackend>,
        policy: RetryPolicy,
        timeout: Duration,
        audit: AuditLog,
        actor: impl Into<String>,
    ) -> Self {
        Self {
            backend,
            policy,
            timeout,
            audit,
            actor: actor.into(),
        }
    }

    pub fn from_config(config: &Config) -> Result<Self, AgentError> {
        let agent = &config.settings.agent;
        Ok(Self::new(
            build_backend(config)?,
            RetryPolicy::from_section(agent),
            Duration::from_secs(agent.timeout_secs),
            AuditLog::new(&config.audit_log),
            agent.actor.clone(),
        ))
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Ask a question. Malformed queries fail before any attempt.
    pub async fn send(&self, query: &Query, context: &ContextPackage) -> Result<AgentResponse, AgentError> {
        if query.text().trim().is_empty() {
            return Err(AgentError::InvalidQuery("query text is empty".into()));
        }
        let prompt = Prompt::question(query, context);
        self.dispatch(&prompt, query.query_type(), query.text(), context)
            .await
    }

    /// Report a recorded phase transition and collect the acknowledgement.
    pub async fn report_progress(
        &self,
        record: &ProgressRecord,
        context: &ContextPackage,
    ) -> Result<AgentResponse, AgentError> {
        let prompt = Prompt::progress(record, context);
        let summary = format!(
            "progress report: {} phase {} {}",
            record.milestone, record.phase, record.status
        );
        self.dispatch(&prompt, QueryType::Progress, &summary, context)
            .await
    }

    /// Ask the planning agent to validate the project state.
    pub async fn validate_status(&self, context: &ContextPackage) -> Result<AgentResponse, AgentError> {
        let prompt = Prompt::status_validation(context);
        self.dispatch(&prompt, QueryType::Status, "status validation request", context)
            .await
    }

    /// Deliver with retry and timeout. Every attempt is audited before the
    /// next step; an audit failure aborts the call.
    async fn dispatch(
        &self,
        prompt: &Prompt,
        query_type: QueryType,
        audit_text: &str,
        context: &ContextPackage,
    ) -> Result<AgentResponse, AgentError> {
        let max = self.policy.max_attempts;
        let mut all_timed_out = true;
        let mut last_reason = String::new();

        for attempt in 1..=max {
            debug!(attempt, max, backend = self.backend.name(), "sending to planning agent");
            let outcome = tokio::time::timeout(self.timeout, self.backend.complete(prompt)).await;

            match outcome {
                Ok(Ok(text)) => {
                    self.audit(query_type, attempt, AttemptOutcome::Success, audit_text, &text, context)?;
                    info!(attempt, "planning agent answered");
                    return Ok(AgentResponse {
                        status: ResponseStatus::Success,
                        payload: text,
                        context_used: context.document_names(),
                        timestamp: Utc::now(),
                        attempts: attempt,
                        error: None,
                    });
                }
                Ok(Err(BackendError::Rejected(reason))) => {
                    self.audit(query_type, attempt, AttemptOutcome::Rejected, audit_text, &reason, context)?;
                    return Err(AgentError::InvalidQuery(reason));
                }
                Ok(Err(BackendError::Transient(reason))) => {
                    self.audit(query_type, attempt, AttemptOutcome::Failed, audit_text, &reason, context)?;
                    warn!(attempt, max, reason = %reason, "planning agent attempt failed");
                    all_timed_out = false;
                    last_reason = reason;
                }
                Err(_) => {
                    let reason = format!("no answer within {}s", self.timeout.as_secs());
                    self.audit(query_type, attempt, AttemptOutcome::TimedOut, audit_text, &reason, context)?;
                    warn!(attempt, max, "planning agent attempt timed out");
                    last_reason = reason;
                }
            }

            if attempt < max {
                tokio::time::sleep(self.policy.delay_for(attempt)).await;
            }
        }

        if all_timed_out {
            Err(AgentError::Timeout {
                attempts: max,
                timeout_secs: self.timeout.as_secs(),
            })
        } else {
            Err(AgentError::Unreachable {
                attempts: max,
                reason: last_reason,
            })
        }
    }

    fn audit(
        &self,
        query_type: QueryType,
        attempt: u32,
        outcome: AttemptOutcome,
        query: &str,
        response: &str,
        context: &ContextPackage,
    ) -> Result<(), AgentError> {
        let entry = AuditEntry::new(
            &self.actor,
            self.backend.name(),
            query_type,
            attempt,
            outcome,
            query,
            response,
            context.document_names(),
            &context.digest,
        );
        self.audit.append(&entry)?;
        Ok(())
    }
}
