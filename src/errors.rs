//! Typed error hierarchy for the bridge layer.
//!
//! Each subsystem owns one enum:
//! - `ContextError`: document selection for an outbound query
//! - `AgentError`: communication with the planning agent
//! - `AuditError`: persistence of the interaction audit trail
//! - `LedgerError`: the progress ledger
//! - `HandoffError`: the handoff slot
//! - `SupervisorError`: the session supervisor loop
//!
//! `BridgeError` is what command implementations surface; it carries the
//! exit code and remediation hint shown to the user.

use std::path::PathBuf;
use thiserror::Error;

use crate::context::QueryType;

/// Errors raised while assembling a context package.
#[derive(Debug, Error)]
pub enum ContextError {
    #[error("Required document '{name}' is missing for a {query_type} query")]
    MissingDocument { name: String, query_type: QueryType },

    #[error("Failed to read document at {path}: {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors from the planning-agent interface.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Planning agent unreachable after {attempts} attempt(s): {reason}")]
    Unreachable { attempts: u32, reason: String },

    #[error("Planning agent timed out on all {attempts} attempt(s) ({timeout_secs}s each)")]
    Timeout { attempts: u32, timeout_secs: u64 },

    #[error("Agent backend misconfigured: {0}")]
    Misconfigured(String),

    #[error(transparent)]
    Audit(#[from] AuditError),
}

/// Errors persisting the interaction audit trail.
#[derive(Debug, Error)]
pub enum AuditError {
    #[error("Failed to write audit log at {path}: {source}")]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read audit log at {path}: {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize audit entry: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Errors from the progress ledger.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Failed to access ledger at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize progress record: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Errors from the handoff slot.
#[derive(Debug, Error)]
pub enum HandoffError {
    #[error("Failed to access handoff artifact at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Handoff artifact at {path} is malformed: {reason}")]
    Malformed { path: PathBuf, reason: String },
}

/// Errors from the session supervisor.
#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("Illegal supervisor transition {from} -> {to}")]
    IllegalTransition { from: String, to: String },

    #[error("Failed to launch execution session: {0}")]
    LaunchFailed(#[source] anyhow::Error),

    #[error(transparent)]
    Handoff(#[from] HandoffError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Top-level error surfaced by the CLI commands.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error(transparent)]
    Agent(#[from] AgentError),

    #[error(transparent)]
    Context(#[from] ContextError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Handoff(#[from] HandoffError),

    #[error(transparent)]
    Supervisor(#[from] SupervisorError),

    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("Phase {phase} not found in milestone {milestone}")]
    PhaseNotFound { milestone: String, phase: u32 },

    #[error("Milestone {0} not found")]
    MilestoneNotFound(String),

    #[error("No milestone specifications found")]
    NoMilestones,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl BridgeError {
    /// Exit code for the query and progress commands.
    pub fn exit_code(&self) -> u8 {
        match self {
            BridgeError::Agent(AgentError::InvalidQuery(_)) => 2,
            BridgeError::Agent(AgentError::Misconfigured(_)) => 2,
            BridgeError::Agent(_) => 1,
            BridgeError::InvalidArguments(_) | BridgeError::Config(_) => 2,
            BridgeError::Context(_)
            | BridgeError::PhaseNotFound { .. }
            | BridgeError::MilestoneNotFound(_)
            | BridgeError::NoMilestones => 3,
            BridgeError::Ledger(_)
            | BridgeError::Handoff(_)
            | BridgeError::Supervisor(_)
            | BridgeError::Other(_) => 1,
        }
    }

    /// Remediation suggestion printed under the error, when one exists.
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            BridgeError::Agent(AgentError::Unreachable { .. })
            | BridgeError::Agent(AgentError::Timeout { .. }) => Some(
                "check the [agent] backend settings or raise retry_count / timeout_secs",
            ),
            BridgeError::Agent(AgentError::InvalidQuery(_)) => {
                Some("pass a non-empty question, e.g. bridge ask \"Which storage layer?\"")
            }
            BridgeError::Agent(AgentError::Audit(_)) => {
                Some("make .bridge/logs writable; interactions are not confirmed until audited")
            }
            BridgeError::Agent(AgentError::Misconfigured(_)) | BridgeError::Config(_) => {
                Some("run 'bridge config show' to inspect the effective configuration")
            }
            BridgeError::Context(ContextError::MissingDocument { .. }) => {
                Some("create the document or use --milestone to select an existing milestone")
            }
            BridgeError::PhaseNotFound { .. } => {
                Some("check the Phases section of the milestone specification")
            }
            BridgeError::MilestoneNotFound(_) | BridgeError::NoMilestones => {
                Some("milestone files are expected as docs/01_milestones/M<n>_<name>.md")
            }
            BridgeError::Supervisor(SupervisorError::LaunchFailed(_)) => {
                Some("check [session] command and args in .bridge/bridge.toml")
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unreachable_maps_to_exit_one() {
        let err: BridgeError = AgentError::Unreachable {
            attempts: 3,
            reason: "connection refused".into(),
        }
        .into();
        assert_eq!(err.exit_code(), 1);
        assert!(err.to_string().contains("3 attempt"));
        assert!(err.hint().is_some());
    }

    #[test]
    fn invalid_query_maps_to_exit_two() {
        let err: BridgeError = AgentError::InvalidQuery("empty".into()).into();
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn context_and_phase_errors_map_to_exit_three() {
        let missing: BridgeError = ContextError::MissingDocument {
            name: "ARCHITECTURE.md".into(),
            query_type: QueryType::Architectural,
        }
        .into();
        assert_eq!(missing.exit_code(), 3);

        let phase = BridgeError::PhaseNotFound {
            milestone: "M2".into(),
            phase: 9,
        };
        assert_eq!(phase.exit_code(), 3);
        assert!(phase.to_string().contains("Phase 9"));
    }

    #[test]
    fn audit_failure_is_reported_as_agent_failure() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only");
        let err: BridgeError = AgentError::Audit(AuditError::WriteFailed {
            path: PathBuf::from(".bridge/logs/interactions.jsonl"),
            source: io_err,
        })
        .into();
        assert_eq!(err.exit_code(), 1);
        match &err {
            BridgeError::Agent(AgentError::Audit(AuditError::WriteFailed { source, .. })) => {
                assert_eq!(source.kind(), std::io::ErrorKind::PermissionDenied);
            }
            _ => panic!("Expected Agent(Audit(WriteFailed))"),
        }
    }

    #[test]
    fn all_error_types_implement_std_error_trait() {
        fn assert_std_error<E: std::error::Error>(_: &E) {}
        assert_std_error(&AgentError::InvalidQuery("x".into()));
        assert_std_error(&HandoffError::Malformed {
            path: PathBuf::from("x"),
            reason: "y".into(),
        });
        assert_std_error(&SupervisorError::IllegalTransition {
            from: "Idle".into(),
            to: "SessionRunning".into(),
        });
        assert_std_error(&BridgeError::NoMilestones);
    }
}
