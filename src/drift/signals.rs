//! The three independent inputs to drift reconciliation.

use serde::Serialize;

use crate::ledger::LedgerView;
use crate::tracker::RepoState;

/// What the documentation store says about a milestone.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DocSignal {
    pub milestone: String,
    pub spec_present: bool,
    /// Phase numbers defined by the milestone, in document order
    pub phases: Vec<u32>,
    pub architecture_present: bool,
}

/// Everything reconciliation needs. A signal that could not be gathered
/// carries the reason instead.
#[derive(Debug, Clone)]
pub struct Signals {
    pub vcs: Result<RepoState, String>,
    pub ledger: Result<LedgerView, String>,
    pub docs: DocSignal,
}
