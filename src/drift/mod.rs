//! Drift detection.
//!
//! Reconciles three independently gathered signals (version control, the
//! progress ledger, the documentation store) into a [`DriftReport`].
//! [`reconcile`] is pure so every combination can be tested without a live
//! repository; [`DriftDetector`] only does the gathering.

mod signals;

pub use signals::{DocSignal, Signals};

use chrono::{DateTime, TimeDelta, Utc};
use regex::Regex;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::LazyLock;
use tracing::debug;

use crate::bridge_config::DriftSection;
use crate::config::Config;
use crate::docs::{Milestone, find_current_milestone, find_milestone, normalize_id};
use crate::ledger::{LedgerView, PhaseStatus, ProgressLedger};
use crate::tracker::{CommitInfo, GitTracker};

static PHASE_MENTION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bphase\s*#?\s*(\d+)\b").expect("static regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum Verdict {
    Aligned,
    Undetermined,
    Warning,
    Misaligned,
}

impl Verdict {
    /// Exit code of the status command.
    pub fn exit_code(&self) -> u8 {
        match self {
            Verdict::Aligned => 0,
            Verdict::Warning => 1,
            Verdict::Misaligned => 2,
            Verdict::Undetermined => 3,
        }
    }
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Verdict::Aligned => write!(f, "ALIGNED"),
            Verdict::Warning => write!(f, "WARNING"),
            Verdict::Misaligned => write!(f, "MISALIGNED"),
            Verdict::Undetermined => write!(f, "UNDETERMINED"),
        }
    }
}

/// Context shown alongside the verdict.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DriftSummary {
    pub milestone: String,
    pub branch: Option<String>,
    pub uncommitted: Option<usize>,
    pub last_commit: Option<CommitInfo>,
    pub current_phase: Option<u32>,
    pub completed_phases: usize,
    pub total_phases: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DriftReport {
    pub verdict: Verdict,
    pub issues: Vec<String>,
    pub warnings: Vec<String>,
    /// Why a signal could not be gathered
    pub reasons: Vec<String>,
    pub summary: DriftSummary,
}

/// Lowest defined phase not yet done; the last phase once all are done.
pub fn current_phase(phases: &[u32], ledger: Option<&LedgerView>) -> Option<u32> {
    let mut sorted = phases.to_vec();
    sorted.sort_unstable();
    sorted.dedup();
    sorted
        .iter()
        .copied()
        .find(|&p| !ledger.map(|l| l.is_done(p)).unwrap_or(false))
        .or_else(|| sorted.last().copied())
}

fn mentions_phase(summary: &str, phase: u32) -> bool {
    PHASE_MENTION_RE
        .captures_iter(summary)
        .filter_map(|c| c.get(1)?.as_str().parse::<u32>().ok())
        .any(|n| n == phase)
}

fn has_commit_evidence(
    history: &[CommitInfo],
    phase: u32,
    done_at: DateTime<Utc>,
    previous_done_at: Option<DateTime<Utc>>,
    grace: TimeDelta,
) -> bool {
    // Bounds that fall outside chrono's range leave that side of the window open.
    let window_end = done_at.checked_add_signed(grace);
    let window_start = previous_done_at.and_then(|prev| prev.checked_sub_signed(grace));
    history.iter().any(|c| {
        if mentions_phase(&c.summary, phase) {
            return true;
        }
        let after_previous = window_start.map(|start| c.time > start).unwrap_or(true);
        let before_done = window_end.map(|end| c.time <= end).unwrap_or(true);
        after_previous && before_done
    })
}

fn grace_window(minutes: u64) -> TimeDelta {
    i64::try_from(minutes)
        .ok()
        .and_then(TimeDelta::try_minutes)
        .unwrap_or(TimeDelta::MAX)
}

/// Reconcile the gathered signals into a report.
pub fn reconcile(signals: &Signals, now: DateTime<Utc>, settings: &DriftSection) -> DriftReport {
    let docs = &signals.docs;
    let mut issues = Vec::new();
    let mut warnings = Vec::new();
    let mut reasons = Vec::new();

    if !docs.spec_present {
        issues.push(format!(
            "specification not found for milestone {}",
            docs.milestone
        ));
    } else if docs.phases.is_empty() {
        issues.push("current phase could not be identified".to_string());
    }

    let ledger = match &signals.ledger {
        Ok(view) => Some(view),
        Err(reason) => {
            reasons.push(format!("progress ledger unavailable: {}", reason));
            None
        }
    };
    let vcs = match &signals.vcs {
        Ok(state) => Some(state),
        Err(reason) => {
            reasons.push(format!("version control state unavailable: {}", reason));
            None
        }
    };

    if let Some(view) = ledger {
        let grace = grace_window(settings.evidence_grace_minutes);
        for record in view.latest.values() {
            let phase = record.phase;
            match record.status {
                PhaseStatus::Done => {
                    if phase > 1 && !view.has_done_record(phase - 1) {
                        issues.push(format!(
                            "out-of-order phase: phase {} marked done before phase {}",
                            phase,
                            phase - 1
                        ));
                    }
                    if docs.spec_present && !docs.phases.is_empty() && !docs.phases.contains(&phase) {
                        issues.push(format!(
                            "phase {} recorded in ledger but not defined in milestone",
                            phase
                        ));
                    }
                    if let Some(state) = vcs {
                        let previous = phase.checked_sub(1).and_then(|p| view.done_at(p));
                        if !has_commit_evidence(&state.history, phase, record.timestamp, previous, grace) {
                            issues.push(format!(
                                "phase {} marked done without commit evidence",
                                phase
                            ));
                        }
                    }
                }
                PhaseStatus::Blocked => warnings.push(format!("phase {} is blocked", phase)),
                PhaseStatus::Review => {}
            }
        }
    }

    if let Some(state) = vcs {
        if state.uncommitted > 0 {
            warnings.push(format!(
                "uncommitted changes detected ({} files)",
                state.uncommitted
            ));
        }
        // A threshold beyond chrono's range can never be exceeded.
        let limit = i64::try_from(settings.staleness_hours)
            .ok()
            .and_then(TimeDelta::try_hours);
        if let Some(head) = &state.head
            && let Some(limit) = limit
            && now.signed_duration_since(head.time) > limit
        {
            warnings.push(format!(
                "last commit is older than {} hours",
                settings.staleness_hours
            ));
        }
    }

    if !docs.architecture_present {
        warnings.push("architecture document missing".to_string());
    }

    let verdict = if !issues.is_empty() {
        Verdict::Misaligned
    } else if !warnings.is_empty() {
        Verdict::Warning
    } else if !reasons.is_empty() {
        Verdict::Undetermined
    } else {
        Verdict::Aligned
    };

    let summary = DriftSummary {
        milestone: docs.milestone.clone(),
        branch: vcs.map(|s| s.branch.clone()),
        uncommitted: vcs.map(|s| s.uncommitted),
        last_commit: vcs.and_then(|s| s.head.clone()),
        current_phase: current_phase(&docs.phases, ledger),
        completed_phases: ledger
            .map(|l| l.done_phases().iter().filter(|p| docs.phases.contains(p)).count())
            .unwrap_or(0),
        total_phases: docs.phases.len(),
    };

    DriftReport {
        verdict,
        issues,
        warnings,
        reasons,
        summary,
    }
}

/// Gathers live signals for a milestone and reconciles them.
pub struct DriftDetector {
    project_dir: PathBuf,
    milestones_dir: PathBuf,
    architecture_file: PathBuf,
    ledger: ProgressLedger,
    settings: DriftSection,
}

impl DriftDetector {
    pub fn new(config: &Config) -> Self {
        Self {
            project_dir: config.project_dir.clone(),
            milestones_dir: config.milestones_dir.clone(),
            architecture_file: config.architecture_file.clone(),
            ledger: ProgressLedger::new(&config.ledger_file),
            settings: config.settings.drift.clone(),
        }
    }

    /// Gather the three signals. `milestone` overrides the current milestone.
    pub fn gather(&self, milestone: Option<&str>) -> Signals {
        let docs = self.doc_signal(milestone);

        let ledger = self
            .ledger
            .view(&docs.milestone)
            .map_err(|e| e.to_string());

        let vcs = GitTracker::new(&self.project_dir)
            .and_then(|t| t.probe(self.settings.history_depth))
            .map_err(|e| format!("{:#}", e));

        Signals { vcs, ledger, docs }
    }

    pub fn check(&self, milestone: Option<&str>) -> DriftReport {
        self.evaluate(&self.gather(milestone))
    }

    /// Reconcile already-gathered signals against the configured thresholds.
    pub fn evaluate(&self, signals: &Signals) -> DriftReport {
        let report = reconcile(signals, Utc::now(), &self.settings);
        debug!(
            milestone = %report.summary.milestone,
            verdict = %report.verdict,
            issues = report.issues.len(),
            warnings = report.warnings.len(),
            "drift check complete"
        );
        report
    }

    fn doc_signal(&self, milestone: Option<&str>) -> DocSignal {
        let architecture_present = self.architecture_file.is_file();

        let file = match milestone {
            Some(reference) => find_milestone(&self.milestones_dir, reference),
            None => find_current_milestone(&self.milestones_dir),
        };
        let fallback_id = milestone
            .map(|r| normalize_id(r).unwrap_or_else(|| r.to_string()))
            .unwrap_or_else(|| "(none)".to_string());

        match file.ok().flatten() {
            Some(file) => match Milestone::load(&file) {
                Ok(parsed) => DocSignal {
                    milestone: file.id.clone(),
                    spec_present: true,
                    phases: parsed.phase_numbers(),
                    architecture_present,
                },
                Err(_) => DocSignal {
                    milestone: file.id.clone(),
                    spec_present: false,
                    phases: Vec::new(),
                    architecture_present,
                },
            },
            None => DocSignal {
                milestone: fallback_id,
                spec_present: false,
                phases: Vec::new(),
                architecture_present,
            },
        }
    }
}
