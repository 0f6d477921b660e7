//! Progress ledger.
//!
//! An append-only JSON-lines log of phase status reports. The current status
//! of a phase is the most recently appended record for its
//! (milestone, phase) pair; nothing is ever rewritten.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::errors::LedgerError;
use crate::util::AppendGuard;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum PhaseStatus {
    Done,
    Blocked,
    Review,
}

impl std::fmt::Display for PhaseStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PhaseStatus::Done => write!(f, "done"),
            PhaseStatus::Blocked => write!(f, "blocked"),
            PhaseStatus::Review => write!(f, "review"),
        }
    }
}

impl std::str::FromStr for PhaseStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "done" => Ok(PhaseStatus::Done),
            "blocked" => Ok(PhaseStatus::Blocked),
            "review" => Ok(PhaseStatus::Review),
            _ => anyhow::bail!("Invalid status '{}'. Valid values: done, blocked, review", s),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressRecord {
    pub milestone: String,
    pub phase: u32,
    pub status: PhaseStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Returned once a record is durable.
#[derive(Debug, Clone, Serialize)]
pub struct RecordReceipt {
    pub record: ProgressRecord,
    /// Out-of-order and duplicate notices; the record is stored regardless
    pub warnings: Vec<String>,
}

/// Latest record per phase for one milestone.
#[derive(Debug, Clone, Default)]
pub struct LedgerView {
    pub milestone: String,
    pub latest: BTreeMap<u32, ProgressRecord>,
    /// Every record for the milestone, in append order
    pub records: Vec<ProgressRecord>,
}

impl LedgerView {
    pub fn status(&self, phase: u32) -> Option<PhaseStatus> {
        self.latest.get(&phase).map(|r| r.status)
    }

    pub fn is_done(&self, phase: u32) -> bool {
        self.status(phase) == Some(PhaseStatus::Done)
    }

    pub fn done_phases(&self) -> Vec<u32> {
        self.latest
            .values()
            .filter(|r| r.status == PhaseStatus::Done)
            .map(|r| r.phase)
            .collect()
    }

    /// Whether `phase` was reported `done` at any point, even if a later
    /// record moved it back to review or blocked.
    pub fn has_done_record(&self, phase: u32) -> bool {
        self.done_at(phase).is_some()
    }

    /// Time of the latest `done` record for `phase`.
    pub fn done_at(&self, phase: u32) -> Option<DateTime<Utc>> {
        self.records
            .iter()
            .rev()
            .find(|r| r.phase == phase && r.status == PhaseStatus::Done)
            .map(|r| r.timestamp)
    }

    /// Plain-text rendering used as the ledger document in context packages.
    pub fn render(&self) -> String {
        if self.latest.is_empty() {
            return format!("No progress recorded for {}.", self.milestone);
        }
        let mut out = format!("Progress for {}:\n", self.milestone);
        for record in self.latest.values() {
            out.push_str(&format!(
                "- Phase {}: {} ({})",
                record.phase,
                record.status,
                record.timestamp.format("%Y-%m-%d %H:%M UTC")
            ));
            if let Some(msg) = &record.message {
                out.push_str(&format!(" - {}", msg));
            }
            out.push('\n');
        }
        out
    }
}

/// File-backed progress ledger.
#[derive(Debug, Clone)]
pub struct ProgressLedger {
    path: PathBuf,
}

impl ProgressLedger {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append a record. Never rejects on ordering; out-of-order `done`
    /// reports come back as warnings on the receipt.
    ///
    /// The ordering and duplicate checks read the ledger while the append
    /// lock is held, so they see every record written before this one.
    pub fn record(
        &self,
        milestone: &str,
        phase: u32,
        status: PhaseStatus,
        message: Option<&str>,
    ) -> Result<RecordReceipt, LedgerError> {
        let mut guard = AppendGuard::acquire(&self.path).map_err(|source| self.io(source))?;

        let view = self.view(milestone)?;
        let mut warnings = Vec::new();

        if status == PhaseStatus::Done && phase > 1 && !view.has_done_record(phase - 1) {
            warnings.push(format!(
                "out-of-order phase: phase {} marked done before phase {}",
                phase,
                phase - 1
            ));
        }
        if view.status(phase) == Some(status) {
            warnings.push(format!(
                "duplicate report: phase {} is already {}",
                phase, status
            ));
        }

        let record = ProgressRecord {
            milestone: milestone.to_string(),
            phase,
            status,
            message: message.map(str::to_string).filter(|m| !m.trim().is_empty()),
            timestamp: Utc::now(),
        };

        let line = serde_json::to_string(&record)?;
        guard.append_line(&line).map_err(|source| self.io(source))?;
        drop(guard);

        debug!(milestone, phase, status = %status, "progress recorded");
        for w in &warnings {
            warn!(milestone, phase, "{}", w);
        }

        Ok(RecordReceipt { record, warnings })
    }

    /// Current status of a phase: the latest record for the pair.
    pub fn current_status(&self, milestone: &str, phase: u32) -> Result<Option<PhaseStatus>, LedgerError> {
        Ok(self.view(milestone)?.status(phase))
    }

    /// Every readable record, in append order.
    pub fn records(&self) -> Result<Vec<ProgressRecord>, LedgerError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(LedgerError::Io {
                    path: self.path.clone(),
                    source,
                });
            }
        };

        Ok(content
            .lines()
            .filter(|l| !l.trim().is_empty())
            .filter_map(|line| match serde_json::from_str::<ProgressRecord>(line) {
                Ok(r) => Some(r),
                Err(e) => {
                    warn!(path = %self.path.display(), error = %e, "skipping unreadable ledger line");
                    None
                }
            })
            .collect())
    }

    pub fn records_for(&self, milestone: &str) -> Result<Vec<ProgressRecord>, LedgerError> {
        Ok(self
            .records()?
            .into_iter()
            .filter(|r| r.milestone == milestone)
            .collect())
    }

    fn io(&self, source: std::io::Error) -> LedgerError {
        LedgerError::Io {
            path: self.path.clone(),
            source,
        }
    }

    pub fn view(&self, milestone: &str) -> Result<LedgerView, LedgerError> {
        let records = self.records_for(milestone)?;
        let mut latest = BTreeMap::new();
        for r in &records {
            latest.insert(r.phase, r.clone());
        }
        Ok(LedgerView {
            milestone: milestone.to_string(),
            latest,
            records,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn make_ledger() -> (ProgressLedger, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let ledger = ProgressLedger::new(&dir.path().join(".bridge/progress.jsonl"));
        (ledger, dir)
    }

    #[test]
    fn test_empty_ledger_has_no_status() {
        let (ledger, _dir) = make_ledger();
        assert!(ledger.current_status("M1", 1).unwrap().is_none());
        assert!(ledger.records().unwrap().is_empty());
    }

    #[test]
    fn test_latest_record_wins() {
        let (ledger, _dir) = make_ledger();
        ledger.record("M1", 1, PhaseStatus::Blocked, Some("waiting on schema")).unwrap();
        ledger.record("M1", 1, PhaseStatus::Review, None).unwrap();
        assert_eq!(ledger.current_status("M1", 1).unwrap(), Some(PhaseStatus::Review));
        ledger.record("M1", 1, PhaseStatus::Done, None).unwrap();
        assert_eq!(ledger.current_status("M1", 1).unwrap(), Some(PhaseStatus::Done));
        // nothing was rewritten
        assert_eq!(ledger.records().unwrap().len(), 3);
    }

    #[test]
    fn test_milestones_are_independent() {
        let (ledger, _dir) = make_ledger();
        ledger.record("M1", 1, PhaseStatus::Done, None).unwrap();
        ledger.record("M2", 1, PhaseStatus::Blocked, None).unwrap();
        assert_eq!(ledger.current_status("M1", 1).unwrap(), Some(PhaseStatus::Done));
        assert_eq!(ledger.current_status("M2", 1).unwrap(), Some(PhaseStatus::Blocked));
    }

    #[test]
    fn test_out_of_order_done_is_accepted_with_warning() {
        let (ledger, _dir) = make_ledger();
        let receipt = ledger.record("M1", 2, PhaseStatus::Done, None).unwrap();
        assert_eq!(
            receipt.warnings,
            vec!["out-of-order phase: phase 2 marked done before phase 1".to_string()]
        );
        assert_eq!(ledger.current_status("M1", 2).unwrap(), Some(PhaseStatus::Done));
    }

    #[test]
    fn test_done_then_reopened_predecessor_is_still_in_order() {
        let (ledger, _dir) = make_ledger();
        ledger.record("M1", 1, PhaseStatus::Done, None).unwrap();
        ledger.record("M1", 1, PhaseStatus::Review, None).unwrap();
        let receipt = ledger.record("M1", 2, PhaseStatus::Done, None).unwrap();
        assert!(receipt.warnings.is_empty(), "{:?}", receipt.warnings);

        let view = ledger.view("M1").unwrap();
        assert!(view.has_done_record(1));
        assert!(!view.is_done(1));
        assert!(view.done_at(1).is_some());
    }

    #[test]
    fn test_concurrent_duplicates_are_flagged_once() {
        let (ledger, _dir) = make_ledger();
        let handles: Vec<_> = (0..6)
            .map(|_| {
                let ledger = ledger.clone();
                std::thread::spawn(move || {
                    ledger.record("M1", 1, PhaseStatus::Done, None).unwrap().warnings
                })
            })
            .collect();
        let flagged = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|w| w.iter().any(|w| w.contains("duplicate")))
            .count();
        // every writer but the first sees an earlier done record
        assert_eq!(flagged, 5);
    }

    #[test]
    fn test_in_order_done_has_no_warning() {
        let (ledger, _dir) = make_ledger();
        assert!(ledger.record("M1", 1, PhaseStatus::Done, None).unwrap().warnings.is_empty());
        assert!(ledger.record("M1", 2, PhaseStatus::Done, None).unwrap().warnings.is_empty());
    }

    #[test]
    fn test_duplicate_is_accepted_and_flagged() {
        let (ledger, _dir) = make_ledger();
        ledger.record("M1", 1, PhaseStatus::Done, None).unwrap();
        let receipt = ledger.record("M1", 1, PhaseStatus::Done, None).unwrap();
        assert_eq!(receipt.warnings.len(), 1);
        assert!(receipt.warnings[0].contains("duplicate"));
    }

    #[test]
    fn test_torn_trailing_line_does_not_hide_records() {
        let (ledger, _dir) = make_ledger();
        ledger.record("M1", 1, PhaseStatus::Done, None).unwrap();
        let mut content = fs::read_to_string(ledger.path()).unwrap();
        content.push_str("{\"milestone\":\"M1\",\"pha");
        fs::write(ledger.path(), content).unwrap();
        assert_eq!(ledger.current_status("M1", 1).unwrap(), Some(PhaseStatus::Done));
    }

    #[test]
    fn test_recovery_after_restart() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("progress.jsonl");
        {
            let ledger = ProgressLedger::new(&path);
            ledger.record("M3", 1, PhaseStatus::Done, Some("schema in")).unwrap();
        }
        {
            let ledger = ProgressLedger::new(&path);
            let view = ledger.view("M3").unwrap();
            assert!(view.is_done(1));
            assert_eq!(view.latest[&1].message.as_deref(), Some("schema in"));
        }
    }

    #[test]
    fn test_concurrent_writers_do_not_corrupt() {
        let (ledger, _dir) = make_ledger();
        let handles: Vec<_> = (1..=4)
            .map(|phase| {
                let ledger = ledger.clone();
                std::thread::spawn(move || {
                    for _ in 0..10 {
                        ledger
                            .record("M1", phase, PhaseStatus::Review, Some(&"m".repeat(300)))
                            .unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(ledger.records().unwrap().len(), 40);
    }

    #[test]
    fn test_render_view() {
        let (ledger, _dir) = make_ledger();
        assert_eq!(ledger.view("M1").unwrap().render(), "No progress recorded for M1.");
        ledger.record("M1", 1, PhaseStatus::Done, Some("tables created")).unwrap();
        let text = ledger.view("M1").unwrap().render();
        assert!(text.contains("Phase 1: done"));
        assert!(text.contains("tables created"));
    }
}
