use anyhow::Result;
use serde_json::json;

use crate::bridge_config::OutputFormat;
use crate::drift::{DriftReport, Signals, Verdict};

pub fn format_report(report: &DriftReport, format: OutputFormat) -> Result<String> {
    if format == OutputFormat::Json {
        return Ok(serde_json::to_string_pretty(report)?);
    }

    let summary = &report.summary;
    let mut lines = vec![
        format!("[STATUS CHECK - {}]", report.verdict),
        format!("Milestone: {}", summary.milestone),
    ];

    if let Some(phase) = summary.current_phase {
        if summary.total_phases > 0 {
            lines.push(format!("Current Phase: {} of {}", phase, summary.total_phases));
        } else {
            lines.push(format!("Current Phase: {}", phase));
        }
    }
    if summary.completed_phases > 0 {
        lines.push(format!("Completed Phases: {}", summary.completed_phases));
    }
    if let Some(branch) = &summary.branch {
        lines.push(format!("Branch: {}", branch));
    }
    match summary.uncommitted {
        Some(0) => lines.push("Git Status: Clean".to_string()),
        Some(n) => lines.push(format!("Git Status: Modified ({} files)", n)),
        None => {}
    }
    if let Some(commit) = &summary.last_commit {
        lines.push(format!("Last Commit: {} \"{}\"", commit.id, commit.summary));
    }

    push_list(&mut lines, "Issues:", &report.issues);
    push_list(&mut lines, "Warnings:", &report.warnings);
    push_list(&mut lines, "Undetermined:", &report.reasons);

    match report.verdict {
        Verdict::Aligned => {}
        Verdict::Warning => lines.push("Recommendation: Review warnings before proceeding".into()),
        Verdict::Misaligned => lines.push(
            "Action Required: run 'bridge ask' for remediation guidance, then re-run 'bridge status'"
                .into(),
        ),
        Verdict::Undetermined => lines.push(
            "Recommendation: fix the unavailable signals above and re-run 'bridge status'".into(),
        ),
    }
    lines.push("[END STATUS]".to_string());

    let text = lines.join("\n");
    if format == OutputFormat::Markdown {
        return Ok(format!("```text\n{}\n```", text));
    }
    Ok(text)
}

fn push_list(lines: &mut Vec<String>, title: &str, items: &[String]) {
    if items.is_empty() {
        return;
    }
    lines.push(title.to_string());
    lines.extend(items.iter().map(|i| format!("  - {}", i)));
}

/// Raw signals, for `status --verbose`.
pub fn format_signals(signals: &Signals, format: OutputFormat) -> Result<String> {
    let vcs = match &signals.vcs {
        Ok(state) => json!({
            "branch": state.branch,
            "uncommitted": state.uncommitted,
            "head": state.head,
            "history_inspected": state.history.len(),
        }),
        Err(reason) => json!({ "unavailable": reason }),
    };
    let ledger = match &signals.ledger {
        Ok(view) => json!({
            "records": view.records.len(),
            "latest": view.latest.values().collect::<Vec<_>>(),
        }),
        Err(reason) => json!({ "unavailable": reason }),
    };
    let value = json!({ "vcs": vcs, "ledger": ledger, "docs": signals.docs });

    if format == OutputFormat::Json {
        return Ok(serde_json::to_string_pretty(&value)?);
    }

    let mut lines = vec!["[SIGNALS]".to_string()];
    match &signals.vcs {
        Ok(state) => {
            lines.push(format!(
                "VCS: branch {}, {} uncommitted, {} commits inspected",
                state.branch,
                state.uncommitted,
                state.history.len()
            ));
        }
        Err(reason) => lines.push(format!("VCS: unavailable ({})", reason)),
    }
    match &signals.ledger {
        Ok(view) => {
            lines.push(format!("Ledger: {} records", view.records.len()));
            lines.extend(view.render().lines().skip(1).map(|l| format!("  {}", l)));
        }
        Err(reason) => lines.push(format!("Ledger: unavailable ({})", reason)),
    }
    let docs = &signals.docs;
    lines.push(format!(
        "Docs: milestone {} spec {}, phases {:?}, architecture {}",
        docs.milestone,
        if docs.spec_present { "present" } else { "missing" },
        docs.phases,
        if docs.architecture_present { "present" } else { "missing" }
    ));
    lines.push("[END SIGNALS]".to_string());
    Ok(lines.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drift::{DocSignal, DriftSummary};
    use crate::ledger::LedgerView;
    use crate::tracker::CommitInfo;
    use chrono::Utc;

    fn report(verdict: Verdict, issues: &[&str], warnings: &[&str]) -> DriftReport {
        DriftReport {
            verdict,
            issues: issues.iter().map(|s| s.to_string()).collect(),
            warnings: warnings.iter().map(|s| s.to_string()).collect(),
            reasons: Vec::new(),
            summary: DriftSummary {
                milestone: "M2".into(),
                branch: Some("main".into()),
                uncommitted: Some(0),
                last_commit: Some(CommitInfo {
                    id: "abc1234".into(),
                    summary: "Phase 1: routes".into(),
                    time: Utc::now(),
                }),
                current_phase: Some(2),
                completed_phases: 1,
                total_phases: 3,
            },
        }
    }

    #[test]
    fn test_aligned_text() {
        let out = format_report(&report(Verdict::Aligned, &[], &[]), OutputFormat::Text).unwrap();
        assert_eq!(
            out,
            "[STATUS CHECK - ALIGNED]\nMilestone: M2\nCurrent Phase: 2 of 3\nCompleted Phases: 1\nBranch: main\nGit Status: Clean\nLast Commit: abc1234 \"Phase 1: routes\"\n[END STATUS]"
        );
    }

    #[test]
    fn test_misaligned_lists_issues_and_warnings() {
        let out = format_report(
            &report(
                Verdict::Misaligned,
                &["specification not found for milestone M2"],
                &["phase 3 is blocked"],
            ),
            OutputFormat::Text,
        )
        .unwrap();
        assert!(out.starts_with("[STATUS CHECK - MISALIGNED]"));
        assert!(out.contains("Issues:\n  - specification not found for milestone M2"));
        assert!(out.contains("Warnings:\n  - phase 3 is blocked"));
        assert!(out.contains("Action Required"));
    }

    #[test]
    fn test_json_report() {
        let out = format_report(&report(Verdict::Warning, &[], &["x"]), OutputFormat::Json).unwrap();
        let value: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(value["verdict"], "Warning");
        assert_eq!(value["summary"]["current_phase"], 2);
    }

    #[test]
    fn test_signals_with_unavailable_vcs() {
        let signals = Signals {
            vcs: Err("not a repository".into()),
            ledger: Ok(LedgerView {
                milestone: "M2".into(),
                ..LedgerView::default()
            }),
            docs: DocSignal {
                milestone: "M2".into(),
                spec_present: true,
                phases: vec![1, 2],
                architecture_present: false,
            },
        };
        let out = format_signals(&signals, OutputFormat::Text).unwrap();
        assert!(out.contains("VCS: unavailable (not a repository)"));
        assert!(out.contains("Ledger: 0 records"));
        assert!(out.contains("architecture missing"));
    }
}
