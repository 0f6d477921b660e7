//! Rendering of the resumption context handed to the next execution session.

use chrono::{DateTime, Utc};
use regex::Regex;
use std::sync::LazyLock;

use crate::docs::Milestone;
use crate::ledger::{LedgerView, PhaseStatus};

const ARCHITECTURE_FALLBACK_CHARS: usize = 3000;
const AUDIT_COMPACT_CHARS: usize = 500;

static NUMBERED_SECTION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^##\s*([12])\.\s*(.+?)\s*$").expect("static regex"));

static AUDIT_SUMMARY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^##\s*(validation summary|summary|final status)\s*$").expect("static regex")
});

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderOptions {
    /// Shorter output for small context windows
    pub compact: bool,
    pub include_audit: bool,
}

/// Everything the renderer reads. Absent documents render as a placeholder.
#[derive(Debug, Clone, Copy)]
pub struct HandoffInput<'a> {
    pub milestone: &'a Milestone,
    pub architecture: Option<&'a str>,
    pub roadmap: Option<&'a str>,
    /// (file name, content) of the latest audit report
    pub audit: Option<(&'a str, &'a str)>,
    pub ledger: Option<&'a LedgerView>,
    pub generated: DateTime<Utc>,
}

pub fn render(input: &HandoffInput<'_>, options: RenderOptions) -> String {
    let mut sections = Vec::new();
    let milestone = input.milestone;

    sections.push(format!(
        "System prompt for the execution agent:\n\n\
         You are the **execution agent** of a two-agent development setup. The planning agent owns the documentation and answers your questions.\n\n\
         **Current Context:**\n\
         - **Current Milestone:** {} ({})\n\
         - **Generated:** {}\n",
        milestone.title,
        milestone.id,
        input.generated.format("%Y-%m-%d %H:%M UTC")
    ));

    if !milestone.objective.is_empty() {
        sections.push(format!("**Objective:**\n{}\n", milestone.objective));
    }

    if !options.compact {
        let summary = input
            .architecture
            .map(summarize_architecture)
            .unwrap_or_else(|| "(Architecture document not found)".to_string());
        sections.push(format!("---\n## Architecture Summary\n\n{}\n", summary));
    }

    sections.push(format!(
        "---\n## Current Roadmap\n\n{}\n",
        input
            .roadmap
            .map(str::trim)
            .unwrap_or("(Roadmap not found)")
    ));

    let checklist = phase_checklist(milestone, input.ledger);
    if !checklist.is_empty() {
        sections.push(format!("---\n## Current Milestone Phases\n\n{}\n", checklist));
    }

    if !milestone.success_criteria.is_empty() {
        let criteria: Vec<String> = milestone
            .success_criteria
            .iter()
            .map(|c| format!("- {}", c))
            .collect();
        sections.push(format!("---\n## Success Criteria\n\n{}\n", criteria.join("\n")));
    }

    if options.include_audit
        && let Some((name, content)) = input.audit
    {
        sections.push(format!(
            "---\n## Latest Audit Summary\n\n{}\n",
            summarize_audit(name, content, options.compact)
        ));
    }

    sections.push(COMMAND_PROTOCOLS.to_string());
    sections.push(INSTRUCTIONS.to_string());

    sections.join("\n")
}

/// Phase list annotated with the ledger's current status. Falls back to the
/// raw Phases section when no phase lines could be parsed.
fn phase_checklist(milestone: &Milestone, ledger: Option<&LedgerView>) -> String {
    if milestone.phases.is_empty() {
        return milestone.phases_text.trim().to_string();
    }

    milestone
        .phases
        .iter()
        .map(|phase| {
            let status = ledger.and_then(|l| l.status(phase.number));
            let done = matches!(status, Some(PhaseStatus::Done))
                || (status.is_none() && phase.checked);
            let mark = if done { "x" } else { " " };
            let note = match status {
                Some(PhaseStatus::Blocked) => " (blocked)",
                Some(PhaseStatus::Review) => " (review)",
                _ => "",
            };
            if phase.title.is_empty() {
                format!("- [{}] Phase {}{}", mark, phase.number, note)
            } else {
                format!("- [{}] Phase {}: {}{}", mark, phase.number, phase.title, note)
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Sections `## 1.` and `## 2.` of the architecture document, else its head.
pub fn summarize_architecture(content: &str) -> String {
    let mut sections: Vec<String> = Vec::new();
    let mut current: Option<(String, Vec<&str>)> = None;

    for line in content.lines() {
        if line.starts_with("##") && !line.starts_with("###") {
            if let Some((title, body)) = current.take() {
                sections.push(format!("## {}\n{}", title, body.join("\n").trim()));
            }
            if let Some(caps) = NUMBERED_SECTION_RE.captures(line) {
                current = Some((caps[2].to_string(), Vec::new()));
            }
            continue;
        }
        if line.starts_with("# ") {
            if let Some((title, body)) = current.take() {
                sections.push(format!("## {}\n{}", title, body.join("\n").trim()));
            }
            continue;
        }
        if let Some((_, body)) = current.as_mut() {
            body.push(line);
        }
    }
    if let Some((title, body)) = current {
        sections.push(format!("## {}\n{}", title, body.join("\n").trim()));
    }

    if sections.is_empty() {
        head(content, ARCHITECTURE_FALLBACK_CHARS)
    } else {
        sections.join("\n\n")
    }
}

fn summarize_audit(name: &str, content: &str, compact: bool) -> String {
    if !compact {
        return format!("[From {}]\n{}", name, content.trim());
    }

    let mut lines = content.lines();
    if let Some(heading) = lines.by_ref().find(|l| AUDIT_SUMMARY_RE.is_match(l)) {
        let body: Vec<&str> = lines.take_while(|l| !l.starts_with("## ")).collect();
        return format!("[From {}]\n{}\n{}", name, heading.trim(), body.join("\n").trim());
    }
    format!("[From {}]\n{}", name, head(content, AUDIT_COMPACT_CHARS))
}

fn head(content: &str, max: usize) -> String {
    if content.chars().count() <= max {
        return content.trim().to_string();
    }
    let cut: String = content.chars().take(max).collect();
    format!("{}...", cut)
}

const COMMAND_PROTOCOLS: &str = "---
## Command Protocols (Macros)

Use these shorthand commands to interact with the bridge:

| Macro | Expands To | Purpose |
|-------|------------|---------|
| `>> STATUS` | `bridge status` | Check alignment of ledger, history and documentation |
| `>> DONE` | `bridge progress --phase <N> --status done` | Report the current phase completed |
| `>> BLOCK` | `bridge progress --phase <N> --status blocked --message \"<reason>\"` | Report the current phase blocked |
| `>> ASK <query>` | `bridge ask \"<query>\"` | Ask the planning agent for guidance |
| `>> HANDOFF` | `bridge handoff --auto` | Prepare context for the next session, then exit |

**Note:** Replace `<N>` with the current phase number. After `>> HANDOFF`, exit the session immediately.
";

const INSTRUCTIONS: &str = "---
## Instructions

1. Review the context above to understand the current project state.
2. Check the milestone specification for the detailed phase tasks.
3. Use `>> STATUS` to verify alignment.
4. Use `>> ASK <query>` for clarifications from the planning agent.
5. Proceed with the current phase tasks.
6. Use `>> DONE` after completing each phase.
7. Use `>> HANDOFF` when the context window is exhausted or the milestone is complete.
";
