//! Rendering of outbound messages for the planning agent.

use crate::context::{ContextPackage, Query};
use crate::ledger::{PhaseStatus, ProgressRecord};

/// System instruction establishing the planning agent's role.
pub const PLANNING_AGENT_PERSONA: &str = "You are the lead architect (planning agent) of a two-agent development setup.

## Your Role
- Maintain the global project context: architecture, roadmap and milestone specifications
- Answer questions from the execution agent with concise, authoritative guidance
- Keep decisions consistent with the documented milestones

## Communication Style
- Lead with the decision or answer, 2-5 sentences is typical
- Give rationale only when it changes what the execution agent does
- Reference specific documents or milestones when relevant
- If clarification is needed, ask exactly one focused question

## Do Not
- Write the implementation yourself
- Propose major architectural changes without strong justification
- Pad answers with caveats";

/// What kind of message a prompt carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptKind {
    Question,
    Progress,
    StatusValidation,
}

/// A fully rendered request, ready for any backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub kind: PromptKind,
    pub system: String,
    /// Context sections followed by the request section
    pub body: String,
    /// The request section alone, without context
    pub request: String,
    /// Names of the documents rendered into the body
    pub documents: Vec<String>,
}

impl Prompt {
    fn new(kind: PromptKind, request: String, context: &ContextPackage) -> Self {
        let mut body = String::new();
        if !context.documents.is_empty() {
            body.push_str("## Project Context\n\n");
            for doc in &context.documents {
                body.push_str(&format!("=== {} ===\n{}\n\n", doc.name, doc.content.trim_end()));
            }
        }
        body.push_str(&request);

        Self {
            kind,
            system: PLANNING_AGENT_PERSONA.to_string(),
            body,
            request,
            documents: context.document_names(),
        }
    }

    pub fn question(query: &Query, context: &ContextPackage) -> Self {
        let mut request = String::from("## Question from Execution Agent\n\n");
        if let Some(m) = query.milestone() {
            request.push_str(&format!("(milestone {}", m));
            if let Some(p) = query.phase() {
                request.push_str(&format!(", phase {}", p));
            }
            request.push_str(")\n\n");
        }
        request.push_str(query.text().trim());
        request.push('\n');
        Self::new(PromptKind::Question, request, context)
    }

    pub fn progress(record: &ProgressRecord, context: &ContextPackage) -> Self {
        let mut request = format!(
            "## Progress Report\n\n**Milestone:** {}\n**Phase:** {}\n**Status:** {}\n",
            record.milestone, record.phase, record.status
        );
        if let Some(msg) = &record.message {
            request.push_str(&format!("**Details:** {}\n", msg));
        }
        request.push_str("\nPlease acknowledge this progress report and give guidance for the next step.\n");
        match record.status {
            PhaseStatus::Blocked => request.push_str("The phase is blocked: suggest how to resolve it.\n"),
            PhaseStatus::Review => request.push_str("The phase awaits review: note what should be validated.\n"),
            PhaseStatus::Done => {}
        }
        Self::new(PromptKind::Progress, request, context)
    }

    pub fn status_validation(context: &ContextPackage) -> Self {
        let request = "## Status Validation Request\n\n\
            Validate the current project state against the provided context.\n\
            Check for:\n\
            1. Alignment between version control and recorded progress\n\
            2. Drift from the milestone specification\n\
            3. Blockers that need attention\n\n\
            Give a concise assessment.\n"
            .to_string();
        Self::new(PromptKind::StatusValidation, request, context)
    }
}
