use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::debug;

use super::query::{ContextMode, Query, QueryType};
use super::truncate::{Candidate, Fitted, fit};
use crate::bridge_config::TruncationStrategy;
use crate::config::Config;
use crate::docs::{Document, DocumentKind, DocumentSet};
use crate::errors::ContextError;

/// Characters counted per budget token.
pub const CHARS_PER_TOKEN: usize = 4;

/// One document as sent to the planning agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PackagedDocument {
    pub name: String,
    pub content: String,
}

/// Bounded bundle of documents sent with a query. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContextPackage {
    pub documents: Vec<PackagedDocument>,
    /// Total characters across all document contents
    pub total_size: usize,
    pub truncated: bool,
    /// Names of selected documents that were missing or dropped
    pub omitted: Vec<String>,
    /// SHA-256 over document names and contents
    pub digest: String,
}

impl ContextPackage {
    pub fn empty() -> Self {
        Self::from_documents(Vec::new(), false, Vec::new())
    }

    fn from_documents(documents: Vec<PackagedDocument>, truncated: bool, omitted: Vec<String>) -> Self {
        let total_size = documents.iter().map(|d| d.content.chars().count()).sum();
        let mut hasher = Sha256::new();
        for doc in &documents {
            hasher.update(doc.name.as_bytes());
            hasher.update([0u8]);
            hasher.update(doc.content.as_bytes());
            hasher.update([0u8]);
        }
        Self {
            documents,
            total_size,
            truncated,
            omitted,
            digest: format!("{:x}", hasher.finalize()),
        }
    }

    pub fn document_names(&self) -> Vec<String> {
        self.documents.iter().map(|d| d.name.clone()).collect()
    }
}

/// Document slots a query type can ask for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Architecture,
    Roadmap,
    Workflow,
    ActiveMilestone,
    Ledger,
}

fn base_slots(query_type: QueryType) -> &'static [Slot] {
    match query_type {
        QueryType::Architectural => &[Slot::Architecture, Slot::Roadmap, Slot::ActiveMilestone],
        QueryType::Implementation => &[Slot::ActiveMilestone, Slot::Architecture],
        QueryType::Progress | QueryType::Status => &[Slot::ActiveMilestone, Slot::Ledger],
    }
}

fn critical_slot(query_type: QueryType, milestone_known: bool) -> Slot {
    match query_type {
        QueryType::Architectural => Slot::Architecture,
        QueryType::Implementation if milestone_known => Slot::ActiveMilestone,
        QueryType::Implementation => Slot::Architecture,
        QueryType::Progress | QueryType::Status => Slot::ActiveMilestone,
    }
}

/// Selects and bounds the documentation sent with a query.
///
/// `select` is a pure function of the query, the document snapshot and the
/// aggregator's settings.
#[derive(Debug, Clone)]
pub struct ContextAggregator {
    budget_chars: usize,
    strategy: TruncationStrategy,
}

impl ContextAggregator {
    pub fn new(budget_chars: usize, strategy: TruncationStrategy) -> Self {
        Self {
            budget_chars,
            strategy,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.context_budget_chars(),
            config.settings.context.truncation_strategy,
        )
    }

    pub fn select(&self, query: &Query, docs: &DocumentSet) -> Result<ContextPackage, ContextError> {
        let query_type = query.query_type();
        let overrides = query.overrides();
        let milestone = query.milestone();
        let critical = critical_slot(query_type, milestone.is_some());

        let mut slots: Vec<Slot> = match overrides.mode {
            ContextMode::Minimal => vec![critical],
            ContextMode::Auto => base_slots(query_type).to_vec(),
            ContextMode::Full => {
                let mut s = base_slots(query_type).to_vec();
                s.extend([Slot::Roadmap, Slot::Workflow]);
                s
            }
        };
        dedup_in_order(&mut slots);

        let mut candidates: Vec<Candidate<'_>> = Vec::new();
        let mut omitted = Vec::new();

        for slot in slots {
            let is_critical = slot == critical;
            match resolve(slot, milestone, docs) {
                Some(doc) => candidates.push(Candidate {
                    doc,
                    critical: is_critical,
                }),
                None if is_critical => {
                    return Err(ContextError::MissingDocument {
                        name: slot_label(slot, milestone),
                        query_type,
                    });
                }
                None => {
                    debug!(slot = ?slot, "non-critical document missing, skipping");
                    omitted.push(slot_label(slot, milestone));
                }
            }
        }

        if overrides.include_milestones {
            candidates.extend(
                docs.other_milestones(milestone)
                    .map(|doc| Candidate { doc, critical: false }),
            );
        }
        if overrides.include_audit {
            candidates.extend(
                docs.of_kind(&DocumentKind::Audit)
                    .map(|doc| Candidate { doc, critical: false }),
            );
        }
        if !overrides.include_source.is_empty() {
            candidates.extend(
                docs.of_kind(&DocumentKind::Source)
                    .map(|doc| Candidate { doc, critical: false }),
            );
        }

        let fitted = fit(&candidates, self.budget_chars, self.strategy);
        let mut truncated = false;
        let mut documents = Vec::with_capacity(candidates.len());
        for (candidate, outcome) in candidates.iter().zip(fitted) {
            match outcome {
                Fitted::Whole(content) => documents.push(PackagedDocument {
                    name: candidate.doc.name.clone(),
                    content,
                }),
                Fitted::Cut(content) => {
                    truncated = true;
                    documents.push(PackagedDocument {
                        name: candidate.doc.name.clone(),
                        content,
                    });
                }
                Fitted::Dropped => {
                    truncated = true;
                    omitted.push(candidate.doc.name.clone());
                }
            }
        }

        let package = ContextPackage::from_documents(documents, truncated, omitted);
        debug!(
            query_type = %query_type,
            documents = package.documents.len(),
            size = package.total_size,
            budget = self.budget_chars,
            truncated = package.truncated,
            "context package assembled"
        );
        Ok(package)
    }
}

fn resolve<'a>(slot: Slot, milestone: Option<&str>, docs: &'a DocumentSet) -> Option<&'a Document> {
    match slot {
        Slot::Architecture => docs.get(&DocumentKind::Architecture),
        Slot::Roadmap => docs.get(&DocumentKind::Roadmap),
        Slot::Workflow => docs.get(&DocumentKind::Workflow),
        Slot::ActiveMilestone => milestone.and_then(|id| docs.milestone(id)),
        Slot::Ledger => docs.get(&DocumentKind::Ledger),
    }
}

fn slot_label(slot: Slot, milestone: Option<&str>) -> String {
    match slot {
        Slot::Architecture => "architecture".to_string(),
        Slot::Roadmap => "roadmap".to_string(),
        Slot::Workflow => "workflow".to_string(),
        Slot::ActiveMilestone => milestone
            .map(|m| format!("milestone {}", m))
            .unwrap_or_else(|| "active milestone".to_string()),
        Slot::Ledger => "progress ledger".to_string(),
    }
}

fn dedup_in_order(slots: &mut Vec<Slot>) {
    let mut seen = Vec::new();
    slots.retain(|s| {
        if seen.contains(s) {
            false
        } else {
            seen.push(*s);
            true
        }
    });
}
