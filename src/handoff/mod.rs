//! Handoff between execution sessions.
//!
//! A completing session renders its resumption context with [`generate`] and
//! stores it in the [`HandoffSlot`]; the session supervisor consumes it
//! before starting the next session.

mod render;
mod slot;

pub use render::{HandoffInput, RenderOptions, render, summarize_architecture};
pub use slot::{HandoffContext, HandoffSlot};

use chrono::Utc;
use std::path::Path;
use tracing::{debug, warn};

use crate::config::Config;
use crate::docs::{self, Milestone, MilestoneFile};
use crate::errors::BridgeError;
use crate::ledger::ProgressLedger;

/// Which milestone a handoff is rendered for.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum MilestoneTarget {
    #[default]
    Current,
    /// The milestone after the current one, or the current one when the
    /// next has not been written yet
    Next,
    Named(String),
}

/// Resolve `target` against the milestones directory.
pub fn resolve_milestone(dir: &Path, target: &MilestoneTarget) -> Result<MilestoneFile, BridgeError> {
    match target {
        MilestoneTarget::Current => {
            docs::find_current_milestone(dir)?.ok_or(BridgeError::NoMilestones)
        }
        MilestoneTarget::Next => docs::next_milestone(dir)?.ok_or(BridgeError::NoMilestones),
        MilestoneTarget::Named(reference) => docs::find_milestone(dir, reference)?
            .ok_or_else(|| BridgeError::MilestoneNotFound(reference.clone())),
    }
}

/// Render the handoff context for `target` from the documentation store
/// and the ledger.
pub fn generate(
    config: &Config,
    target: &MilestoneTarget,
    options: RenderOptions,
) -> Result<HandoffContext, BridgeError> {
    let file = resolve_milestone(&config.milestones_dir, target)?;
    debug!(milestone = %file.id, path = %file.path.display(), "rendering handoff");
    let milestone = Milestone::load(&file)?;

    let architecture = read_optional(&config.architecture_file);
    let roadmap = read_optional(&config.roadmap_file);

    let audit = if options.include_audit {
        docs::FsDocumentStore::new(config)
            .latest_audit_report()
            .and_then(|path| {
                let name = path.file_name()?.to_string_lossy().to_string();
                Some((name, read_optional(&path)?))
            })
    } else {
        None
    };

    let ledger = match ProgressLedger::new(&config.ledger_file).view(&milestone.id) {
        Ok(view) => Some(view),
        Err(e) => {
            warn!(error = %e, "ledger unavailable, rendering phases without progress");
            None
        }
    };

    let text = render(
        &HandoffInput {
            milestone: &milestone,
            architecture: architecture.as_deref(),
            roadmap: roadmap.as_deref(),
            audit: audit.as_ref().map(|(n, c)| (n.as_str(), c.as_str())),
            ledger: ledger.as_ref(),
            generated: Utc::now(),
        },
        options,
    );

    Ok(HandoffContext::new(milestone.id, text))
}

fn read_optional(path: &Path) -> Option<String> {
    std::fs::read_to_string(path).ok()
}
