//! `bridge progress`: phase status reports.

use tracing::{info, warn};

use bridge::agent::AgentInterface;
use bridge::bridge_config::OutputFormat;
use bridge::config::Config;
use bridge::context::{ContextAggregator, Query, QueryType};
use bridge::docs::{FsDocumentStore, Milestone};
use bridge::errors::BridgeError;
use bridge::ledger::{PhaseStatus, ProgressLedger};
use bridge::ui;

pub struct ProgressOptions {
    pub phase: i64,
    pub status: PhaseStatus,
    pub message: Option<String>,
    pub milestone: Option<String>,
    pub notify: bool,
    pub format: Option<OutputFormat>,
}

pub async fn cmd_progress(config: &Config, options: ProgressOptions) -> Result<u8, BridgeError> {
    let format = options
        .format
        .unwrap_or(config.settings.output.default_format);

    let phase = u32::try_from(options.phase)
        .ok()
        .filter(|p| *p >= 1)
        .ok_or_else(|| {
            BridgeError::InvalidArguments(format!(
                "phase must be a positive integer, got {}",
                options.phase
            ))
        })?;

    let file = super::resolve_milestone(config, options.milestone.as_deref())?
        .ok_or(BridgeError::NoMilestones)?;
    let milestone = Milestone::load(&file)?;
    // Milestones without a parsable phase list accept any phase number.
    if !milestone.phases.is_empty() && milestone.phase(phase).is_none() {
        return Err(BridgeError::PhaseNotFound {
            milestone: milestone.id,
            phase,
        });
    }

    config.ensure_directories()?;
    let ledger = ProgressLedger::new(&config.ledger_file);
    let message = options.message.as_deref().filter(|m| !m.trim().is_empty());
    let receipt = ledger.record(&milestone.id, phase, options.status, message)?;
    info!(
        milestone = %milestone.id,
        phase,
        status = %options.status,
        "progress recorded"
    );

    if !(options.notify && config.settings.agent.notify_progress) {
        println!("{}", ui::format_receipt(&receipt, None, format)?);
        return Ok(0);
    }

    let view = ledger.view(&milestone.id)?;
    let docs = FsDocumentStore::new(config).snapshot(Some(view.render()))?;
    let query = Query::new(
        format!("Phase {} of {} is now {}", phase, milestone.id, options.status),
        Some(QueryType::Progress),
    )
    .with_milestone(Some(milestone.id.clone()))
    .with_phase(Some(phase));
    let package = ContextAggregator::from_config(config).select(&query, &docs)?;

    let agent = AgentInterface::from_config(config)?;
    match agent.report_progress(&receipt.record, &package).await {
        Ok(ack) => {
            println!("{}", ui::format_receipt(&receipt, Some(&ack), format)?);
            Ok(0)
        }
        Err(err) => {
            warn!(error = %err, "progress notification failed");
            println!("{}", ui::format_receipt(&receipt, None, format)?);
            eprintln!(
                "Progress was persisted locally in {}; the planning agent was not notified.",
                config.ledger_file.display()
            );
            Err(err.into())
        }
    }
}
