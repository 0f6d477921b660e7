//! `bridge status`: alignment check.

use tracing::warn;

use bridge::agent::AgentInterface;
use bridge::bridge_config::OutputFormat;
use bridge::config::Config;
use bridge::context::{ContextAggregator, Query, QueryType};
use bridge::docs::FsDocumentStore;
use bridge::drift::{DriftDetector, DriftReport};
use bridge::errors::BridgeError;
use bridge::ui;

/// Prints the drift report and exits with the verdict's code.
///
/// With `--verbose` the raw signals are printed too and the planning agent
/// is asked to validate the state; that request never changes the verdict.
pub async fn cmd_status(
    config: &Config,
    milestone: Option<&str>,
    format: Option<OutputFormat>,
) -> Result<u8, BridgeError> {
    let format = format.unwrap_or(config.settings.output.default_format);

    let detector = DriftDetector::new(config);
    let signals = detector.gather(milestone);
    let report = detector.evaluate(&signals);

    println!("{}", ui::format_report(&report, format)?);

    if config.verbose {
        println!();
        println!("{}", ui::format_signals(&signals, format)?);

        match validate_with_agent(config, &report).await {
            Ok(text) => {
                println!();
                println!("[PLANNING AGENT VALIDATION]\n{}\n[END VALIDATION]", text.trim_end());
            }
            Err(e) => {
                warn!(error = %e, "planning-agent validation unavailable");
                eprintln!("Note: planning-agent validation unavailable: {}", e);
            }
        }
    }

    Ok(report.verdict.exit_code())
}

async fn validate_with_agent(config: &Config, report: &DriftReport) -> Result<String, BridgeError> {
    let milestone = &report.summary.milestone;
    let ledger_text = bridge::ledger::ProgressLedger::new(&config.ledger_file)
        .view(milestone)
        .ok()
        .map(|view| view.render());

    let docs = FsDocumentStore::new(config).snapshot(ledger_text)?;
    let query = Query::new(
        format!("Validate the current state of milestone {}", milestone),
        Some(QueryType::Status),
    )
    .with_milestone(Some(milestone.clone()));
    let package = ContextAggregator::from_config(config).select(&query, &docs)?;

    config.ensure_directories()?;
    let agent = AgentInterface::from_config(config)?;
    let response = agent.validate_status(&package).await?;
    Ok(response.payload)
}
