//! `bridge ask`: planning-agent questions.

use std::path::PathBuf;
use tracing::{debug, info};

use bridge::agent::{AgentInterface, RelayBackend};
use bridge::bridge_config::OutputFormat;
use bridge::config::Config;
use bridge::context::{ContextAggregator, ContextMode, Query, QueryOverrides, QueryType};
use bridge::docs::FsDocumentStore;
use bridge::errors::{AgentError, BridgeError};
use bridge::ledger::ProgressLedger;
use bridge::ui;

pub struct AskOptions {
    pub question: String,
    pub query_type: Option<QueryType>,
    pub context: ContextMode,
    pub format: Option<OutputFormat>,
    pub milestone: Option<String>,
    pub phase: Option<u32>,
    pub include_audit: bool,
    pub include_milestones: bool,
    pub include_source: Vec<PathBuf>,
}

pub async fn cmd_ask(config: &Config, options: AskOptions) -> Result<u8, BridgeError> {
    let format = options
        .format
        .unwrap_or(config.settings.output.default_format);

    match ask(config, options, format).await {
        Ok(code) => Ok(code),
        Err(err) => {
            if format == OutputFormat::Json {
                println!("{}", ui::format_failure(&err.to_string()));
            }
            Err(err)
        }
    }
}

async fn ask(config: &Config, options: AskOptions, format: OutputFormat) -> Result<u8, BridgeError> {
    if options.question.trim().is_empty() {
        return Err(AgentError::InvalidQuery("query text is empty".into()).into());
    }

    let milestone = super::resolve_milestone(config, options.milestone.as_deref())?
        .map(|file| file.id);

    let ledger_text = milestone.as_deref().and_then(|id| {
        ProgressLedger::new(&config.ledger_file)
            .view(id)
            .ok()
            .filter(|view| !view.records.is_empty())
            .map(|view| view.render())
    });

    let store = FsDocumentStore::new(config);
    let mut docs = store.snapshot(ledger_text)?;
    let sources: Vec<PathBuf> = options
        .include_source
        .iter()
        .map(|p| config.project_dir.join(p))
        .collect();
    store.load_sources(&mut docs, &sources)?;

    let query = Query::new(options.question, options.query_type)
        .with_milestone(milestone)
        .with_phase(options.phase)
        .with_overrides(QueryOverrides {
            mode: options.context,
            include_audit: options.include_audit,
            include_milestones: options.include_milestones,
            include_source: sources,
        });
    debug!(
        query_type = %query.query_type(),
        inferred = query.is_inferred(),
        milestone = ?query.milestone(),
        "query built"
    );

    let package = ContextAggregator::from_config(config).select(&query, &docs)?;
    info!(
        documents = ?package.document_names(),
        total_size = package.total_size,
        truncated = package.truncated,
        "context selected"
    );

    config.ensure_directories()?;
    let agent = AgentInterface::from_config(config)?;

    // The relay backend waits on a human, who needs the terminal.
    let spinner = (agent.backend_name() != RelayBackend::NAME)
        .then(|| ui::spinner("Waiting for the planning agent..."));

    let outcome = tokio::select! {
        result = agent.send(&query, &package) => Some(result),
        _ = tokio::signal::ctrl_c() => None,
    };
    if let Some(bar) = spinner {
        bar.finish_and_clear();
    }

    let Some(result) = outcome else {
        eprintln!("Interrupted; no response was recorded.");
        return Ok(130);
    };
    let response = result?;

    println!("{}", ui::format_response(&response, format)?);
    Ok(0)
}
