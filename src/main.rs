use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

use bridge::bridge_config::OutputFormat;
use bridge::config::Config;
use bridge::context::{ContextMode, QueryType};
use bridge::errors::BridgeError;
use bridge::ledger::PhaseStatus;

mod cmd;

#[derive(Parser)]
#[command(name = "bridge")]
#[command(
    version,
    about = "Coordination layer between a planning agent and an execution agent"
)]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true)]
    pub project_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Ask the planning agent a question, with relevant project documents attached
    Ask {
        /// The question
        question: String,

        /// Query type; inferred from the question when omitted
        #[arg(long = "type", value_enum)]
        query_type: Option<QueryType>,

        /// How much documentation to attach
        #[arg(long, value_enum, default_value_t = ContextMode::Auto)]
        context: ContextMode,

        #[arg(long, value_enum)]
        format: Option<OutputFormat>,

        /// Milestone to ask about (defaults to the current one)
        #[arg(long)]
        milestone: Option<String>,

        #[arg(long)]
        phase: Option<u32>,

        /// Attach the latest audit report
        #[arg(long)]
        include_audit: bool,

        /// Attach every milestone specification
        #[arg(long)]
        include_milestones: bool,

        /// Attach a source file (repeatable)
        #[arg(long = "include-source", value_name = "PATH")]
        include_source: Vec<PathBuf>,
    },
    /// Record a phase status change in the progress ledger
    Progress {
        #[arg(long, allow_negative_numbers = true)]
        phase: i64,

        #[arg(long, value_enum)]
        status: PhaseStatus,

        #[arg(short, long)]
        message: Option<String>,

        /// Milestone the phase belongs to (defaults to the current one)
        #[arg(long)]
        milestone: Option<String>,

        /// Skip notifying the planning agent
        #[arg(long)]
        no_notify: bool,

        #[arg(long, value_enum)]
        format: Option<OutputFormat>,
    },
    /// Check whether work is aligned with the current milestone
    Status {
        #[arg(long)]
        milestone: Option<String>,

        #[arg(long, value_enum)]
        format: Option<OutputFormat>,
    },
    /// Generate a fresh-session context document
    Handoff {
        #[arg(long, conflicts_with = "next")]
        milestone: Option<String>,

        /// Target the milestone after the current one
        #[arg(long)]
        next: bool,

        /// Include the latest audit summary
        #[arg(long)]
        include_audit: bool,

        /// Omit the architecture summary and shorten the audit
        #[arg(long)]
        compact: bool,

        /// Write to a file instead of stdout
        #[arg(short, long, conflicts_with = "auto")]
        output: Option<PathBuf>,

        /// Write to the handoff slot read by 'bridge loop'
        #[arg(long)]
        auto: bool,
    },
    /// Run execution sessions back to back, chaining handoff context
    Loop {
        /// Apply the configured default decision instead of prompting
        #[arg(long)]
        unattended: bool,

        /// Stop after this many sessions
        #[arg(long)]
        max_cycles: Option<u32>,
    },
    /// View or initialize configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Show the effective configuration
    Show,
    /// Validate the configuration file
    Validate,
    /// Create .bridge/bridge.toml with default settings
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let project_dir = match cli.project_dir.clone() {
        Some(dir) => dir,
        None => match std::env::current_dir() {
            Ok(dir) => dir,
            Err(e) => {
                bridge::ui::print_error(&BridgeError::Other(e.into()));
                return ExitCode::from(1);
            }
        },
    };

    // File logging only once the project has been initialized.
    let bridge_dir = project_dir.join(".bridge");
    let log_dir = bridge_dir.is_dir().then(|| bridge_dir.join("logs"));
    let _log_guard = bridge::logging::init(cli.verbose, log_dir.as_deref());

    let is_status = matches!(cli.command, Commands::Status { .. });
    match run(cli, &project_dir).await {
        Ok(code) => ExitCode::from(code),
        Err(err) => {
            tracing::debug!(error = ?err, "command failed");
            bridge::ui::print_error(&err);
            // A status check that cannot complete is reported as undetermined.
            let code = if is_status { 3 } else { err.exit_code() };
            ExitCode::from(code)
        }
    }
}

async fn run(cli: Cli, project_dir: &std::path::Path) -> Result<u8, BridgeError> {
    let config = Config::load(project_dir, cli.verbose)
        .map_err(|e| BridgeError::Config(format!("{:#}", e)))?;

    match cli.command {
        Commands::Ask {
            question,
            query_type,
            context,
            format,
            milestone,
            phase,
            include_audit,
            include_milestones,
            include_source,
        } => {
            cmd::cmd_ask(
                &config,
                cmd::AskOptions {
                    question,
                    query_type,
                    context,
                    format,
                    milestone,
                    phase,
                    include_audit,
                    include_milestones,
                    include_source,
                },
            )
            .await
        }
        Commands::Progress {
            phase,
            status,
            message,
            milestone,
            no_notify,
            format,
        } => {
            cmd::cmd_progress(
                &config,
                cmd::ProgressOptions {
                    phase,
                    status,
                    message,
                    milestone,
                    notify: !no_notify,
                    format,
                },
            )
            .await
        }
        Commands::Status { milestone, format } => {
            cmd::cmd_status(&config, milestone.as_deref(), format).await
        }
        Commands::Handoff {
            milestone,
            next,
            include_audit,
            compact,
            output,
            auto,
        } => cmd::cmd_handoff(
            &config,
            cmd::HandoffOptions {
                milestone,
                next,
                include_audit,
                compact,
                output,
                auto,
            },
        ),
        Commands::Loop {
            unattended,
            max_cycles,
        } => cmd::cmd_loop(&config, unattended, max_cycles).await,
        Commands::Config { command } => cmd::cmd_config(&config, command),
    }
}
