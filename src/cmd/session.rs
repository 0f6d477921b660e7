//! `bridge loop`: session supervisor.

use std::time::Duration;
use tokio_util::sync::CancellationToken;

use bridge::config::Config;
use bridge::errors::BridgeError;
use bridge::handoff::HandoffSlot;
use bridge::supervisor::{
    DecisionPrompt, FixedDecision, MilestoneContextSource, ProcessLauncher, SessionSupervisor,
    TerminalPrompt, TerminationReason,
};
use bridge::ui::icons;

/// Exits 0 when the loop ends normally and 130 when interrupted.
pub async fn cmd_loop(
    config: &Config,
    unattended: bool,
    max_cycles: Option<u32>,
) -> Result<u8, BridgeError> {
    let session = &config.settings.session;
    if session.command.trim().is_empty() {
        return Err(BridgeError::Config(
            "session.command is empty; set the execution agent command in bridge.toml".into(),
        ));
    }
    config.ensure_directories()?;

    let prompt: Box<dyn DecisionPrompt> = if unattended {
        Box::new(FixedDecision(session.default_decision))
    } else {
        Box::new(TerminalPrompt::new(
            session.default_decision,
            session.decision_timeout_secs.map(Duration::from_secs),
        ))
    };

    let supervisor = SessionSupervisor::new(
        HandoffSlot::new(&config.handoff_file),
        Box::new(MilestoneContextSource::new(config)),
        Box::new(ProcessLauncher::from_section(session, &config.project_dir)),
        prompt,
    )
    .with_max_cycles(max_cycles.or(session.max_cycles));

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    println!(
        "{}Supervising '{}' sessions (handoff slot: {})",
        icons::LOOP,
        session.command,
        config.handoff_file.display()
    );

    let outcome = supervisor.run(cancel).await?;

    let reason = match outcome.termination {
        Some(TerminationReason::UserQuit) | None => "quit",
        Some(TerminationReason::MaxCycles) => "cycle limit reached",
        Some(TerminationReason::Interrupted) => "interrupted",
    };
    println!(
        "{}Loop ended after {} session(s): {}",
        icons::LOOP,
        outcome.cycles,
        reason
    );

    Ok(match outcome.termination {
        Some(TerminationReason::Interrupted) => 130,
        _ => 0,
    })
}
