use anyhow::{Context, Result};
use async_trait::async_trait;
use dialoguer::{Select, theme::ColorfulTheme};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, info};

use super::{DecisionPrompt, LoopDecision};

/// Always answers the same way; used for unattended runs.
#[derive(Debug, Clone, Copy)]
pub struct FixedDecision(pub LoopDecision);

#[async_trait]
impl DecisionPrompt for FixedDecision {
    async fn decide(&self, _cycles: u32) -> Result<LoopDecision> {
        Ok(self.0)
    }
}

type Answer = oneshot::Receiver<Result<LoopDecision>>;

/// Interactive restart-or-quit menu. Without an answer within `timeout`
/// (or when the menu is dismissed) the default applies.
///
/// The menu runs on a plain thread. A menu still open after a timeout is
/// kept and answers the next decision, so at most one menu owns the terminal
/// and nothing waits on it at shutdown.
#[derive(Debug)]
pub struct TerminalPrompt {
    default: LoopDecision,
    timeout: Option<Duration>,
    pending: Mutex<Option<Answer>>,
}

impl TerminalPrompt {
    pub fn new(default: LoopDecision, timeout: Option<Duration>) -> Self {
        Self {
            default,
            timeout,
            pending: Mutex::new(None),
        }
    }

    /// Wait for `prompt`'s answer, or for the menu left open by an earlier
    /// timeout if there is one.
    async fn decide_with<F>(&self, prompt: F) -> Result<LoopDecision>
    where
        F: FnOnce() -> Result<LoopDecision> + Send + 'static,
    {
        let answer = match self.take_pending() {
            Some(answer) => {
                debug!("reusing the open decision menu");
                answer
            }
            None => spawn_prompt(prompt)?,
        };

        match wait_for(answer, self.timeout).await {
            Waited::Answered(decision) => decision,
            Waited::TimedOut(answer) => {
                info!(decision = %self.default, "no decision before timeout, using default");
                if let Ok(mut pending) = self.pending.lock() {
                    *pending = Some(answer);
                }
                Ok(self.default)
            }
        }
    }

    fn take_pending(&self) -> Option<Answer> {
        self.pending.lock().ok().and_then(|mut pending| pending.take())
    }
}

enum Waited {
    Answered(Result<LoopDecision>),
    TimedOut(Answer),
}

fn spawn_prompt<F>(prompt: F) -> Result<Answer>
where
    F: FnOnce() -> Result<LoopDecision> + Send + 'static,
{
    let (tx, rx) = oneshot::channel();
    std::thread::Builder::new()
        .name("decision-prompt".into())
        .spawn(move || {
            // The receiver is gone once the loop has ended.
            let _ = tx.send(prompt());
        })
        .context("Failed to start decision prompt")?;
    Ok(rx)
}

async fn wait_for(mut answer: Answer, timeout: Option<Duration>) -> Waited {
    let received = match timeout {
        Some(limit) => match tokio::time::timeout(limit, &mut answer).await {
            Ok(received) => received,
            Err(_) => return Waited::TimedOut(answer),
        },
        None => answer.await,
    };
    Waited::Answered(
        received
            .context("Decision prompt ended without an answer")
            .and_then(|decision| decision),
    )
}

/// Menu index to decision; a dismissed menu means the default.
fn decision_for(selection: Option<usize>, default: LoopDecision) -> LoopDecision {
    match selection {
        Some(0) => LoopDecision::Restart,
        Some(_) => LoopDecision::Quit,
        None => default,
    }
}

fn ask(cycles: u32, default: LoopDecision) -> Result<LoopDecision> {
    let options = &["Restart with fresh context", "Quit"];
    let default_index = match default {
        LoopDecision::Restart => 0,
        LoopDecision::Quit => 1,
    };

    let selection = Select::with_theme(&ColorfulTheme::default())
        .with_prompt(format!(
            "Session ended without a handoff ({} completed). What next?",
            cycles
        ))
        .items(options)
        .default(default_index)
        .interact_opt()?;

    Ok(decision_for(selection, default))
}

#[async_trait]
impl DecisionPrompt for TerminalPrompt {
    async fn decide(&self, cycles: u32) -> Result<LoopDecision> {
        let default = self.default;
        self.decide_with(move || ask(cycles, default)).await
    }
}
