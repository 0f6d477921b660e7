//! Session supervisor ("infinity loop").
//!
//! Runs one execution-agent session at a time. When a session exits, a
//! handoff artifact in the [`HandoffSlot`] starts the next session with the
//! context it carries; without one, the user chooses between a fresh restart
//! and quitting.
//!
//! ```text
//! Idle -> ContextReady -> SessionRunning -> AwaitingHandoff
//!              ^                                  |
//!              |------- artifact found -----------|
//!              |                                  v
//!              +-------- restart ---------- UserDecision -- quit --> Terminated
//! ```
//!
//! Any state may move to `Terminated` on interrupt.

pub mod process;
pub mod prompt;

pub use process::{ProcessLauncher, ProcessSession};
pub use prompt::{FixedDecision, TerminalPrompt};

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::Config;
use crate::errors::{HandoffError, SupervisorError};
use crate::handoff::{self, HandoffContext, HandoffSlot, MilestoneTarget, RenderOptions};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum LoopState {
    Idle,
    ContextReady,
    SessionRunning,
    AwaitingHandoff,
    UserDecision,
    Terminated,
}

impl LoopState {
    fn can_transition_to(self, next: LoopState) -> bool {
        use LoopState::*;
        match (self, next) {
            (Terminated, _) => false,
            (_, Terminated) => true,
            (Idle, ContextReady)
            | (ContextReady, SessionRunning)
            | (SessionRunning, AwaitingHandoff)
            | (AwaitingHandoff, ContextReady)
            | (AwaitingHandoff, UserDecision)
            | (UserDecision, ContextReady) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for LoopState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            LoopState::Idle => "Idle",
            LoopState::ContextReady => "ContextReady",
            LoopState::SessionRunning => "SessionRunning",
            LoopState::AwaitingHandoff => "AwaitingHandoff",
            LoopState::UserDecision => "UserDecision",
            LoopState::Terminated => "Terminated",
        };
        f.write_str(name)
    }
}

/// Choice offered when a session ends without a handoff artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoopDecision {
    Restart,
    Quit,
}

impl std::fmt::Display for LoopDecision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoopDecision::Restart => write!(f, "restart"),
            LoopDecision::Quit => write!(f, "quit"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextOrigin {
    /// Consumed from the handoff slot
    Handoff,
    /// Generated from the current documentation and ledger
    Fresh,
}

/// Context handed to one execution session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionContext {
    pub origin: ContextOrigin,
    pub milestone: Option<String>,
    pub text: String,
}

impl SessionContext {
    pub fn from_handoff(handoff: HandoffContext) -> Self {
        Self {
            origin: ContextOrigin::Handoff,
            milestone: handoff.milestone,
            text: handoff.text,
        }
    }

    pub fn fresh(handoff: HandoffContext) -> Self {
        Self {
            origin: ContextOrigin::Fresh,
            ..Self::from_handoff(handoff)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationReason {
    UserQuit,
    Interrupted,
    MaxCycles,
}

#[derive(Debug, Clone, Serialize)]
pub struct Transition {
    pub from: LoopState,
    pub to: LoopState,
    pub at: DateTime<Utc>,
}

/// State of one supervisor run.
#[derive(Debug, Clone)]
pub struct LoopSession {
    /// Completed execution sessions
    pub cycles: u32,
    pub state: LoopState,
    pub last_context: Option<SessionContext>,
    pub history: Vec<Transition>,
    pub termination: Option<TerminationReason>,
}

impl Default for LoopSession {
    fn default() -> Self {
        Self::new()
    }
}

impl LoopSession {
    pub fn new() -> Self {
        Self {
            cycles: 0,
            state: LoopState::Idle,
            last_context: None,
            history: Vec::new(),
            termination: None,
        }
    }

    pub fn transition(&mut self, to: LoopState) -> Result<(), SupervisorError> {
        let from = self.state;
        if !from.can_transition_to(to) {
            return Err(SupervisorError::IllegalTransition {
                from: from.to_string(),
                to: to.to_string(),
            });
        }
        info!(from = %from, state = %to, cycles = self.cycles, "supervisor transition");
        self.history.push(Transition {
            from,
            to,
            at: Utc::now(),
        });
        self.state = to;
        Ok(())
    }

    fn terminate(&mut self, reason: TerminationReason) -> Result<(), SupervisorError> {
        self.transition(LoopState::Terminated)?;
        self.termination = Some(reason);
        Ok(())
    }

    /// States visited, starting with `Idle`.
    pub fn path(&self) -> Vec<LoopState> {
        std::iter::once(LoopState::Idle)
            .chain(self.history.iter().map(|t| t.to))
            .collect()
    }
}

/// How an execution session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionExit {
    pub code: Option<i32>,
}

/// Starts the execution agent. The supervisor knows nothing about what the
/// session does internally.
#[async_trait]
pub trait SessionLauncher: Send + Sync {
    async fn start(&self, context: &SessionContext) -> Result<Box<dyn RunningSession>>;
}

#[async_trait]
pub trait RunningSession: Send {
    async fn await_exit(&mut self) -> Result<SessionExit>;

    async fn cancel(&mut self) -> Result<()>;
}

/// Blocking restart-or-quit request.
#[async_trait]
pub trait DecisionPrompt: Send + Sync {
    async fn decide(&self, cycles: u32) -> Result<LoopDecision>;
}

/// Produces fresh context when no handoff artifact is available.
pub trait ContextSource: Send + Sync {
    fn fresh(&self) -> Result<SessionContext>;
}

/// Fresh context rendered for the current milestone.
pub struct MilestoneContextSource {
    config: Config,
}

impl MilestoneContextSource {
    pub fn new(config: &Config) -> Self {
        Self {
            config: config.clone(),
        }
    }
}

impl ContextSource for MilestoneContextSource {
    fn fresh(&self) -> Result<SessionContext> {
        let handoff = handoff::generate(
            &self.config,
            &MilestoneTarget::Current,
            RenderOptions::default(),
        )?;
        Ok(SessionContext::fresh(handoff))
    }
}

pub struct SessionSupervisor {
    slot: HandoffSlot,
    source: Box<dyn ContextSource>,
    launcher: Box<dyn SessionLauncher>,
    prompt: Box<dyn DecisionPrompt>,
    max_cycles: Option<u32>,
}

impl SessionSupervisor {
    pub fn new(
        slot: HandoffSlot,
        source: Box<dyn ContextSource>,
        launcher: Box<dyn SessionLauncher>,
        prompt: Box<dyn DecisionPrompt>,
    ) -> Self {
        Self {
            slot,
            source,
            launcher,
            prompt,
            max_cycles: None,
        }
    }

    pub fn with_max_cycles(mut self, max_cycles: Option<u32>) -> Self {
        self.max_cycles = max_cycles.filter(|m| *m > 0);
        self
    }

    /// Run until the user quits, `max_cycles` sessions have completed, or
    /// `cancel` fires. Slot reads happen synchronously between awaits, so an
    /// interrupt never lands in the middle of one.
    pub async fn run(&self, cancel: CancellationToken) -> Result<LoopSession, SupervisorError> {
        let mut session = LoopSession::new();

        if cancel.is_cancelled() {
            session.terminate(TerminationReason::Interrupted)?;
            return Ok(session);
        }

        let mut context = match self.take_handoff()? {
            Some(handoff) => SessionContext::from_handoff(handoff),
            None => self.source.fresh()?,
        };
        session.transition(LoopState::ContextReady)?;

        loop {
            session.last_context = Some(context.clone());
            session.transition(LoopState::SessionRunning)?;
            info!(
                origin = ?context.origin,
                milestone = ?context.milestone,
                cycle = session.cycles + 1,
                "starting execution session"
            );

            let mut running = self
                .launcher
                .start(&context)
                .await
                .map_err(SupervisorError::LaunchFailed)?;

            let exit = tokio::select! {
                exit = running.await_exit() => Some(exit),
                _ = cancel.cancelled() => None,
            };
            let Some(exit) = exit else {
                if let Err(e) = running.cancel().await {
                    warn!(error = %e, "failed to stop execution session");
                }
                session.terminate(TerminationReason::Interrupted)?;
                return Ok(session);
            };
            let exit = exit?;

            session.transition(LoopState::AwaitingHandoff)?;
            session.cycles += 1;
            info!(code = ?exit.code, cycles = session.cycles, "execution session exited");

            if cancel.is_cancelled() {
                session.terminate(TerminationReason::Interrupted)?;
                return Ok(session);
            }
            if let Some(max) = self.max_cycles
                && session.cycles >= max
            {
                session.terminate(TerminationReason::MaxCycles)?;
                return Ok(session);
            }

            if let Some(handoff) = self.take_handoff()? {
                session.transition(LoopState::ContextReady)?;
                context = SessionContext::from_handoff(handoff);
                continue;
            }

            session.transition(LoopState::UserDecision)?;
            let decision = tokio::select! {
                d = self.prompt.decide(session.cycles) => Some(d),
                _ = cancel.cancelled() => None,
            };
            match decision {
                None => {
                    session.terminate(TerminationReason::Interrupted)?;
                    return Ok(session);
                }
                Some(decision) => match decision? {
                    LoopDecision::Restart => {
                        session.transition(LoopState::ContextReady)?;
                        context = self.source.fresh()?;
                    }
                    LoopDecision::Quit => {
                        session.terminate(TerminationReason::UserQuit)?;
                        return Ok(session);
                    }
                },
            }
        }
    }

    /// Consume the artifact. A malformed one is consumed and ignored.
    fn take_handoff(&self) -> Result<Option<HandoffContext>, SupervisorError> {
        match self.slot.take() {
            Ok(handoff) => Ok(handoff),
            Err(e @ HandoffError::Malformed { .. }) => {
                warn!(error = %e, "discarding malformed handoff artifact");
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tempfile::tempdir;

    /// Numbered fresh contexts, so staleness is visible.
    struct CountingSource {
        calls: Arc<AtomicU32>,
    }

    impl ContextSource for CountingSource {
        fn fresh(&self) -> Result<SessionContext> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(SessionContext {
                origin: ContextOrigin::Fresh,
                milestone: Some("M1".into()),
                text: format!("fresh #{}", n),
            })
        }
    }

    /// What a fake session does before exiting.
    #[derive(Clone)]
    enum Script {
        Exit,
        /// Writes a handoff artifact, then exits
        Handoff(String),
        Hang,
    }

    struct FakeLauncher {
        slot: HandoffSlot,
        scripts: Mutex<VecDeque<Script>>,
        seen: Arc<Mutex<Vec<SessionContext>>>,
        cancelled: Arc<AtomicU32>,
    }

    struct FakeSession {
        slot: HandoffSlot,
        script: Script,
        cancelled: Arc<AtomicU32>,
    }

    #[async_trait]
    impl SessionLauncher for FakeLauncher {
        async fn start(&self, context: &SessionContext) -> Result<Box<dyn RunningSession>> {
            self.seen.lock().unwrap().push(context.clone());
            let script = self
                .scripts
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Script::Exit);
            Ok(Box::new(FakeSession {
                slot: self.slot.clone(),
                script,
                cancelled: self.cancelled.clone(),
            }))
        }
    }

    #[async_trait]
    impl RunningSession for FakeSession {
        async fn await_exit(&mut self) -> Result<SessionExit> {
            match &self.script {
                Script::Exit => {}
                Script::Handoff(text) => {
                    self.slot.write(&HandoffContext::new("M1", text.clone()))?;
                }
                Script::Hang => std::future::pending::<()>().await,
            }
            Ok(SessionExit { code: Some(0) })
        }

        async fn cancel(&mut self) -> Result<()> {
            self.cancelled.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct ScriptedPrompt(Mutex<VecDeque<LoopDecision>>);

    #[async_trait]
    impl DecisionPrompt for ScriptedPrompt {
        async fn decide(&self, _cycles: u32) -> Result<LoopDecision> {
            Ok(self
                .0
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(LoopDecision::Quit))
        }
    }

    struct Harness {
        _dir: tempfile::TempDir,
        slot: HandoffSlot,
        fresh_calls: Arc<AtomicU32>,
        seen: Arc<Mutex<Vec<SessionContext>>>,
        cancelled: Arc<AtomicU32>,
    }

    fn harness(scripts: Vec<Script>, decisions: Vec<LoopDecision>) -> (Harness, SessionSupervisor) {
        let dir = tempdir().unwrap();
        let slot = HandoffSlot::new(&dir.path().join(".bridge/next_context.md"));
        let fresh_calls = Arc::new(AtomicU32::new(0));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let cancelled = Arc::new(AtomicU32::new(0));

        let supervisor = SessionSupervisor::new(
            slot.clone(),
            Box::new(CountingSource {
                calls: fresh_calls.clone(),
            }),
            Box::new(FakeLauncher {
                slot: slot.clone(),
                scripts: Mutex::new(scripts.into()),
                seen: seen.clone(),
                cancelled: cancelled.clone(),
            }),
            Box::new(ScriptedPrompt(Mutex::new(decisions.into()))),
        );

        (
            Harness {
                _dir: dir,
                slot,
                fresh_calls,
                seen,
                cancelled,
            },
            supervisor,
        )
    }

    #[tokio::test]
    async fn test_restart_without_handoff_uses_fresh_context() {
        let (h, supervisor) = harness(
            vec![Script::Exit, Script::Exit],
            vec![LoopDecision::Restart, LoopDecision::Quit],
        );

        let session = supervisor.run(CancellationToken::new()).await.unwrap();

        assert_eq!(session.termination, Some(TerminationReason::UserQuit));
        assert_eq!(session.cycles, 2);
        assert_eq!(h.fresh_calls.load(Ordering::SeqCst), 2);
        let seen = h.seen.lock().unwrap();
        assert_eq!(seen[0].text, "fresh #1");
        assert_eq!(seen[1].text, "fresh #2");
        assert_eq!(seen[1].origin, ContextOrigin::Fresh);
    }

    #[tokio::test]
    async fn test_handoff_artifact_feeds_next_session() {
        let (h, supervisor) = harness(
            vec![Script::Handoff("resume at phase 3".into()), Script::Exit],
            vec![LoopDecision::Quit],
        );

        let session = supervisor.run(CancellationToken::new()).await.unwrap();

        assert_eq!(session.cycles, 2);
        let seen = h.seen.lock().unwrap();
        assert_eq!(seen[1].origin, ContextOrigin::Handoff);
        assert_eq!(seen[1].text, "resume at phase 3");
        assert_eq!(h.fresh_calls.load(Ordering::SeqCst), 1);
        assert!(!h.slot.is_present());
        assert_eq!(
            session.path(),
            vec![
                LoopState::Idle,
                LoopState::ContextReady,
                LoopState::SessionRunning,
                LoopState::AwaitingHandoff,
                LoopState::ContextReady,
                LoopState::SessionRunning,
                LoopState::AwaitingHandoff,
                LoopState::UserDecision,
                LoopState::Terminated,
            ]
        );
    }

    #[tokio::test]
    async fn test_startup_consumes_existing_artifact() {
        let (h, supervisor) = harness(vec![Script::Exit], vec![LoopDecision::Quit]);
        h.slot
            .write(&HandoffContext::new("M1", "left by the last run"))
            .unwrap();

        supervisor.run(CancellationToken::new()).await.unwrap();

        assert_eq!(h.seen.lock().unwrap()[0].text, "left by the last run");
        assert_eq!(h.fresh_calls.load(Ordering::SeqCst), 0);
        assert!(!h.slot.is_present());
    }

    #[tokio::test]
    async fn test_max_cycles_stops_the_loop() {
        let (h, supervisor) = harness(
            vec![Script::Handoff("a".into()), Script::Handoff("b".into())],
            vec![],
        );
        let supervisor = supervisor.with_max_cycles(Some(2));

        let session = supervisor.run(CancellationToken::new()).await.unwrap();

        assert_eq!(session.termination, Some(TerminationReason::MaxCycles));
        assert_eq!(session.cycles, 2);
        // the second session's artifact is left for the next run
        assert!(h.slot.is_present());
    }

    #[tokio::test]
    async fn test_interrupt_cancels_running_session() {
        let (h, supervisor) = harness(vec![Script::Hang], vec![]);
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let session = supervisor.run(cancel).await.unwrap();

        assert_eq!(session.termination, Some(TerminationReason::Interrupted));
        assert_eq!(session.cycles, 0);
        assert_eq!(h.cancelled.load(Ordering::SeqCst), 1);
        assert_eq!(session.state, LoopState::Terminated);
    }

    #[tokio::test]
    async fn test_malformed_artifact_falls_back_to_decision() {
        let (h, supervisor) = harness(vec![Script::Exit], vec![LoopDecision::Quit]);
        std::fs::create_dir_all(h.slot.path().parent().unwrap()).unwrap();
        std::fs::write(h.slot.path(), "").unwrap();

        let session = supervisor.run(CancellationToken::new()).await.unwrap();
        assert_eq!(h.fresh_calls.load(Ordering::SeqCst), 1);
        assert_eq!(session.termination, Some(TerminationReason::UserQuit));
    }

    #[test]
    fn test_illegal_transition_is_rejected() {
        let mut session = LoopSession::new();
        let err = session.transition(LoopState::SessionRunning).unwrap_err();
        assert!(matches!(err, SupervisorError::IllegalTransition { .. }));

        session.transition(LoopState::Terminated).unwrap();
        assert!(session.transition(LoopState::ContextReady).is_err());
    }

    #[test]
    fn test_every_state_may_terminate() {
        for state in [
            LoopState::Idle,
            LoopState::ContextReady,
            LoopState::SessionRunning,
            LoopState::AwaitingHandoff,
            LoopState::UserDecision,
        ] {
            assert!(state.can_transition_to(LoopState::Terminated));
        }
    }
}
