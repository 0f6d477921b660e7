use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use super::backend::{AgentBackend, BackendError};
use super::prompt::{Prompt, PromptKind};

/// Canned, deterministic answers without any network access.
#[derive(Debug, Default)]
pub struct StubBackend;

#[async_trait]
impl AgentBackend for StubBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    async fn complete(&self, prompt: &Prompt) -> Result<String, BackendError> {
        let documents = if prompt.documents.is_empty() {
            "(none)".to_string()
        } else {
            prompt.documents.join(", ")
        };
        let text = match prompt.kind {
            PromptKind::Question => format!(
                "[STUB RESPONSE]\nNo planning agent is connected (backend = \"stub\").\n\n{}\nContext documents: {}",
                prompt.request.trim(),
                documents
            ),
            PromptKind::Progress => format!(
                "[STUB ACKNOWLEDGMENT]\nProgress report received.\n\n{}",
                prompt.request.lines().take(6).collect::<Vec<_>>().join("\n").trim()
            ),
            PromptKind::StatusValidation => format!(
                "[STUB VALIDATION]\nStatus validation received. Context documents: {}",
                documents
            ),
        };
        Ok(text)
    }
}

/// One programmed outcome of a [`ScriptedBackend`].
#[derive(Debug, Clone)]
pub enum Scripted {
    Reply(String),
    Fail(BackendError),
    /// Never answers within the given time
    Hang(Duration),
}

/// Plays back a fixed sequence of outcomes; the last one repeats.
#[derive(Debug)]
pub struct ScriptedBackend {
    script: Mutex<VecDeque<Scripted>>,
    last: Scripted,
    calls: AtomicU32,
}

impl ScriptedBackend {
    pub fn new(script: Vec<Scripted>) -> Self {
        let last = script
            .last()
            .cloned()
            .unwrap_or_else(|| Scripted::Fail(BackendError::Transient("empty script".into())));
        Self {
            script: Mutex::new(script.into()),
            last,
            calls: AtomicU32::new(0),
        }
    }

    pub fn always(outcome: Scripted) -> Self {
        Self::new(vec![outcome])
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AgentBackend for ScriptedBackend {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn complete(&self, _prompt: &Prompt) -> Result<String, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = self
            .script
            .lock()
            .ok()
            .and_then(|mut s| s.pop_front())
            .unwrap_or_else(|| self.last.clone());

        match next {
            Scripted::Reply(text) => Ok(text),
            Scripted::Fail(err) => Err(err),
            Scripted::Hang(d) => {
                tokio::time::sleep(d).await;
                Err(BackendError::Transient("hung".into()))
            }
        }
    }
}
