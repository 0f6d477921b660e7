use async_trait::async_trait;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;

use super::backend::{AgentBackend, BackendError};
use super::prompt::Prompt;

const BEGIN_MARKER: &str = "===== BEGIN PROMPT FOR PLANNING AGENT =====";
const END_MARKER: &str = "===== END PROMPT =====";

type Reader = Box<dyn AsyncBufRead + Unpin + Send>;
type Writer = Box<dyn AsyncWrite + Unpin + Send>;

/// Relay through a human: the prompt is printed for copy-paste into the
/// planning agent and the answer is read back, terminated by a line holding
/// only `.` or by end of input.
pub struct RelayBackend {
    input: Mutex<Reader>,
    output: Mutex<Writer>,
}

impl RelayBackend {
    pub const NAME: &'static str = "relay";

    pub fn new(input: Reader, output: Writer) -> Self {
        Self {
            input: Mutex::new(input),
            output: Mutex::new(output),
        }
    }

    /// Prompt on stderr, answer from stdin.
    pub fn stdio() -> Self {
        Self::new(
            Box::new(BufReader::new(tokio::io::stdin())),
            Box::new(tokio::io::stderr()),
        )
    }

    async fn show(&self, prompt: &Prompt) -> std::io::Result<()> {
        let mut out = self.output.lock().await;
        let framed = format!(
            "{}\n[System instruction]\n{}\n\n{}\n{}\nPaste the planning agent's answer, then a line containing only '.':\n",
            BEGIN_MARKER,
            prompt.system,
            prompt.body.trim_end(),
            END_MARKER
        );
        out.write_all(framed.as_bytes()).await?;
        out.flush().await
    }

    async fn read_answer(&self) -> std::io::Result<String> {
        let mut input = self.input.lock().await;
        let mut answer = String::new();
        let mut line = String::new();
        loop {
            line.clear();
            if input.read_line(&mut line).await? == 0 {
                break;
            }
            if line.trim_end_matches(['\r', '\n']) == "." {
                break;
            }
            answer.push_str(&line);
        }
        Ok(answer.trim().to_string())
    }
}

#[async_trait]
impl AgentBackend for RelayBackend {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    async fn complete(&self, prompt: &Prompt) -> Result<String, BackendError> {
        self.show(prompt)
            .await
            .map_err(|e| BackendError::Transient(format!("failed to display prompt: {}", e)))?;
        let answer = self
            .read_answer()
            .await
            .map_err(|e| BackendError::Transient(format!("failed to read answer: {}", e)))?;
        if answer.is_empty() {
            return Err(BackendError::Transient("no answer was relayed".into()));
        }
        Ok(answer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{ContextPackage, Query};
    use std::io::Cursor;

    fn prompt() -> Prompt {
        Prompt::question(&Query::new("Which cache?", None), &ContextPackage::empty())
    }

    #[tokio::test]
    async fn test_reads_until_dot_line() {
        let input = Cursor::new(b"Use Redis.\nKeep TTLs short.\n.\nignored\n".to_vec());
        let backend = RelayBackend::new(Box::new(input), Box::new(tokio::io::sink()));
        let answer = backend.complete(&prompt()).await.unwrap();
        assert_eq!(answer, "Use Redis.\nKeep TTLs short.");
    }

    #[tokio::test]
    async fn test_reads_until_eof() {
        let input = Cursor::new(b"Use SQLite".to_vec());
        let backend = RelayBackend::new(Box::new(input), Box::new(tokio::io::sink()));
        assert_eq!(backend.complete(&prompt()).await.unwrap(), "Use SQLite");
    }

    #[tokio::test]
    async fn test_empty_answer_is_transient() {
        let input = Cursor::new(b".\n".to_vec());
        let backend = RelayBackend::new(Box::new(input), Box::new(tokio::io::sink()));
        assert!(matches!(
            backend.complete(&prompt()).await,
            Err(BackendError::Transient(_))
        ));
    }
}
