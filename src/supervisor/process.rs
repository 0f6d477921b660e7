use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, Command};
use tracing::debug;

use super::{RunningSession, SessionContext, SessionExit, SessionLauncher};
use crate::bridge_config::{ContextDelivery, SessionSection};

/// Launches the execution agent as a child process in the project directory.
///
/// The child inherits the terminal. Its context arrives either as the final
/// command-line argument or on stdin, which is closed afterwards.
#[derive(Debug, Clone)]
pub struct ProcessLauncher {
    command: String,
    args: Vec<String>,
    delivery: ContextDelivery,
    working_dir: PathBuf,
}

impl ProcessLauncher {
    pub fn new(command: impl Into<String>, args: Vec<String>, delivery: ContextDelivery, working_dir: &Path) -> Self {
        Self {
            command: command.into(),
            args,
            delivery,
            working_dir: working_dir.to_path_buf(),
        }
    }

    pub fn from_section(section: &SessionSection, working_dir: &Path) -> Self {
        Self::new(
            section.command.clone(),
            section.args.clone(),
            section.context_delivery,
            working_dir,
        )
    }
}

#[async_trait]
impl SessionLauncher for ProcessLauncher {
    async fn start(&self, context: &SessionContext) -> Result<Box<dyn RunningSession>> {
        let mut cmd = Command::new(&self.command);
        cmd.args(&self.args)
            .current_dir(&self.working_dir)
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);

        match self.delivery {
            ContextDelivery::Argument => {
                cmd.arg(&context.text).stdin(Stdio::inherit());
            }
            ContextDelivery::Stdin => {
                cmd.stdin(Stdio::piped());
            }
        }

        let mut child = cmd
            .spawn()
            .with_context(|| format!("Failed to spawn execution agent '{}'", self.command))?;
        debug!(pid = ?child.id(), command = %self.command, "execution session spawned");

        if self.delivery == ContextDelivery::Stdin
            && let Some(mut stdin) = child.stdin.take()
        {
            stdin
                .write_all(context.text.as_bytes())
                .await
                .context("Failed to write context to execution agent stdin")?;
            stdin
                .shutdown()
                .await
                .context("Failed to close execution agent stdin")?;
        }

        Ok(Box::new(ProcessSession { child }))
    }
}

pub struct ProcessSession {
    child: Child,
}

#[async_trait]
impl RunningSession for ProcessSession {
    async fn await_exit(&mut self) -> Result<SessionExit> {
        let status = self
            .child
            .wait()
            .await
            .context("Failed to wait for execution agent")?;
        Ok(SessionExit {
            code: status.code(),
        })
    }

    async fn cancel(&mut self) -> Result<()> {
        self.child
            .kill()
            .await
            .context("Failed to stop execution agent")
    }
}
