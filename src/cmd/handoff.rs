//! `bridge handoff`: fresh-session context.

use std::path::PathBuf;
use tracing::info;

use bridge::config::Config;
use bridge::errors::BridgeError;
use bridge::handoff::{self, HandoffSlot, MilestoneTarget, RenderOptions};
use bridge::ui::{self, icons};

pub struct HandoffOptions {
    pub milestone: Option<String>,
    pub next: bool,
    pub include_audit: bool,
    pub compact: bool,
    pub output: Option<PathBuf>,
    pub auto: bool,
}

/// Exits 1 when there are no milestones at all and 2 when an explicitly
/// named milestone does not exist.
pub fn cmd_handoff(config: &Config, options: HandoffOptions) -> Result<u8, BridgeError> {
    let target = match (options.milestone, options.next) {
        (Some(reference), _) => MilestoneTarget::Named(reference),
        (None, true) => MilestoneTarget::Next,
        (None, false) => MilestoneTarget::Current,
    };
    let render_options = RenderOptions {
        compact: options.compact,
        include_audit: options.include_audit,
    };

    let context = match handoff::generate(config, &target, render_options) {
        Ok(context) => context,
        Err(err @ BridgeError::NoMilestones) => {
            ui::print_error(&err);
            return Ok(1);
        }
        Err(err @ BridgeError::MilestoneNotFound(_)) => {
            ui::print_error(&err);
            return Ok(2);
        }
        Err(err) => return Err(err),
    };

    if options.auto {
        config.ensure_directories()?;
        let slot = HandoffSlot::new(&config.handoff_file);
        slot.write(&context)?;
        info!(path = %slot.path().display(), milestone = ?context.milestone, "handoff written");
        println!("{}Context written to: {}", icons::HANDOFF, slot.path().display());
        println!("Exit this session now; 'bridge loop' will restart it with this context.");
        return Ok(0);
    }

    match options.output {
        Some(path) => {
            let path = config.project_dir.join(path);
            std::fs::write(&path, &context.text).map_err(|e| {
                BridgeError::Other(anyhow::Error::new(e).context(format!(
                    "Failed to write handoff to {}",
                    path.display()
                )))
            })?;
            eprintln!("{}Handoff written to {}", icons::CHECK, path.display());
        }
        None => println!("{}", context.text),
    }
    Ok(0)
}
