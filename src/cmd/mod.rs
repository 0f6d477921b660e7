//! CLI command implementations.
//!
//! Each submodule owns one `Commands` variant:
//!
//! | Module     | Command          |
//! |------------|------------------|
//! | `ask`      | `Ask`            |
//! | `progress` | `Progress`       |
//! | `status`   | `Status`         |
//! | `handoff`  | `Handoff`        |
//! | `session`  | `Loop`           |
//! | `config`   | `Config`         |
//!
//! Every command returns the process exit code on success; failures are
//! `BridgeError`s, printed and mapped to an exit code by `main`.

pub mod ask;
pub mod config;
pub mod handoff;
pub mod progress;
pub mod session;
pub mod status;

pub use ask::{AskOptions, cmd_ask};
pub use config::cmd_config;
pub use handoff::{HandoffOptions, cmd_handoff};
pub use progress::{ProgressOptions, cmd_progress};
pub use session::cmd_loop;
pub use status::cmd_status;

use bridge::config::Config;
use bridge::docs;
use bridge::errors::BridgeError;

/// Resolve `--milestone`, or the current milestone when it is absent.
///
/// An explicit milestone that does not exist is an error; no milestones at
/// all yields `None`.
pub(crate) fn resolve_milestone(
    config: &Config,
    explicit: Option<&str>,
) -> Result<Option<docs::MilestoneFile>, BridgeError> {
    match explicit {
        Some(reference) => docs::find_milestone(&config.milestones_dir, reference)?
            .map(Some)
            .ok_or_else(|| BridgeError::MilestoneNotFound(reference.to_string())),
        None => Ok(docs::find_current_milestone(&config.milestones_dir)?),
    }
}
