//! Terminal rendering.
//!
//! Every `format_*` function returns the complete output as a string so
//! rendering can be tested; the commands decide where it goes.

pub mod drift;
pub mod icons;
pub mod progress;
pub mod response;

pub use drift::{format_report, format_signals};
pub use progress::format_receipt;
pub use response::{format_failure, format_response};

use console::style;

use crate::errors::BridgeError;

/// `[ERROR] <reason>` and, when one exists, `Hint: <suggestion>`, on stderr.
pub fn print_error(err: &BridgeError) {
    eprintln!("{} {}", style("[ERROR]").red().bold(), err);
    if let Some(hint) = err.hint() {
        eprintln!("{} {}", style("Hint:").yellow(), hint);
    }
}

/// Spinner on stderr while waiting on the planning agent. Hidden when stderr
/// is not a terminal.
pub fn spinner(message: &str) -> indicatif::ProgressBar {
    let bar = indicatif::ProgressBar::new_spinner();
    if let Ok(style) = indicatif::ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}")
    {
        bar.set_style(style);
    }
    bar.set_message(message.to_string());
    bar.enable_steady_tick(std::time::Duration::from_millis(120));
    bar
}
