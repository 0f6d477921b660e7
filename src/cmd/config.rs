//! `bridge config`: configuration view and initialization.

use anyhow::Context;

use bridge::bridge_config::BridgeToml;
use bridge::config::Config;
use bridge::errors::BridgeError;
use bridge::ui::icons;

use super::super::ConfigCommands;

pub fn cmd_config(config: &Config, command: Option<ConfigCommands>) -> Result<u8, BridgeError> {
    let config_path = &config.config_file;

    match command {
        None | Some(ConfigCommands::Show) => {
            println!();
            println!("Bridge Configuration");
            println!("====================");
            println!();
            if config_path.exists() {
                println!("Config file: {}", config_path.display());
            } else {
                println!("No bridge.toml found at {}", config_path.display());
                println!("Using defaults. Run 'bridge config init' to create one.");
            }
            println!();
            println!("Effective values (with BRIDGE_* overrides):");
            println!();
            let rendered = toml::to_string_pretty(&config.settings)
                .context("Failed to render configuration")?;
            println!("{}", rendered.trim_end());
            print_warnings(&config.settings);
        }
        Some(ConfigCommands::Validate) => {
            if !config_path.exists() {
                println!("No bridge.toml found. Using defaults (valid).");
                return Ok(0);
            }
            // Validate the file itself, without environment overrides.
            let toml = BridgeToml::load(config_path)?;
            let warnings = toml.validate();
            if warnings.is_empty() {
                println!("{}Configuration is valid.", icons::CHECK);
            } else {
                print_warnings(&toml);
                return Ok(1);
            }
        }
        Some(ConfigCommands::Init { force }) => {
            if config_path.exists() && !force {
                return Err(BridgeError::Config(format!(
                    "{} already exists; pass --force to overwrite it",
                    config_path.display()
                )));
            }
            if let Some(parent) = config_path.parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
            BridgeToml::default().save(config_path)?;

            println!("{}Created {}", icons::CHECK, config_path.display());
            println!();
            println!("You can now customize:");
            println!("  - [agent] backend, timeout_secs, retry_count, backoff");
            println!("  - [context] max_tokens, truncation_strategy");
            println!("  - [session] command, args, context_delivery");
        }
    }

    Ok(0)
}

fn print_warnings(toml: &BridgeToml) {
    let warnings = toml.validate();
    if warnings.is_empty() {
        return;
    }
    println!();
    println!("Configuration warnings:");
    for warning in warnings {
        println!("  {}{}", icons::WARN, warning);
    }
}
