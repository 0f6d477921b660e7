use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::bridge_config::{BridgeToml, CONFIG_PATH_ENV};

/// Runtime configuration for the bridge.
///
/// Bridges the layered `BridgeToml` settings with resolved, absolute paths
/// for every persisted artifact and documentation location.
#[derive(Debug, Clone)]
pub struct Config {
    pub project_dir: PathBuf,
    pub bridge_dir: PathBuf,
    pub config_file: PathBuf,
    pub docs_dir: PathBuf,
    pub milestones_dir: PathBuf,
    pub architecture_file: PathBuf,
    pub roadmap_file: PathBuf,
    pub workflow_file: PathBuf,
    pub audit_docs_dir: PathBuf,
    pub ledger_file: PathBuf,
    pub audit_log: PathBuf,
    pub handoff_file: PathBuf,
    pub log_dir: PathBuf,
    pub verbose: bool,
    pub settings: BridgeToml,
}

impl Config {
    /// Load configuration for `project_dir`: `.env`, then the config file, then
    /// `BRIDGE_*` environment overrides.
    pub fn load(project_dir: &Path, verbose: bool) -> Result<Self> {
        let project_dir = project_dir
            .canonicalize()
            .context("Failed to resolve project directory")?;

        // A missing .env is the common case.
        let _ = dotenvy::from_path(project_dir.join(".env"));

        let config_file = match std::env::var(CONFIG_PATH_ENV) {
            Ok(path) if !path.trim().is_empty() => project_dir.join(path),
            _ => project_dir.join(".bridge").join("bridge.toml"),
        };

        let mut settings = BridgeToml::load_or_default(&config_file)?;
        settings.apply_env(|key| std::env::var(key).ok())?;

        Ok(Self::from_settings(project_dir, config_file, settings, verbose))
    }

    /// Build a configuration from already-resolved settings.
    pub fn from_settings(
        project_dir: PathBuf,
        config_file: PathBuf,
        settings: BridgeToml,
        verbose: bool,
    ) -> Self {
        let bridge_dir = project_dir.join(".bridge");
        let project = &settings.project;
        let log_dir = bridge_dir.join("logs");

        Self {
            docs_dir: project_dir.join(&project.docs_dir),
            milestones_dir: project_dir.join(&project.milestones_dir),
            architecture_file: project_dir.join(&project.architecture_file),
            roadmap_file: project_dir.join(&project.roadmap_file),
            workflow_file: project_dir.join(&project.workflow_file),
            audit_docs_dir: project_dir.join(&project.audit_docs_dir),
            ledger_file: bridge_dir.join("progress.jsonl"),
            audit_log: log_dir.join("interactions.jsonl"),
            handoff_file: bridge_dir.join("next_context.md"),
            log_dir,
            bridge_dir,
            config_file,
            project_dir,
            verbose,
            settings,
        }
    }

    pub fn ensure_directories(&self) -> Result<()> {
        std::fs::create_dir_all(&self.bridge_dir).context("Failed to create .bridge directory")?;
        std::fs::create_dir_all(&self.log_dir).context("Failed to create log directory")?;
        Ok(())
    }

    /// Size budget of a context package, in characters.
    pub fn context_budget_chars(&self) -> usize {
        self.settings
            .context
            .max_tokens
            .saturating_mul(crate::context::CHARS_PER_TOKEN)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_paths_live_under_bridge_dir() {
        let dir = tempdir().unwrap();
        let root = dir.path().to_path_buf();
        let config = Config::from_settings(
            root.clone(),
            root.join(".bridge/bridge.toml"),
            BridgeToml::default(),
            false,
        );
        assert_eq!(config.ledger_file, root.join(".bridge/progress.jsonl"));
        assert_eq!(config.handoff_file, root.join(".bridge/next_context.md"));
        assert_eq!(
            config.audit_log,
            root.join(".bridge/logs/interactions.jsonl")
        );
        assert_eq!(config.milestones_dir, root.join("docs/01_milestones"));
    }

    #[test]
    fn test_load_reads_config_file() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join(".bridge")).unwrap();
        std::fs::write(
            dir.path().join(".bridge/bridge.toml"),
            "[project]\nmilestones_dir = \"plan\"\n\n[context]\nmax_tokens = 10\n",
        )
        .unwrap();

        let config = Config::load(dir.path(), true).unwrap();
        assert!(config.verbose);
        assert_eq!(
            config.milestones_dir,
            dir.path().canonicalize().unwrap().join("plan")
        );
        assert_eq!(config.context_budget_chars(), 40);
    }

    #[test]
    fn test_load_rejects_invalid_file() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join(".bridge")).unwrap();
        std::fs::write(dir.path().join(".bridge/bridge.toml"), "[agent\n").unwrap();
        assert!(Config::load(dir.path(), false).is_err());
    }

    #[test]
    fn test_context_budget_saturates() {
        let dir = tempdir().unwrap();
        let root = dir.path().to_path_buf();
        let mut settings = BridgeToml::default();
        // from_settings bypasses range checks
        settings.context.max_tokens = usize::MAX;
        let config = Config::from_settings(root.clone(), root.join("bridge.toml"), settings, false);
        assert_eq!(config.context_budget_chars(), usize::MAX);
    }

    #[test]
    fn test_ensure_directories() {
        let dir = tempdir().unwrap();
        let root = dir.path().to_path_buf();
        let config = Config::from_settings(
            root.clone(),
            root.join(".bridge/bridge.toml"),
            BridgeToml::default(),
            false,
        );
        config.ensure_directories().unwrap();
        assert!(config.bridge_dir.exists());
        assert!(config.log_dir.exists());
    }
}
