//! Configuration file for the bridge layer.
//!
//! Settings are read from `.bridge/bridge.toml` (or the file named by
//! `BRIDGE_CONFIG_PATH`) and layered: file → `.env` / environment → CLI.
//!
//! # Configuration File Format
//!
//! ```toml
//! [project]
//! docs_dir = "docs"
//! milestones_dir = "docs/01_milestones"
//! architecture_file = "docs/00_global/ARCHITECTURE.md"
//! roadmap_file = "docs/00_global/ROADMAP.md"
//!
//! [agent]
//! backend = "http"
//! timeout_secs = 30
//! retry_count = 3
//! retry_delay_secs = 5
//! backoff = "fixed"
//! model = "gemini-1.5-pro"
//!
//! [context]
//! max_tokens = 8000
//! truncation_strategy = "recent_first"
//!
//! [drift]
//! staleness_hours = 72
//!
//! [session]
//! command = "claude"
//! context_delivery = "argument"
//! default_decision = "quit"
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::supervisor::LoopDecision;

/// Name of the environment variable pointing at an alternative config file.
pub const CONFIG_PATH_ENV: &str = "BRIDGE_CONFIG_PATH";

/// Transport used to reach the planning agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Canned responses, no network (default)
    #[default]
    Stub,
    /// Print the prompt and read a human-relayed answer from stdin
    Relay,
    /// Networked generative-language API
    Http,
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendKind::Stub => write!(f, "stub"),
            BackendKind::Relay => write!(f, "relay"),
            BackendKind::Http => write!(f, "http"),
        }
    }
}

impl std::str::FromStr for BackendKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "stub" => Ok(BackendKind::Stub),
            "relay" | "interactive" => Ok(BackendKind::Relay),
            "http" | "api" => Ok(BackendKind::Http),
            _ => anyhow::bail!("Invalid backend '{}'. Valid values: stub, relay, http", s),
        }
    }
}

/// Delay growth between retry attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackoffStrategy {
    /// Same delay before every retry (default)
    #[default]
    Fixed,
    /// delay × attempt number
    Linear,
    /// delay × 2^(attempt - 1)
    Exponential,
}

impl std::fmt::Display for BackoffStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackoffStrategy::Fixed => write!(f, "fixed"),
            BackoffStrategy::Linear => write!(f, "linear"),
            BackoffStrategy::Exponential => write!(f, "exponential"),
        }
    }
}

impl std::str::FromStr for BackoffStrategy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "fixed" => Ok(BackoffStrategy::Fixed),
            "linear" => Ok(BackoffStrategy::Linear),
            "exponential" => Ok(BackoffStrategy::Exponential),
            _ => anyhow::bail!(
                "Invalid backoff '{}'. Valid values: fixed, linear, exponential",
                s
            ),
        }
    }
}

/// How the context package is cut down when it exceeds the size budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TruncationStrategy {
    /// Keep critical then most recently modified documents, drop the oldest
    #[default]
    RecentFirst,
    /// Keep documents in selection order, drop from the end
    Priority,
    /// Cap every document at an equal share of the budget
    Proportional,
}

impl std::fmt::Display for TruncationStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TruncationStrategy::RecentFirst => write!(f, "recent_first"),
            TruncationStrategy::Priority => write!(f, "priority"),
            TruncationStrategy::Proportional => write!(f, "proportional"),
        }
    }
}

impl std::str::FromStr for TruncationStrategy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "recent_first" => Ok(TruncationStrategy::RecentFirst),
            "priority" => Ok(TruncationStrategy::Priority),
            "proportional" => Ok(TruncationStrategy::Proportional),
            _ => anyhow::bail!(
                "Invalid truncation strategy '{}'. Valid values: recent_first, priority, proportional",
                s
            ),
        }
    }
}

/// Rendering of command output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
    Markdown,
}

/// How the handoff context reaches the execution agent process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContextDelivery {
    /// Appended as the final command-line argument (default)
    #[default]
    Argument,
    /// Written to the process's stdin, which is then closed
    Stdin,
}

/// Documentation layout, relative to the project directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectSection {
    #[serde(default = "default_docs_dir")]
    pub docs_dir: String,
    #[serde(default = "default_milestones_dir")]
    pub milestones_dir: String,
    #[serde(default = "default_architecture_file")]
    pub architecture_file: String,
    #[serde(default = "default_roadmap_file")]
    pub roadmap_file: String,
    #[serde(default = "default_workflow_file")]
    pub workflow_file: String,
    /// Directory of audit reports produced by the planning agent
    #[serde(default = "default_audit_docs_dir")]
    pub audit_docs_dir: String,
}

fn default_docs_dir() -> String {
    "docs".to_string()
}

fn default_milestones_dir() -> String {
    "docs/01_milestones".to_string()
}

fn default_architecture_file() -> String {
    "docs/00_global/ARCHITECTURE.md".to_string()
}

fn default_roadmap_file() -> String {
    "docs/00_global/ROADMAP.md".to_string()
}

fn default_workflow_file() -> String {
    "docs/00_global/WORKFLOW.md".to_string()
}

fn default_audit_docs_dir() -> String {
    "docs/99_audit".to_string()
}

impl Default for ProjectSection {
    fn default() -> Self {
        Self {
            docs_dir: default_docs_dir(),
            milestones_dir: default_milestones_dir(),
            architecture_file: default_architecture_file(),
            roadmap_file: default_roadmap_file(),
            workflow_file: default_workflow_file(),
            audit_docs_dir: default_audit_docs_dir(),
        }
    }
}

/// Planning-agent communication settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSection {
    #[serde(default)]
    pub backend: BackendKind,
    /// Per-attempt timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Retries after the first attempt
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,
    #[serde(default = "default_retry_delay_secs")]
    pub retry_delay_secs: u64,
    #[serde(default)]
    pub backoff: BackoffStrategy,
    /// Base URL of the generative-language API (http backend)
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_model")]
    pub model: String,
    /// Environment variable holding the API key (http backend)
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    /// Actor name written to the audit trail
    #[serde(default = "default_actor")]
    pub actor: String,
    /// Whether `bridge progress` also reports to the planning agent
    #[serde(default = "default_notify_progress")]
    pub notify_progress: bool,
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_retry_count() -> u32 {
    3
}

fn default_retry_delay_secs() -> u64 {
    5
}

fn default_endpoint() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}

fn default_model() -> String {
    "gemini-1.5-pro".to_string()
}

fn default_api_key_env() -> String {
    "GEMINI_API_KEY".to_string()
}

fn default_actor() -> String {
    "execution-agent".to_string()
}

fn default_notify_progress() -> bool {
    true
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            timeout_secs: default_timeout_secs(),
            retry_count: default_retry_count(),
            retry_delay_secs: default_retry_delay_secs(),
            backoff: BackoffStrategy::default(),
            endpoint: default_endpoint(),
            model: default_model(),
            api_key_env: default_api_key_env(),
            actor: default_actor(),
            notify_progress: default_notify_progress(),
        }
    }
}

/// Context package budget.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextSection {
    /// Budget in tokens; one token is counted as four characters
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,
    #[serde(default)]
    pub truncation_strategy: TruncationStrategy,
}

/// Upper bounds accepted by [`BridgeToml::check_ranges`].
pub const MAX_CONTEXT_TOKENS: usize = 10_000_000;
pub const MAX_STALENESS_HOURS: u64 = 24 * 365 * 100;
pub const MAX_EVIDENCE_GRACE_MINUTES: u64 = 60 * 24 * 365;

fn default_max_tokens() -> usize {
    8000
}

impl Default for ContextSection {
    fn default() -> Self {
        Self {
            max_tokens: default_max_tokens(),
            truncation_strategy: TruncationStrategy::default(),
        }
    }
}

/// Drift detection thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriftSection {
    /// Age of the last commit that triggers a staleness warning
    #[serde(default = "default_staleness_hours")]
    pub staleness_hours: u64,
    /// Slack when matching a `done` record against commit times
    #[serde(default = "default_evidence_grace_minutes")]
    pub evidence_grace_minutes: u64,
    /// Number of commits inspected for evidence
    #[serde(default = "default_history_depth")]
    pub history_depth: usize,
}

fn default_staleness_hours() -> u64 {
    72
}

fn default_evidence_grace_minutes() -> u64 {
    60
}

fn default_history_depth() -> usize {
    200
}

impl Default for DriftSection {
    fn default() -> Self {
        Self {
            staleness_hours: default_staleness_hours(),
            evidence_grace_minutes: default_evidence_grace_minutes(),
            history_depth: default_history_depth(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutputSection {
    #[serde(default)]
    pub default_format: OutputFormat,
}

/// Execution-agent session settings for `bridge loop`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSection {
    #[serde(default = "default_session_command")]
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub context_delivery: ContextDelivery,
    /// Seconds to wait for the restart/quit choice before applying the default
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decision_timeout_secs: Option<u64>,
    #[serde(default = "default_decision")]
    pub default_decision: LoopDecision,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_cycles: Option<u32>,
}

fn default_session_command() -> String {
    "claude".to_string()
}

fn default_decision() -> LoopDecision {
    LoopDecision::Quit
}

impl Default for SessionSection {
    fn default() -> Self {
        Self {
            command: default_session_command(),
            args: Vec::new(),
            context_delivery: ContextDelivery::default(),
            decision_timeout_secs: None,
            default_decision: default_decision(),
            max_cycles: None,
        }
    }
}

/// The complete bridge.toml structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BridgeToml {
    #[serde(default)]
    pub project: ProjectSection,
    #[serde(default)]
    pub agent: AgentSection,
    #[serde(default)]
    pub context: ContextSection,
    #[serde(default)]
    pub drift: DriftSection,
    #[serde(default)]
    pub output: OutputSection,
    #[serde(default)]
    pub session: SessionSection,
}

impl BridgeToml {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::parse(&content).with_context(|| format!("Invalid config file: {}", path.display()))
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self> {
        let parsed: Self = toml::from_str(content).context("Failed to parse bridge.toml")?;
        parsed.check_ranges()?;
        Ok(parsed)
    }

    /// Load from `path`, falling back to defaults when the file does not exist.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize bridge.toml")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Apply `BRIDGE_*` overrides obtained through `lookup`.
    ///
    /// `lookup` is `std::env::var(..).ok()` in production; tests pass a map.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("BRIDGE_AGENT_BACKEND") {
            self.agent.backend = v.parse().context("BRIDGE_AGENT_BACKEND")?;
        }
        if let Some(v) = lookup("BRIDGE_AGENT_TIMEOUT") {
            self.agent.timeout_secs = parse_env_number("BRIDGE_AGENT_TIMEOUT", &v)?;
        }
        if let Some(v) = lookup("BRIDGE_RETRY_COUNT") {
            self.agent.retry_count = parse_env_number("BRIDGE_RETRY_COUNT", &v)?;
        }
        if let Some(v) = lookup("BRIDGE_RETRY_DELAY") {
            self.agent.retry_delay_secs = parse_env_number("BRIDGE_RETRY_DELAY", &v)?;
        }
        if let Some(v) = lookup("BRIDGE_BACKOFF") {
            self.agent.backoff = v.parse().context("BRIDGE_BACKOFF")?;
        }
        if let Some(v) = lookup("BRIDGE_CONTEXT_MAX_TOKENS") {
            self.context.max_tokens = parse_env_number("BRIDGE_CONTEXT_MAX_TOKENS", &v)?;
        }
        if let Some(v) = lookup("BRIDGE_TRUNCATION_STRATEGY") {
            self.context.truncation_strategy = v.parse().context("BRIDGE_TRUNCATION_STRATEGY")?;
        }
        if let Some(v) = lookup("BRIDGE_STALENESS_HOURS") {
            self.drift.staleness_hours = parse_env_number("BRIDGE_STALENESS_HOURS", &v)?;
        }
        self.check_ranges()
    }

    /// Reject values too large to turn into durations or character budgets.
    pub fn check_ranges(&self) -> Result<()> {
        let limits = [
            ("context.max_tokens", self.context.max_tokens as u128, MAX_CONTEXT_TOKENS as u128),
            ("drift.staleness_hours", self.drift.staleness_hours as u128, MAX_STALENESS_HOURS as u128),
            (
                "drift.evidence_grace_minutes",
                self.drift.evidence_grace_minutes as u128,
                MAX_EVIDENCE_GRACE_MINUTES as u128,
            ),
        ];
        for (name, value, max) in limits {
            if value > max {
                anyhow::bail!("{} is {}, the maximum is {}", name, value, max);
            }
        }
        Ok(())
    }

    /// Validate the configuration and return any warnings.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.agent.timeout_secs == 0 {
            warnings.push("agent.timeout_secs is 0: every attempt will time out".to_string());
        }
        if self.context.max_tokens == 0 {
            warnings.push("context.max_tokens is 0: every document will be dropped".to_string());
        }
        if self.session.command.trim().is_empty() {
            warnings.push("session.command is empty: 'bridge loop' cannot start".to_string());
        }
        if self.agent.backend == BackendKind::Http && self.agent.endpoint.trim().is_empty() {
            warnings.push("agent.endpoint is empty for the http backend".to_string());
        }

        warnings
    }
}

fn parse_env_number<T>(name: &str, value: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value
        .trim()
        .parse::<T>()
        .with_context(|| format!("{} must be a non-negative integer, got '{}'", name, value))
}
