use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Kind of question the execution agent is asking.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum QueryType {
    Architectural,
    Implementation,
    Progress,
    Status,
}

impl std::fmt::Display for QueryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QueryType::Architectural => write!(f, "architectural"),
            QueryType::Implementation => write!(f, "implementation"),
            QueryType::Progress => write!(f, "progress"),
            QueryType::Status => write!(f, "status"),
        }
    }
}

impl std::str::FromStr for QueryType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "architectural" | "architecture" => Ok(QueryType::Architectural),
            "implementation" => Ok(QueryType::Implementation),
            "progress" => Ok(QueryType::Progress),
            "status" => Ok(QueryType::Status),
            _ => anyhow::bail!(
                "Invalid query type '{}'. Valid values: architectural, implementation, progress, status",
                s
            ),
        }
    }
}

const ARCHITECTURAL_KEYWORDS: &[&str] = &[
    "architecture",
    "design",
    "pattern",
    "structure",
    "approach",
    "should i use",
    "which",
    "best practice",
    "how should",
];

const PROGRESS_KEYWORDS: &[&str] = &["progress", "completed", "finished", "phase", "milestone done"];

const STATUS_KEYWORDS: &[&str] = &["status", "drift", "aligned", "state of"];

const IMPLEMENTATION_KEYWORDS: &[&str] = &[
    "implement",
    "code",
    "function",
    "method",
    "how do i",
    "how to",
    "error",
    "bug",
];

/// Infer the query type from its text.
///
/// Keyword groups are tried in order architectural, progress, status,
/// implementation; text matching none of them is an implementation question.
pub fn classify(text: &str) -> QueryType {
    let lower = text.to_lowercase();
    let groups = [
        (QueryType::Architectural, ARCHITECTURAL_KEYWORDS),
        (QueryType::Progress, PROGRESS_KEYWORDS),
        (QueryType::Status, STATUS_KEYWORDS),
        (QueryType::Implementation, IMPLEMENTATION_KEYWORDS),
    ];

    groups
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|k| lower.contains(k)))
        .map(|(kind, _)| *kind)
        .unwrap_or(QueryType::Implementation)
}

/// How much documentation accompanies a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ContextMode {
    /// Base set for the query type
    #[default]
    Auto,
    /// Only the document(s) the query type cannot do without
    Minimal,
    /// Base set plus roadmap and workflow
    Full,
}

/// Caller-controlled adjustments to document selection.
///
/// Restricted categories are excluded unless opted into here.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryOverrides {
    pub mode: ContextMode,
    pub include_audit: bool,
    pub include_milestones: bool,
    /// Source files the caller asked to attach
    pub include_source: Vec<PathBuf>,
}

/// A question bound for the planning agent. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    text: String,
    query_type: QueryType,
    inferred: bool,
    milestone: Option<String>,
    phase: Option<u32>,
    overrides: QueryOverrides,
}

impl Query {
    /// Build a query; an explicit type wins over inference.
    pub fn new(text: impl Into<String>, explicit: Option<QueryType>) -> Self {
        let text = text.into();
        let (query_type, inferred) = match explicit {
            Some(t) => (t, false),
            None => (classify(&text), true),
        };
        Self {
            text,
            query_type,
            inferred,
            milestone: None,
            phase: None,
            overrides: QueryOverrides::default(),
        }
    }

    pub fn with_milestone(mut self, milestone: Option<String>) -> Self {
        self.milestone = milestone;
        self
    }

    pub fn with_phase(mut self, phase: Option<u32>) -> Self {
        self.phase = phase;
        self
    }

    pub fn with_overrides(mut self, overrides: QueryOverrides) -> Self {
        self.overrides = overrides;
        self
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn query_type(&self) -> QueryType {
        self.query_type
    }

    pub fn is_inferred(&self) -> bool {
        self.inferred
    }

    pub fn milestone(&self) -> Option<&str> {
        self.milestone.as_deref()
    }

    pub fn phase(&self) -> Option<u32> {
        self.phase
    }

    pub fn overrides(&self) -> &QueryOverrides {
        &self.overrides
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_keyword_groups() {
        assert_eq!(
            classify("Which database should back the session store?"),
            QueryType::Architectural
        );
        assert_eq!(classify("Phase 2 is finished"), QueryType::Progress);
        assert_eq!(classify("Are we still aligned?"), QueryType::Status);
        assert_eq!(classify("How do I parse the header?"), QueryType::Implementation);
        assert_eq!(classify("Thoughts?"), QueryType::Implementation);
    }

    #[test]
    fn test_classify_precedence_architectural_first() {
        // mentions both design and a phase
        assert_eq!(
            classify("What design should phase 3 follow?"),
            QueryType::Architectural
        );
        // progress beats implementation
        assert_eq!(
            classify("Completed the code for the parser"),
            QueryType::Progress
        );
    }

    #[test]
    fn test_explicit_type_wins() {
        let q = Query::new("Which ORM?", Some(QueryType::Status));
        assert_eq!(q.query_type(), QueryType::Status);
        assert!(!q.is_inferred());

        let q = Query::new("Which ORM?", None);
        assert_eq!(q.query_type(), QueryType::Architectural);
        assert!(q.is_inferred());
    }

    #[test]
    fn test_query_type_parse() {
        assert_eq!(
            "Architecture".parse::<QueryType>().unwrap(),
            QueryType::Architectural
        );
        assert!("vibes".parse::<QueryType>().is_err());
    }
}
