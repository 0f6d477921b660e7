//! Documentation store.
//!
//! The planning agent owns the documentation; the bridge only reads it. A
//! [`DocumentSet`] is an in-memory snapshot so that context selection can be
//! a pure function of its inputs.

pub mod milestone;

pub use milestone::{
    Milestone, MilestoneFile, PhaseDef, find_current_milestone, find_milestone, list_milestones,
    next_milestone, normalize_id,
};

use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::errors::ContextError;

/// Category of a document, used for selection and access restrictions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DocumentKind {
    Architecture,
    Roadmap,
    Workflow,
    Milestone(String),
    /// Audit report written by the planning agent (restricted)
    Audit,
    /// Rendered current state of the progress ledger
    Ledger,
    /// Raw project source (restricted)
    Source,
}

impl DocumentKind {
    pub fn is_milestone(&self, id: &str) -> bool {
        matches!(self, DocumentKind::Milestone(m) if m == id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub name: String,
    pub kind: DocumentKind,
    pub content: String,
    pub modified: DateTime<Utc>,
}

impl Document {
    pub fn new(
        name: impl Into<String>,
        kind: DocumentKind,
        content: impl Into<String>,
        modified: DateTime<Utc>,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            content: content.into(),
            modified,
        }
    }

    pub fn char_len(&self) -> usize {
        self.content.chars().count()
    }
}

/// Snapshot of the documentation store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentSet {
    documents: Vec<Document>,
}

impl DocumentSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, document: Document) {
        self.documents.push(document);
    }

    pub fn with(mut self, document: Document) -> Self {
        self.push(document);
        self
    }

    /// First document of `kind`.
    pub fn get(&self, kind: &DocumentKind) -> Option<&Document> {
        self.documents.iter().find(|d| &d.kind == kind)
    }

    pub fn milestone(&self, id: &str) -> Option<&Document> {
        self.documents.iter().find(|d| d.kind.is_milestone(id))
    }

    /// Milestone documents other than `active`.
    pub fn other_milestones<'a>(&'a self, active: Option<&'a str>) -> impl Iterator<Item = &'a Document> {
        self.documents.iter().filter(move |d| match &d.kind {
            DocumentKind::Milestone(id) => Some(id.as_str()) != active,
            _ => false,
        })
    }

    pub fn of_kind<'a>(&'a self, kind: &'a DocumentKind) -> impl Iterator<Item = &'a Document> {
        self.documents.iter().filter(move |d| &d.kind == kind)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Document> {
        self.documents.iter()
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

/// Filesystem-backed documentation store.
pub struct FsDocumentStore {
    milestones_dir: PathBuf,
    architecture_file: PathBuf,
    roadmap_file: PathBuf,
    workflow_file: PathBuf,
    audit_docs_dir: PathBuf,
}

impl FsDocumentStore {
    pub fn new(config: &Config) -> Self {
        Self {
            milestones_dir: config.milestones_dir.clone(),
            architecture_file: config.architecture_file.clone(),
            roadmap_file: config.roadmap_file.clone(),
            workflow_file: config.workflow_file.clone(),
            audit_docs_dir: config.audit_docs_dir.clone(),
        }
    }

    /// Load every document the bridge may select from. `ledger_text`, when
    /// given, is added as the ledger document.
    pub fn snapshot(&self, ledger_text: Option<String>) -> Result<DocumentSet, ContextError> {
        let mut set = DocumentSet::new();

        for (path, kind) in [
            (&self.architecture_file, DocumentKind::Architecture),
            (&self.roadmap_file, DocumentKind::Roadmap),
            (&self.workflow_file, DocumentKind::Workflow),
        ] {
            if let Some(doc) = read_document(path, kind)? {
                set.push(doc);
            }
        }

        let milestones =
            list_milestones(&self.milestones_dir).map_err(|e| ContextError::ReadFailed {
                path: self.milestones_dir.clone(),
                source: std::io::Error::other(e.to_string()),
            })?;
        for file in milestones {
            if let Some(doc) = read_document(&file.path, DocumentKind::Milestone(file.id.clone()))? {
                set.push(doc);
            }
        }

        if let Some(path) = self.latest_audit_report()
            && let Some(doc) = read_document(&path, DocumentKind::Audit)?
        {
            set.push(doc);
        }

        if let Some(text) = ledger_text {
            set.push(Document::new(
                "progress-ledger",
                DocumentKind::Ledger,
                text,
                Utc::now(),
            ));
        }

        Ok(set)
    }

    /// Load caller-named source files (only used with an explicit opt-in).
    pub fn load_sources(&self, set: &mut DocumentSet, paths: &[PathBuf]) -> Result<(), ContextError> {
        for path in paths {
            match read_document(path, DocumentKind::Source)? {
                Some(doc) => set.push(Document {
                    name: path.display().to_string(),
                    ..doc
                }),
                None => {
                    return Err(ContextError::ReadFailed {
                        path: path.clone(),
                        source: std::io::Error::new(std::io::ErrorKind::NotFound, "not found"),
                    });
                }
            }
        }
        Ok(())
    }

    /// Most recently modified markdown file in the audit directory.
    pub fn latest_audit_report(&self) -> Option<PathBuf> {
        let entries = std::fs::read_dir(&self.audit_docs_dir).ok()?;
        entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().map(|e| e == "md").unwrap_or(false))
            .filter_map(|p| {
                let modified = p.metadata().and_then(|m| m.modified()).ok()?;
                Some((modified, p))
            })
            .max_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)))
            .map(|(_, p)| p)
    }
}

fn read_document(path: &Path, kind: DocumentKind) -> Result<Option<Document>, ContextError> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(ContextError::ReadFailed {
                path: path.to_path_buf(),
                source,
            });
        }
    };

    let modified = path
        .metadata()
        .and_then(|m| m.modified())
        .map(DateTime::<Utc>::from)
        .unwrap_or_else(|_| Utc::now());

    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string());

    Ok(Some(Document {
        name,
        kind,
        content,
        modified,
    }))
}
