use super::AuditEntry;
use crate::errors::AuditError;
use crate::util::append_line_locked;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Append-only writer for the interaction audit trail.
///
/// `append` returns only after the entry has been synced to disk; a failed
/// write is an error, never a silent drop.
#[derive(Debug, Clone)]
pub struct AuditLog {
    path: PathBuf,
}

impl AuditLog {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, entry: &AuditEntry) -> Result<(), AuditError> {
        let line = serde_json::to_string(entry)?;
        append_line_locked(&self.path, &line).map_err(|source| AuditError::WriteFailed {
            path: self.path.clone(),
            source,
        })
    }

    /// All readable entries, oldest first.
    pub fn entries(&self) -> Result<Vec<AuditEntry>, AuditError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(AuditError::ReadFailed {
                    path: self.path.clone(),
                    source,
                });
            }
        };

        Ok(content
            .lines()
            .filter(|l| !l.trim().is_empty())
            .filter_map(|line| match serde_json::from_str(line) {
                Ok(entry) => Some(entry),
                Err(e) => {
                    warn!(path = %self.path.display(), error = %e, "skipping unreadable audit line");
                    None
                }
            })
            .collect())
    }

    /// The `n` most recent entries, newest last.
    pub fn recent(&self, n: usize) -> Result<Vec<AuditEntry>, AuditError> {
        let mut entries = self.entries()?;
        let skip = entries.len().saturating_sub(n);
        Ok(entries.split_off(skip))
    }
}
