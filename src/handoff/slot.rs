use chrono::{DateTime, Utc};
use fs2::FileExt;
use regex::Regex;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tracing::{debug, info};

use crate::errors::HandoffError;

static METADATA_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^<!--\s*bridge-handoff\s+milestone=(\S+)\s+generated=(\S+)\s*-->\s*$")
        .expect("static regex")
});

/// Resumption context passed from one execution session to the next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandoffContext {
    /// `None` for artifacts written without the metadata line
    pub milestone: Option<String>,
    pub generated: Option<DateTime<Utc>>,
    pub text: String,
}

impl HandoffContext {
    pub fn new(milestone: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            milestone: Some(milestone.into()),
            generated: Some(Utc::now()),
            text: text.into(),
        }
    }

    fn to_file_content(&self) -> String {
        let generated = self.generated.unwrap_or_else(Utc::now);
        format!(
            "<!-- bridge-handoff milestone={} generated={} -->\n{}",
            self.milestone.as_deref().unwrap_or("unknown"),
            generated.to_rfc3339(),
            self.text
        )
    }

    fn from_file_content(path: &Path, content: &str) -> Result<Self, HandoffError> {
        if content.trim().is_empty() {
            return Err(HandoffError::Malformed {
                path: path.to_path_buf(),
                reason: "artifact is empty".into(),
            });
        }

        let (first, rest) = content.split_once('\n').unwrap_or((content, ""));
        if !first.trim_start().starts_with("<!-- bridge-handoff") {
            // Hand-written artifact: the whole file is the context
            return Ok(Self {
                milestone: None,
                generated: None,
                text: content.to_string(),
            });
        }

        let caps = METADATA_RE
            .captures(first.trim())
            .ok_or_else(|| HandoffError::Malformed {
                path: path.to_path_buf(),
                reason: format!("unreadable metadata line: {}", first.trim()),
            })?;
        let generated = DateTime::parse_from_rfc3339(&caps[2])
            .map(|t| t.with_timezone(&Utc))
            .map_err(|e| HandoffError::Malformed {
                path: path.to_path_buf(),
                reason: format!("bad timestamp '{}': {}", &caps[2], e),
            })?;

        Ok(Self {
            milestone: Some(caps[1].to_string()).filter(|m| m != "unknown"),
            generated: Some(generated),
            text: rest.to_string(),
        })
    }
}

/// The single well-known handoff location.
///
/// Presence of the file is the signal. A completing session writes it; the
/// supervisor consumes it with [`take`](Self::take), which reads and deletes
/// under an exclusive lock so the artifact is consumed at most once.
#[derive(Debug, Clone)]
pub struct HandoffSlot {
    path: PathBuf,
    lock_path: PathBuf,
}

impl HandoffSlot {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            lock_path: path.with_extension("lock"),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_present(&self) -> bool {
        self.path.exists()
    }

    /// Atomically replace the artifact.
    ///
    /// The temp file is written and renamed under the slot lock, so
    /// concurrent writers cannot truncate each other's temp file.
    pub fn write(&self, context: &HandoffContext) -> Result<(), HandoffError> {
        let parent = self.path.parent().unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(parent).map_err(|e| self.io(e))?;

        let lock = self.lock()?;
        let written = self.write_and_rename(context);
        self.unlock(&lock)?;
        written?;

        info!(path = %self.path.display(), milestone = ?context.milestone, "handoff written");
        Ok(())
    }

    fn write_and_rename(&self, context: &HandoffContext) -> Result<(), HandoffError> {
        let tmp = self.path.with_extension("md.tmp");
        {
            let mut file = File::create(&tmp).map_err(|e| self.io(e))?;
            file.write_all(context.to_file_content().as_bytes())
                .and_then(|_| file.sync_all())
                .map_err(|e| self.io(e))?;
        }
        fs::rename(&tmp, &self.path).map_err(|e| self.io(e))
    }

    /// Read and delete the artifact. A second call before the next write
    /// returns `None`.
    pub fn take(&self) -> Result<Option<HandoffContext>, HandoffError> {
        let lock = self.lock()?;
        let result = self.read_and_remove();
        self.unlock(&lock)?;

        let content = match result? {
            Some(c) => c,
            None => return Ok(None),
        };
        debug!(path = %self.path.display(), "handoff consumed");
        HandoffContext::from_file_content(&self.path, &content).map(Some)
    }

    /// Read without consuming.
    pub fn peek(&self) -> Result<Option<HandoffContext>, HandoffError> {
        match fs::read_to_string(&self.path) {
            Ok(content) => HandoffContext::from_file_content(&self.path, &content).map(Some),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(self.io(e)),
        }
    }

    fn read_and_remove(&self) -> Result<Option<String>, HandoffError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(self.io(e)),
        };
        fs::remove_file(&self.path).map_err(|e| self.io(e))?;
        Ok(Some(content))
    }

    fn lock(&self) -> Result<File, HandoffError> {
        if let Some(parent) = self.lock_path.parent() {
            fs::create_dir_all(parent).map_err(|e| self.io(e))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&self.lock_path)
            .map_err(|e| self.io(e))?;
        file.lock_exclusive().map_err(|e| self.io(e))?;
        Ok(file)
    }

    fn unlock(&self, file: &File) -> Result<(), HandoffError> {
        FileExt::unlock(file).map_err(|e| self.io(e))
    }

    fn io(&self, source: std::io::Error) -> HandoffError {
        HandoffError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use tempfile::tempdir;

    #[test]
    fn test_take_consumes_at_most_once() {
        let dir = tempdir().unwrap();
        let slot = HandoffSlot::new(&dir.path().join(".bridge/next_context.md"));

        assert!(slot.take().unwrap().is_none());
        slot.write(&HandoffContext::new("M3", "resume at phase 2")).unwrap();
        assert!(slot.is_present());

        let ctx = slot.take().unwrap().unwrap();
        assert_eq!(ctx.milestone.as_deref(), Some("M3"));
        assert_eq!(ctx.text, "resume at phase 2");
        assert!(ctx.generated.is_some());

        assert!(slot.take().unwrap().is_none());
        assert!(!slot.is_present());
    }

    #[test]
    fn test_peek_does_not_consume() {
        let dir = tempdir().unwrap();
        let slot = HandoffSlot::new(&dir.path().join("next_context.md"));
        slot.write(&HandoffContext::new("M1", "ctx")).unwrap();

        assert!(slot.peek().unwrap().is_some());
        assert!(slot.peek().unwrap().is_some());
        assert!(slot.take().unwrap().is_some());
        assert!(slot.peek().unwrap().is_none());
    }

    #[test]
    fn test_write_replaces_previous_artifact() {
        let dir = tempdir().unwrap();
        let slot = HandoffSlot::new(&dir.path().join("next_context.md"));
        slot.write(&HandoffContext::new("M1", "old")).unwrap();
        slot.write(&HandoffContext::new("M2", "new")).unwrap();

        let ctx = slot.take().unwrap().unwrap();
        assert_eq!(ctx.milestone.as_deref(), Some("M2"));
        assert_eq!(ctx.text, "new");
        assert!(!dir.path().join("next_context.md.tmp").exists());
    }

    #[test]
    fn test_hand_written_artifact_is_accepted() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("next_context.md");
        fs::write(&path, "Continue with phase 4.").unwrap();

        let ctx = HandoffSlot::new(&path).take().unwrap().unwrap();
        assert_eq!(ctx.milestone, None);
        assert_eq!(ctx.text, "Continue with phase 4.");
    }

    #[test]
    fn test_malformed_metadata_is_error_and_still_consumed() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("next_context.md");
        fs::write(&path, "<!-- bridge-handoff milestone=M1 generated=yesterday -->\nctx").unwrap();

        let slot = HandoffSlot::new(&path);
        assert!(matches!(slot.take(), Err(HandoffError::Malformed { .. })));
        assert!(!slot.is_present());
    }

    #[test]
    fn test_empty_artifact_is_malformed() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("next_context.md");
        fs::write(&path, "  \n").unwrap();
        assert!(matches!(
            HandoffSlot::new(&path).take(),
            Err(HandoffError::Malformed { .. })
        ));
    }

    #[test]
    fn test_concurrent_writers_leave_one_whole_artifact() {
        let dir = tempdir().unwrap();
        let slot = Arc::new(HandoffSlot::new(&dir.path().join("next_context.md")));
        let texts: Vec<String> = (0..8).map(|i| format!("writer {} ", i).repeat(4096)).collect();

        let handles: Vec<_> = texts
            .iter()
            .cloned()
            .map(|text| {
                let slot = Arc::clone(&slot);
                thread::spawn(move || {
                    for _ in 0..5 {
                        slot.write(&HandoffContext::new("M5", text.clone())).unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let ctx = slot.take().unwrap().unwrap();
        assert!(texts.contains(&ctx.text));
        assert!(!dir.path().join("next_context.md.tmp").exists());
    }

    #[test]
    fn test_concurrent_takers_get_one_artifact() {
        let dir = tempdir().unwrap();
        let slot = Arc::new(HandoffSlot::new(&dir.path().join("next_context.md")));
        slot.write(&HandoffContext::new("M4", "only once")).unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let slot = Arc::clone(&slot);
                thread::spawn(move || slot.take().unwrap().is_some())
            })
            .collect();
        let taken = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|t| *t)
            .count();
        assert_eq!(taken, 1);
    }
}
