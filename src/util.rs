//! Shared utility functions for the bridge crate.

use fs2::FileExt;
use std::io::Write;
use std::path::Path;

/// Exclusive advisory lock on an append-only file, released on drop.
///
/// Holding the guard lets a caller read the file and append in one critical
/// section.
pub struct AppendGuard {
    file: std::fs::File,
}

impl AppendGuard {
    pub fn acquire(path: &Path) -> std::io::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        file.lock_exclusive()?;
        Ok(Self { file })
    }

    /// The whole line goes out in a single `write_all` and is synced, so
    /// concurrent writers never interleave partial lines and a returned `Ok`
    /// means the line is durable.
    pub fn append_line(&mut self, line: &str) -> std::io::Result<()> {
        let mut buf = String::with_capacity(line.len() + 1);
        buf.push_str(line);
        buf.push('\n');
        self.file
            .write_all(buf.as_bytes())
            .and_then(|_| self.file.sync_data())
    }
}

impl Drop for AppendGuard {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

/// Append one line to `path` under an exclusive advisory lock.
pub fn append_line_locked(path: &Path, line: &str) -> std::io::Result<()> {
    AppendGuard::acquire(path)?.append_line(line)
}

/// At most `max` characters of `text`, with an ellipsis when cut.
pub fn excerpt(text: &str, max: usize) -> String {
    let text = text.trim();
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max.saturating_sub(1)).collect();
    out.push('…');
    out
}
