use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use git2::{ErrorCode, Repository, Sort, Status, StatusOptions};
use serde::Serialize;
use std::path::Path;

/// Working-tree paths owned by the bridge itself; never counted as changes.
const BRIDGE_DIR_PREFIX: &str = ".bridge";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommitInfo {
    /// Abbreviated commit id
    pub id: String,
    pub summary: String,
    pub time: DateTime<Utc>,
}

/// Version-control state of the project at one point in time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RepoState {
    /// Branch name, or `detached`
    pub branch: String,
    pub uncommitted: usize,
    /// `None` for an unborn repository
    pub head: Option<CommitInfo>,
    /// Most recent commits, newest first
    pub history: Vec<CommitInfo>,
}

pub struct GitTracker {
    repo: Repository,
}

impl GitTracker {
    pub fn new(project_dir: &Path) -> Result<Self> {
        let repo = Repository::open(project_dir).context("Failed to open git repository")?;
        Ok(Self { repo })
    }

    /// Read branch, working-tree and history state, inspecting at most
    /// `history_depth` commits.
    pub fn probe(&self, history_depth: usize) -> Result<RepoState> {
        let history = self.history(history_depth)?;
        Ok(RepoState {
            branch: self.branch()?,
            uncommitted: self.uncommitted_count()?,
            head: history.first().cloned(),
            history,
        })
    }

    pub fn branch(&self) -> Result<String> {
        match self.repo.head() {
            Ok(head) => {
                if self.repo.head_detached().unwrap_or(false) {
                    Ok("detached".to_string())
                } else {
                    Ok(head.shorthand().unwrap_or("detached").to_string())
                }
            }
            Err(e) if e.code() == ErrorCode::UnbornBranch => {
                // HEAD points at a branch with no commits yet
                let head = self
                    .repo
                    .find_reference("HEAD")
                    .context("Failed to read HEAD")?;
                Ok(head
                    .symbolic_target()
                    .and_then(|t| t.strip_prefix("refs/heads/"))
                    .unwrap_or("unborn")
                    .to_string())
            }
            Err(e) => Err(e).context("Failed to read HEAD"),
        }
    }

    /// Changed, staged or untracked files, ignoring the bridge's own directory.
    pub fn uncommitted_count(&self) -> Result<usize> {
        let mut opts = StatusOptions::new();
        opts.include_untracked(true)
            .include_ignored(false)
            .recurse_untracked_dirs(false);

        let statuses = self
            .repo
            .statuses(Some(&mut opts))
            .context("Failed to read working tree status")?;

        Ok(statuses
            .iter()
            .filter(|entry| {
                let status = entry.status();
                status != Status::CURRENT && !status.contains(Status::IGNORED)
            })
            .filter(|entry| {
                !entry
                    .path()
                    .map(|p| p.starts_with(BRIDGE_DIR_PREFIX))
                    .unwrap_or(false)
            })
            .count())
    }

    fn history(&self, depth: usize) -> Result<Vec<CommitInfo>> {
        if self.head_commit().is_none() {
            return Ok(Vec::new());
        }

        let mut walk = self.repo.revwalk().context("Failed to walk history")?;
        walk.push_head()?;
        walk.set_sorting(Sort::TIME)?;

        let mut commits = Vec::new();
        for oid in walk.take(depth.max(1)) {
            let commit = self.repo.find_commit(oid?)?;
            let id = commit.id().to_string();
            commits.push(CommitInfo {
                id: id.chars().take(7).collect(),
                summary: commit.summary().unwrap_or_default().to_string(),
                time: DateTime::from_timestamp(commit.time().seconds(), 0).unwrap_or_default(),
            });
        }
        Ok(commits)
    }

    /// HEAD commit if it exists (None for unborn branches)
    fn head_commit(&self) -> Option<git2::Commit<'_>> {
        self.repo
            .head()
            .ok()
            .and_then(|head| head.peel_to_commit().ok())
    }
}
