//! Version-control probe.

pub mod git;

pub use git::{CommitInfo, GitTracker, RepoState};
