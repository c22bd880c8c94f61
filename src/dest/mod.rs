//! The [`DestRepo`] trait — the minimal destination-VCS port.
//!
//! The commit stage and the sync orchestrator touch the destination
//! repository only through this trait: unstage, stage, commit, and a
//! dirty check. The production implementation shells out to the `git`
//! CLI ([`GitDest`]); the surface is deliberately small because the
//! destination's branching, merging, and history tooling stay entirely
//! out of scope.

pub mod git;

pub use git::GitDest;

use std::path::Path;

use thiserror::Error;

use crate::model::ChangeSet;

// ---------------------------------------------------------------------------
// DestError
// ---------------------------------------------------------------------------

/// Errors returned by [`DestRepo`] operations.
#[derive(Debug, Error)]
pub enum DestError {
    /// The path given at construction is not a repository work tree.
    #[error("not a git repository: {path}")]
    NotARepository {
        /// The offending path.
        path: String,
    },

    /// A destination command exited non-zero.
    #[error("`{command}` failed: {stderr}")]
    CommandFailed {
        /// The full command string (for diagnostics).
        command: String,
        /// Trimmed stderr from the tool.
        stderr: String,
    },

    /// An I/O error occurred (e.g. spawning the tool).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// DestRepo
// ---------------------------------------------------------------------------

/// The destination-repository abstraction used by the commit stage and
/// the sync orchestrator.
///
/// # Object safety
///
/// This trait is object-safe: no generic methods, no `Self` in return
/// position outside of `Result`.
pub trait DestRepo {
    /// The working-tree root.
    fn root(&self) -> &Path;

    /// The repository's metadata directory. Run state such as the sync
    /// cursor lives under it.
    ///
    /// Replaces: `git rev-parse --git-dir` (resolved once at open).
    fn git_dir(&self) -> &Path;

    /// Clear the index without touching the working tree, so staged
    /// leftovers from an interrupted run never leak into the next commit.
    /// A repository with no commits yet is a no-op, not an error.
    ///
    /// Replaces: `git reset`.
    fn unstage_all(&self) -> Result<(), DestError>;

    /// Stage exactly the paths in the change set: additions and
    /// modifications from the working tree, deletions from the index.
    /// A recorded deletion whose path was never tracked is skipped
    /// silently (drift cleanup of stray files).
    ///
    /// Replaces: `git add -- <paths>` plus `git rm -f -q --ignore-unmatch -- <paths>`.
    fn stage(&self, changes: &ChangeSet) -> Result<(), DestError>;

    /// Create a commit from the index with both author and committer
    /// dates set to `timestamp` (epoch seconds, UTC) and return the new
    /// commit's id. Authorship comes from the ambient git identity.
    ///
    /// Replaces: `git commit -m <message>` under
    /// `GIT_AUTHOR_DATE`/`GIT_COMMITTER_DATE`.
    fn commit(&self, message: &str, timestamp: i64) -> Result<String, DestError>;

    /// True if the working tree or index differs from HEAD under any of
    /// the given repo-relative paths.
    ///
    /// Replaces: `git status --porcelain -- <paths>`.
    fn is_dirty(&self, paths: &[&Path]) -> Result<bool, DestError>;
}
