//! The `git` CLI adapter for [`DestRepo`].
//!
//! Commit dates are pinned by exporting `GIT_AUTHOR_DATE` and
//! `GIT_COMMITTER_DATE` in git's internal `<epoch> <offset>` format, so a
//! synced commit carries the original changelist time on both clocks.
//! Authorship deliberately stays whatever identity git resolves from the
//! environment; source-system users are never impersonated.

use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::debug;

use crate::dest::{DestError, DestRepo};
use crate::model::ChangeSet;

// ---------------------------------------------------------------------------
// GitDest
// ---------------------------------------------------------------------------

/// Destination adapter backed by the `git` command-line tool.
#[derive(Debug)]
pub struct GitDest {
    root: PathBuf,
    git_dir: PathBuf,
}

impl GitDest {
    /// Open the repository whose working tree is at `root`.
    ///
    /// # Errors
    /// Returns [`DestError::NotARepository`] if `root` is not inside a git
    /// work tree.
    pub fn open(root: &Path) -> Result<Self, DestError> {
        let out = Command::new("git")
            .args(["rev-parse", "--git-dir"])
            .current_dir(root)
            .output()?;
        if !out.status.success() {
            return Err(DestError::NotARepository {
                path: root.display().to_string(),
            });
        }
        let reported = String::from_utf8_lossy(&out.stdout).trim_end().to_owned();
        let git_dir = if Path::new(&reported).is_absolute() {
            PathBuf::from(reported)
        } else {
            root.join(reported)
        };
        Ok(Self {
            root: root.to_owned(),
            git_dir,
        })
    }

    /// Run a git command in the repository root and return trimmed stdout.
    fn git(&self, args: &[&str]) -> Result<String, DestError> {
        self.git_with_env(args, &[])
    }

    fn git_with_env(&self, args: &[&str], envs: &[(&str, &str)]) -> Result<String, DestError> {
        debug!("git {}", args.join(" "));
        let mut cmd = Command::new("git");
        cmd.args(args).current_dir(&self.root);
        for (key, value) in envs {
            cmd.env(key, value);
        }
        let out = cmd.output()?;
        if out.status.success() {
            Ok(String::from_utf8_lossy(&out.stdout).trim_end().to_owned())
        } else {
            Err(DestError::CommandFailed {
                command: format!("git {}", args.join(" ")),
                stderr: String::from_utf8_lossy(&out.stderr).trim().to_owned(),
            })
        }
    }

    fn head_exists(&self) -> Result<bool, DestError> {
        let out = Command::new("git")
            .args(["rev-parse", "--verify", "--quiet", "HEAD"])
            .current_dir(&self.root)
            .output()?;
        Ok(out.status.success())
    }
}

impl DestRepo for GitDest {
    fn root(&self) -> &Path {
        &self.root
    }

    fn git_dir(&self) -> &Path {
        &self.git_dir
    }

    fn unstage_all(&self) -> Result<(), DestError> {
        if !self.head_exists()? {
            debug!("no commits yet, nothing to unstage");
            return Ok(());
        }
        self.git(&["reset", "-q"]).map(|_| ())
    }

    fn stage(&self, changes: &ChangeSet) -> Result<(), DestError> {
        let present: Vec<String> = changes
            .added
            .iter()
            .chain(&changes.modified)
            .map(|p| p.to_string_lossy().into_owned())
            .collect();
        if !present.is_empty() {
            let mut args: Vec<&str> = vec!["add", "--"];
            args.extend(present.iter().map(String::as_str));
            self.git(&args)?;
        }

        let gone: Vec<String> = changes
            .deleted
            .iter()
            .map(|p| p.to_string_lossy().into_owned())
            .collect();
        if !gone.is_empty() {
            // --ignore-unmatch skips stray files that were never tracked;
            // mirroring deletes those from disk but there is nothing to
            // record for them.
            let mut args: Vec<&str> = vec!["rm", "-f", "-q", "--ignore-unmatch", "--"];
            args.extend(gone.iter().map(String::as_str));
            self.git(&args)?;
        }
        Ok(())
    }

    fn commit(&self, message: &str, timestamp: i64) -> Result<String, DestError> {
        let date = format!("{timestamp} +0000");
        self.git_with_env(
            &["commit", "-q", "-m", message],
            &[("GIT_AUTHOR_DATE", &date), ("GIT_COMMITTER_DATE", &date)],
        )?;
        self.git(&["rev-parse", "HEAD"])
    }

    fn is_dirty(&self, paths: &[&Path]) -> Result<bool, DestError> {
        let specs: Vec<String> = paths
            .iter()
            .map(|p| p.to_string_lossy().into_owned())
            .collect();
        let mut args: Vec<&str> = vec!["status", "--porcelain"];
        if !specs.is_empty() {
            args.push("--");
            args.extend(specs.iter().map(String::as_str));
        }
        Ok(!self.git(&args)?.is_empty())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
