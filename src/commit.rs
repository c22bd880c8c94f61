//! Turns mirror results into destination commits.
//!
//! One mirrored changelist becomes at most one commit: the change set's
//! files are staged exactly, the commit message carries the changelist
//! description, and the author and committer dates are pinned to the
//! changelist's original submit time so destination history lines up with
//! source history. The committing identity is whatever the repository is
//! configured with, never the source-side user.

use tracing::{debug, info};

use crate::dest::DestRepo;
use crate::error::FerryError;
use crate::model::{Changelist, CommitOutcome, MirrorResult};

// ---------------------------------------------------------------------------
// CommitBuilder
// ---------------------------------------------------------------------------

/// Stages and commits the outcome of one mirrored changelist.
#[derive(Clone, Copy, Debug)]
pub struct CommitBuilder {
    no_cl: bool,
    dry_run: bool,
}

impl CommitBuilder {
    /// `no_cl` drops the trailing changelist reference from commit
    /// messages; `dry_run` reports what would be committed without
    /// touching the index.
    #[must_use]
    pub const fn new(no_cl: bool, dry_run: bool) -> Self {
        Self { no_cl, dry_run }
    }

    /// Commit one mirror result.
    ///
    /// An empty change set is a [`CommitOutcome::NoOp`]: the changelist
    /// was relevant by path but mirrored to no net change (for example it
    /// only touched ignored files).
    ///
    /// # Errors
    /// Returns [`FerryError::CommitFailed`] if the destination rejects
    /// the staged change.
    pub fn commit(
        &self,
        dest: &dyn DestRepo,
        result: &MirrorResult,
    ) -> Result<CommitOutcome, FerryError> {
        let changelist = &result.changelist;
        if result.changes.is_empty() {
            debug!("{changelist} changed nothing, no commit");
            return Ok(CommitOutcome::NoOp);
        }

        let message = self.message(changelist);
        if self.dry_run {
            println!(
                "would commit {changelist} at {} ({})",
                changelist.time, result.changes
            );
            for path in &result.changes.added {
                println!("  A {}", path.display());
            }
            for path in &result.changes.modified {
                println!("  M {}", path.display());
            }
            for path in &result.changes.deleted {
                println!("  D {}", path.display());
            }
            if let Some(subject) = message.lines().next() {
                println!("  message: {subject}");
            }
            return Ok(CommitOutcome::DryRun);
        }

        let fail = |e: crate::dest::DestError| FerryError::CommitFailed {
            change: changelist.number,
            detail: e.to_string(),
        };
        dest.stage(&result.changes).map_err(fail)?;
        let id = dest.commit(&message, changelist.time).map_err(fail)?;
        info!("committed {changelist} as {id}");
        Ok(CommitOutcome::Committed { id })
    }

    /// Build the commit message for a changelist.
    ///
    /// The body is the trimmed description, falling back to `CL <n>` for
    /// changelists submitted without one. Unless suppressed, a trailing
    /// `[CL <n>]` reference is appended after a blank line.
    fn message(&self, changelist: &Changelist) -> String {
        let description = changelist.description.trim();
        let mut message = if description.is_empty() {
            changelist.to_string()
        } else {
            description.to_owned()
        };
        if !self.no_cl {
            message.push_str(&format!("\n\n[CL {}]", changelist.number));
        }
        message
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
