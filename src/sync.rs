//! The forward flow: changelists in, commits out.
//!
//! The engine walks the requested range in ascending changelist order
//! and, for each changelist that touches a mapped path, mirrors the
//! exported trees into the destination and commits the result. Progress
//! is durable per changelist: the cursor advances only after a
//! changelist is fully processed, and the run halts at the first failure
//! so a re-run can resume from the reported number.

use tracing::{debug, info, warn};

use crate::commit::CommitBuilder;
use crate::cursor::SyncCursor;
use crate::dest::DestRepo;
use crate::error::Result;
use crate::mirror::MirrorEngine;
use crate::model::{CommitOutcome, SyncRange};
use crate::pathmap::PathMapper;
use crate::source::ChangelistSource;

// ---------------------------------------------------------------------------
// SyncSummary
// ---------------------------------------------------------------------------

/// What one `sync` run did (or, dry, would have done).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SyncSummary {
    /// Commits created.
    pub committed: usize,
    /// Commits a dry run would have created.
    pub planned: usize,
    /// Changelists that mirrored to no net change.
    pub no_ops: usize,
    /// Changelists skipped because they touch no mapped path.
    pub skipped: usize,
    /// Whether this was a dry run.
    pub dry_run: bool,
}

impl std::fmt::Display for SyncSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.dry_run {
            write!(f, "dry run: would create {} commit(s)", self.planned)?;
        } else {
            write!(f, "created {} commit(s)", self.committed)?;
        }
        write!(f, ", {} no-op(s), {} skipped", self.no_ops, self.skipped)
    }
}

// ---------------------------------------------------------------------------
// SyncEngine
// ---------------------------------------------------------------------------

/// Drives mirror and commit for a range of changelists.
#[derive(Debug)]
pub struct SyncEngine<'a> {
    mapper: &'a PathMapper,
    dry_run: bool,
    no_cl: bool,
}

impl<'a> SyncEngine<'a> {
    #[must_use]
    pub const fn new(mapper: &'a PathMapper, dry_run: bool, no_cl: bool) -> Self {
        Self {
            mapper,
            dry_run,
            no_cl,
        }
    }

    /// Sync every changelist of `range`, oldest first.
    ///
    /// # Errors
    /// Halts at the first failing changelist; the error names it so the
    /// run can be resumed with a range starting there. Setup failures
    /// (source or destination unreachable) are reported before any
    /// changelist is touched.
    pub fn sync(
        &self,
        source: &dyn ChangelistSource,
        dest: &dyn DestRepo,
        range: SyncRange,
    ) -> Result<SyncSummary> {
        let mut summary = SyncSummary {
            dry_run: self.dry_run,
            ..SyncSummary::default()
        };

        let changelists = source.list_changelists(range)?;
        if changelists.is_empty() {
            info!(
                "no submitted changelists touch the mapped paths in {},{}",
                range.first, range.last
            );
            return Ok(summary);
        }
        info!("{} changelist(s) to process", changelists.len());

        self.warn_on_dirty_tree(dest)?;
        let cursor = SyncCursor::new(dest.git_dir());
        warn_on_cursor_mismatch(cursor.load()?, range);

        // Leftover staged state from an interrupted run must not leak
        // into the first commit of this one.
        if !self.dry_run {
            dest.unstage_all()?;
        }

        let mirror = MirrorEngine::new(self.mapper, dest.root(), self.dry_run);
        let builder = CommitBuilder::new(self.no_cl, self.dry_run);

        for changelist in &changelists {
            if self.mapper.affected_mappings(&changelist.affected).is_empty() {
                info!("{changelist} touches no mapped path, skipping");
                summary.skipped += 1;
                if !self.dry_run {
                    cursor.store(changelist.number)?;
                }
                continue;
            }

            info!("{changelist}: {}", changelist.summary());
            let result = mirror.mirror(source, changelist)?;
            match builder.commit(dest, &result)? {
                CommitOutcome::Committed { id } => {
                    debug!("{changelist} -> {id}");
                    summary.committed += 1;
                }
                CommitOutcome::NoOp => summary.no_ops += 1,
                CommitOutcome::DryRun => summary.planned += 1,
            }
            if !self.dry_run {
                cursor.store(changelist.number)?;
            }
        }

        Ok(summary)
    }

    /// Uncommitted edits under a mapped path will be absorbed into the
    /// next mirrored commit or overwritten by it. Worth a warning, not a
    /// refusal.
    fn warn_on_dirty_tree(&self, dest: &dyn DestRepo) -> Result<()> {
        let paths: Vec<&std::path::Path> =
            self.mapper.mappings().iter().map(|m| m.repo_path()).collect();
        if dest.is_dirty(&paths)? {
            warn!("destination has uncommitted changes under mapped paths; mirroring may absorb or overwrite them");
        }
        Ok(())
    }
}

/// Compare the requested range against the stored cursor and warn about
/// re-syncs and gaps. Advisory only; the run proceeds either way.
fn warn_on_cursor_mismatch(cursor: Option<u64>, range: SyncRange) {
    let Some(last) = cursor else { return };
    if range.first <= last {
        warn!(
            "range starts at {} but changelists up to {last} were already synced; expect no-op commits",
            range.first
        );
    } else if range.first > last + 1 {
        warn!(
            "range starts at {} leaving changelists {},{} unsynced",
            range.first,
            last + 1,
            range.first - 1
        );
    }
}
