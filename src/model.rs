//! Core data types for the sync engine.
//!
//! Foundation types used throughout ferry: changelists, sync ranges,
//! change sets, and the outcomes produced by the mirror, commit, and
//! reverse-reconcile stages.

use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

// ---------------------------------------------------------------------------
// Changelist
// ---------------------------------------------------------------------------

/// A submitted source-system changelist.
///
/// Immutable once submitted; ferry only ever reads these. The timestamp is
/// preserved verbatim as epoch seconds, exactly as the source reports it,
/// so destination commits can carry the original time.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Changelist {
    /// Unique, monotonically increasing changelist number.
    pub number: u64,
    /// Submission time in epoch seconds, as reported by the source.
    pub time: i64,
    /// Full changelist description.
    pub description: String,
    /// Depot paths of every file the changelist touched.
    pub affected: Vec<String>,
}

impl Changelist {
    /// First line of the description, trimmed. Used in logs and dry-run
    /// reports.
    #[must_use]
    pub fn summary(&self) -> &str {
        self.description.lines().next().unwrap_or("").trim()
    }
}

impl fmt::Display for Changelist {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CL {}", self.number)
    }
}

// ---------------------------------------------------------------------------
// SyncRange
// ---------------------------------------------------------------------------

/// An inclusive changelist range, iterated in ascending order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SyncRange {
    /// Lower bound (inclusive).
    pub first: u64,
    /// Upper bound (inclusive).
    pub last: u64,
}

impl SyncRange {
    /// Create a range, rejecting `first > last`.
    ///
    /// # Errors
    /// Returns an error if the bounds are out of order.
    pub fn new(first: u64, last: u64) -> Result<Self, RangeParseError> {
        if first > last {
            return Err(RangeParseError {
                value: format!("{first},{last}"),
                reason: "first must not exceed last".to_owned(),
            });
        }
        Ok(Self { first, last })
    }
}

impl fmt::Display for SyncRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.first, self.last)
    }
}

impl FromStr for SyncRange {
    type Err = RangeParseError;

    /// Parse the command-line form `first,last`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let Some((first, last)) = s.split_once(',') else {
            return Err(RangeParseError {
                value: s.to_owned(),
                reason: "expected two changelist numbers separated by a comma".to_owned(),
            });
        };
        let parse = |part: &str| {
            part.trim().parse::<u64>().map_err(|_| RangeParseError {
                value: s.to_owned(),
                reason: format!("`{}` is not a changelist number", part.trim()),
            })
        };
        Self::new(parse(first)?, parse(last)?)
    }
}

/// A range argument that could not be parsed or was out of order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RangeParseError {
    /// The invalid value.
    pub value: String,
    /// Human-readable explanation.
    pub reason: String,
}

impl fmt::Display for RangeParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid range {:?}: {}", self.value, self.reason)
    }
}

impl std::error::Error for RangeParseError {}

// ---------------------------------------------------------------------------
// ChangeSet
// ---------------------------------------------------------------------------

/// Repo-relative paths changed by mirroring one changelist.
///
/// The symmetric difference between a destination directory's prior state
/// and the exported source tree. Sets are ordered so logs, dry-run reports,
/// and staging commands are deterministic.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ChangeSet {
    /// Files present in the export but not the destination.
    pub added: BTreeSet<PathBuf>,
    /// Files present in both with differing content.
    pub modified: BTreeSet<PathBuf>,
    /// Files present in the destination but not the export.
    pub deleted: BTreeSet<PathBuf>,
}

impl ChangeSet {
    /// True if mirroring changed nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.modified.is_empty() && self.deleted.is_empty()
    }

    /// Total number of changed paths.
    #[must_use]
    pub fn len(&self) -> usize {
        self.added.len() + self.modified.len() + self.deleted.len()
    }

    /// Every changed path (added, modified, and deleted), ordered.
    ///
    /// This is exactly the set of paths the commit stage stages.
    #[must_use]
    pub fn files(&self) -> Vec<&Path> {
        let mut files: Vec<&Path> = self
            .added
            .iter()
            .chain(&self.modified)
            .chain(&self.deleted)
            .map(PathBuf::as_path)
            .collect();
        files.sort_unstable();
        files
    }

    /// Fold another change set into this one (used to aggregate per-mapping
    /// results into one per-changelist result).
    pub fn extend(&mut self, other: Self) {
        self.added.extend(other.added);
        self.modified.extend(other.modified);
        self.deleted.extend(other.deleted);
    }
}

impl fmt::Display for ChangeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "+{} ~{} -{}",
            self.added.len(),
            self.modified.len(),
            self.deleted.len()
        )
    }
}

// ---------------------------------------------------------------------------
// MirrorResult
// ---------------------------------------------------------------------------

/// The outcome of mirroring one changelist across all affected mappings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MirrorResult {
    /// The changelist that was mirrored.
    pub changelist: Changelist,
    /// Aggregate changes across every affected mapping.
    pub changes: ChangeSet,
}

// ---------------------------------------------------------------------------
// CommitOutcome
// ---------------------------------------------------------------------------

/// What the commit stage did with a [`MirrorResult`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CommitOutcome {
    /// A commit was created.
    Committed {
        /// The new commit's id as reported by the destination.
        id: String,
    },
    /// Mirroring produced no net change; no commit was created.
    NoOp,
    /// Dry-run: the would-be commit was reported, nothing was staged.
    DryRun,
}

// ---------------------------------------------------------------------------
// ReconcilePlan
// ---------------------------------------------------------------------------

/// Pending source-side actions computed by reverse reconciliation.
///
/// Paths are repo-relative. The plan is only ever applied as pending opens;
/// submission stays a human step.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReconcilePlan {
    /// Present only in the destination: open for add.
    pub adds: BTreeSet<PathBuf>,
    /// Present in both with differing content: open for edit.
    pub edits: BTreeSet<PathBuf>,
    /// Present only in the source workspace: open for delete.
    pub deletes: BTreeSet<PathBuf>,
}

impl ReconcilePlan {
    /// True if both trees already agree.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.adds.is_empty() && self.edits.is_empty() && self.deletes.is_empty()
    }

    /// Total number of pending actions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.adds.len() + self.edits.len() + self.deletes.len()
    }
}

impl fmt::Display for ReconcilePlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} add(s), {} edit(s), {} delete(s)",
            self.adds.len(),
            self.edits.len(),
            self.deletes.len()
        )
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
