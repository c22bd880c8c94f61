//! The [`ChangelistSource`] trait — the abstraction boundary between the
//! engine and the centralized source system.
//!
//! The mirror, commit, and reverse stages interact with the source
//! exclusively through this trait. The trait is object-safe so the engine
//! can hold `&dyn ChangelistSource`; the production implementation shells
//! out to the `p4` CLI ([`P4Source`]), tests use a scripted in-process
//! double.

pub mod p4;

pub use p4::P4Source;

use std::path::{Path, PathBuf};

use crate::error::FerryError;
use crate::model::{Changelist, SyncRange};
use crate::pathmap::PathMapping;

// ---------------------------------------------------------------------------
// WorkspaceSnapshot
// ---------------------------------------------------------------------------

/// The on-disk root of one mapping's subtree content at a specific
/// changelist.
///
/// Where the tree lives is the source adapter's business: the p4 adapter
/// hands out its bound client workspace directory after syncing, test
/// doubles hand out staging directories. The only promise is a readable
/// root outside the destination repository.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorkspaceSnapshot {
    root: PathBuf,
}

impl WorkspaceSnapshot {
    /// Wrap a materialized tree root.
    #[must_use]
    pub const fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// The directory holding the exported subtree.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }
}

// ---------------------------------------------------------------------------
// ChangelistSource
// ---------------------------------------------------------------------------

/// The source-system abstraction used by the sync and reverse engines.
///
/// # Object safety
///
/// This trait is object-safe: no generic methods, no `Self` in return
/// position outside of `Result`.
pub trait ChangelistSource {
    /// List submitted changelists in the inclusive range that touch any
    /// configured mapping, ascending by number, with full descriptions,
    /// timestamps, and affected depot paths.
    ///
    /// Replaces: `p4 changes -s submitted <pattern>@<first>,<last>` plus
    /// `p4 describe -s <n>` per result.
    fn list_changelists(&self, range: SyncRange) -> Result<Vec<Changelist>, FerryError>;

    /// Materialize the mapping's depot subtree as of the changelist and
    /// return its on-disk root. Deterministic against an unchanged source.
    ///
    /// Replaces: `p4 sync <pattern>@<change>`.
    fn export_tree(
        &self,
        mapping: &PathMapping,
        change: u64,
    ) -> Result<WorkspaceSnapshot, FerryError>;

    /// The workspace-local directory bound to the mapping's depot pattern.
    /// The reverse flow reads and writes the live workspace through this.
    ///
    /// Replaces: `p4 where <pattern>`.
    fn workspace_dir(&self, mapping: &PathMapping) -> Result<PathBuf, FerryError>;

    /// Open a workspace file for add in the default pending changelist.
    ///
    /// Replaces: `p4 add <file>`.
    fn open_add(&self, file: &Path) -> Result<(), FerryError>;

    /// Open a workspace file for edit, making it writable.
    ///
    /// Replaces: `p4 edit <file>`.
    fn open_edit(&self, file: &Path) -> Result<(), FerryError>;

    /// Open a workspace file for delete. The source removes the local
    /// file itself.
    ///
    /// Replaces: `p4 delete <file>`.
    fn open_delete(&self, file: &Path) -> Result<(), FerryError>;
}
