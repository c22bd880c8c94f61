//! Full-mirror replacement of destination directories from exported trees.
//!
//! For each changelist the engine replaces the content of every affected
//! mapping's repo directory with the exported subtree: files in the export
//! are written, files absent from the export are deleted, ignored paths are
//! left alone on both sides. The result is a [`ChangeSet`] of what actually
//! changed, computed by byte comparison.
//!
//! Replacement rather than patch replay is the point: the source's diff
//! format cannot be trusted against the destination's current state, while
//! "destination subtree equals exported subtree" is idempotent and heals
//! any drift on the next changelist.
//!
//! Source systems export files read-only, so overwrites and deletes clear
//! the read-only bit first. Directories emptied by deletion are pruned;
//! directories still holding ignored files survive.

use std::collections::BTreeSet;
use std::io;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::FerryError;
use crate::model::{Changelist, ChangeSet, MirrorResult};
use crate::pathmap::{PathMapper, PathMapping};
use crate::source::ChangelistSource;

// ---------------------------------------------------------------------------
// MirrorEngine
// ---------------------------------------------------------------------------

/// Mirrors exported source trees into the destination working tree.
#[derive(Debug)]
pub struct MirrorEngine<'a> {
    mapper: &'a PathMapper,
    dest_root: PathBuf,
    dry_run: bool,
}

impl<'a> MirrorEngine<'a> {
    /// Create an engine writing under `dest_root` (the repository work
    /// tree). In dry-run mode the change set is computed by comparison
    /// only and the destination is never written.
    #[must_use]
    pub fn new(mapper: &'a PathMapper, dest_root: &Path, dry_run: bool) -> Self {
        Self {
            mapper,
            dest_root: dest_root.to_owned(),
            dry_run,
        }
    }

    /// Mirror one changelist across all affected mappings.
    ///
    /// Every affected mapping is exported before anything is written, so a
    /// failing export aborts the changelist with the destination untouched.
    ///
    /// # Errors
    /// Propagates [`FerryError::ExportFailed`] from the source and returns
    /// [`FerryError::MirrorFailed`] for filesystem errors during
    /// replacement.
    pub fn mirror(
        &self,
        source: &dyn ChangelistSource,
        changelist: &Changelist,
    ) -> Result<MirrorResult, FerryError> {
        let mappings = self.mapper.affected_mappings(&changelist.affected);

        let mut exports = Vec::with_capacity(mappings.len());
        for mapping in &mappings {
            let snapshot = source.export_tree(mapping, changelist.number)?;
            exports.push((*mapping, snapshot));
        }

        let mut changes = ChangeSet::default();
        for (mapping, snapshot) in &exports {
            let set = self.mirror_mapping(mapping, snapshot.root(), changelist.number)?;
            changes.extend(set);
        }

        Ok(MirrorResult {
            changelist: changelist.clone(),
            changes,
        })
    }

    /// Replace one mapping's repo directory with the exported tree.
    fn mirror_mapping(
        &self,
        mapping: &PathMapping,
        export_root: &Path,
        change: u64,
    ) -> Result<ChangeSet, FerryError> {
        let dest_dir = self.dest_root.join(mapping.repo_path());
        let fail = |path: &Path, e: &io::Error| FerryError::MirrorFailed {
            change,
            detail: format!("{}: {e}", path.display()),
        };

        // A mapping whose subtree is empty at this changelist has no
        // export directory at all; that simply mirrors as "delete
        // everything".
        let export_files = walk_files(export_root).map_err(|e| fail(export_root, &e))?;
        let dest_files = walk_files(&dest_dir).map_err(|e| fail(&dest_dir, &e))?;

        let mut changes = ChangeSet::default();

        // Copy pass: write every exported file that is not ignored.
        for rel in &export_files {
            let repo_rel = mapping.repo_path().join(rel);
            if self.mapper.is_ignored(&repo_rel) {
                debug!("ignore {}", repo_rel.display());
                continue;
            }
            let src = export_root.join(rel);
            let dst = dest_dir.join(rel);
            if dst.exists() {
                if files_differ(&src, &dst).map_err(|e| fail(&dst, &e))? {
                    debug!("update {}", repo_rel.display());
                    if !self.dry_run {
                        make_writable(&dst).map_err(|e| fail(&dst, &e))?;
                        std::fs::copy(&src, &dst).map_err(|e| fail(&dst, &e))?;
                    }
                    changes.modified.insert(repo_rel);
                }
            } else {
                debug!("add {}", repo_rel.display());
                if !self.dry_run {
                    if let Some(parent) = dst.parent() {
                        std::fs::create_dir_all(parent).map_err(|e| fail(parent, &e))?;
                    }
                    std::fs::copy(&src, &dst).map_err(|e| fail(&dst, &e))?;
                }
                changes.added.insert(repo_rel);
            }
        }

        // Delete pass: drop destination files absent from the export,
        // keeping ignored paths untouched.
        for rel in &dest_files {
            if export_files.contains(rel) {
                continue;
            }
            let repo_rel = mapping.repo_path().join(rel);
            if self.mapper.is_ignored(&repo_rel) {
                continue;
            }
            debug!("delete {}", repo_rel.display());
            if !self.dry_run {
                let dst = dest_dir.join(rel);
                make_writable(&dst).map_err(|e| fail(&dst, &e))?;
                std::fs::remove_file(&dst).map_err(|e| fail(&dst, &e))?;
            }
            changes.deleted.insert(repo_rel);
        }

        if !self.dry_run && !changes.deleted.is_empty() && dest_dir.exists() {
            prune_empty_dirs(&dest_dir).map_err(|e| fail(&dest_dir, &e))?;
        }

        Ok(changes)
    }
}

// ---------------------------------------------------------------------------
// Filesystem helpers
// ---------------------------------------------------------------------------

/// Collect every file under `base` as a sorted set of relative paths.
/// A missing `base` is an empty tree, not an error.
pub(crate) fn walk_files(base: &Path) -> io::Result<BTreeSet<PathBuf>> {
    fn inner(base: &Path, current: &Path, files: &mut BTreeSet<PathBuf>) -> io::Result<()> {
        for entry in std::fs::read_dir(current)? {
            let entry = entry?;
            let path = entry.path();
            if entry.file_type()?.is_dir() {
                inner(base, &path, files)?;
            } else if let Ok(rel) = path.strip_prefix(base) {
                files.insert(rel.to_path_buf());
            }
        }
        Ok(())
    }

    let mut files = BTreeSet::new();
    if base.exists() {
        inner(base, base, &mut files)?;
    }
    Ok(files)
}

/// Byte-for-byte comparison.
pub(crate) fn files_differ(a: &Path, b: &Path) -> io::Result<bool> {
    Ok(std::fs::read(a)? != std::fs::read(b)?)
}

/// Clear the read-only bit so an exported file can be overwritten or
/// removed.
pub(crate) fn make_writable(path: &Path) -> io::Result<()> {
    let mut perms = std::fs::metadata(path)?.permissions();
    if !perms.readonly() {
        return Ok(());
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        perms.set_mode(perms.mode() | 0o200);
    }
    #[cfg(not(unix))]
    #[allow(clippy::permissions_set_readonly_false)]
    perms.set_readonly(false);
    std::fs::set_permissions(path, perms)
}

/// Remove directories left empty by the delete pass, bottom-up. A
/// directory that still holds ignored files stays. Returns whether `dir`
/// itself ended up empty and was removed.
fn prune_empty_dirs(dir: &Path) -> io::Result<bool> {
    let mut empty = true;
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            if !prune_empty_dirs(&entry.path())? {
                empty = false;
            }
        } else {
            empty = false;
        }
    }
    if empty {
        std::fs::remove_dir(dir)?;
    }
    Ok(empty)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
