//! Reverse reconciliation: push destination content back into the source
//! workspace.
//!
//! The forward flow assumes the destination tree is a faithful mirror.
//! When someone edits the destination directly (a hotfix landed as a git
//! commit, say), the trees drift. This module compares every mapped repo
//! directory against the corresponding live source workspace directory
//! and opens pending source-side actions so the source catches up:
//!
//! - file present in the destination only: copied over, then opened for
//!   add
//! - file present on both sides with differing bytes: opened for edit,
//!   then overwritten with destination content
//! - file present in the source only: opened for delete (the source tool
//!   removes the workspace copy itself)
//!
//! Nothing is ever submitted; a human reviews the pending changelist.
//! Ignored paths are invisible to the comparison on both sides.

use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::FerryError;
use crate::mirror::{files_differ, make_writable, walk_files};
use crate::model::ReconcilePlan;
use crate::pathmap::{PathMapper, PathMapping};
use crate::source::ChangelistSource;

// ---------------------------------------------------------------------------
// ReverseReconciler
// ---------------------------------------------------------------------------

/// Compares mapped trees and opens pending source-side actions.
#[derive(Debug)]
pub struct ReverseReconciler<'a> {
    mapper: &'a PathMapper,
    dest_root: PathBuf,
    dry_run: bool,
}

impl<'a> ReverseReconciler<'a> {
    #[must_use]
    pub fn new(mapper: &'a PathMapper, dest_root: &Path, dry_run: bool) -> Self {
        Self {
            mapper,
            dest_root: dest_root.to_owned(),
            dry_run,
        }
    }

    /// Reconcile every mapping and return the aggregate plan.
    ///
    /// In dry-run mode the plan is reported to stdout and nothing is
    /// copied or opened.
    ///
    /// # Errors
    /// Returns [`FerryError::ReconcileFailed`] for tree-read or copy
    /// failures, and propagates the source adapter's errors for pending
    /// actions that could not be opened.
    pub fn reconcile(&self, source: &dyn ChangelistSource) -> Result<ReconcilePlan, FerryError> {
        let mut plan = ReconcilePlan::default();
        for mapping in self.mapper.mappings() {
            let workspace = source.workspace_dir(mapping)?;
            let mapping_plan = self.plan_mapping(mapping, &workspace)?;
            if mapping_plan.is_empty() {
                debug!("`{}` is in sync", mapping.depot_pattern());
                continue;
            }
            if !self.dry_run {
                self.apply_mapping(source, mapping, &workspace, &mapping_plan)?;
            }
            plan.adds.extend(mapping_plan.adds);
            plan.edits.extend(mapping_plan.edits);
            plan.deletes.extend(mapping_plan.deletes);
        }

        if self.dry_run && !plan.is_empty() {
            println!("would open {} pending action(s):", plan.len());
            for path in &plan.adds {
                println!("  add {}", path.display());
            }
            for path in &plan.edits {
                println!("  edit {}", path.display());
            }
            for path in &plan.deletes {
                println!("  delete {}", path.display());
            }
        }
        Ok(plan)
    }

    /// Diff one mapping's destination directory against its workspace
    /// directory. Paths in the returned plan are repo-relative.
    fn plan_mapping(
        &self,
        mapping: &PathMapping,
        workspace: &Path,
    ) -> Result<ReconcilePlan, FerryError> {
        let fail = |path: &Path, e: &io::Error| reconcile_failed(mapping, path, e);
        let dest_dir = self.dest_root.join(mapping.repo_path());
        let dest_files = walk_files(&dest_dir).map_err(|e| fail(&dest_dir, &e))?;
        let ws_files = walk_files(workspace).map_err(|e| fail(workspace, &e))?;

        let mut plan = ReconcilePlan::default();
        for rel in &dest_files {
            let repo_rel = mapping.repo_path().join(rel);
            if self.mapper.is_ignored(&repo_rel) {
                continue;
            }
            if ws_files.contains(rel) {
                let differs = files_differ(&dest_dir.join(rel), &workspace.join(rel))
                    .map_err(|e| fail(&dest_dir.join(rel), &e))?;
                if differs {
                    plan.edits.insert(repo_rel);
                }
            } else {
                plan.adds.insert(repo_rel);
            }
        }
        for rel in &ws_files {
            if dest_files.contains(rel) {
                continue;
            }
            let repo_rel = mapping.repo_path().join(rel);
            if self.mapper.is_ignored(&repo_rel) {
                continue;
            }
            plan.deletes.insert(repo_rel);
        }
        Ok(plan)
    }

    /// Open the pending actions for one mapping's plan.
    fn apply_mapping(
        &self,
        source: &dyn ChangelistSource,
        mapping: &PathMapping,
        workspace: &Path,
        plan: &ReconcilePlan,
    ) -> Result<(), FerryError> {
        let fail = |path: &Path, e: &io::Error| reconcile_failed(mapping, path, e);
        let dest_dir = self.dest_root.join(mapping.repo_path());

        // Adds need the file in place before the source tool will accept
        // it.
        for repo_rel in &plan.adds {
            let Ok(rel) = repo_rel.strip_prefix(mapping.repo_path()) else {
                continue;
            };
            let target = workspace.join(rel);
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent).map_err(|e| fail(parent, &e))?;
            }
            std::fs::copy(dest_dir.join(rel), &target).map_err(|e| fail(&target, &e))?;
            source.open_add(&target)?;
            info!("add {}", repo_rel.display());
        }

        // Edits are opened first so the workspace copy becomes writable,
        // then overwritten. The explicit chmod covers sources that leave
        // the read-only bit alone.
        for repo_rel in &plan.edits {
            let Ok(rel) = repo_rel.strip_prefix(mapping.repo_path()) else {
                continue;
            };
            let target = workspace.join(rel);
            source.open_edit(&target)?;
            make_writable(&target).map_err(|e| fail(&target, &e))?;
            std::fs::copy(dest_dir.join(rel), &target).map_err(|e| fail(&target, &e))?;
            info!("edit {}", repo_rel.display());
        }

        // Deletes are entirely the source tool's business; it removes the
        // workspace copy when the action is opened.
        for repo_rel in &plan.deletes {
            let Ok(rel) = repo_rel.strip_prefix(mapping.repo_path()) else {
                continue;
            };
            source.open_delete(&workspace.join(rel))?;
            info!("delete {}", repo_rel.display());
        }
        Ok(())
    }
}

fn reconcile_failed(mapping: &PathMapping, path: &Path, e: &io::Error) -> FerryError {
    FerryError::ReconcileFailed {
        mapping: mapping.depot_pattern().to_owned(),
        detail: format!("{}: {e}", path.display()),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
