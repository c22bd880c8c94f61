//! Shared test helpers for ferry integration tests.
//!
//! Each test gets its own git repository and a scripted in-process
//! changelist source in temp directories; nothing talks to a real
//! Perforce server.
#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::sync::Mutex;

use tempfile::TempDir;

use ferry::error::FerryError;
use ferry::model::{Changelist, SyncRange};
use ferry::pathmap::{IgnoreSet, PathMapper, PathMapping};
use ferry::source::{ChangelistSource, WorkspaceSnapshot};

// ---------------------------------------------------------------------------
// Scripted source
// ---------------------------------------------------------------------------

/// In-process [`ChangelistSource`] backed by canned changelists and
/// per-pattern workspace directories.
///
/// Trees are scripted as full subtree states: `set_tree(pattern, n, ..)`
/// records what the pattern's subtree looks like from changelist `n`
/// onward, and `export_tree` materializes the newest recorded state at
/// or before the requested changelist, files marked read-only the way a
/// real sync leaves them.
pub struct ScriptedSource {
    ws: TempDir,
    dirs: BTreeMap<String, PathBuf>,
    changelists: Vec<Changelist>,
    trees: BTreeMap<(String, u64), Vec<(String, String)>>,
    fail_exports: BTreeSet<u64>,
    opened: Mutex<Vec<(String, PathBuf)>>,
}

impl ScriptedSource {
    pub fn new(patterns: &[&str]) -> Self {
        let ws = TempDir::new().expect("failed to create temp dir");
        let dirs = patterns
            .iter()
            .enumerate()
            .map(|(i, p)| ((*p).to_owned(), ws.path().join(format!("ws{i}"))))
            .collect();
        Self {
            ws,
            dirs,
            changelists: Vec::new(),
            trees: BTreeMap::new(),
            fail_exports: BTreeSet::new(),
            opened: Mutex::new(Vec::new()),
        }
    }

    /// Register a submitted changelist.
    pub fn add_changelist(&mut self, number: u64, time: i64, description: &str, affected: &[&str]) {
        self.changelists.push(Changelist {
            number,
            time,
            description: description.to_owned(),
            affected: affected.iter().map(|s| (*s).to_owned()).collect(),
        });
    }

    /// Record the full state of `pattern`'s subtree as of changelist
    /// `change`. Paths are relative to the subtree root.
    pub fn set_tree(&mut self, pattern: &str, change: u64, files: &[(&str, &str)]) {
        self.trees.insert(
            (pattern.to_owned(), change),
            files
                .iter()
                .map(|(p, c)| ((*p).to_owned(), (*c).to_owned()))
                .collect(),
        );
    }

    /// Make `export_tree` fail for the given changelist.
    pub fn fail_export_at(&mut self, change: u64) {
        self.fail_exports.insert(change);
    }

    /// Write a file directly into a pattern's workspace directory, as if
    /// it had been synced earlier (reverse-flow fixtures).
    pub fn write_workspace(&self, pattern: &str, rel: &str, content: &str) {
        let full = self.dir_of(pattern).join(rel);
        if let Some(parent) = full.parent() {
            std::fs::create_dir_all(parent).expect("failed to create workspace dirs");
        }
        std::fs::write(full, content).expect("failed to write workspace file");
    }

    /// The workspace directory bound to `pattern`.
    pub fn workspace_root(&self, pattern: &str) -> PathBuf {
        self.dir_of(pattern)
    }

    /// Pending actions opened so far, as `"<op> <workspace-relative
    /// path>"` strings in call order.
    pub fn opened(&self) -> Vec<String> {
        self.opened
            .lock()
            .expect("opened lock")
            .iter()
            .map(|(op, file)| {
                let rel = self
                    .dirs
                    .values()
                    .find_map(|d| file.strip_prefix(d).ok())
                    .unwrap_or(file.as_path());
                format!("{op} {}", rel.display())
            })
            .collect()
    }

    fn dir_of(&self, pattern: &str) -> PathBuf {
        self.dirs
            .get(pattern)
            .unwrap_or_else(|| panic!("pattern {pattern} not scripted"))
            .clone()
    }

    fn record(&self, op: &str, file: &Path) {
        self.opened
            .lock()
            .expect("opened lock")
            .push((op.to_owned(), file.to_owned()));
    }
}

impl ChangelistSource for ScriptedSource {
    fn list_changelists(&self, range: SyncRange) -> Result<Vec<Changelist>, FerryError> {
        let prefixes: Vec<&str> = self
            .dirs
            .keys()
            .map(|p| p.trim_end_matches("..."))
            .collect();
        let mut hits: Vec<Changelist> = self
            .changelists
            .iter()
            .filter(|c| c.number >= range.first && c.number <= range.last)
            .filter(|c| {
                c.affected
                    .iter()
                    .any(|f| prefixes.iter().any(|p| f.starts_with(p)))
            })
            .cloned()
            .collect();
        hits.sort_by_key(|c| c.number);
        Ok(hits)
    }

    fn export_tree(
        &self,
        mapping: &PathMapping,
        change: u64,
    ) -> Result<WorkspaceSnapshot, FerryError> {
        let pattern = mapping.depot_pattern();
        let fail = |detail: String| FerryError::ExportFailed {
            change,
            pattern: pattern.to_owned(),
            detail,
        };
        if self.fail_exports.contains(&change) {
            return Err(fail("scripted export failure".to_owned()));
        }
        let dir = self
            .dirs
            .get(pattern)
            .ok_or_else(|| fail("pattern not scripted".to_owned()))?;

        match std::fs::remove_dir_all(dir) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(fail(e.to_string())),
        }

        let state = self
            .trees
            .range((pattern.to_owned(), 0)..=(pattern.to_owned(), change))
            .next_back()
            .map(|(_, files)| files);
        if let Some(files) = state {
            for (rel, content) in files {
                let full = dir.join(rel);
                if let Some(parent) = full.parent() {
                    std::fs::create_dir_all(parent).map_err(|e| fail(e.to_string()))?;
                }
                std::fs::write(&full, content).map_err(|e| fail(e.to_string()))?;
                // Synced files arrive read-only.
                let mut perms = std::fs::metadata(&full)
                    .map_err(|e| fail(e.to_string()))?
                    .permissions();
                perms.set_readonly(true);
                std::fs::set_permissions(&full, perms).map_err(|e| fail(e.to_string()))?;
            }
        }
        Ok(WorkspaceSnapshot::new(dir.clone()))
    }

    fn workspace_dir(&self, mapping: &PathMapping) -> Result<PathBuf, FerryError> {
        self.dirs
            .get(mapping.depot_pattern())
            .cloned()
            .ok_or_else(|| FerryError::SourceUnavailable {
                detail: format!("pattern {} not scripted", mapping.depot_pattern()),
            })
    }

    fn open_add(&self, file: &Path) -> Result<(), FerryError> {
        self.record("add", file);
        Ok(())
    }

    fn open_edit(&self, file: &Path) -> Result<(), FerryError> {
        self.record("edit", file);
        Ok(())
    }

    fn open_delete(&self, file: &Path) -> Result<(), FerryError> {
        self.record("delete", file);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Mapper and git fixtures
// ---------------------------------------------------------------------------

/// Build a mapper from `(depot pattern, repo path)` pairs and ignore
/// patterns.
pub fn mapper(mappings: &[(&str, &str)], ignores: &[&str]) -> PathMapper {
    let mappings = mappings
        .iter()
        .map(|(depot, repo)| PathMapping::new(depot, repo).expect("valid mapping"))
        .collect();
    PathMapper::new(mappings, IgnoreSet::new(ignores).expect("valid ignore patterns"))
}

/// Create a fresh git repository in a temp directory with a local test
/// identity configured.
pub fn setup_git_repo() -> TempDir {
    let dir = TempDir::new().expect("failed to create temp dir");
    git_init(dir.path());
    dir
}

pub fn git_init(dir: &Path) {
    run_git(dir, &["init", "-b", "main"]);
    run_git(dir, &["config", "user.email", "test@test.com"]);
    run_git(dir, &["config", "user.name", "Test"]);
}

/// Run a git command in the given directory. Panics on failure.
pub fn run_git(dir: &Path, args: &[&str]) -> String {
    let out = Command::new("git")
        .current_dir(dir)
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("failed to run git {}: {e}", args.join(" ")));
    assert!(
        out.status.success(),
        "git {} failed:\nstdout: {}\nstderr: {}",
        args.join(" "),
        String::from_utf8_lossy(&out.stdout),
        String::from_utf8_lossy(&out.stderr),
    );
    String::from_utf8_lossy(&out.stdout).trim_end().to_string()
}

/// Write a file under `dir`, creating parent directories.
pub fn write_file(dir: &Path, rel: &str, content: &str) {
    let full = dir.join(rel);
    if let Some(parent) = full.parent() {
        std::fs::create_dir_all(parent).expect("failed to create parent dirs");
    }
    std::fs::write(full, content).expect("failed to write file");
}

/// Number of commits on HEAD, zero for a repository without commits.
pub fn commit_count(dir: &Path) -> usize {
    let out = Command::new("git")
        .current_dir(dir)
        .args(["rev-list", "--count", "HEAD"])
        .output()
        .expect("failed to run git rev-list");
    if !out.status.success() {
        return 0;
    }
    String::from_utf8_lossy(&out.stdout)
        .trim()
        .parse()
        .unwrap_or(0)
}

// ---------------------------------------------------------------------------
// Binary helpers
// ---------------------------------------------------------------------------

/// Run ferry with the given args in the given directory.
pub fn ferry_in(dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_ferry"))
        .args(args)
        .current_dir(dir)
        .output()
        .expect("failed to execute ferry")
}

/// Run ferry and assert it fails. Returns stderr as string.
pub fn ferry_fails(dir: &Path, args: &[&str]) -> String {
    let out = ferry_in(dir, args);
    assert!(
        !out.status.success(),
        "Expected ferry {} to fail, but it succeeded.\nstdout: {}",
        args.join(" "),
        String::from_utf8_lossy(&out.stdout),
    );
    String::from_utf8_lossy(&out.stderr).to_string()
}
