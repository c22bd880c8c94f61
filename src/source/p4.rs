//! The `p4` CLI adapter for [`ChangelistSource`].
//!
//! Every interaction with the source system goes through the `p4` binary
//! with `-ztag` output, which prints one `... key value` line per field.
//! The workspace directory for each mapping is resolved once at
//! construction via `p4 where`; everything later is plain lookups.
//!
//! Dry-run discipline matches the rest of the engine: read-only queries
//! (`where`, `changes`, `describe`) always run so a preview sees real
//! metadata, while mutations (`sync`, `add`, `edit`, `delete`) are skipped
//! with a debug log.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::debug;

use crate::error::FerryError;
use crate::model::{Changelist, SyncRange};
use crate::pathmap::{PathMapper, PathMapping};
use crate::source::{ChangelistSource, WorkspaceSnapshot};

// ---------------------------------------------------------------------------
// P4Source
// ---------------------------------------------------------------------------

/// Source adapter backed by the `p4` command-line client.
#[derive(Debug)]
pub struct P4Source {
    /// Local root of the bound client workspace; every command runs here
    /// so the client is picked up from the environment or `.p4config`.
    root: PathBuf,
    /// Workspace directory per depot pattern, resolved at construction.
    workspace_dirs: BTreeMap<String, PathBuf>,
    /// Suppress mutating commands.
    dry_run: bool,
}

impl P4Source {
    /// Connect to the source: verify `p4` answers from the workspace root
    /// and resolve every mapping's workspace-local directory.
    ///
    /// # Errors
    /// Returns [`FerryError::SourceUnavailable`] if `p4` cannot be run or
    /// any mapping does not resolve to a local directory (unbound client,
    /// pattern outside the client view).
    pub fn connect(root: &Path, mapper: &PathMapper, dry_run: bool) -> Result<Self, FerryError> {
        let mut workspace_dirs = BTreeMap::new();
        for mapping in mapper.mappings() {
            let output = run_p4(root, &["-ztag", "where", mapping.depot_pattern()])
                .map_err(|detail| FerryError::SourceUnavailable { detail })?;
            let dir = parse_where(&output).ok_or_else(|| FerryError::SourceUnavailable {
                detail: format!(
                    "`{}` is not mapped in the client view",
                    mapping.depot_pattern()
                ),
            })?;
            workspace_dirs.insert(mapping.depot_pattern().to_owned(), dir);
        }
        Ok(Self {
            root: root.to_owned(),
            workspace_dirs,
            dry_run,
        })
    }

    fn dir_for(&self, mapping: &PathMapping) -> Result<PathBuf, FerryError> {
        self.workspace_dirs
            .get(mapping.depot_pattern())
            .cloned()
            .ok_or_else(|| FerryError::SourceUnavailable {
                detail: format!(
                    "no workspace directory resolved for `{}`",
                    mapping.depot_pattern()
                ),
            })
    }

    /// Run a mutating p4 command, or skip it in dry-run.
    fn run_mutating(&self, args: &[&str]) -> Result<(), String> {
        if self.dry_run {
            debug!("dry-run: skipping `p4 {}`", args.join(" "));
            return Ok(());
        }
        run_p4(&self.root, args).map(|_| ())
    }

    /// Attribute a failed pending-action open to the mapping whose
    /// workspace directory holds the file. Nested views resolve to the
    /// most specific directory.
    fn pending_failed(&self, file: &Path, detail: String) -> FerryError {
        let mapping = self
            .workspace_dirs
            .iter()
            .filter(|(_, dir)| file.starts_with(dir))
            .max_by_key(|(_, dir)| dir.as_os_str().len())
            .map_or_else(
                || "unknown mapping".to_owned(),
                |(pattern, _)| pattern.clone(),
            );
        FerryError::ReconcileFailed {
            mapping,
            detail: format!("{}: {detail}", file.display()),
        }
    }
}

impl ChangelistSource for P4Source {
    fn list_changelists(&self, range: SyncRange) -> Result<Vec<Changelist>, FerryError> {
        // One `changes` query per pattern, then a union: a changelist
        // touching several mappings must still be processed once.
        let mut numbers = BTreeSet::new();
        for pattern in self.workspace_dirs.keys() {
            let spec = format!("{pattern}@{},{}", range.first, range.last);
            let output = run_p4(
                &self.root,
                &["-ztag", "changes", "-s", "submitted", &spec],
            )
            .map_err(|detail| FerryError::SourceUnavailable { detail })?;
            numbers.extend(parse_change_numbers(&output));
        }

        let mut changelists = Vec::with_capacity(numbers.len());
        for number in numbers {
            let output = run_p4(&self.root, &["-ztag", "describe", "-s", &number.to_string()])
                .map_err(|detail| FerryError::SourceUnavailable { detail })?;
            let cl = parse_describe(&output).ok_or_else(|| FerryError::SourceUnavailable {
                detail: format!("could not parse `p4 describe -s {number}` output"),
            })?;
            changelists.push(cl);
        }
        Ok(changelists)
    }

    fn export_tree(
        &self,
        mapping: &PathMapping,
        change: u64,
    ) -> Result<WorkspaceSnapshot, FerryError> {
        let dir = self.dir_for(mapping)?;
        let spec = format!("{}@{change}", mapping.depot_pattern());
        self.run_mutating(&["sync", &spec])
            .map_err(|detail| FerryError::ExportFailed {
                change,
                pattern: mapping.depot_pattern().to_owned(),
                detail,
            })?;
        Ok(WorkspaceSnapshot::new(dir))
    }

    fn workspace_dir(&self, mapping: &PathMapping) -> Result<PathBuf, FerryError> {
        self.dir_for(mapping)
    }

    fn open_add(&self, file: &Path) -> Result<(), FerryError> {
        let file_str = file.to_string_lossy();
        self.run_mutating(&["add", &file_str])
            .map_err(|detail| self.pending_failed(file, detail))
    }

    fn open_edit(&self, file: &Path) -> Result<(), FerryError> {
        let file_str = file.to_string_lossy();
        self.run_mutating(&["edit", &file_str])
            .map_err(|detail| self.pending_failed(file, detail))
    }

    fn open_delete(&self, file: &Path) -> Result<(), FerryError> {
        let file_str = file.to_string_lossy();
        self.run_mutating(&["delete", &file_str])
            .map_err(|detail| self.pending_failed(file, detail))
    }
}

// ---------------------------------------------------------------------------
// Command helper
// ---------------------------------------------------------------------------

/// Run a p4 command in `cwd` and return raw stdout, or a failure detail
/// combining stderr and stdout (p4 reports some errors on stdout).
fn run_p4(cwd: &Path, args: &[&str]) -> Result<String, String> {
    debug!("p4 {}", args.join(" "));
    let out = Command::new("p4")
        .args(args)
        .current_dir(cwd)
        .output()
        .map_err(|e| format!("failed to run `p4 {}`: {e}", args.join(" ")))?;
    if out.status.success() {
        Ok(String::from_utf8_lossy(&out.stdout).into_owned())
    } else {
        let stderr = String::from_utf8_lossy(&out.stderr);
        let stdout = String::from_utf8_lossy(&out.stdout);
        let message = format!("{stderr}{stdout}");
        Err(format!(
            "`p4 {}` failed: {}",
            args.join(" "),
            message.trim()
        ))
    }
}

// ---------------------------------------------------------------------------
// -ztag parsing
// ---------------------------------------------------------------------------

/// Extract the workspace-local directory from `p4 -ztag where <pattern>`.
///
/// `where` emits one record per matching view line; exclusion lines carry
/// an `unmap` field and are skipped. Later view lines override earlier
/// ones, so the last mapped record wins. The `path` value ends with the
/// pattern's `/...` suffix, which is stripped.
fn parse_where(output: &str) -> Option<PathBuf> {
    let mut result: Option<&str> = None;
    for record in output.split("\n\n") {
        let mut path = None;
        let mut unmapped = false;
        for line in record.lines() {
            let Some(rest) = line.strip_prefix("... ") else {
                continue;
            };
            let (key, value) = rest.split_once(' ').unwrap_or((rest, ""));
            match key {
                "path" => path = Some(value),
                "unmap" => unmapped = true,
                _ => {}
            }
        }
        if let Some(p) = path
            && !unmapped
        {
            result = Some(p);
        }
    }

    let local = result?;
    let local = local.strip_suffix("/...").unwrap_or(local);
    if local.is_empty() {
        return None;
    }
    Some(PathBuf::from(local))
}

/// Extract changelist numbers from `p4 -ztag changes` output.
fn parse_change_numbers(output: &str) -> Vec<u64> {
    output
        .lines()
        .filter_map(|line| line.strip_prefix("... change "))
        .filter_map(|value| value.trim().parse().ok())
        .collect()
}

/// Parse one `p4 -ztag describe -s <n>` record into a [`Changelist`].
///
/// The `desc` value spans every following line up to the next `... ` field,
/// including blank ones, so descriptions keep their paragraph breaks.
/// Affected paths come from the numbered `depotFileN` fields.
fn parse_describe(output: &str) -> Option<Changelist> {
    let mut number: Option<u64> = None;
    let mut time: Option<i64> = None;
    let mut description = String::new();
    let mut affected = Vec::new();
    let mut in_desc = false;

    for line in output.lines() {
        if let Some(rest) = line.strip_prefix("... ") {
            in_desc = false;
            let (key, value) = rest.split_once(' ').unwrap_or((rest, ""));
            match key {
                "change" => number = value.trim().parse().ok(),
                "time" => time = value.trim().parse().ok(),
                "desc" => {
                    description = value.to_owned();
                    in_desc = true;
                }
                k if k.starts_with("depotFile") => affected.push(value.to_owned()),
                _ => {}
            }
        } else if in_desc {
            description.push('\n');
            description.push_str(line);
        }
    }

    Some(Changelist {
        number: number?,
        time: time?,
        description: description.trim_end().to_owned(),
        affected,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    // -- parse_where --

    #[test]
    fn where_strips_wildcard_suffix() {
        let output = "\
... depotFile //depot/proj/...
... clientFile //ws/proj/...
... path /home/user/p4ws/proj/...
";
        assert_eq!(
            parse_where(output),
            Some(PathBuf::from("/home/user/p4ws/proj"))
        );
    }

    #[test]
    fn where_skips_unmapped_records() {
        let output = "\
... unmap
... depotFile //depot/proj/...
... clientFile //ws/old/...
... path /home/user/p4ws/old/...

... depotFile //depot/proj/...
... clientFile //ws/proj/...
... path /home/user/p4ws/proj/...
";
        assert_eq!(
            parse_where(output),
            Some(PathBuf::from("/home/user/p4ws/proj"))
        );
    }

    #[test]
    fn where_last_mapped_record_wins() {
        let output = "\
... depotFile //depot/proj/...
... path /ws/first/...

... depotFile //depot/proj/...
... path /ws/second/...
";
        assert_eq!(parse_where(output), Some(PathBuf::from("/ws/second")));
    }

    #[test]
    fn where_empty_output_is_none() {
        assert_eq!(parse_where(""), None);
    }

    // -- parse_change_numbers --

    #[test]
    fn change_numbers_from_multiple_records() {
        let output = "\
... change 4219
... time 1714000300
... user alice
... status submitted
... desc Fix the widget

... change 4217
... time 1714000100
... user bob
... status submitted
... desc Earlier change
";
        assert_eq!(parse_change_numbers(output), vec![4219, 4217]);
    }

    #[test]
    fn change_numbers_empty_output() {
        assert!(parse_change_numbers("").is_empty());
    }

    // -- parse_describe --

    #[test]
    fn describe_single_line_description() {
        let output = "\
... change 4217
... user alice
... client alice-ws
... time 1714000100
... desc Fix the widget
... status submitted
... depotFile0 //depot/proj/src/widget.c
... action0 edit
... rev0 3
... depotFile1 //depot/proj/src/widget.h
... action1 edit
... rev1 2
";
        let cl = parse_describe(output).unwrap();
        assert_eq!(cl.number, 4217);
        assert_eq!(cl.time, 1_714_000_100);
        assert_eq!(cl.description, "Fix the widget");
        assert_eq!(
            cl.affected,
            vec![
                "//depot/proj/src/widget.c".to_owned(),
                "//depot/proj/src/widget.h".to_owned(),
            ]
        );
    }

    #[test]
    fn describe_multiline_description_keeps_paragraphs() {
        let output = "\
... change 4300
... user alice
... time 1714000500
... desc Rework the export path.

Second paragraph with detail.
... status submitted
... depotFile0 //depot/proj/a.c
... action0 edit
";
        let cl = parse_describe(output).unwrap();
        assert_eq!(
            cl.description,
            "Rework the export path.\n\nSecond paragraph with detail."
        );
    }

    #[test]
    fn describe_empty_description() {
        let output = "\
... change 9
... time 100
... desc
... status submitted
";
        let cl = parse_describe(output).unwrap();
        assert_eq!(cl.description, "");
        assert!(cl.affected.is_empty());
    }

    #[test]
    fn describe_missing_change_number_is_none() {
        assert!(parse_describe("... desc orphan text\n").is_none());
    }

    // -- pending_failed --

    #[test]
    fn failed_pending_action_names_the_owning_pattern() {
        let source = P4Source {
            root: PathBuf::from("/ws"),
            workspace_dirs: BTreeMap::from([
                ("//depot/docs/...".to_owned(), PathBuf::from("/ws/docs")),
                ("//depot/proj/...".to_owned(), PathBuf::from("/ws/proj")),
            ]),
            dry_run: false,
        };

        let err = source.pending_failed(Path::new("/ws/proj/src/a.c"), "file locked".to_owned());
        let FerryError::ReconcileFailed { mapping, detail } = err else {
            panic!("expected ReconcileFailed, got {err:?}");
        };
        assert_eq!(mapping, "//depot/proj/...");
        assert!(detail.contains("a.c"));
        assert!(detail.contains("file locked"));
    }

    #[test]
    fn nested_views_attribute_to_the_most_specific_mapping() {
        let source = P4Source {
            root: PathBuf::from("/ws"),
            workspace_dirs: BTreeMap::from([
                ("//depot/proj/...".to_owned(), PathBuf::from("/ws/proj")),
                ("//depot/proj/gen/...".to_owned(), PathBuf::from("/ws/proj/gen")),
            ]),
            dry_run: false,
        };

        let err = source.pending_failed(Path::new("/ws/proj/gen/x.c"), "denied".to_owned());
        assert!(matches!(
            err,
            FerryError::ReconcileFailed { mapping, .. } if mapping == "//depot/proj/gen/..."
        ));
    }
}
