//! Depot-path mapping and ignore filtering.
//!
//! Pure logic, no subprocess or filesystem access. A [`PathMapper`] holds
//! the ordered depot-pattern mappings and the compiled ignore set from the
//! configuration and answers three questions:
//!
//! - which repo-relative path does a depot path land on ([`PathMapper::resolve`]);
//! - which mappings does a changelist touch ([`PathMapper::affected_mappings`]);
//! - is a repo-relative path excluded ([`PathMapper::is_ignored`]).
//!
//! Mappings are evaluated in declaration order and the first match wins.
//! Ignore patterns use shell-style wildcards where `*` crosses directory
//! separators, and a path is ignored if it or any ancestor directory
//! matches.

use std::fmt;
use std::path::{Path, PathBuf};

use glob::Pattern;

// ---------------------------------------------------------------------------
// PathMapping
// ---------------------------------------------------------------------------

/// One depot-pattern to repo-directory mapping.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PathMapping {
    /// Depot pattern, always ending in `/...`.
    depot_pattern: String,
    /// Repo-relative directory the subtree lands in.
    repo_path: PathBuf,
}

impl PathMapping {
    /// Create a mapping, validating both sides.
    ///
    /// # Errors
    /// Returns an error if the depot pattern does not start with `//` or
    /// does not end with `/...`, or if the repo path is empty, absolute, or
    /// escapes the repository root.
    pub fn new(depot_pattern: &str, repo_path: &str) -> Result<Self, PatternError> {
        if !depot_pattern.starts_with("//") {
            return Err(PatternError {
                value: depot_pattern.to_owned(),
                reason: "depot pattern must start with `//`".to_owned(),
            });
        }
        if !depot_pattern.ends_with("/...") || depot_pattern.len() == "//...".len() {
            return Err(PatternError {
                value: depot_pattern.to_owned(),
                reason: "depot pattern must name a directory and end with `/...`".to_owned(),
            });
        }
        let repo = Path::new(repo_path);
        if repo_path.is_empty() || repo_path == "." {
            return Err(PatternError {
                value: repo_path.to_owned(),
                reason: "repo path must name a directory inside the repository".to_owned(),
            });
        }
        if repo.is_absolute() {
            return Err(PatternError {
                value: repo_path.to_owned(),
                reason: "repo path must be relative".to_owned(),
            });
        }
        if repo
            .components()
            .any(|c| matches!(c, std::path::Component::ParentDir))
        {
            return Err(PatternError {
                value: repo_path.to_owned(),
                reason: "repo path must not escape the repository root".to_owned(),
            });
        }
        Ok(Self {
            depot_pattern: depot_pattern.to_owned(),
            repo_path: repo.to_path_buf(),
        })
    }

    /// The full depot pattern, e.g. `//depot/proj/...`.
    #[must_use]
    pub fn depot_pattern(&self) -> &str {
        &self.depot_pattern
    }

    /// The pattern's directory prefix including the trailing slash,
    /// e.g. `//depot/proj/`. Matching against this is component-boundary
    /// aware for free: `//depot/proj/` never prefixes `//depot/project/x`.
    #[must_use]
    pub fn depot_prefix(&self) -> &str {
        &self.depot_pattern[..self.depot_pattern.len() - "...".len()]
    }

    /// The repo-relative directory this mapping lands in.
    #[must_use]
    pub fn repo_path(&self) -> &Path {
        &self.repo_path
    }

    /// True if the depot path falls under this mapping.
    #[must_use]
    pub fn matches(&self, depot_path: &str) -> bool {
        depot_path.starts_with(self.depot_prefix())
    }

    /// Map a depot path to its repo-relative path, or `None` if it falls
    /// outside this mapping.
    #[must_use]
    pub fn resolve(&self, depot_path: &str) -> Option<PathBuf> {
        let suffix = depot_path.strip_prefix(self.depot_prefix())?;
        if suffix.is_empty() {
            return None;
        }
        Some(self.repo_path.join(suffix))
    }
}

impl fmt::Display for PathMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.depot_pattern, self.repo_path.display())
    }
}

// ---------------------------------------------------------------------------
// IgnoreSet
// ---------------------------------------------------------------------------

/// Compiled ignore patterns matched against repo-relative paths.
#[derive(Clone, Debug, Default)]
pub struct IgnoreSet {
    patterns: Vec<Pattern>,
}

impl IgnoreSet {
    /// Compile a list of shell-style wildcard patterns.
    ///
    /// # Errors
    /// Returns an error naming the first pattern that fails to compile.
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Result<Self, PatternError> {
        let patterns = patterns
            .iter()
            .map(|p| {
                Pattern::new(p.as_ref()).map_err(|e| PatternError {
                    value: p.as_ref().to_owned(),
                    reason: e.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { patterns })
    }

    /// True if the path itself or any of its ancestor directories matches
    /// any pattern. `proj/tmp/sub/x.log` is ignored by `proj/tmp` as well
    /// as by `proj/tmp/*`.
    #[must_use]
    pub fn is_ignored(&self, repo_rel: &Path) -> bool {
        if self.patterns.is_empty() {
            return false;
        }
        repo_rel
            .ancestors()
            .filter(|a| !a.as_os_str().is_empty())
            .any(|a| self.patterns.iter().any(|p| p.matches_path(a)))
    }

    /// Number of compiled patterns.
    #[must_use]
    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    /// True if no patterns are configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

// ---------------------------------------------------------------------------
// PathMapper
// ---------------------------------------------------------------------------

/// Ordered mappings plus the ignore set, as loaded from configuration.
#[derive(Clone, Debug)]
pub struct PathMapper {
    mappings: Vec<PathMapping>,
    ignores: IgnoreSet,
}

impl PathMapper {
    /// Build a mapper from validated parts.
    #[must_use]
    pub fn new(mappings: Vec<PathMapping>, ignores: IgnoreSet) -> Self {
        Self { mappings, ignores }
    }

    /// All mappings in declaration order.
    #[must_use]
    pub fn mappings(&self) -> &[PathMapping] {
        &self.mappings
    }

    /// The first mapping (declaration order) whose prefix covers the depot
    /// path, or `None` if the path is unmapped.
    #[must_use]
    pub fn mapping_for(&self, depot_path: &str) -> Option<&PathMapping> {
        self.mappings.iter().find(|m| m.matches(depot_path))
    }

    /// Map a depot path to its repo-relative path. First match wins.
    #[must_use]
    pub fn resolve(&self, depot_path: &str) -> Option<PathBuf> {
        self.mapping_for(depot_path)?.resolve(depot_path)
    }

    /// The distinct mappings touched by a changelist's affected depot
    /// paths, in declaration order. Empty means the changelist is
    /// irrelevant to this configuration.
    #[must_use]
    pub fn affected_mappings<S: AsRef<str>>(&self, affected: &[S]) -> Vec<&PathMapping> {
        self.mappings
            .iter()
            .filter(|m| affected.iter().any(|p| m.matches(p.as_ref())))
            .collect()
    }

    /// True if the repo-relative path is excluded by the ignore set.
    #[must_use]
    pub fn is_ignored(&self, repo_rel: &Path) -> bool {
        self.ignores.is_ignored(repo_rel)
    }

    /// The ignore set itself, for components that filter standalone trees.
    #[must_use]
    pub fn ignores(&self) -> &IgnoreSet {
        &self.ignores
    }
}

// ---------------------------------------------------------------------------
// PatternError
// ---------------------------------------------------------------------------

/// A mapping or ignore pattern that failed validation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PatternError {
    /// The invalid value.
    pub value: String,
    /// Human-readable explanation.
    pub reason: String,
}

impl fmt::Display for PatternError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid pattern {:?}: {}", self.value, self.reason)
    }
}

impl std::error::Error for PatternError {}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn mapper(pairs: &[(&str, &str)], ignores: &[&str]) -> PathMapper {
        let mappings = pairs
            .iter()
            .map(|(d, r)| PathMapping::new(d, r).unwrap())
            .collect();
        PathMapper::new(mappings, IgnoreSet::new(ignores).unwrap())
    }

    // -- PathMapping validation --

    #[test]
    fn mapping_requires_depot_prefix() {
        let err = PathMapping::new("depot/proj/...", "proj").unwrap_err();
        assert!(err.reason.contains("must start with"));
    }

    #[test]
    fn mapping_requires_wildcard_suffix() {
        let err = PathMapping::new("//depot/proj", "proj").unwrap_err();
        assert!(err.reason.contains("/..."));
    }

    #[test]
    fn mapping_rejects_bare_root_wildcard() {
        assert!(PathMapping::new("//...", "all").is_err());
    }

    #[test]
    fn mapping_rejects_empty_repo_path() {
        assert!(PathMapping::new("//depot/proj/...", "").is_err());
        assert!(PathMapping::new("//depot/proj/...", ".").is_err());
    }

    #[test]
    fn mapping_rejects_absolute_repo_path() {
        let err = PathMapping::new("//depot/proj/...", "/abs/proj").unwrap_err();
        assert!(err.reason.contains("relative"));
    }

    #[test]
    fn mapping_rejects_escaping_repo_path() {
        let err = PathMapping::new("//depot/proj/...", "../outside").unwrap_err();
        assert!(err.reason.contains("escape"));
    }

    #[test]
    fn mapping_allows_nested_repo_path() {
        let m = PathMapping::new("//depot/docs/...", "docs/manual").unwrap();
        assert_eq!(m.repo_path(), Path::new("docs/manual"));
    }

    // -- resolution --

    #[test]
    fn resolve_joins_suffix_under_repo_path() {
        let m = PathMapping::new("//depot/proj/...", "proj").unwrap();
        assert_eq!(
            m.resolve("//depot/proj/src/a.c"),
            Some(PathBuf::from("proj/src/a.c"))
        );
    }

    #[test]
    fn resolve_respects_component_boundary() {
        let m = PathMapping::new("//depot/proj/...", "proj").unwrap();
        assert_eq!(m.resolve("//depot/project/x"), None);
        assert!(!m.matches("//depot/project/x"));
    }

    #[test]
    fn resolve_rejects_bare_prefix() {
        let m = PathMapping::new("//depot/proj/...", "proj").unwrap();
        assert_eq!(m.resolve("//depot/proj/"), None);
    }

    #[test]
    fn first_match_wins_for_overlapping_mappings() {
        let pm = mapper(
            &[
                ("//depot/proj/sub/...", "special"),
                ("//depot/proj/...", "proj"),
            ],
            &[],
        );
        assert_eq!(
            pm.resolve("//depot/proj/sub/f.c"),
            Some(PathBuf::from("special/f.c"))
        );
        assert_eq!(
            pm.resolve("//depot/proj/other/f.c"),
            Some(PathBuf::from("proj/other/f.c"))
        );
    }

    #[test]
    fn first_match_wins_even_when_declared_broad_first() {
        // Declaration order decides, not specificity.
        let pm = mapper(
            &[
                ("//depot/proj/...", "proj"),
                ("//depot/proj/sub/...", "special"),
            ],
            &[],
        );
        assert_eq!(
            pm.resolve("//depot/proj/sub/f.c"),
            Some(PathBuf::from("proj/sub/f.c"))
        );
    }

    #[test]
    fn unmapped_path_resolves_to_none() {
        let pm = mapper(&[("//depot/proj/...", "proj")], &[]);
        assert_eq!(pm.resolve("//depot/other/f.c"), None);
    }

    // -- affected mappings --

    #[test]
    fn affected_mappings_distinct_in_declaration_order() {
        let pm = mapper(
            &[
                ("//depot/proj/...", "proj"),
                ("//depot/docs/...", "docs/manual"),
            ],
            &[],
        );
        let affected = pm.affected_mappings(&[
            "//depot/docs/guide.md",
            "//depot/proj/a.c",
            "//depot/proj/b.c",
        ]);
        let patterns: Vec<_> = affected.iter().map(|m| m.depot_pattern()).collect();
        assert_eq!(patterns, vec!["//depot/proj/...", "//depot/docs/..."]);
    }

    #[test]
    fn affected_mappings_empty_for_irrelevant_changelist() {
        let pm = mapper(&[("//depot/proj/...", "proj")], &[]);
        let affected = pm.affected_mappings(&["//depot/elsewhere/x"]);
        assert!(affected.is_empty());
    }

    // -- ignores --

    #[test]
    fn ignore_matches_file_pattern() {
        let ig = IgnoreSet::new(&["*.generated"]).unwrap();
        assert!(ig.is_ignored(Path::new("proj/api.generated")));
        assert!(!ig.is_ignored(Path::new("proj/api.c")));
    }

    #[test]
    fn ignore_star_crosses_directory_separator() {
        // Shell-style semantics: `proj/tmp/*` covers nested paths too.
        let ig = IgnoreSet::new(&["proj/tmp/*"]).unwrap();
        assert!(ig.is_ignored(Path::new("proj/tmp/x.log")));
        assert!(ig.is_ignored(Path::new("proj/tmp/deep/nested/x.log")));
    }

    #[test]
    fn ignore_applies_to_ancestor_directories() {
        let ig = IgnoreSet::new(&["proj/vendor"]).unwrap();
        assert!(ig.is_ignored(Path::new("proj/vendor")));
        assert!(ig.is_ignored(Path::new("proj/vendor/lib/a.c")));
        assert!(!ig.is_ignored(Path::new("proj/vendored/a.c")));
    }

    #[test]
    fn empty_ignore_set_ignores_nothing() {
        let ig = IgnoreSet::new::<&str>(&[]).unwrap();
        assert!(ig.is_empty());
        assert!(!ig.is_ignored(Path::new("anything/at/all")));
    }

    #[test]
    fn invalid_ignore_pattern_is_rejected() {
        let err = IgnoreSet::new(&["proj/[unclosed"]).unwrap_err();
        assert_eq!(err.value, "proj/[unclosed");
    }
}

// ---------------------------------------------------------------------------
// Property tests
// ---------------------------------------------------------------------------
