//! Ferry configuration (`ferry.toml`).
//!
//! Defines the typed configuration for a sync setup: the source workspace
//! root, the ordered depot-to-repo path mappings, and the destination
//! ignore patterns. Unlike most tools, ferry cannot do anything useful
//! without a config file, so a missing file is an error rather than a
//! defaults fallback.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::pathmap::{IgnoreSet, PathMapper, PathMapping};

/// Default configuration file name, resolved against the current directory.
pub const DEFAULT_PATH: &str = "ferry.toml";

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Top-level ferry configuration.
///
/// ```toml
/// [source]
/// root = "/home/user/p4ws"
///
/// [destination]
/// ignore_patterns = ["proj/tmp/*", "*.generated"]
///
/// [paths]
/// "//depot/proj/..." = "proj"
/// "//depot/docs/..." = "docs/manual"
/// ```
///
/// `[paths]` entries are kept in declaration order; the first matching
/// pattern wins during resolution, so order is semantic.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FerryConfig {
    /// Source-system settings.
    pub source: SourceConfig,

    /// Destination-repository settings.
    #[serde(default)]
    pub destination: DestinationConfig,

    /// Ordered depot-pattern to repo-path mappings.
    pub paths: PathsTable,
}

// ---------------------------------------------------------------------------
// SourceConfig
// ---------------------------------------------------------------------------

/// Source-system settings.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SourceConfig {
    /// Local root of the bound source client workspace.
    pub root: PathBuf,
}

// ---------------------------------------------------------------------------
// DestinationConfig
// ---------------------------------------------------------------------------

/// Destination-repository settings.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DestinationConfig {
    /// Repo-relative glob patterns excluded from mirroring and
    /// reconciliation. `*` crosses directory separators.
    #[serde(default)]
    pub ignore_patterns: Vec<String>,
}

// ---------------------------------------------------------------------------
// PathsTable — ordered depot mappings
// ---------------------------------------------------------------------------

/// The `[paths]` table with declaration order preserved.
///
/// A plain map type would lose document order, and order decides which
/// mapping wins for overlapping patterns, so this deserializes through a
/// map visitor that collects entries in visit order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PathsTable(Vec<(String, String)>);

impl PathsTable {
    /// Entries as `(depot_pattern, repo_path)` pairs, in declaration order.
    #[must_use]
    pub fn entries(&self) -> &[(String, String)] {
        &self.0
    }

    /// Number of mappings.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True if no mappings were declared.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<'de> Deserialize<'de> for PathsTable {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct TableVisitor;

        impl<'de> serde::de::Visitor<'de> for TableVisitor {
            type Value = PathsTable;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a table mapping depot patterns to repo paths")
            }

            fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
            where
                A: serde::de::MapAccess<'de>,
            {
                let mut entries = Vec::new();
                while let Some((pattern, repo_path)) = map.next_entry::<String, String>()? {
                    entries.push((pattern, repo_path));
                }
                Ok(PathsTable(entries))
            }
        }

        deserializer.deserialize_map(TableVisitor)
    }
}

// ---------------------------------------------------------------------------
// ConfigError
// ---------------------------------------------------------------------------

/// Error loading a ferry configuration file.
#[derive(Debug)]
pub struct ConfigError {
    /// The path that was being loaded (if available).
    pub path: Option<PathBuf>,
    /// Human-readable message with line-level detail when possible.
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(p) = &self.path {
            write!(f, "{}: {}", p.display(), self.message)
        } else {
            write!(f, "config error: {}", self.message)
        }
    }
}

impl std::error::Error for ConfigError {}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

impl FerryConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    /// Returns a [`ConfigError`] if the file is missing or unreadable, the
    /// TOML is invalid, or a required section is absent.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError {
            path: Some(path.to_owned()),
            message: format!("could not read file: {e}"),
        })?;
        Self::parse(&contents).map_err(|mut e| {
            e.path = Some(path.to_owned());
            e
        })
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    /// Returns a [`ConfigError`] on invalid TOML, unknown fields, or
    /// missing sections, with line-level detail when possible.
    pub fn parse(toml_str: &str) -> Result<Self, ConfigError> {
        toml::from_str(toml_str).map_err(|e| {
            let mut message = e.message().to_owned();
            if let Some(span) = e.span() {
                // Calculate line number from byte offset.
                let line = toml_str[..span.start]
                    .chars()
                    .filter(|&c| c == '\n')
                    .count()
                    + 1;
                message = format!("line {line}: {message}");
            }
            ConfigError {
                path: None,
                message,
            }
        })
    }

    /// Validate the mappings and ignore patterns and build the
    /// [`PathMapper`] used by every engine stage.
    ///
    /// # Errors
    /// Returns a [`ConfigError`] if no mappings are declared, a depot
    /// pattern or repo path fails validation, or an ignore pattern does
    /// not compile.
    pub fn mapper(&self) -> Result<PathMapper, ConfigError> {
        if self.paths.is_empty() {
            return Err(ConfigError {
                path: None,
                message: "[paths] must declare at least one mapping".to_owned(),
            });
        }
        let mappings = self
            .paths
            .entries()
            .iter()
            .map(|(pattern, repo_path)| PathMapping::new(pattern, repo_path))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| ConfigError {
                path: None,
                message: format!("[paths]: {e}"),
            })?;
        let ignores =
            IgnoreSet::new(&self.destination.ignore_patterns).map_err(|e| ConfigError {
                path: None,
                message: format!("[destination] ignore_patterns: {e}"),
            })?;
        Ok(PathMapper::new(mappings, ignores))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
