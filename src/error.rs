//! Error types for the sync engine.
//!
//! [`FerryError`] is the single error type returned across the library. It
//! uses rich enum variants so callers (and the final CLI report) can name
//! the changelist, mapping, or path involved without parsing error
//! messages. The engine never retries: every failure is surfaced and the
//! run halts at the first one.

use std::path::PathBuf;

use thiserror::Error;

// ---------------------------------------------------------------------------
// FerryError
// ---------------------------------------------------------------------------

/// Errors returned by ferry operations.
#[derive(Debug, Error)]
pub enum FerryError {
    /// A changelist range argument was malformed or out of order.
    ///
    /// Reported before any side effect.
    #[error("invalid changelist range `{value}`: {reason}")]
    InvalidRange {
        /// The raw range argument as given on the command line.
        value: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The source system could not be queried at all (spawn failure,
    /// unbound client workspace, connection refused).
    #[error("source unavailable: {detail}")]
    SourceUnavailable {
        /// What the underlying command reported.
        detail: String,
    },

    /// The destination repository could not be opened or prepared
    /// (not a repository, index reset failure, status query failure).
    #[error("destination unavailable: {detail}")]
    DestUnavailable {
        /// What the underlying command reported.
        detail: String,
    },

    /// Materializing a depot subtree at a specific changelist failed.
    #[error("export of `{pattern}` at changelist {change} failed: {detail}")]
    ExportFailed {
        /// The changelist being exported.
        change: u64,
        /// The depot pattern whose subtree was requested.
        pattern: String,
        /// What the underlying command reported.
        detail: String,
    },

    /// Mirroring a changelist into the destination tree failed.
    ///
    /// No partial state for the failing changelist is committed; the range
    /// halts here and the number is surfaced for manual resumption.
    #[error("mirror of changelist {change} failed: {detail}")]
    MirrorFailed {
        /// The changelist being mirrored.
        change: u64,
        /// Export or filesystem failure description.
        detail: String,
    },

    /// The destination rejected a staged change.
    ///
    /// Commits for earlier changelists remain valid; forward progress is
    /// durable per changelist.
    #[error("commit for changelist {change} failed: {detail}")]
    CommitFailed {
        /// The changelist whose commit was rejected.
        change: u64,
        /// What the destination tool reported.
        detail: String,
    },

    /// The reverse flow could not read a mapped tree or open a pending
    /// source-side action.
    #[error("reconcile of `{mapping}` failed: {detail}")]
    ReconcileFailed {
        /// The depot pattern of the mapping being reconciled.
        mapping: String,
        /// Read or pending-action failure description.
        detail: String,
    },

    /// The configuration file was missing, unreadable, or invalid.
    #[error("config error in {}: {detail}", path.display())]
    Config {
        /// Path to the offending configuration file.
        path: PathBuf,
        /// Parse or validation failure description.
        detail: String,
    },

    /// An I/O error occurred (file system, process spawn, etc.).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience alias used throughout the library.
pub type Result<T> = std::result::Result<T, FerryError>;

impl From<crate::model::RangeParseError> for FerryError {
    fn from(err: crate::model::RangeParseError) -> Self {
        Self::InvalidRange {
            value: err.value,
            reason: err.reason,
        }
    }
}

impl From<crate::config::ConfigError> for FerryError {
    fn from(err: crate::config::ConfigError) -> Self {
        Self::Config {
            path: err.path.unwrap_or_default(),
            detail: err.message,
        }
    }
}

// Covers the setup stage only (opening the repository, clearing the
// index, the dirty-tree probe). Per-changelist staging failures are
// wrapped into `CommitFailed` where the changelist number is known.
impl From<crate::dest::DestError> for FerryError {
    fn from(err: crate::dest::DestError) -> Self {
        Self::DestUnavailable {
            detail: err.to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
