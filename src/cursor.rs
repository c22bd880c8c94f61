//! Persisted sync position.
//!
//! The cursor records the last changelist number a `sync` run fully
//! processed, as a single line under the repository's git directory
//! (`<git-dir>/ferry/cursor`). It is advisory: the engine uses it to warn
//! about overlapping or gapped ranges, never to refuse a run. A missing
//! or unreadable cursor therefore degrades to "no position known".

use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::error::Result;

const CURSOR_FILE: &str = "ferry/cursor";

/// Handle to the cursor file of one repository.
#[derive(Clone, Debug)]
pub struct SyncCursor {
    path: PathBuf,
}

impl SyncCursor {
    #[must_use]
    pub fn new(git_dir: &Path) -> Self {
        Self {
            path: git_dir.join(CURSOR_FILE),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the stored position. A missing file or unparsable content is
    /// `None`; only a real I/O failure is an error.
    ///
    /// # Errors
    /// Returns [`crate::error::FerryError::Io`] if the file exists but
    /// cannot be read.
    pub fn load(&self) -> Result<Option<u64>> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        match content.trim().parse::<u64>() {
            Ok(number) => Ok(Some(number)),
            Err(_) => {
                warn!(
                    "cursor file {} holds {:?}, not a changelist number; ignoring it",
                    self.path.display(),
                    content.trim()
                );
                Ok(None)
            }
        }
    }

    /// Record `number` as the last processed changelist.
    ///
    /// The write goes through a temporary file in the same directory and
    /// a rename, so a crash mid-write leaves the previous cursor intact.
    ///
    /// # Errors
    /// Returns [`crate::error::FerryError::Io`] if the cursor directory
    /// or file cannot be written.
    pub fn store(&self, number: u64) -> Result<()> {
        let dir = self.path.parent().unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(dir)?;
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        writeln!(tmp, "{number}")?;
        tmp.persist(&self.path).map_err(|e| e.error)?;
        Ok(())
    }
}
