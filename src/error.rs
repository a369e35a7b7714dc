//! Error taxonomy shared by the manifest and source-folder layers.

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Errors raised by the record store, the catalog and the source folder
#[derive(Debug, Error)]
pub enum SourceError {
    /// A record, file or URL that was asked for does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Record {id} is out of range (manifest holds {len} records)")]
    OutOfRange { id: usize, len: usize },

    /// The manifest is not a JSON array of objects
    #[error("Malformed manifest: {0}")]
    MalformedDocument(#[source] serde_json::Error),

    /// Another catalog already holds the sentinel for this manifest
    #[error("Manifest is locked (sentinel present): {}", .0.display())]
    LockHeld(PathBuf),

    #[error("Catalog handle is closed")]
    ClosedHandle,

    #[error("Filesystem error at {}: {reason}", path.display())]
    Filesystem { path: PathBuf, reason: String },

    /// Every disambiguator for this second and suffix is taken
    #[error("Temporary namespace exhausted for {stamp} with suffix '{suffix}'")]
    ExhaustedNamespace { stamp: String, suffix: String },

    #[error("Not a complete source folder: {} (run `sw init` to create one)", .0.display())]
    IncompleteSourceFolder(PathBuf),

    #[error("Invalid search pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl SourceError {
    pub(crate) fn filesystem(path: &Path, reason: impl Into<String>) -> Self {
        Self::Filesystem {
            path: path.to_path_buf(),
            reason: reason.into(),
        }
    }

    /// Map an I/O failure on `path`, turning a missing file into `NotFound`
    pub(crate) fn from_io(path: &Path, err: io::Error) -> Self {
        if err.kind() == io::ErrorKind::NotFound {
            Self::NotFound(path.display().to_string())
        } else {
            Self::filesystem(path, err.to_string())
        }
    }
}

pub type Result<T, E = SourceError> = std::result::Result<T, E>;
