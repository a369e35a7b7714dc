//! Scratch area with collision-free file naming.
//!
//! Names look like `20240131235959-000-<suffix>`: the UTC second, a
//! three-digit disambiguator, then the caller's suffix. Each candidate is
//! claimed with an exclusive create, so concurrent allocators never share a
//! name without needing a lock.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use super::list_files;
use crate::error::{Result, SourceError};

/// Disambiguators available per second and suffix (`000`..`999`)
pub const MAX_DISAMBIGUATOR: u32 = 1000;

const STAMP_FORMAT: &str = "%Y%m%d%H%M%S";

/// The `.tmp` directory of a source folder
#[derive(Debug, Clone)]
pub struct TemporaryArea {
    path: PathBuf,
}

impl TemporaryArea {
    /// Bind to an existing directory
    pub fn new(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if !path.is_dir() {
            return Err(SourceError::IncompleteSourceFolder(path));
        }
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Names of the files currently in the area, in directory order
    pub fn available(&self) -> Result<Vec<String>> {
        list_files(&self.path)
    }

    /// Create a new, empty temporary file named after the current second
    pub fn allocate(&self, suffix: &str) -> Result<TemporaryFile> {
        self.allocate_at(suffix, Utc::now())
    }

    /// Create a new, empty temporary file named after `at`.
    ///
    /// Tries disambiguators in order and fails with `ExhaustedNamespace` once
    /// all of them are taken.
    pub fn allocate_at(&self, suffix: &str, at: DateTime<Utc>) -> Result<TemporaryFile> {
        if suffix.contains(&['/', '\\'][..]) {
            return Err(SourceError::filesystem(
                &self.path,
                format!("suffix '{}' contains a path separator", suffix),
            ));
        }

        let stamp = at.format(STAMP_FORMAT).to_string();

        for n in 0..MAX_DISAMBIGUATOR {
            let path = self.path.join(format!("{}-{:03}-{}", stamp, n, suffix));

            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(_) => {
                    debug!(path = %path.display(), "Allocated temporary file");
                    return Ok(TemporaryFile { path });
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(SourceError::filesystem(&path, e.to_string())),
            }
        }

        warn!(stamp = %stamp, suffix, "Temporary namespace exhausted");
        Err(SourceError::ExhaustedNamespace {
            stamp,
            suffix: suffix.to_string(),
        })
    }
}

/// A file allocated in a [`TemporaryArea`].
///
/// The file stays on disk until [`cleanup`](Self::cleanup) is called or it is
/// moved elsewhere.
#[derive(Debug)]
pub struct TemporaryFile {
    path: PathBuf,
}

impl TemporaryFile {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn file_name(&self) -> &str {
        self.path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
    }

    /// The suffix passed to [`TemporaryArea::allocate`]
    pub fn suffix(&self) -> &str {
        self.file_name().splitn(3, '-').nth(2).unwrap_or_default()
    }

    /// Open the file for reading
    pub fn open(&self) -> Result<File> {
        File::open(&self.path).map_err(|e| SourceError::from_io(&self.path, e))
    }

    /// Delete the file. A second call fails with `NotFound`.
    pub fn cleanup(&self) -> Result<()> {
        std::fs::remove_file(&self.path).map_err(|e| SourceError::from_io(&self.path, e))?;
        debug!(path = %self.path.display(), "Removed temporary file");
        Ok(())
    }
}
