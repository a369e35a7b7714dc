//! Receiving bay: files delivered to the folder but not yet cataloged.

use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use super::list_files;
use super::tmp::TemporaryFile;
use crate::error::{Result, SourceError};

/// The `rbay` directory of a source folder
#[derive(Debug, Clone)]
pub struct ReceivingBay {
    path: PathBuf,
}

impl ReceivingBay {
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

    /// Names of the files currently in the bay, in directory order
    pub fn available(&self) -> Result<Vec<String>> {
        list_files(&self.path)
    }

    /// Move a temporary file into the bay as `name`.
    ///
    /// Never overwrites: fails with `FilesystemError` if `name` is taken. On
    /// failure the temporary file is left in place and still belongs to the
    /// caller.
    pub fn accept(&self, file: &TemporaryFile, name: &str) -> Result<PathBuf> {
        if name.is_empty() || name == "." || name == ".." || name.contains(&['/', '\\'][..]) {
            return Err(SourceError::filesystem(
                &self.path,
                format!("'{}' is not a plain file name", name),
            ));
        }

        let target = self.path.join(name);

        // A hard link fails atomically if the target exists
        match fs::hard_link(file.path(), &target) {
            Ok(()) => {
                if let Err(e) = file.cleanup() {
                    warn!(path = %file.path().display(), error = %e, "Failed to remove temporary file");
                }
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                return Err(SourceError::filesystem(&target, "file already exists"));
            }
            Err(_) => move_with_placeholder(file.path(), &target)?,
        }

        info!(path = %target.display(), "Accepted file into receiving bay");
        Ok(target)
    }
}

/// Claim `target` with an exclusive create, then rename `source` over the claim
fn move_with_placeholder(source: &Path, target: &Path) -> Result<()> {
    match OpenOptions::new().write(true).create_new(true).open(target) {
        Ok(_) => {}
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
            return Err(SourceError::filesystem(target, "file already exists"));
        }
        Err(e) => return Err(SourceError::filesystem(target, e.to_string())),
    }

    if let Err(e) = fs::rename(source, target) {
        if let Err(remove) = fs::remove_file(target) {
            warn!(path = %target.display(), error = %remove, "Failed to remove placeholder");
        }
        return Err(SourceError::filesystem(target, e.to_string()));
    }
    Ok(())
}
