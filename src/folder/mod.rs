//! Source folders: the directory that holds sources, their manifest and the
//! two staging areas.
//!
//! # Layout
//!
//! ```text
//! <folder>/
//! ├── manifest.json         # catalog of every source
//! ├── rbay/                 # receiving bay: delivered, not yet cataloged
//! │   └── <id>-<name>
//! └── .tmp/                 # scratch files, <stamp>-<nnn>-<suffix>
//! ```

pub mod rbay;
pub mod tmp;

use std::fmt::Display;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::error::{Result, SourceError};
use crate::manifest::{Catalog, CatalogOptions};

pub use rbay::ReceivingBay;
pub use tmp::{TemporaryArea, TemporaryFile};

pub const RECEIVING_BAY_DIR: &str = "rbay";
pub const TEMPORARY_DIR: &str = ".tmp";
pub const MANIFEST_FILE: &str = "manifest.json";

/// A validated source folder
#[derive(Debug, Clone)]
pub struct SourceFolder {
    root: PathBuf,
    rbay: ReceivingBay,
    tmp: TemporaryArea,
}

impl SourceFolder {
    /// Whether `path` holds a receiving bay, a temporary area and a manifest.
    /// Never touches the filesystem beyond reading metadata.
    pub fn check(path: impl AsRef<Path>) -> bool {
        let root = path.as_ref();
        root.is_dir()
            && root.join(RECEIVING_BAY_DIR).is_dir()
            && root.join(TEMPORARY_DIR).is_dir()
            && root.join(MANIFEST_FILE).is_file()
    }

    /// Create whatever parts of a source folder are missing at `path`.
    ///
    /// Existing parts are left alone; an existing manifest keeps its records.
    pub fn spawn(path: impl AsRef<Path>) -> Result<Self> {
        let requested = path.as_ref();
        let root = absolute(requested).map_err(|e| SourceError::filesystem(requested, e.to_string()))?;

        ensure_dir(&root)?;
        ensure_dir(&root.join(RECEIVING_BAY_DIR))?;
        ensure_dir(&root.join(TEMPORARY_DIR))?;
        ensure_manifest(&root.join(MANIFEST_FILE))?;

        info!(path = %root.display(), "Source folder ready");
        Self::open(&root)
    }

    /// Open an existing source folder
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let requested = path.as_ref();
        if !Self::check(requested) {
            return Err(SourceError::IncompleteSourceFolder(requested.to_path_buf()));
        }

        let root = requested
            .canonicalize()
            .map_err(|e| SourceError::filesystem(requested, e.to_string()))?;

        Ok(Self {
            rbay: ReceivingBay::new(root.join(RECEIVING_BAY_DIR))?,
            tmp: TemporaryArea::new(root.join(TEMPORARY_DIR))?,
            root,
        })
    }

    /// Absolute path of the folder
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.root.join(MANIFEST_FILE)
    }

    pub fn receiving_bay(&self) -> &ReceivingBay {
        &self.rbay
    }

    pub fn temporary_area(&self) -> &TemporaryArea {
        &self.tmp
    }

    /// Name of the receiving-bay file for source `id`: the first name, in
    /// lexicographic order, that starts with `id`'s string form.
    pub fn get(&self, id: impl Display) -> Result<String> {
        let key = id.to_string();
        if key.is_empty() {
            return Err(SourceError::NotFound("empty source id".to_string()));
        }

        let found = self
            .rbay
            .available()?
            .into_iter()
            .filter(|name| name.starts_with(&key))
            .min()
            .ok_or_else(|| SourceError::NotFound(format!("no file for source {}", key)))?;

        debug!(id = %key, file = %found, "Resolved source file");
        Ok(found)
    }

    /// Absolute path of the receiving-bay file for source `id`
    pub fn source_path(&self, id: impl Display) -> Result<PathBuf> {
        Ok(self.rbay.path().join(self.get(id)?))
    }

    /// Open the manifest with autocommit and locking
    pub fn open_manifest(&self) -> Result<Catalog> {
        Catalog::open_default(self.manifest_path())
    }

    pub fn open_manifest_with(&self, options: CatalogOptions) -> Result<Catalog> {
        Catalog::open(self.manifest_path(), options)
    }
}

fn absolute(path: &Path) -> io::Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}

fn ensure_dir(path: &Path) -> Result<()> {
    match fs::metadata(path) {
        Ok(meta) if meta.is_dir() => Ok(()),
        Ok(_) => Err(SourceError::filesystem(path, "exists but is not a directory")),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            fs::create_dir_all(path).map_err(|e| SourceError::filesystem(path, e.to_string()))?;
            debug!(path = %path.display(), "Created directory");
            Ok(())
        }
        Err(e) => Err(SourceError::filesystem(path, e.to_string())),
    }
}

fn ensure_manifest(path: &Path) -> Result<()> {
    match fs::metadata(path) {
        Ok(meta) if meta.is_file() => Ok(()),
        Ok(_) => Err(SourceError::filesystem(path, "exists but is not a file")),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            let mut file = match OpenOptions::new().write(true).create_new(true).open(path) {
                Ok(file) => file,
                // Someone else created it in the meantime
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => return Ok(()),
                Err(e) => return Err(SourceError::filesystem(path, e.to_string())),
            };
            file.write_all(b"[]\n")
                .map_err(|e| SourceError::filesystem(path, e.to_string()))?;
            debug!(path = %path.display(), "Created empty manifest");
            Ok(())
        }
        Err(e) => Err(SourceError::filesystem(path, e.to_string())),
    }
}

/// File names in `dir`, skipping subdirectories and names that are not UTF-8
pub(crate) fn list_files(dir: &Path) -> Result<Vec<String>> {
    let entries = fs::read_dir(dir).map_err(|e| SourceError::from_io(dir, e))?;

    let mut names = Vec::new();
    for entry in entries {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            continue;
        }
        match entry.file_name().into_string() {
            Ok(name) => names.push(name),
            Err(raw) => warn!(name = ?raw, dir = %dir.display(), "Skipping non UTF-8 file name"),
        }
    }

    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::Records;
    use tempfile::TempDir;

    fn spawn_test_folder() -> (SourceFolder, TempDir) {
        let temp = TempDir::new().unwrap();
        let folder = SourceFolder::spawn(temp.path().join("sources")).unwrap();
        (folder, temp)
    }

    #[test]
    fn test_spawn_creates_layout() {
        let (folder, _temp) = spawn_test_folder();

        assert!(SourceFolder::check(folder.root()));
        assert!(folder.root().is_absolute());
        assert_eq!(fs::read_to_string(folder.manifest_path()).unwrap().trim(), "[]");
    }

    #[test]
    fn test_spawn_is_idempotent_and_keeps_records() {
        let (folder, _temp) = spawn_test_folder();
        fs::write(folder.manifest_path(), r#"[{"title": "kept"}]"#).unwrap();

        let again = SourceFolder::spawn(folder.root()).unwrap();
        let catalog = again.open_manifest().unwrap();
        assert_eq!(catalog.len().unwrap(), 1);
    }

    #[test]
    fn test_spawn_rejects_file_root() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("not-a-dir");
        fs::write(&path, b"").unwrap();

        let result = SourceFolder::spawn(&path);
        assert!(matches!(result, Err(SourceError::Filesystem { .. })));
    }

    #[test]
    fn test_spawn_rejects_manifest_directory() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join(MANIFEST_FILE)).unwrap();

        let result = SourceFolder::spawn(temp.path());
        assert!(matches!(result, Err(SourceError::Filesystem { .. })));
    }

    #[test]
    fn test_check_does_not_create_anything() {
        let temp = TempDir::new().unwrap();
        assert!(!SourceFolder::check(temp.path()));
        assert_eq!(fs::read_dir(temp.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_open_incomplete_folder() {
        let temp = TempDir::new().unwrap();
        fs::create_dir(temp.path().join(RECEIVING_BAY_DIR)).unwrap();
        fs::write(temp.path().join(MANIFEST_FILE), "[]").unwrap();

        let result = SourceFolder::open(temp.path());
        assert!(matches!(result, Err(SourceError::IncompleteSourceFolder(_))));
    }

    #[test]
    fn test_get_resolves_prefix() {
        let (folder, _temp) = spawn_test_folder();
        fs::write(folder.receiving_bay().path().join("5-notes.pdf"), b"").unwrap();

        assert_eq!(folder.get(5).unwrap(), "5-notes.pdf");
        assert!(matches!(folder.get(6), Err(SourceError::NotFound(_))));
        assert!(matches!(folder.get(""), Err(SourceError::NotFound(_))));
    }

    #[test]
    fn test_get_prefers_lexicographically_smallest() {
        let (folder, _temp) = spawn_test_folder();
        let rbay = folder.receiving_bay().path();
        fs::write(rbay.join("50-other.pdf"), b"").unwrap();
        fs::write(rbay.join("5-b.pdf"), b"").unwrap();
        fs::write(rbay.join("5-a.pdf"), b"").unwrap();

        assert_eq!(folder.get(5).unwrap(), "5-a.pdf");
        assert_eq!(folder.source_path(5).unwrap(), rbay.join("5-a.pdf"));
    }

    #[test]
    fn test_open_manifest_is_locked() {
        let (folder, _temp) = spawn_test_folder();
        let _held = folder.open_manifest().unwrap();
        assert!(matches!(
            folder.open_manifest(),
            Err(SourceError::LockHeld(_))
        ));
    }
}
