//! On-disk manifest with a lock sentinel and autocommit.
//!
//! Opening a [`Catalog`] with locking enabled creates `<manifest>.lock` with
//! an exclusive create. A second catalog on the same file fails with
//! `LockHeld` until the first one is closed or dropped. The lock is advisory:
//! nothing stops a process from editing the manifest directly.

use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use super::{Record, RecordStore, Records};
use crate::error::{Result, SourceError};

/// How a [`Catalog`] treats the file it is bound to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogOptions {
    /// Commit after every `add` and `replace`
    #[serde(default = "default_true")]
    pub autocommit: bool,

    /// Hold `<manifest>.lock` while open
    #[serde(default = "default_true")]
    pub lock: bool,
}

fn default_true() -> bool {
    true
}

impl Default for CatalogOptions {
    fn default() -> Self {
        Self {
            autocommit: true,
            lock: true,
        }
    }
}

/// Disk-backed, lock-guarded handle over a manifest.
///
/// Dropping the handle closes it, so the sentinel is released on every exit
/// path, including early returns through `?`.
#[derive(Debug)]
pub struct Catalog {
    path: PathBuf,
    options: CatalogOptions,
    /// Sentinel created by this handle, if any
    sentinel: Option<PathBuf>,
    /// `None` once closed
    store: Option<RecordStore>,
}

impl Catalog {
    /// Open the manifest at `path`
    pub fn open(path: impl AsRef<Path>, options: CatalogOptions) -> Result<Self> {
        let requested = path.as_ref();
        let path = requested
            .canonicalize()
            .map_err(|e| SourceError::from_io(requested, e))?;
        if !path.is_file() {
            return Err(SourceError::NotFound(path.display().to_string()));
        }

        let sentinel = if options.lock {
            let lock_path = lock_path(&path);
            acquire_sentinel(&lock_path)?;
            info!(path = %lock_path.display(), "Acquired manifest lock");
            Some(lock_path)
        } else {
            None
        };

        let mut catalog = Self {
            path,
            options,
            sentinel,
            store: Some(RecordStore::new()),
        };

        // A failed load drops `catalog`, which removes the sentinel again
        catalog.revert()?;
        debug!(
            path = %catalog.path.display(),
            records = catalog.len()?,
            "Opened catalog"
        );

        Ok(catalog)
    }

    /// Open with autocommit and locking enabled
    pub fn open_default(path: impl AsRef<Path>) -> Result<Self> {
        Self::open(path, CatalogOptions::default())
    }

    /// Absolute path of the manifest
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn options(&self) -> CatalogOptions {
        self.options
    }

    pub fn is_open(&self) -> bool {
        self.store.is_some()
    }

    /// Reload the in-memory state from disk
    pub fn revert(&mut self) -> Result<()> {
        let store = self.store.as_mut().ok_or(SourceError::ClosedHandle)?;
        let file = File::open(&self.path).map_err(|e| SourceError::from_io(&self.path, e))?;
        store.revert(BufReader::new(file))
    }

    /// Rewrite the manifest from the in-memory state.
    ///
    /// The document goes to a side file in the same directory which is then
    /// renamed over the manifest, so readers see the old or the new version.
    pub fn commit(&self) -> Result<()> {
        let store = self.store()?;
        let dir = self
            .path
            .parent()
            .ok_or_else(|| SourceError::filesystem(&self.path, "manifest has no parent directory"))?;

        let mut side = tempfile::Builder::new()
            .prefix(".manifest-")
            .suffix(".partial")
            .tempfile_in(dir)?;

        if let Ok(meta) = fs::metadata(&self.path) {
            side.as_file().set_permissions(meta.permissions())?;
        }

        store.commit(BufWriter::new(side.as_file_mut()))?;
        side.as_file().sync_all()?;
        side.persist(&self.path).map_err(|e| SourceError::Io(e.error))?;

        info!(path = %self.path.display(), records = store.len()?, "Committed manifest");
        Ok(())
    }

    /// Close the handle and release the sentinel. Safe to call repeatedly.
    pub fn close(&mut self) -> Result<()> {
        self.store = None;

        if let Some(sentinel) = self.sentinel.take() {
            fs::remove_file(&sentinel)
                .map_err(|e| SourceError::filesystem(&sentinel, e.to_string()))?;
            info!(path = %sentinel.display(), "Released manifest lock");
        }

        Ok(())
    }

    fn store(&self) -> Result<&RecordStore> {
        self.store.as_ref().ok_or(SourceError::ClosedHandle)
    }

    fn store_mut(&mut self) -> Result<&mut RecordStore> {
        self.store.as_mut().ok_or(SourceError::ClosedHandle)
    }

    fn autocommit(&self) -> Result<()> {
        if self.options.autocommit {
            self.commit()
        } else {
            Ok(())
        }
    }
}

impl Records for Catalog {
    fn len(&self) -> Result<usize> {
        self.store()?.len()
    }

    fn get(&self, id: usize) -> Result<&Record> {
        self.store()?.get(id)
    }

    fn values(&self, field: &str) -> Result<Vec<Value>> {
        self.store()?.values(field)
    }

    fn search(&self, field: &str, query: &str, is_regex: bool) -> Result<Vec<usize>> {
        self.store()?.search(field, query, is_regex)
    }

    fn add(&mut self, record: Record) -> Result<usize> {
        let id = self.store_mut()?.add(record)?;
        self.autocommit()?;
        Ok(id)
    }

    fn replace(&mut self, id: usize, record: Record) -> Result<()> {
        self.store_mut()?.replace(id, record)?;
        self.autocommit()
    }
}

impl Drop for Catalog {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!(path = %self.path.display(), error = %e, "Failed to release manifest lock");
        }
    }
}

/// Sentinel path for a manifest: the manifest path with `.lock` appended
pub fn lock_path(manifest: &Path) -> PathBuf {
    let mut name = OsString::from(manifest.as_os_str());
    name.push(".lock");
    PathBuf::from(name)
}

fn acquire_sentinel(lock_path: &Path) -> Result<()> {
    match OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(lock_path)
    {
        Ok(_) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
            Err(SourceError::LockHeld(lock_path.to_path_buf()))
        }
        Err(e) => Err(SourceError::filesystem(lock_path, e.to_string())),
    }
}
