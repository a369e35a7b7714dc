//! Manifest storage: the JSON array that catalogs every source.
//!
//! A record's ID is its zero-based position in the array. Records are never
//! deleted, so an ID stays valid for the lifetime of a loaded store.
//!
//! # Storage Layout
//!
//! ```text
//! <folder>/
//! ├── manifest.json         # [ {"title": ..., "author": ...}, ... ]
//! └── manifest.json.lock    # present while a Catalog holds the lock
//! ```
//!
//! [`RecordStore`] is the in-memory array. [`Catalog`] binds one to a file on
//! disk and adds the lock sentinel, revert/commit and autocommit.

pub mod catalog;
pub mod store;

use serde_json::{Map, Value};

use crate::error::Result;

pub use catalog::{Catalog, CatalogOptions};
pub use store::RecordStore;

/// One cataloged source. No schema is enforced beyond "JSON object".
pub type Record = Map<String, Value>;

/// Fields the command-line tools know about
pub mod fields {
    pub const AUTHOR: &str = "author";
    pub const CATEGORY: &str = "category";
    pub const MEDIA: &str = "media";
    pub const TITLE: &str = "title";
    /// Human-readable URL of the source
    pub const HUMAN: &str = "human";
    /// `{"protocol": ..., "options": {...}}`
    pub const RETRIEVAL: &str = "retrieval";
    pub const SHA256: &str = "sha256";
    pub const MEDIA_TYPE: &str = "media_type";
}

/// Operations shared by the in-memory store and the on-disk catalog.
///
/// Every method returns a `Result` because a closed [`Catalog`] fails all of
/// them, and its mutators may fail while committing.
pub trait Records {
    /// Number of records
    fn len(&self) -> Result<usize>;

    /// Record at `id`, or `OutOfRange`
    fn get(&self, id: usize) -> Result<&Record>;

    /// Distinct values stored under `field`, skipping records without it
    fn values(&self, field: &str) -> Result<Vec<Value>>;

    /// Ascending IDs of records whose `field` equals `query`, or matches it
    /// anywhere when `is_regex` is set
    fn search(&self, field: &str, query: &str, is_regex: bool) -> Result<Vec<usize>>;

    /// Append a record and return its ID
    fn add(&mut self, record: Record) -> Result<usize>;

    /// Overwrite the record at `id`
    fn replace(&mut self, id: usize, record: Record) -> Result<()>;

    fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    fn contains(&self, id: usize) -> Result<bool> {
        Ok(id < self.len()?)
    }
}
