//! sourcewrangler - keep a folder of reference sources and their catalog
//!
//! A source folder holds downloaded reference files together with a JSON
//! manifest describing each one.
//!
//! # Modules
//!
//! - `manifest`: records, the in-memory store and the locked on-disk catalog
//! - `folder`: source folder layout, receiving bay and temporary area
//! - `retriever`: protocols that fetch sources into the temporary area
//! - `cli`: the `sw` command registry and built-in commands
//! - `config`: folder and catalog settings from files and environment
//!
//! # Usage
//!
//! ```bash
//! sw init
//! sw add -t "Reflections on Trusting Trust" -a Thompson \
//!     --retrieval '{"protocol": "file", "options": {"path": "/tmp/trust.pdf"}}'
//! sw fetch 0
//! sw values -a
//! sw open 0 -l
//! ```

pub mod cli;
pub mod config;
pub mod error;
pub mod folder;
pub mod manifest;
pub mod retriever;

// Re-export main types at crate root for convenience
pub use error::{Result, SourceError};
pub use folder::{ReceivingBay, SourceFolder, TemporaryArea, TemporaryFile};
pub use manifest::{Catalog, CatalogOptions, Record, RecordStore, Records};
pub use retriever::{Retriever, RetrieverError, RetrieverRegistry};
