//! Retrievers fetch a source into a folder's temporary area.
//!
//! Each way of retrieving a source is a *protocol* with a string name. A
//! record names its protocol and options in its `retrieval` field:
//!
//! ```json
//! {"title": "...", "retrieval": {"protocol": "file", "options": {"path": "/tmp/paper.pdf"}}}
//! ```
//!
//! A retriever declares which option fields it requires and which it accepts,
//! each with a validator. Options are rejected if a required field is
//! missing, a validator fails, or a field is not declared at all.

pub mod file;

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, info};

use crate::error::SourceError;
use crate::folder::{TemporaryArea, TemporaryFile};
use crate::manifest::{fields, Record};

pub use file::FileRetriever;

/// Errors raised while registering or running retrievers
#[derive(Debug, Error)]
pub enum RetrieverError {
    #[error("Field '{0}' is declared more than once")]
    DuplicateField(String),

    #[error("Protocol '{0}' is already registered")]
    DuplicateProtocol(String),

    #[error("No retriever for protocol '{0}'")]
    InvalidProtocol(String),

    #[error("Retrieval options rejected by protocol '{0}'")]
    InvalidRetrievalOptions(String),

    #[error("Malformed retrieval field: {0}")]
    MalformedRetrieval(String),

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Checks one proposed option value
pub type FieldValidator = fn(&Value) -> bool;

/// Required and optional option fields of a protocol
#[derive(Clone, Default)]
pub struct RetrievalFields {
    required: BTreeMap<String, FieldValidator>,
    optional: BTreeMap<String, FieldValidator>,
}

impl RetrievalFields {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a field that must be present
    pub fn required(mut self, name: &str, validator: FieldValidator) -> Result<Self, RetrieverError> {
        self.ensure_undeclared(name)?;
        self.required.insert(name.to_string(), validator);
        Ok(self)
    }

    /// Declare a field that may be present
    pub fn optional(mut self, name: &str, validator: FieldValidator) -> Result<Self, RetrieverError> {
        self.ensure_undeclared(name)?;
        self.optional.insert(name.to_string(), validator);
        Ok(self)
    }

    fn ensure_undeclared(&self, name: &str) -> Result<(), RetrieverError> {
        if self.required.contains_key(name) || self.optional.contains_key(name) {
            return Err(RetrieverError::DuplicateField(name.to_string()));
        }
        Ok(())
    }

    pub fn required_names(&self) -> impl Iterator<Item = &str> {
        self.required.keys().map(String::as_str)
    }

    pub fn optional_names(&self) -> impl Iterator<Item = &str> {
        self.optional.keys().map(String::as_str)
    }

    /// True iff every field is declared and valid and no required field is missing
    pub fn validate(&self, options: &Map<String, Value>) -> bool {
        let mut required_seen = 0;

        for (field, value) in options {
            if let Some(check) = self.required.get(field) {
                if !check(value) {
                    return false;
                }
                required_seen += 1;
            } else if let Some(check) = self.optional.get(field) {
                if !check(value) {
                    return false;
                }
            } else {
                return false;
            }
        }

        required_seen == self.required.len()
    }
}

impl fmt::Debug for RetrievalFields {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetrievalFields")
            .field("required", &self.required.keys().collect::<Vec<_>>())
            .field("optional", &self.optional.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// A fetched source waiting in the temporary area
#[derive(Debug)]
pub struct Retrieved {
    pub file: TemporaryFile,
    pub media_type: String,
}

/// One retrieval protocol
#[async_trait]
pub trait Retriever: Send + Sync {
    /// Protocol name, as used in `retrieval.protocol`
    fn protocol(&self) -> &str;

    fn fields(&self) -> &RetrievalFields;

    fn validate(&self, options: &Map<String, Value>) -> bool {
        self.fields().validate(options)
    }

    /// Fetch into `tmp`. Called only with options that passed `validate`.
    async fn fetch(
        &self,
        options: &Map<String, Value>,
        tmp: &TemporaryArea,
    ) -> Result<Retrieved, RetrieverError>;
}

/// Validate `options`, then fetch
pub async fn run(
    retriever: &dyn Retriever,
    options: &Map<String, Value>,
    tmp: &TemporaryArea,
) -> Result<Retrieved, RetrieverError> {
    if !retriever.validate(options) {
        return Err(RetrieverError::InvalidRetrievalOptions(
            retriever.protocol().to_string(),
        ));
    }
    retriever.fetch(options, tmp).await
}

/// The `retrieval` field of a record
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Retrieval {
    pub protocol: String,
    #[serde(default)]
    pub options: Map<String, Value>,
}

impl Retrieval {
    /// Read the retrieval field of `record`, if it has one
    pub fn from_record(record: &Record) -> Result<Option<Self>, RetrieverError> {
        match record.get(fields::RETRIEVAL) {
            None => Ok(None),
            Some(value) => serde_json::from_value(value.clone())
                .map(Some)
                .map_err(|e| RetrieverError::MalformedRetrieval(e.to_string())),
        }
    }
}

/// Table of retrievers by protocol name
#[derive(Default)]
pub struct RetrieverRegistry {
    retrievers: BTreeMap<String, Box<dyn Retriever>>,
}

impl RetrieverRegistry {
    /// An empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the protocols shipped with this crate
    pub fn with_builtin() -> Result<Self, RetrieverError> {
        let mut registry = Self::new();
        registry.register(Box::new(FileRetriever::new()?))?;
        Ok(registry)
    }

    pub fn register(&mut self, retriever: Box<dyn Retriever>) -> Result<(), RetrieverError> {
        let protocol = retriever.protocol().to_string();
        if self.retrievers.contains_key(&protocol) {
            return Err(RetrieverError::DuplicateProtocol(protocol));
        }
        debug!(protocol = %protocol, "Registered retriever");
        self.retrievers.insert(protocol, retriever);
        Ok(())
    }

    pub fn has(&self, protocol: &str) -> bool {
        self.retrievers.contains_key(protocol)
    }

    pub fn get(&self, protocol: &str) -> Result<&dyn Retriever, RetrieverError> {
        self.retrievers
            .get(protocol)
            .map(|r| r.as_ref())
            .ok_or_else(|| RetrieverError::InvalidProtocol(protocol.to_string()))
    }

    pub fn protocols(&self) -> impl Iterator<Item = &str> {
        self.retrievers.keys().map(String::as_str)
    }

    pub fn validate(&self, protocol: &str, options: &Map<String, Value>) -> Result<bool, RetrieverError> {
        Ok(self.get(protocol)?.validate(options))
    }

    /// Validate and run the retriever for `protocol`
    pub async fn run(
        &self,
        protocol: &str,
        options: &Map<String, Value>,
        tmp: &TemporaryArea,
    ) -> Result<Retrieved, RetrieverError> {
        let retrieved = run(self.get(protocol)?, options, tmp).await?;
        info!(
            protocol,
            file = %retrieved.file.path().display(),
            media_type = %retrieved.media_type,
            "Retrieved source"
        );
        Ok(retrieved)
    }

    /// Run a record's retrieval
    pub async fn retrieve(
        &self,
        retrieval: &Retrieval,
        tmp: &TemporaryArea,
    ) -> Result<Retrieved, RetrieverError> {
        self.run(&retrieval.protocol, &retrieval.options, tmp).await
    }
}

impl fmt::Debug for RetrieverRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.retrievers.keys()).finish()
    }
}

/// SHA256 of a file's content, hex encoded
pub async fn compute_file_hash(path: &Path) -> Result<String, std::io::Error> {
    let content = tokio::fs::read(path).await?;
    let mut hasher = Sha256::new();
    hasher.update(&content);
    Ok(hex::encode(hasher.finalize()))
}
