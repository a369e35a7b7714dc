//! In-memory manifest.

use std::collections::BTreeMap;
use std::io::{self, Read, Write};

use regex::Regex;
use serde_json::Value;
use tracing::debug;

use super::{Record, Records};
use crate::error::{Result, SourceError};

/// Ordered sequence of records, addressed by position
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordStore {
    records: Vec<Record>,
}

impl RecordStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_records(records: Vec<Record>) -> Self {
        Self { records }
    }

    /// Load a store from a serialized JSON array
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut store = Self::new();
        store.revert(reader)?;
        Ok(store)
    }

    /// Discard the current state and reload it from `reader`.
    ///
    /// On `MalformedDocument` the current state is kept.
    pub fn revert<R: Read>(&mut self, mut reader: R) -> Result<()> {
        let mut content = String::new();
        reader.read_to_string(&mut content)?;
        self.records = parse_manifest(&content)?;
        debug!(records = self.records.len(), "Reverted record store");
        Ok(())
    }

    /// Write the whole store to `writer` as a JSON array
    pub fn commit<W: Write>(&self, mut writer: W) -> Result<()> {
        serde_json::to_writer_pretty(&mut writer, &self.records).map_err(io::Error::from)?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        Ok(())
    }

    /// Iterate over `(id, record)` pairs in ID order
    pub fn iter(&self) -> impl Iterator<Item = (usize, &Record)> {
        self.records.iter().enumerate()
    }

    pub fn as_slice(&self) -> &[Record] {
        &self.records
    }
}

fn parse_manifest(content: &str) -> Result<Vec<Record>> {
    serde_json::from_str(content).map_err(SourceError::MalformedDocument)
}

impl Records for RecordStore {
    fn len(&self) -> Result<usize> {
        Ok(self.records.len())
    }

    fn get(&self, id: usize) -> Result<&Record> {
        self.records.get(id).ok_or(SourceError::OutOfRange {
            id,
            len: self.records.len(),
        })
    }

    fn values(&self, field: &str) -> Result<Vec<Value>> {
        // Keyed by canonical JSON text so numbers and objects dedupe too
        let mut found: BTreeMap<String, Value> = BTreeMap::new();
        for value in self.records.iter().filter_map(|r| r.get(field)) {
            found
                .entry(value.to_string())
                .or_insert_with(|| value.clone());
        }
        Ok(found.into_values().collect())
    }

    fn search(&self, field: &str, query: &str, is_regex: bool) -> Result<Vec<usize>> {
        let pattern = if is_regex {
            Some(Regex::new(query)?)
        } else {
            None
        };

        let ids = self
            .iter()
            .filter_map(|(id, record)| {
                let value = record.get(field)?.as_str();
                let hit = match &pattern {
                    Some(re) => value.is_some_and(|v| re.is_match(v)),
                    None => value == Some(query),
                };
                hit.then_some(id)
            })
            .collect();

        Ok(ids)
    }

    fn add(&mut self, record: Record) -> Result<usize> {
        let id = self.records.len();
        self.records.push(record);
        Ok(id)
    }

    fn replace(&mut self, id: usize, record: Record) -> Result<()> {
        let len = self.records.len();
        let slot = self
            .records
            .get_mut(id)
            .ok_or(SourceError::OutOfRange { id, len })?;
        *slot = record;
        Ok(())
    }
}
