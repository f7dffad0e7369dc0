//! Record shapes flowing through the pipeline.
//!
//! - [`RawRecord`]: loosely typed mapping produced by one fetcher call
//! - [`UnifiedRecord`]: canonical row after aggregation
//! - [`MinimalRecord`]: downstream projection written by the export stage

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Canonical field names. Everything else a source returns is kept as an extra column.
pub const CANONICAL_FIELDS: &[&str] = &[
    "source",
    "title",
    "abstract",
    "authors",
    "year",
    "doi",
    "url",
    "publisher",
    "journal",
    "likely_peer_reviewed",
    "mentions_europe",
];

/// Columns of the minimal downstream view, in output order.
pub const MINIMAL_COLUMNS: &[&str] = &["title", "abstract", "authors", "year", "doi", "url"];

/// A best-effort record as returned by a source. Any field may be missing or
/// carry an unexpected JSON type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawRecord {
    fields: BTreeMap<String, Value>,
}

impl RawRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert; skips `Value::Null` so absent and null look the same.
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: &str, value: impl Into<Value>) {
        let value = value.into();
        if !value.is_null() {
            self.fields.insert(key.to_string(), value);
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// The field as a string slice; `None` when absent or not a JSON string.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(Value::as_str)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.fields.keys()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl From<serde_json::Map<String, Value>> for RawRecord {
    fn from(map: serde_json::Map<String, Value>) -> Self {
        let mut record = RawRecord::new();
        for (key, value) in map {
            record.insert(&key, value);
        }
        record
    }
}

/// One row of the homogeneous table built by aggregation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UnifiedRecord {
    pub source: String,
    pub title: String,
    #[serde(rename = "abstract")]
    pub abstract_text: String,
    pub authors: String,
    pub year: Option<i32>,
    pub doi: String,
    pub url: String,
    pub publisher: String,
    pub journal: String,
    pub likely_peer_reviewed: bool,
    pub mentions_europe: bool,
    /// Non-canonical fields, present for every column seen anywhere in the batch
    #[serde(default)]
    pub extra: BTreeMap<String, String>,
}

impl UnifiedRecord {
    /// Value of a canonical or extra column as it appears in the full-schema table.
    pub fn column(&self, name: &str) -> String {
        match name {
            "source" => self.source.clone(),
            "title" => self.title.clone(),
            "abstract" => self.abstract_text.clone(),
            "authors" => self.authors.clone(),
            "year" => self.year.map(|y| y.to_string()).unwrap_or_default(),
            "doi" => self.doi.clone(),
            "url" => self.url.clone(),
            "publisher" => self.publisher.clone(),
            "journal" => self.journal.clone(),
            "likely_peer_reviewed" => self.likely_peer_reviewed.to_string(),
            "mentions_europe" => self.mentions_europe.to_string(),
            other => self.extra.get(other).cloned().unwrap_or_default(),
        }
    }
}

/// Downstream screening view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MinimalRecord {
    pub title: String,
    #[serde(rename = "abstract")]
    pub abstract_text: String,
    pub authors: String,
    pub year: Option<i32>,
    pub doi: String,
    pub url: String,
}

impl From<&UnifiedRecord> for MinimalRecord {
    fn from(r: &UnifiedRecord) -> Self {
        Self {
            title: r.title.clone(),
            abstract_text: r.abstract_text.clone(),
            authors: r.authors.clone(),
            year: r.year,
            doi: r.doi.clone(),
            url: r.url.clone(),
        }
    }
}
