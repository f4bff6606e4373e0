// Data carried between the collectors, the pipeline and the uploader

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::PathBuf;

/// A manufacturer discovered on the root page, with its model links.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrandEntry {
    pub brand_name: String,
    pub brand_link: String,
    pub models: Vec<ModelEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelEntry {
    pub title: String,
    pub detail_link: String,
}

/// Field name of the publication date, when the listing carries one.
pub const PUBLISHED_FIELD: &str = "date_published";

/// One scraped advertisement. The schema is whatever the site sends;
/// values are always scalars (string, number, bool or null). Fields keep
/// the order they were scraped in.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ListingRecord {
    fields: Map<String, Value>,
}

impl ListingRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a field. Non-scalar values are ignored.
    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        if !(value.is_array() || value.is_object()) {
            self.fields.insert(key.into(), value);
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.fields.iter()
    }

    pub fn published_at(&self) -> Option<&str> {
        self.fields.get(PUBLISHED_FIELD).and_then(Value::as_str)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl<K: Into<String>> FromIterator<(K, Value)> for ListingRecord {
    fn from_iter<I: IntoIterator<Item = (K, Value)>>(iter: I) -> Self {
        let mut record = ListingRecord::new();
        for (key, value) in iter {
            record.insert(key, value);
        }
        record
    }
}

/// Records collected for one model of a brand, ready for the workbook.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelSheet {
    pub model_name: String,
    pub records: Vec<ListingRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SummaryEntry {
    pub brand_name: String,
}

/// Brands that produced a workbook during the run, in processing order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub entries: Vec<SummaryEntry>,
}

impl RunSummary {
    pub fn record(&mut self, brand_name: &str) {
        self.entries.push(SummaryEntry { brand_name: brand_name.to_string() });
    }

    pub fn brand_names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.brand_name.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Per-file outcome of one upload call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadReport {
    pub uploaded: Vec<PathBuf>,
    pub failed: Vec<PathBuf>,
}

impl UploadReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}
