// src/models.rs
use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Canonical security returned by an exchange's lookup service.
/// All values are kept as text regardless of how the server typed them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockInfo {
    /// Exchange-internal id used by the listing endpoint
    pub stock_id: String,
    pub code: String,
    pub name: String,
}

/// One disclosure document in a listing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilingRecord {
    pub identifier: String,
    pub security_name: String,
    pub announcement_date: Option<NaiveDate>,
    pub announcement_title: String,
    /// Always absolute once the record leaves a listing call
    pub document_url: String,
    pub document_format: String,
    pub document_size_bytes: Option<u64>,
    pub info_type_code: String,
    pub market_code: String,
    /// Exchange-specific fields that have no column of their own
    pub extra: BTreeMap<String, String>,
    #[serde(skip)]
    pub document_content: Option<Vec<u8>>,
    #[serde(skip)]
    pub document_text: Option<String>,
}

/// Ordered, fully paginated listing for one query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilingBatch {
    pub records: Vec<FilingRecord>,
}

impl FilingBatch {
    pub fn new(records: Vec<FilingRecord>) -> Self {
        Self { records }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Date range, document type and ordering for a listing request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilingQuery {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub doc_type: String,
    pub ascending: bool,
}

/// Storage identity of a persisted result set:
/// `{identifier}_{exchange}_{start:YYYYMMDD}_{end:YYYYMMDD}_{doc_type}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResultSetKey {
    pub identifier: String,
    pub exchange_tag: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub doc_type: String,
}

impl ResultSetKey {
    pub fn new(identifier: &str, exchange_tag: &str, query: &FilingQuery) -> Self {
        Self {
            identifier: identifier.to_string(),
            exchange_tag: exchange_tag.to_string(),
            start_date: query.start_date,
            end_date: query.end_date,
            doc_type: query.doc_type.clone(),
        }
    }

    pub fn table_name(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for ResultSetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}_{}_{}_{}_{}",
            self.identifier,
            self.exchange_tag,
            self.start_date.format("%Y%m%d"),
            self.end_date.format("%Y%m%d"),
            self.doc_type
        )
    }
}

/// How a result set is written to storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WriteMode {
    Append,
    #[default]
    Replace,
}
