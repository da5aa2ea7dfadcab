// src/exchanges/mod.rs
pub mod cninfo;
pub mod doctypes;
pub mod edgar;
pub mod hkex;

use async_trait::async_trait;
use serde_json::Value;

use crate::models::{FilingBatch, FilingQuery, StockInfo};
use crate::utils::error::FetchError;

pub use cninfo::CnInfo;
pub use edgar::SecEdgar;
pub use hkex::HkexNews;

/// A remote filing index: keyword lookup, date-bounded listing, and document download.
///
/// Implementations are shared read-only across worker tasks, so every
/// method takes `&self` and any lazily fetched state must be internally
/// synchronized.
#[async_trait]
pub trait FilingSource: Send + Sync {
    /// Short tag used in result-set keys, e.g. `hkexnews`.
    fn exchange_tag(&self) -> &'static str;

    /// Document types understood by `fetch_list`.
    fn doc_types(&self) -> Vec<&'static str>;

    /// Turns a ticker or name fragment into the exchange's canonical id.
    async fn resolve(&self, keyword: &str) -> Result<StockInfo, FetchError>;

    /// Returns the complete, non-paginated listing for `stock`.
    async fn fetch_list(&self, stock: &StockInfo, query: &FilingQuery) -> Result<FilingBatch, FetchError>;

    /// Downloads one document body.
    async fn download(&self, url: &str) -> Result<Vec<u8>, FetchError>;
}

/// Renders any JSON scalar as text; `null` becomes empty.
pub(crate) fn value_to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
