// src/exchanges/hkex.rs
//! HKEX news (www1.hkexnews.hk) title search.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use serde_json::{Map, Value};
use url::Url;

use crate::config::{HttpMethod, ScraperConfig};
use crate::exchanges::doctypes::{self, HKEX_ALL_T2CODE, HKEX_DOC_TYPES};
use crate::exchanges::{value_to_text, FilingSource};
use crate::models::{FilingBatch, FilingQuery, FilingRecord, StockInfo};
use crate::transport::HttpTransport;
use crate::utils::error::FetchError;
use crate::utils::text::{decode_entities, unwrap_callback};

pub const HKEX_ENDPOINT: &str = "https://www1.hkexnews.hk/";
pub const HKEX_TAG: &str = "hkexnews";
const INITIAL_ROW_RANGE: u64 = 100;
const MARKET: &str = "SEHK";

pub struct HkexNews {
    transport: HttpTransport,
    endpoint: Url,
    method: HttpMethod,
}

/// One decoded `titleSearchServlet.do` response.
struct ListPage {
    has_next_row: bool,
    rows: Vec<Map<String, Value>>,
}

impl ListPage {
    fn from_response(response: &Value) -> Result<Self, FetchError> {
        let has_next_row = response
            .get("hasNextRow")
            .and_then(Value::as_bool)
            .ok_or_else(|| FetchError::Parse("listing response has no hasNextRow flag".to_string()))?;

        // `result` is a JSON array serialized into a string
        let rows = match response.get("result") {
            Some(Value::String(raw)) if raw != "null" && !raw.trim().is_empty() => {
                serde_json::from_str::<Vec<Map<String, Value>>>(raw)?
            }
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|item| item.as_object().cloned())
                .collect(),
            _ => Vec::new(),
        };

        Ok(Self { has_next_row, rows })
    }

    fn total_count(&self) -> Option<u64> {
        let value = self.rows.first()?.get("TOTAL_COUNT")?;
        match value {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

impl HkexNews {
    pub fn new(config: &ScraperConfig) -> Result<Self, FetchError> {
        let endpoint = Url::parse(config.endpoint.as_deref().unwrap_or(HKEX_ENDPOINT))?;
        let transport = HttpTransport::new(config, &[("Referer", endpoint.as_str())])?;
        Ok(Self {
            transport,
            endpoint,
            method: config.method.unwrap_or(HttpMethod::Get),
        })
    }

    async fn request_page(
        &self,
        stock: &StockInfo,
        query: &FilingQuery,
        t2code: &str,
        row_range: u64,
    ) -> Result<ListPage, FetchError> {
        let url = self.endpoint.join("search/titleSearchServlet.do")?;
        let params = [
            ("stockId", stock.stock_id.clone()),
            ("fromDate", query.start_date.format("%Y%m%d").to_string()),
            ("toDate", query.end_date.format("%Y%m%d").to_string()),
            ("searchType", "1".to_string()),
            ("documentType", "-1".to_string()),
            ("t2code", t2code.to_string()),
            ("sortDir", if query.ascending { "1" } else { "0" }.to_string()),
            ("category", "0".to_string()),
            ("rowRange", row_range.to_string()),
            ("sortByOptions", "DateTime".to_string()),
            ("lang", "E".to_string()),
        ];
        tracing::debug!("Listing {} ({}) with rowRange={}", stock.code, stock.stock_id, row_range);
        let response = self.transport.send_json(self.method, url.as_str(), &params).await?;
        ListPage::from_response(&response)
    }

    fn record_from_row(&self, row: Map<String, Value>, t2code: &str) -> Result<FilingRecord, FetchError> {
        let mut fields: BTreeMap<String, String> = row
            .into_iter()
            .map(|(key, value)| (key, decode_entities(&value_to_text(&value))))
            .collect();

        let link = fields
            .remove("FILE_LINK")
            .filter(|link| !link.trim().is_empty())
            .ok_or_else(|| FetchError::Parse("listing row has no FILE_LINK".to_string()))?;
        let document_url = self.endpoint.join(link.trim())?.to_string();

        let announcement_date = fields
            .remove("DATE_TIME")
            .and_then(|raw| NaiveDateTime::parse_from_str(raw.trim(), "%d/%m/%Y %H:%M").ok())
            .map(|dt| dt.date());

        Ok(FilingRecord {
            identifier: fields.remove("STOCK_CODE").unwrap_or_default(),
            security_name: fields.remove("STOCK_NAME").unwrap_or_default(),
            announcement_date,
            announcement_title: fields.remove("TITLE").unwrap_or_default(),
            document_url,
            document_format: fields.remove("FILE_TYPE").unwrap_or_default(),
            document_size_bytes: fields.remove("FILE_INFO").as_deref().and_then(parse_file_size),
            info_type_code: t2code.to_string(),
            market_code: MARKET.to_string(),
            extra: fields,
            document_content: None,
            document_text: None,
        })
    }
}

#[async_trait]
impl FilingSource for HkexNews {
    fn exchange_tag(&self) -> &'static str {
        HKEX_TAG
    }

    fn doc_types(&self) -> Vec<&'static str> {
        doctypes::keys(HKEX_DOC_TYPES)
    }

    async fn resolve(&self, keyword: &str) -> Result<StockInfo, FetchError> {
        let url = self.endpoint.join("search/prefix.do")?;
        let params = [
            ("callback", "callback".to_string()),
            ("lang", "EN".to_string()),
            ("type", "A".to_string()),
            ("name", keyword.to_string()),
            ("market", MARKET.to_string()),
        ];
        let body = self
            .transport
            .get_text(url.as_str(), &params, &[("Accept", "application/json")])
            .await?;
        let payload: Value = serde_json::from_str(unwrap_callback(&body)?)?;

        let first = payload
            .get("stockInfo")
            .and_then(Value::as_array)
            .and_then(|candidates| candidates.first())
            .ok_or_else(|| FetchError::NotFound(keyword.to_string()))?;

        let text = |key: &str| first.get(key).map(value_to_text).unwrap_or_default();
        let stock = StockInfo {
            stock_id: text("stockId"),
            code: text("code"),
            name: text("name"),
        };
        if stock.stock_id.is_empty() {
            return Err(FetchError::Parse(format!("lookup for '{}' returned no stockId", keyword)));
        }
        tracing::debug!("Resolved '{}' to {:?}", keyword, stock);
        Ok(stock)
    }

    /// Fetches the listing, re-requesting once with `rowRange` set to the
    /// reported total when the first page says more rows exist.
    async fn fetch_list(&self, stock: &StockInfo, query: &FilingQuery) -> Result<FilingBatch, FetchError> {
        let t2code = doctypes::lookup(HKEX_DOC_TYPES, &query.doc_type).unwrap_or(HKEX_ALL_T2CODE);

        let first = self.request_page(stock, query, t2code, INITIAL_ROW_RANGE).await?;
        let (rows, expected) = if first.has_next_row {
            let total = first.total_count().ok_or_else(|| {
                FetchError::Remote("hasNextRow is set but the first row carries no TOTAL_COUNT".to_string())
            })?;
            let enlarged = self.request_page(stock, query, t2code, total).await?;
            if enlarged.has_next_row {
                return Err(FetchError::Remote(format!(
                    "server still reports more rows after requesting rowRange={}",
                    total
                )));
            }
            (enlarged.rows, Some(total))
        } else {
            let total = first.total_count();
            (first.rows, total)
        };

        if let Some(total) = expected {
            if total != rows.len() as u64 {
                tracing::warn!(
                    "{}: server reported {} filings but returned {}",
                    stock.code,
                    total,
                    rows.len()
                );
            }
        }

        let records = rows
            .into_iter()
            .map(|row| self.record_from_row(row, t2code))
            .collect::<Result<Vec<_>, _>>()?;
        tracing::info!("Found {} filings for {}", records.len(), stock.code);
        Ok(FilingBatch::new(records))
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        self.transport.get_bytes(url).await
    }
}

/// Parses HKEX `FILE_INFO` sizes such as `245KB` or `1.2MB`.
fn parse_file_size(raw: &str) -> Option<u64> {
    let raw = raw.trim().to_ascii_uppercase();
    let (number, multiplier) = if let Some(n) = raw.strip_suffix("KB") {
        (n, 1024.0)
    } else if let Some(n) = raw.strip_suffix("MB") {
        (n, 1024.0 * 1024.0)
    } else if let Some(n) = raw.strip_suffix("GB") {
        (n, 1024.0 * 1024.0 * 1024.0)
    } else if let Some(n) = raw.strip_suffix('B') {
        (n, 1.0)
    } else {
        (raw.as_str(), 1.0)
    };
    let value: f64 = number.trim().parse().ok()?;
    Some((value * multiplier).round() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn doc_type_keys_come_from_the_hkex_table() {
        let source = HkexNews::new(&ScraperConfig::default()).unwrap();
        assert_eq!(source.doc_types(), doctypes::keys(HKEX_DOC_TYPES));
        assert!(source.doc_types().contains(&"annual_report"));
    }

    #[test]
    fn file_sizes() {
        assert_eq!(parse_file_size("245KB"), Some(245 * 1024));
        assert_eq!(parse_file_size("1.5MB"), Some(1_572_864));
        assert_eq!(parse_file_size("N/A"), None);
    }

    #[test]
    fn result_string_is_decoded() {
        let response = json!({
            "hasNextRow": false,
            "result": "[{\"TOTAL_COUNT\":\"2\",\"TITLE\":\"a\"},{\"TOTAL_COUNT\":\"2\",\"TITLE\":\"b\"}]"
        });
        let page = ListPage::from_response(&response).unwrap();
        assert!(!page.has_next_row);
        assert_eq!(page.rows.len(), 2);
        assert_eq!(page.total_count(), Some(2));
    }

    #[test]
    fn null_result_is_empty() {
        let page = ListPage::from_response(&json!({"hasNextRow": false, "result": "null"})).unwrap();
        assert!(page.rows.is_empty());
        assert_eq!(page.total_count(), None);
    }

    #[test]
    fn missing_flag_is_a_parse_error() {
        assert!(matches!(
            ListPage::from_response(&json!({"result": "[]"})),
            Err(FetchError::Parse(_))
        ));
    }

    #[test]
    fn row_fields_are_normalized() {
        let source = HkexNews::new(&ScraperConfig::default()).unwrap();
        let row = json!({
            "STOCK_CODE": "00700",
            "STOCK_NAME": "TENCENT",
            "TITLE": "Annual Report 2021 &amp; ESG",
            "FILE_LINK": "/listedco/listconews/sehk/2022/0407/2022040700551.pdf",
            "FILE_TYPE": "PDF",
            "FILE_INFO": "12MB",
            "DATE_TIME": "07/04/2022 16:39",
            "NEWS_ID": 10906513,
            "TOTAL_COUNT": "1"
        });
        let record = source
            .record_from_row(row.as_object().unwrap().clone(), "40100")
            .unwrap();
        assert_eq!(record.announcement_title, "Annual Report 2021 & ESG");
        assert_eq!(
            record.document_url,
            "https://www1.hkexnews.hk/listedco/listconews/sehk/2022/0407/2022040700551.pdf"
        );
        assert_eq!(record.announcement_date, chrono::NaiveDate::from_ymd_opt(2022, 4, 7));
        assert_eq!(record.document_size_bytes, Some(12 * 1024 * 1024));
        assert_eq!(record.extra.get("NEWS_ID").map(String::as_str), Some("10906513"));
        assert_eq!(record.market_code, "SEHK");
    }
}
