// src/exchanges/cninfo.rs
//! CNINFO web API (webapi.cninfo.com.cn) for mainland-listed securities.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use regex::Regex;
use serde_json::{Map, Value};
use tokio::sync::OnceCell;
use url::Url;

use crate::config::{HttpMethod, ScraperConfig};
use crate::exchanges::doctypes::{self, CNINFO_DOC_TYPES};
use crate::exchanges::{value_to_text, FilingSource};
use crate::models::{FilingBatch, FilingQuery, FilingRecord, StockInfo};
use crate::transport::HttpTransport;
use crate::utils::error::FetchError;
use crate::utils::text::decode_entities;

pub const CNINFO_ENDPOINT: &str = "http://webapi.cninfo.com.cn/";
pub const CNINFO_TAG: &str = "cninfo";

pub struct CnInfo {
    transport: HttpTransport,
    endpoint: Url,
    method: HttpMethod,
    credentials: BTreeMap<String, String>,
    token: OnceCell<String>,
}

impl CnInfo {
    pub fn new(config: &ScraperConfig) -> Result<Self, FetchError> {
        let endpoint = Url::parse(config.endpoint.as_deref().unwrap_or(CNINFO_ENDPOINT))?;
        Ok(Self {
            transport: HttpTransport::new(config, &[])?,
            endpoint,
            method: config.method.unwrap_or(HttpMethod::Post),
            credentials: config.credentials.clone(),
            token: OnceCell::new(),
        })
    }

    /// Access token, fetched on first use and shared by every task.
    async fn token(&self) -> Result<&str, FetchError> {
        let token = self
            .token
            .get_or_try_init(|| async {
                let url = self.endpoint.join("api-cloud-platform/oauth2/token")?;
                let res = self.transport.post_form_json(url.as_str(), &self.credentials).await?;
                let access_token = res.get("access_token").and_then(Value::as_str);
                let expires_in = res.get("expires_in").and_then(Value::as_i64).unwrap_or(0);
                match access_token {
                    Some(token) if expires_in > 0 => {
                        tracing::debug!("Obtained CNINFO token valid for {}s", expires_in);
                        Ok(token.to_string())
                    }
                    _ => Err(FetchError::Remote(format!(
                        "cannot get token, check credentials; server returned: {}",
                        res
                    ))),
                }
            })
            .await?;
        Ok(token.as_str())
    }

    fn record_from_row(&self, row: Map<String, Value>) -> Result<FilingRecord, FetchError> {
        let mut fields: BTreeMap<String, String> = row
            .into_iter()
            .map(|(key, value)| (key, decode_entities(&value_to_text(&value))))
            .collect();

        let link = fields.remove("F003V").unwrap_or_default();
        if link.trim().is_empty() {
            return Err(FetchError::Parse("listing row has no F003V link".to_string()));
        }

        Ok(FilingRecord {
            identifier: fields.remove("SECCODE").unwrap_or_default(),
            security_name: fields.remove("SECNAME").unwrap_or_default(),
            announcement_date: fields.remove("F001D").as_deref().and_then(parse_cninfo_date),
            announcement_title: fields.remove("F002V").unwrap_or_default(),
            document_url: self.endpoint.join(link.trim())?.to_string(),
            document_format: fields.remove("F004V").unwrap_or_default(),
            document_size_bytes: fields.remove("F005N").and_then(|s| s.trim().parse().ok()),
            info_type_code: fields.remove("F006V").unwrap_or_default(),
            market_code: fields.remove("F009V").unwrap_or_default(),
            extra: fields,
            document_content: None,
            document_text: None,
        })
    }
}

#[async_trait]
impl FilingSource for CnInfo {
    fn exchange_tag(&self) -> &'static str {
        CNINFO_TAG
    }

    fn doc_types(&self) -> Vec<&'static str> {
        doctypes::keys(CNINFO_DOC_TYPES)
    }

    /// CNINFO is queried by ticker directly, so resolution is the identity.
    async fn resolve(&self, keyword: &str) -> Result<StockInfo, FetchError> {
        let code = keyword.trim();
        if code.is_empty() {
            return Err(FetchError::NotFound(keyword.to_string()));
        }
        Ok(StockInfo {
            stock_id: code.to_string(),
            code: code.to_string(),
            name: String::new(),
        })
    }

    async fn fetch_list(&self, stock: &StockInfo, query: &FilingQuery) -> Result<FilingBatch, FetchError> {
        let token = self.token().await?;
        let url = self.endpoint.join("api/info/p_info3015")?;
        let params = [
            ("scode", stock.stock_id.clone()),
            ("access_token", token.to_string()),
            ("sdate", query.start_date.format("%Y%m%d").to_string()),
            ("edate", query.end_date.format("%Y%m%d").to_string()),
            ("format", "json".to_string()),
        ];
        let res = self.transport.send_json(self.method, url.as_str(), &params).await?;

        if res.get("resultmsg").and_then(Value::as_str) != Some("success") {
            return Err(FetchError::Remote(format!(
                "cannot get list of filings; error message: {}; error code: {}",
                res.get("resultmsg").map(value_to_text).unwrap_or_default(),
                res.get("resultcode").map(value_to_text).unwrap_or_default()
            )));
        }
        if res.get("total").and_then(Value::as_u64).unwrap_or(0) == 0 {
            tracing::info!("No filings for {} in range", stock.code);
            return Ok(FilingBatch::default());
        }

        let pattern = doctypes::lookup(CNINFO_DOC_TYPES, &query.doc_type).unwrap_or("");
        let title_filter = Regex::new(pattern)
            .map_err(|e| FetchError::Parse(format!("bad title pattern '{}': {}", pattern, e)))?;

        let rows = res
            .get("records")
            .and_then(Value::as_array)
            .ok_or_else(|| FetchError::Parse("listing response has no records".to_string()))?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            let Some(row) = row.as_object() else {
                continue;
            };
            let record = self.record_from_row(row.clone())?;
            if title_filter.is_match(&record.announcement_title) {
                records.push(record);
            }
        }
        tracing::info!("Found {} filings for {}", records.len(), stock.code);
        Ok(FilingBatch::new(records))
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        self.transport.get_bytes(url).await
    }
}

/// `F001D` arrives either as `YYYY-MM-DD` or `YYYY-MM-DD HH:MM:SS`.
fn parse_cninfo_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
        .map(|dt| dt.date())
        .or_else(|_| NaiveDate::parse_from_str(raw, "%Y-%m-%d"))
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dates_with_and_without_time() {
        let expected = NaiveDate::from_ymd_opt(2021, 4, 28);
        assert_eq!(parse_cninfo_date("2021-04-28 00:00:00"), expected);
        assert_eq!(parse_cninfo_date("2021-04-28"), expected);
        assert_eq!(parse_cninfo_date("28/04/2021"), None);
    }

    #[test]
    fn resolution_is_identity() {
        let source = CnInfo::new(&ScraperConfig::default()).unwrap();
        let stock = tokio_test::block_on(source.resolve(" 600519 ")).unwrap();
        assert_eq!(stock.stock_id, "600519");
        assert!(matches!(
            tokio_test::block_on(source.resolve("  ")),
            Err(FetchError::NotFound(_))
        ));
    }
}
