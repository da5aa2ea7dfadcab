// src/exchanges/edgar/mod.rs
//! SEC EDGAR: ticker to CIK lookup and the recent-filings submission index.
pub mod client;
pub mod models;

use async_trait::async_trait;

use crate::config::ScraperConfig;
use crate::exchanges::doctypes::{self, EDGAR_DOC_TYPES};
use crate::exchanges::FilingSource;
use crate::models::{FilingBatch, FilingQuery, StockInfo};
use crate::transport::HttpTransport;
use crate::utils::error::FetchError;

pub const EDGAR_WWW: &str = "https://www.sec.gov";
pub const EDGAR_DATA: &str = "https://data.sec.gov";
pub const EDGAR_TAG: &str = "secedgar";
// SEC rejects requests without a contact User-Agent; override via config headers
const EDGAR_USER_AGENT: &str = "filing_scraper research admin@example.com";

pub struct SecEdgar {
    transport: HttpTransport,
    www_base: String,
    data_base: String,
}

impl SecEdgar {
    /// `config.endpoint`, when set, replaces both the www and data hosts.
    pub fn new(config: &ScraperConfig) -> Result<Self, FetchError> {
        let has_agent = config.headers.keys().any(|k| k.eq_ignore_ascii_case("user-agent"));
        let extra: &[(&str, &str)] = if has_agent { &[] } else { &[("User-Agent", EDGAR_USER_AGENT)] };
        let (www_base, data_base) = match &config.endpoint {
            Some(endpoint) => (endpoint.clone(), endpoint.clone()),
            None => (EDGAR_WWW.to_string(), EDGAR_DATA.to_string()),
        };
        Ok(Self {
            transport: HttpTransport::new(config, extra)?,
            www_base,
            data_base,
        })
    }
}

#[async_trait]
impl FilingSource for SecEdgar {
    fn exchange_tag(&self) -> &'static str {
        EDGAR_TAG
    }

    fn doc_types(&self) -> Vec<&'static str> {
        doctypes::keys(EDGAR_DOC_TYPES)
    }

    async fn resolve(&self, keyword: &str) -> Result<StockInfo, FetchError> {
        client::get_cik_from_ticker(&self.transport, &self.www_base, keyword).await
    }

    /// Unknown doc types are treated as a literal form name, e.g. `S-4`.
    async fn fetch_list(&self, stock: &StockInfo, query: &FilingQuery) -> Result<FilingBatch, FetchError> {
        let forms: Vec<&str> = match doctypes::lookup(EDGAR_DOC_TYPES, &query.doc_type) {
            Some("") => Vec::new(),
            Some(list) => list.split('|').collect(),
            None => vec![query.doc_type.as_str()],
        };
        let submissions = client::get_company_submissions(&self.transport, &self.data_base, &stock.stock_id).await?;
        let filings = client::select_filings(stock, &submissions, query, &forms)?;
        tracing::info!("Found {} filings for {}", filings.len(), stock.code);
        let records = filings
            .into_iter()
            .map(|filing| filing.into_record(&self.www_base))
            .collect();
        Ok(FilingBatch::new(records))
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        client::download_filing_doc(&self.transport, url).await
    }
}

#[cfg(test)]
mod tests {
    use super::client::select_filings;
    use super::models::CompanySubmission;
    use super::*;
    use chrono::NaiveDate;

    fn submissions() -> CompanySubmission {
        serde_json::from_value(serde_json::json!({
            "cik": "320193",
            "name": "Apple Inc.",
            "tickers": ["AAPL"],
            "exchanges": ["Nasdaq"],
            "filings": {
                "recent": {
                    "accessionNumber": ["0000320193-23-000106", "0000320193-23-000077", "0000320193-22-000108"],
                    "filingDate": ["2023-11-03", "2023-08-04", "2022-10-28"],
                    "reportDate": ["2023-09-30", "2023-07-01", "2022-09-24"],
                    "form": ["10-K", "10-Q", "10-K"],
                    "size": [9000000, 5000000, 8000000],
                    "primaryDocument": ["aapl-20230930.htm", "aapl-20230701.htm", "aapl-20220924.htm"],
                    "primaryDocDescription": ["10-K", "10-Q", "10-K"]
                }
            }
        }))
        .unwrap()
    }

    fn stock() -> StockInfo {
        StockInfo {
            stock_id: "0000320193".to_string(),
            code: "AAPL".to_string(),
            name: "Apple Inc.".to_string(),
        }
    }

    fn query(ascending: bool) -> FilingQuery {
        FilingQuery {
            start_date: NaiveDate::from_ymd_opt(2022, 1, 1).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2023, 12, 31).unwrap(),
            doc_type: "annual_report".to_string(),
            ascending,
        }
    }

    #[test]
    fn filters_by_form_and_date() {
        let filings = select_filings(&stock(), &submissions(), &query(false), &["10-K"]).unwrap();
        assert_eq!(filings.len(), 2);
        assert_eq!(filings[0].filing_date, NaiveDate::from_ymd_opt(2023, 11, 3).unwrap());

        let mut narrow = query(false);
        narrow.start_date = NaiveDate::from_ymd_opt(2023, 1, 1).unwrap();
        let filings = select_filings(&stock(), &submissions(), &narrow, &[]).unwrap();
        assert_eq!(filings.len(), 2);
    }

    #[test]
    fn ascending_reverses_server_order() {
        let filings = select_filings(&stock(), &submissions(), &query(true), &["10-K"]).unwrap();
        assert_eq!(filings[0].accession_number, "0000320193-22-000108");
    }

    #[test]
    fn record_url_uses_archive_path() {
        let filing = select_filings(&stock(), &submissions(), &query(false), &["10-K"])
            .unwrap()
            .remove(0);
        let record = filing.into_record(EDGAR_WWW);
        assert_eq!(
            record.document_url,
            "https://www.sec.gov/Archives/edgar/data/320193/000032019323000106/aapl-20230930.htm"
        );
        assert_eq!(record.document_format, "HTM");
        assert_eq!(record.market_code, "Nasdaq");
    }
}
