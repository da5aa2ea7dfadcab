// src/exchanges/edgar/models.rs
use chrono::NaiveDate;
use serde::Deserialize;

use crate::models::FilingRecord;

/// Structure representing the EDGAR company submission index
/// Example: https://data.sec.gov/submissions/CIK0000320193.json
#[derive(Debug, Deserialize)]
pub struct CompanySubmission {
    #[serde(default)]
    pub cik: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub tickers: Vec<String>,
    #[serde(default)]
    pub exchanges: Vec<String>,
    pub filings: Filings,
}

#[derive(Debug, Deserialize)]
pub struct Filings {
    pub recent: FilingsList,
}

/// Column-oriented filing arrays; index `i` of every vector is one filing.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FilingsList {
    pub accession_number: Vec<String>,
    pub filing_date: Vec<String>,
    pub report_date: Vec<String>,
    pub form: Vec<String>,
    pub size: Vec<u64>,
    pub primary_document: Vec<String>,
    pub primary_doc_description: Vec<String>,
}

/// One row of `FilingsList`, flattened
#[derive(Debug, Clone, PartialEq)]
pub struct FilingInfo {
    pub accession_number: String,
    pub filing_date: NaiveDate,
    pub report_date: String,
    pub form_type: String,
    pub ticker: String,
    pub company_name: String,
    pub cik: String,
    pub primary_doc: String,
    pub primary_doc_description: String,
    pub size: Option<u64>,
    pub exchange: String,
}

impl FilingInfo {
    /// Constructs the URL to access the primary document of this filing
    pub fn primary_doc_url(&self, archives_base: &str) -> String {
        let acc_no_dashes = self.accession_number.replace('-', "");
        // Archive paths use the unpadded CIK
        let cik = self.cik.trim_start_matches('0');
        format!(
            "{}/Archives/edgar/data/{}/{}/{}",
            archives_base.trim_end_matches('/'),
            cik,
            acc_no_dashes,
            self.primary_doc
        )
    }

    pub fn into_record(self, archives_base: &str) -> FilingRecord {
        let document_url = self.primary_doc_url(archives_base);
        let document_format = self
            .primary_doc
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_uppercase())
            .unwrap_or_default();

        let title = if self.primary_doc_description.trim().is_empty() {
            self.form_type.clone()
        } else {
            self.primary_doc_description.clone()
        };

        let mut extra = std::collections::BTreeMap::new();
        extra.insert("accession_number".to_string(), self.accession_number);
        extra.insert("cik".to_string(), self.cik);
        extra.insert("report_date".to_string(), self.report_date);
        extra.insert("primary_doc_description".to_string(), self.primary_doc_description);

        FilingRecord {
            identifier: self.ticker,
            security_name: self.company_name,
            announcement_date: Some(self.filing_date),
            announcement_title: title,
            document_url,
            document_format,
            document_size_bytes: self.size,
            info_type_code: self.form_type,
            market_code: self.exchange,
            extra,
            document_content: None,
            document_text: None,
        }
    }
}
