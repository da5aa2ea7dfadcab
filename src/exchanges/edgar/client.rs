// src/exchanges/edgar/client.rs
use std::time::Duration;

use chrono::NaiveDate;

use crate::exchanges::edgar::models::{CompanySubmission, FilingInfo};
use crate::models::{FilingQuery, StockInfo};
use crate::transport::HttpTransport;
use crate::utils::error::FetchError;

// SEC asks for 10 requests/second max. Be conservative. >100ms delay.
const EDGAR_REQUEST_DELAY_MS: u64 = 150;

async fn pause() {
    tokio::time::sleep(Duration::from_millis(EDGAR_REQUEST_DELAY_MS)).await;
}

/// Downloads a specific filing document from its URL.
pub async fn download_filing_doc(transport: &HttpTransport, url: &str) -> Result<Vec<u8>, FetchError> {
    tracing::info!("Downloading document from: {}", url);
    pause().await;
    transport.get_bytes(url).await
}

/// Gets the zero-padded CIK (Central Index Key) for a ticker symbol
pub async fn get_cik_from_ticker(
    transport: &HttpTransport,
    www_base: &str,
    ticker: &str,
) -> Result<StockInfo, FetchError> {
    let ticker = ticker.trim().to_uppercase();
    let url = format!("{}/files/company_tickers.json", www_base.trim_end_matches('/'));

    pause().await;
    let json = transport.get_json(&url, &[]).await?;

    // Iterate through the company list to find the matching ticker
    let companies = json
        .as_object()
        .ok_or_else(|| FetchError::Parse("Invalid company_tickers.json structure".to_string()))?;
    for company in companies.values() {
        let company_ticker = company.get("ticker").and_then(|t| t.as_str()).unwrap_or_default();
        if company_ticker.to_uppercase() != ticker {
            continue;
        }
        let cik_num = company
            .get("cik_str")
            .and_then(|c| c.as_u64().or_else(|| c.as_str().and_then(|s| s.parse().ok())))
            .ok_or_else(|| FetchError::Parse("Invalid CIK format".to_string()))?;
        return Ok(StockInfo {
            // Format CIK with leading zeros to 10 digits
            stock_id: format!("{:010}", cik_num),
            code: ticker.clone(),
            name: company
                .get("title")
                .and_then(|t| t.as_str())
                .unwrap_or_default()
                .to_string(),
        });
    }

    Err(FetchError::NotFound(ticker))
}

/// Fetches the company submission data for a given CIK
pub async fn get_company_submissions(
    transport: &HttpTransport,
    data_base: &str,
    cik: &str,
) -> Result<CompanySubmission, FetchError> {
    let url = format!("{}/submissions/CIK{}.json", data_base.trim_end_matches('/'), cik);
    pause().await;
    let json = transport.get_json(&url, &[]).await?;
    Ok(serde_json::from_value(json)?)
}

/// Flattens the recent-filings arrays and keeps rows inside the query's
/// date range whose form is in `forms` (every form when `forms` is empty).
pub fn select_filings(
    stock: &StockInfo,
    submissions: &CompanySubmission,
    query: &FilingQuery,
    forms: &[&str],
) -> Result<Vec<FilingInfo>, FetchError> {
    let recent = &submissions.filings.recent;
    let mut filings = Vec::new();

    for (i, acc_num) in recent.accession_number.iter().enumerate() {
        let form = recent
            .form
            .get(i)
            .ok_or_else(|| FetchError::Parse("Missing form type".to_string()))?;
        if !forms.is_empty() && !forms.contains(&form.as_str()) {
            continue;
        }

        let raw_date = recent
            .filing_date
            .get(i)
            .ok_or_else(|| FetchError::Parse("Missing filing date".to_string()))?;
        let filing_date = NaiveDate::parse_from_str(raw_date, "%Y-%m-%d")
            .map_err(|_| FetchError::Parse(format!("Invalid date format: {}", raw_date)))?;
        if filing_date < query.start_date || filing_date > query.end_date {
            continue;
        }

        let primary_doc = recent
            .primary_document
            .get(i)
            .ok_or_else(|| FetchError::Parse("Missing primary document".to_string()))?;

        filings.push(FilingInfo {
            accession_number: acc_num.clone(),
            filing_date,
            report_date: recent.report_date.get(i).cloned().unwrap_or_default(),
            form_type: form.clone(),
            ticker: stock.code.clone(),
            company_name: if submissions.name.is_empty() {
                stock.name.clone()
            } else {
                submissions.name.clone()
            },
            cik: stock.stock_id.clone(),
            primary_doc: primary_doc.clone(),
            primary_doc_description: recent.primary_doc_description.get(i).cloned().unwrap_or_default(),
            size: recent.size.get(i).copied(),
            exchange: submissions.exchanges.first().cloned().unwrap_or_default(),
        });
    }

    // EDGAR lists newest first
    if query.ascending {
        filings.reverse();
    }

    Ok(filings)
}
