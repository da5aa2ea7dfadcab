// src/transport.rs
//! Shared HTTP transport.
//!
//! One [`reqwest::Client`] per exchange source, cloned into every worker.
//! Requests that fail to connect or time out are re-sent up to
//! `max_retries` times; HTTP error statuses are returned as-is.

use std::collections::BTreeMap;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};

use crate::config::{HttpMethod, ScraperConfig};
use crate::utils::error::FetchError;

const DEFAULT_USER_AGENT: &str = concat!("filing_scraper/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    max_retries: u32,
    retry_schema: String,
    default_params: BTreeMap<String, String>,
}

impl HttpTransport {
    /// Builds a client from the config headers plus any exchange-specific ones.
    pub fn new(config: &ScraperConfig, extra_headers: &[(&str, &str)]) -> Result<Self, FetchError> {
        let mut header_map = HeaderMap::new();
        let pairs = config
            .headers
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .chain(extra_headers.iter().copied());
        for (key, value) in pairs {
            let name = HeaderName::from_bytes(key.as_bytes())
                .map_err(|e| FetchError::Parse(format!("invalid header name '{}': {}", key, e)))?;
            let val = HeaderValue::from_str(value)
                .map_err(|e| FetchError::Parse(format!("invalid header value '{}': {}", value, e)))?;
            header_map.insert(name, val);
        }

        let client = reqwest::Client::builder()
            .user_agent(DEFAULT_USER_AGENT) // Overridden by an explicit User-Agent header
            .default_headers(header_map)
            .timeout(Duration::from_secs(config.timeout))
            .build()?;

        Ok(Self {
            client,
            max_retries: config.max_retries,
            retry_schema: config.schema.clone(),
            default_params: config.params.clone(),
        })
    }

    /// Config-level params overlaid with the request's own.
    fn merged_params(&self, params: &[(&str, String)]) -> Vec<(String, String)> {
        let mut merged = self.default_params.clone();
        for (key, value) in params {
            merged.insert((*key).to_string(), value.clone());
        }
        merged.into_iter().collect()
    }

    async fn send<F>(&self, url: &str, build_request: F) -> Result<reqwest::Response, FetchError>
    where
        F: Fn() -> reqwest::RequestBuilder,
    {
        let retries = if url.starts_with(&self.retry_schema) { self.max_retries } else { 0 };
        let mut attempt = 0;
        loop {
            match build_request().send().await {
                Ok(response) => {
                    let status = response.status();
                    if !status.is_success() {
                        tracing::error!("HTTP error status: {} for URL: {}", status, url);
                        return Err(FetchError::Http { status, url: url.to_string() });
                    }
                    return Ok(response);
                }
                Err(e) if (e.is_connect() || e.is_timeout()) && attempt < retries => {
                    attempt += 1;
                    tracing::warn!("Request to {} failed ({}), retry {}/{}", url, e, attempt, retries);
                }
                Err(e) => return Err(FetchError::Transport(e)),
            }
        }
    }

    /// GET with per-request headers on top of the client defaults.
    pub async fn get_text(
        &self,
        url: &str,
        params: &[(&str, String)],
        headers: &[(&str, &str)],
    ) -> Result<String, FetchError> {
        let query = self.merged_params(params);
        let response = self
            .send(url, || {
                headers
                    .iter()
                    .fold(self.client.get(url).query(&query), |req, (k, v)| req.header(*k, *v))
            })
            .await?;
        Ok(response.text().await?)
    }

    pub async fn get_json(
        &self,
        url: &str,
        params: &[(&str, String)],
    ) -> Result<serde_json::Value, FetchError> {
        self.send_json(HttpMethod::Get, url, params).await
    }

    /// GET sends `params` as the query string, POST as a form body.
    pub async fn send_json(
        &self,
        method: HttpMethod,
        url: &str,
        params: &[(&str, String)],
    ) -> Result<serde_json::Value, FetchError> {
        let params = self.merged_params(params);
        let response = match method {
            HttpMethod::Get => self.send(url, || self.client.get(url).query(&params)).await?,
            HttpMethod::Post => self.send(url, || self.client.post(url).form(&params)).await?,
        };
        let body = response.text().await?;
        tracing::debug!("Received {} bytes from {}", body.len(), url);
        Ok(serde_json::from_str(&body)?)
    }

    /// POSTs a form without the config-level default params.
    pub async fn post_form_json(
        &self,
        url: &str,
        form: &BTreeMap<String, String>,
    ) -> Result<serde_json::Value, FetchError> {
        let response = self.send(url, || self.client.post(url).form(form)).await?;
        Ok(response.json().await?)
    }

    /// Downloads a whole response body.
    pub async fn get_bytes(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let response = self.send(url, || self.client.get(url)).await?;
        let bytes = response.bytes().await?;
        tracing::debug!("Successfully downloaded {} bytes from {}", bytes.len(), url);
        Ok(bytes.to_vec())
    }
}
