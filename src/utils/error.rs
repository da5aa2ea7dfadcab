// src/utils/error.rs
use thiserror::Error;

use crate::pipeline::Stage;

// Define specific error types for different parts of the application
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Network request failed: {0}")]
    Transport(#[from] reqwest::Error), // Connection failures and timeouts

    #[error("HTTP error {status} for URL: {url}")]
    Http {
        status: reqwest::StatusCode,
        url: String,
    },

    #[error("Remote source reported a failure: {0}")]
    Remote(String),

    #[error("No match found for '{0}'")]
    NotFound(String),

    #[error("Failed to parse remote response: {0}")]
    Parse(String),
}

impl From<serde_json::Error> for FetchError {
    fn from(err: serde_json::Error) -> Self {
        FetchError::Parse(err.to_string())
    }
}

impl From<url::ParseError> for FetchError {
    fn from(err: url::ParseError) -> Self {
        FetchError::Parse(format!("invalid URL: {}", err))
    }
}

#[derive(Error, Debug)]
pub enum ConvertError {
    #[error("PDF text extraction failed: {0}")]
    Pdf(String),

    #[error("Unsupported document format: {0}")]
    UnsupportedFormat(String),
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure inside one identifier's resolve/list/materialize/persist pipeline.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("Conversion failed for {url}: {source}")]
    Conversion {
        url: String,
        #[source]
        source: ConvertError,
    },

    #[error("{failed} of {total} documents failed, first error: {first}")]
    PartialFailure {
        failed: usize,
        total: usize,
        first: String,
    },

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Worker task failed: {0}")]
    Worker(String),
}

/// An identifier failure that stopped the batch.
#[derive(Error, Debug)]
#[error("identifier '{identifier}' failed while {stage}: {source}")]
pub struct BatchError {
    pub identifier: String,
    pub stage: Stage,
    #[source]
    pub source: PipelineError,
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error), // Automatically convert IO errors

    #[error("Exchange interaction failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Batch aborted: {0}")]
    Batch(#[from] BatchError),
}
