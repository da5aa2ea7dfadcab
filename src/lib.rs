// src/lib.rs
//! Batch retrieval of exchange filing lists and documents into SQLite.
pub mod config;
pub mod exchanges;
pub mod models;
pub mod pipeline;
pub mod storage;
pub mod transport;
pub mod utils;

pub use config::ScraperConfig;
pub use exchanges::FilingSource;
pub use pipeline::{BatchOptions, BatchOrchestrator, BatchReport, IdentifierOutcome};
pub use utils::AppError;
