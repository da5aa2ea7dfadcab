// src/pipeline/mod.rs
pub mod materializer;
pub mod orchestrator;

use std::fmt;

pub use materializer::{ContentMaterializer, MaterializeSummary};
pub use orchestrator::{BatchOptions, BatchOrchestrator, BatchReport, IdentifierOutcome};

/// Where an identifier's pipeline was when it stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Failed outside any stage, e.g. the worker task itself died
    Pending,
    Resolving,
    Listing,
    Materializing,
    Persisting,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Pending => "pending",
            Stage::Resolving => "resolving",
            Stage::Listing => "listing",
            Stage::Materializing => "materializing",
            Stage::Persisting => "persisting",
        };
        f.write_str(name)
    }
}
