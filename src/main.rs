// src/main.rs
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{Local, NaiveDate};
use clap::{Parser, ValueEnum};

use filing_scraper::exchanges::{cninfo, edgar, hkex};
use filing_scraper::exchanges::{CnInfo, FilingSource, HkexNews, SecEdgar};
use filing_scraper::models::{FilingQuery, WriteMode};
use filing_scraper::utils::logging::setup_logging;
use filing_scraper::{AppError, BatchOptions, BatchOrchestrator, IdentifierOutcome, ScraperConfig};

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Exchange {
    Hkex,
    Cninfo,
    Edgar,
}

impl Exchange {
    fn build(self, config: &ScraperConfig) -> Result<Arc<dyn FilingSource>, AppError> {
        let source: Arc<dyn FilingSource> = match self {
            Exchange::Hkex => Arc::new(HkexNews::new(config)?),
            Exchange::Cninfo => Arc::new(CnInfo::new(config)?),
            Exchange::Edgar => Arc::new(SecEdgar::new(config)?),
        };
        Ok(source)
    }

    fn default_db(self) -> String {
        let tag = match self {
            Exchange::Hkex => hkex::HKEX_TAG,
            Exchange::Cninfo => cninfo::CNINFO_TAG,
            Exchange::Edgar => edgar::EDGAR_TAG,
        };
        format!("{}.db", tag)
    }
}

fn parse_date(s: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(s, "%Y%m%d").map_err(|e| format!("expected YYYYMMDD: {}", e))
}

/// Download filing lists and documents for a batch of stocks into SQLite
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Exchange to query
    #[arg(long, value_enum, default_value = "hkex")]
    exchange: Exchange,

    /// Stock codes to process (overrides --stocks-path)
    #[arg(short = 'S', long, num_args = 1..)]
    stock_list: Vec<String>,

    /// Newline-separated file of stock codes
    #[arg(long, default_value = "stock_list.txt")]
    stocks_path: PathBuf,

    /// SQLite database path (defaults to config, then <exchange>.db)
    #[arg(short = 'D', long)]
    db_path: Option<PathBuf>,

    /// First announcement date, YYYYMMDD
    #[arg(short = 's', long, default_value = "20151231", value_parser = parse_date)]
    start_date: NaiveDate,

    /// Last announcement date, YYYYMMDD (default: today)
    #[arg(short = 'e', long, value_parser = parse_date)]
    end_date: Option<NaiveDate>,

    /// JSON config file
    #[arg(short = 'C', long)]
    config: Option<PathBuf>,

    /// Log progress at info level
    #[arg(short, long)]
    verbose: bool,

    /// Document type key, see --display-doctype-list
    #[arg(short = 'd', long, default_value = "annual_report")]
    doctype: String,

    /// Print the exchange's document type keys and exit
    #[arg(long)]
    display_doctype_list: bool,

    /// Convert downloaded documents to text
    #[arg(long)]
    convert_to_text: bool,

    /// Keep page markers in converted Chinese text
    #[arg(long)]
    keep_chinese: bool,

    /// Oldest filings first
    #[arg(long)]
    ascending: bool,

    /// Concurrent identifiers per chunk; 0 or 1 runs sequentially
    #[arg(short = 'M', long, default_value_t = 0)]
    max_workers: usize,

    /// Log failures and keep going
    #[arg(short = 'I', long)]
    ignore_errors: bool,
}

fn read_stock_list(args: &Args) -> Result<Vec<String>, AppError> {
    if !args.stock_list.is_empty() {
        return Ok(args.stock_list.clone());
    }
    let raw = std::fs::read_to_string(&args.stocks_path)?;
    Ok(raw.lines().map(str::to_string).collect())
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let args = Args::parse();

    // 1. Setup Logging (RUST_LOG wins over --verbose)
    setup_logging(args.verbose);
    tracing::info!("Starting with args: {:?}", args);

    // 2. Configuration and exchange source
    let config = ScraperConfig::load_or_default(args.config.as_deref())?;
    let source = args.exchange.build(&config)?;

    if args.display_doctype_list {
        for key in source.doc_types() {
            println!("{}", key);
        }
        return Ok(());
    }
    let db_path = config.resolve_db_path(args.db_path.as_deref(), &args.exchange.default_db());

    let end_date = args.end_date.unwrap_or_else(|| Local::now().date_naive());
    if end_date < args.start_date {
        return Err(AppError::Config(format!(
            "end date {} is before start date {}",
            end_date, args.start_date
        )));
    }

    let options = BatchOptions {
        query: FilingQuery {
            start_date: args.start_date,
            end_date,
            doc_type: args.doctype.clone(),
            ascending: args.ascending,
        },
        convert_to_text: args.convert_to_text,
        keep_chinese: args.keep_chinese,
        ignore_errors: args.ignore_errors,
        max_workers: args.max_workers,
        write_mode: WriteMode::Replace,
    };

    // 3. Run the batch
    let identifiers = read_stock_list(&args)?;
    let orchestrator = BatchOrchestrator::new(source, db_path.clone(), options)?;
    let report = orchestrator.run(&identifiers).await?;

    for (identifier, outcome) in &report.outcomes {
        if let IdentifierOutcome::Failed { stage, message } = outcome {
            tracing::warn!(identifier = %identifier, stage = %stage, "Skipped after error: {}", message);
        }
    }
    tracing::info!(
        "Done. {} persisted, {} already stored, {} failed; database {}",
        report.persisted(),
        report.skipped(),
        report.failed(),
        db_path.display()
    );

    Ok(())
}
