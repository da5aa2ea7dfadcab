// src/pipeline/orchestrator.rs
//! Batch driver: resolve, list, materialize and persist each identifier.
//!
//! The set of stored result sets is read once at construction; identifiers
//! whose key is already in it are skipped. With `max_workers > 1` the
//! remaining identifiers run in chunks of `max_workers` tasks and a chunk
//! is fully joined before the next one is spawned. Each task opens its own
//! SQLite connection for the final write.

use std::collections::{HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::exchanges::FilingSource;
use crate::models::{FilingQuery, ResultSetKey, WriteMode};
use crate::pipeline::materializer::ContentMaterializer;
use crate::pipeline::Stage;
use crate::storage::ResultSetStore;
use crate::utils::error::{BatchError, PipelineError, StorageError};

#[derive(Debug, Clone)]
pub struct BatchOptions {
    pub query: FilingQuery,
    pub convert_to_text: bool,
    pub keep_chinese: bool,
    pub ignore_errors: bool,
    /// `<= 1` runs identifiers one at a time
    pub max_workers: usize,
    pub write_mode: WriteMode,
}

impl BatchOptions {
    fn materializer(&self) -> ContentMaterializer {
        ContentMaterializer {
            convert_to_text: self.convert_to_text,
            keep_chinese: self.keep_chinese,
            ignore_errors: self.ignore_errors,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentifierOutcome {
    /// Result set already stored before the run
    Skipped,
    Persisted { rows: usize },
    Failed { stage: Stage, message: String },
}

/// Per-identifier outcomes, in input order.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub outcomes: Vec<(String, IdentifierOutcome)>,
}

impl BatchReport {
    pub fn outcome(&self, identifier: &str) -> Option<&IdentifierOutcome> {
        self.outcomes
            .iter()
            .find(|(id, _)| id == identifier)
            .map(|(_, outcome)| outcome)
    }

    pub fn persisted(&self) -> usize {
        self.count(|o| matches!(o, IdentifierOutcome::Persisted { .. }))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, IdentifierOutcome::Skipped))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, IdentifierOutcome::Failed { .. }))
    }

    fn count(&self, pred: impl Fn(&IdentifierOutcome) -> bool) -> usize {
        self.outcomes.iter().filter(|(_, o)| pred(o)).count()
    }
}

/// Everything one worker needs for one identifier.
#[derive(Debug, Clone)]
struct FilingTask {
    index: usize,
    identifier: String,
    key: ResultSetKey,
}

struct StageFailure {
    stage: Stage,
    error: PipelineError,
}

impl StageFailure {
    fn at<E: Into<PipelineError>>(stage: Stage) -> impl FnOnce(E) -> Self {
        move |e| Self { stage, error: e.into() }
    }
}

/// Outcome slots indexed by input position; blank inputs stay `None`.
type Slots = Vec<Option<(String, IdentifierOutcome)>>;

pub struct BatchOrchestrator {
    source: Arc<dyn FilingSource>,
    db_path: PathBuf,
    existing: Arc<HashSet<String>>,
    options: Arc<BatchOptions>,
}

impl BatchOrchestrator {
    /// Snapshots the stored result-set names in `db_path`.
    pub fn new(
        source: Arc<dyn FilingSource>,
        db_path: impl Into<PathBuf>,
        options: BatchOptions,
    ) -> Result<Self, StorageError> {
        let db_path = db_path.into();
        let existing = ResultSetStore::open(&db_path)?.list_result_sets()?;
        tracing::debug!("{} result sets already in {}", existing.len(), db_path.display());
        Ok(Self {
            source,
            db_path,
            existing: Arc::new(existing),
            options: Arc::new(options),
        })
    }

    pub fn existing_result_sets(&self) -> &HashSet<String> {
        &self.existing
    }

    pub async fn run(&self, identifiers: &[String]) -> Result<BatchReport, BatchError> {
        let mut slots: Slots = vec![None; identifiers.len()];
        let mut queue = VecDeque::new();
        let mut planned = HashSet::new();

        for (index, raw) in identifiers.iter().enumerate() {
            let identifier = raw.trim();
            if identifier.is_empty() {
                continue;
            }
            let key = ResultSetKey::new(identifier, self.source.exchange_tag(), &self.options.query);
            let table = key.table_name();
            if self.existing.contains(&table) || !planned.insert(table) {
                tracing::info!(identifier, result_set = %key, "Skipping, already stored");
                slots[index] = Some((identifier.to_string(), IdentifierOutcome::Skipped));
                continue;
            }
            queue.push_back(FilingTask {
                index,
                identifier: identifier.to_string(),
                key,
            });
        }

        if self.options.max_workers > 1 {
            self.run_concurrent(queue, &mut slots).await?;
        } else {
            self.run_sequential(queue, &mut slots).await?;
        }

        let report = BatchReport {
            outcomes: slots.into_iter().flatten().collect(),
        };
        tracing::info!(
            "Batch finished. Persisted: {}, Skipped: {}, Failed: {}",
            report.persisted(),
            report.skipped(),
            report.failed()
        );
        Ok(report)
    }

    async fn run_sequential(&self, mut queue: VecDeque<FilingTask>, slots: &mut Slots) -> Result<(), BatchError> {
        while let Some(task) = queue.pop_front() {
            tracing::info!(identifier = %task.identifier, "Processing");
            let result = process_identifier(self.source.as_ref(), &task, &self.db_path, &self.options).await;
            self.settle(task, result, slots)?;
        }
        Ok(())
    }

    async fn run_concurrent(&self, queue: VecDeque<FilingTask>, slots: &mut Slots) -> Result<(), BatchError> {
        let tasks: Vec<FilingTask> = queue.into();

        for chunk in tasks.chunks(self.options.max_workers) {
            let names: Vec<&str> = chunk.iter().map(|t| t.identifier.as_str()).collect();
            tracing::info!("Dispatching chunk: {:?}", names);

            let handles: Vec<_> = chunk
                .iter()
                .cloned()
                .map(|task| {
                    let source = Arc::clone(&self.source);
                    let options = Arc::clone(&self.options);
                    let db_path = self.db_path.clone();
                    let worker_task = task.clone();
                    let handle = tokio::spawn(async move {
                        process_identifier(source.as_ref(), &worker_task, &db_path, &options).await
                    });
                    (task, handle)
                })
                .collect();

            // Join the whole chunk before surfacing any failure
            let mut first_failure = None;
            for (task, handle) in handles {
                let result = match handle.await {
                    Ok(result) => result,
                    Err(e) => Err(StageFailure {
                        stage: Stage::Pending,
                        error: PipelineError::Worker(e.to_string()),
                    }),
                };
                if let Err(err) = self.settle(task, result, slots) {
                    first_failure.get_or_insert(err);
                }
            }
            if let Some(err) = first_failure {
                return Err(err);
            }
        }
        Ok(())
    }

    /// Records one task's result; returns the error when it should stop the batch.
    fn settle(
        &self,
        task: FilingTask,
        result: Result<usize, StageFailure>,
        slots: &mut Slots,
    ) -> Result<(), BatchError> {
        let outcome = match result {
            Ok(rows) => {
                tracing::info!(identifier = %task.identifier, rows, "Persisted {}", task.key);
                IdentifierOutcome::Persisted { rows }
            }
            Err(failure) => {
                tracing::error!(
                    identifier = %task.identifier,
                    stage = %failure.stage,
                    "Failed: {}",
                    failure.error
                );
                if !self.options.ignore_errors {
                    return Err(BatchError {
                        identifier: task.identifier,
                        stage: failure.stage,
                        source: failure.error,
                    });
                }
                IdentifierOutcome::Failed {
                    stage: failure.stage,
                    message: failure.error.to_string(),
                }
            }
        };
        slots[task.index] = Some((task.identifier, outcome));
        Ok(())
    }
}

/// Resolve, list, materialize and persist one identifier.
async fn process_identifier(
    source: &dyn FilingSource,
    task: &FilingTask,
    db_path: &Path,
    options: &BatchOptions,
) -> Result<usize, StageFailure> {
    let stock = source
        .resolve(&task.identifier)
        .await
        .map_err(StageFailure::at(Stage::Resolving))?;

    let mut batch = source
        .fetch_list(&stock, &options.query)
        .await
        .map_err(StageFailure::at(Stage::Listing))?;

    let summary = options
        .materializer()
        .materialize(source, &mut batch)
        .await
        .map_err(StageFailure::at(Stage::Materializing))?;
    tracing::debug!(identifier = %task.identifier, "Materialized: {:?}", summary);

    let key = task.key.clone();
    let db_path = db_path.to_path_buf();
    let mode = options.write_mode;
    tokio::task::spawn_blocking(move || -> Result<usize, StorageError> {
        let mut store = ResultSetStore::open(&db_path)?;
        store.write_result_set(&key, &batch.records, mode)
    })
    .await
    .map_err(|e| StageFailure {
        stage: Stage::Persisting,
        error: PipelineError::Worker(e.to_string()),
    })?
    .map_err(StageFailure::at(Stage::Persisting))
}
