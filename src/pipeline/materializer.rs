// src/pipeline/materializer.rs
//! Downloads every document of a batch and optionally converts it to text.
//!
//! Downloads run first over the whole batch, then conversion runs as a
//! second pass. With `ignore_errors` a failed record is logged and left
//! without content or text; otherwise the first pass that sees a failure
//! returns an error. Content already attached is never rolled back.

use crate::exchanges::FilingSource;
use crate::models::{FilingBatch, FilingRecord};
use crate::utils::error::{ConvertError, PipelineError};
use crate::utils::text::document_to_text;

#[derive(Debug, Clone, Copy, Default)]
pub struct ContentMaterializer {
    pub convert_to_text: bool,
    pub keep_chinese: bool,
    pub ignore_errors: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MaterializeSummary {
    pub downloaded: usize,
    pub download_failures: usize,
    pub converted: usize,
    pub conversion_failures: usize,
}

/// Declared format, falling back to the URL's file extension.
fn effective_format(record: &FilingRecord) -> String {
    if !record.document_format.trim().is_empty() {
        return record.document_format.clone();
    }
    record
        .document_url
        .rsplit('/')
        .next()
        .and_then(|name| name.rsplit_once('.'))
        .map(|(_, ext)| ext.to_string())
        .unwrap_or_default()
}

impl ContentMaterializer {
    pub async fn materialize(
        &self,
        source: &dyn FilingSource,
        batch: &mut FilingBatch,
    ) -> Result<MaterializeSummary, PipelineError> {
        let mut summary = MaterializeSummary::default();
        let mut first_failure: Option<String> = None;

        for record in batch.records.iter_mut() {
            match source.download(&record.document_url).await {
                Ok(bytes) => {
                    record.document_content = Some(bytes);
                    summary.downloaded += 1;
                }
                Err(e) => {
                    tracing::warn!("Failed to download {}: {}", record.document_url, e);
                    summary.download_failures += 1;
                    first_failure.get_or_insert_with(|| format!("{}: {}", record.document_url, e));
                }
            }
        }

        if let Some(first) = first_failure {
            if !self.ignore_errors {
                return Err(PipelineError::PartialFailure {
                    failed: summary.download_failures,
                    total: batch.len(),
                    first,
                });
            }
        }

        if self.convert_to_text {
            self.convert_all(batch, &mut summary).await?;
        }

        Ok(summary)
    }

    async fn convert_all(&self, batch: &mut FilingBatch, summary: &mut MaterializeSummary) -> Result<(), PipelineError> {
        for record in batch.records.iter_mut() {
            let format = effective_format(record);
            let Some(bytes) = record.document_content.clone() else {
                continue; // download already failed and was ignored
            };
            match convert_blocking(format, bytes, self.keep_chinese).await {
                Ok(text) => {
                    record.document_text = Some(text);
                    summary.converted += 1;
                }
                Err(e) if self.ignore_errors => {
                    tracing::warn!("Failed to convert {}: {}", record.document_url, e);
                    summary.conversion_failures += 1;
                }
                Err(e) => {
                    return Err(PipelineError::Conversion {
                        url: record.document_url.clone(),
                        source: e,
                    });
                }
            }
        }
        Ok(())
    }
}

/// Runs the CPU-bound conversion on the blocking pool.
async fn convert_blocking(format: String, bytes: Vec<u8>, keep_chinese: bool) -> Result<String, ConvertError> {
    tokio::task::spawn_blocking(move || document_to_text(&format, &bytes, keep_chinese))
        .await
        .map_err(|e| ConvertError::Pdf(format!("conversion task failed: {}", e)))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FilingQuery, StockInfo};
    use crate::utils::error::FetchError;
    use async_trait::async_trait;

    /// Serves fixed bodies; URLs containing `missing` fail to download.
    struct StaticSource;

    #[async_trait]
    impl FilingSource for StaticSource {
        fn exchange_tag(&self) -> &'static str {
            "static"
        }

        fn doc_types(&self) -> Vec<&'static str> {
            vec!["all"]
        }

        async fn resolve(&self, keyword: &str) -> Result<StockInfo, FetchError> {
            Err(FetchError::NotFound(keyword.to_string()))
        }

        async fn fetch_list(&self, _: &StockInfo, _: &FilingQuery) -> Result<FilingBatch, FetchError> {
            Ok(FilingBatch::default())
        }

        async fn download(&self, url: &str) -> Result<Vec<u8>, FetchError> {
            if url.contains("missing") {
                Err(FetchError::Remote(format!("gone: {}", url)))
            } else {
                Ok(format!("<html><body><p>{}</p></body></html>", url).into_bytes())
            }
        }
    }

    fn record(url: &str, format: &str) -> FilingRecord {
        FilingRecord {
            document_url: url.to_string(),
            document_format: format.to_string(),
            ..Default::default()
        }
    }

    fn batch() -> FilingBatch {
        FilingBatch::new(vec![
            record("https://x/a.htm", "HTML"),
            record("https://x/b.xls", "XLS"),
            record("https://x/c.html", ""),
        ])
    }

    #[tokio::test]
    async fn downloads_without_conversion() {
        let mut batch = batch();
        let summary = ContentMaterializer::default()
            .materialize(&StaticSource, &mut batch)
            .await
            .unwrap();
        assert_eq!(summary.downloaded, 3);
        assert!(batch.records.iter().all(|r| r.document_content.is_some()));
        assert!(batch.records.iter().all(|r| r.document_text.is_none()));
    }

    #[tokio::test]
    async fn ignored_conversion_failure_leaves_text_unset() {
        let materializer = ContentMaterializer {
            convert_to_text: true,
            ignore_errors: true,
            ..Default::default()
        };
        let mut batch = batch();
        let summary = materializer.materialize(&StaticSource, &mut batch).await.unwrap();

        assert_eq!(summary.converted, 2);
        assert_eq!(summary.conversion_failures, 1);
        assert_eq!(batch.records[0].document_text.as_deref(), Some("https://x/a.htm"));
        assert!(batch.records[1].document_text.is_none());
        // the record after the failure is still converted
        assert_eq!(batch.records[2].document_text.as_deref(), Some("https://x/c.html"));
    }

    #[tokio::test]
    async fn conversion_failure_aborts_but_keeps_content() {
        let materializer = ContentMaterializer {
            convert_to_text: true,
            ..Default::default()
        };
        let mut batch = batch();
        let err = materializer.materialize(&StaticSource, &mut batch).await.unwrap_err();

        assert!(matches!(
            err,
            PipelineError::Conversion { source: ConvertError::UnsupportedFormat(_), .. }
        ));
        assert!(batch.records.iter().all(|r| r.document_content.is_some()));
        assert!(batch.records[0].document_text.is_some());
    }

    #[tokio::test]
    async fn unreadable_pdf_is_skipped_when_ignoring_errors() {
        let materializer = ContentMaterializer {
            convert_to_text: true,
            ignore_errors: true,
            ..Default::default()
        };
        let mut batch = FilingBatch::new(vec![
            record("https://x/broken.pdf", "PDF"),
            record("https://x/after.htm", "HTML"),
        ]);
        let summary = materializer.materialize(&StaticSource, &mut batch).await.unwrap();

        assert_eq!(summary.conversion_failures, 1);
        assert!(batch.records[0].document_content.is_some());
        assert!(batch.records[0].document_text.is_none());
        assert_eq!(batch.records[1].document_text.as_deref(), Some("https://x/after.htm"));
    }

    #[test]
    fn download_failure_is_partial_failure_unless_ignored() {
        let mut strict_batch = FilingBatch::new(vec![
            record("https://x/a.htm", "HTML"),
            record("https://x/missing.htm", "HTML"),
        ]);
        let err = tokio_test::block_on(ContentMaterializer::default().materialize(&StaticSource, &mut strict_batch))
            .unwrap_err();
        assert!(matches!(err, PipelineError::PartialFailure { failed: 1, total: 2, .. }));

        let mut lenient_batch = strict_batch.clone();
        let lenient = ContentMaterializer {
            convert_to_text: true,
            ignore_errors: true,
            ..Default::default()
        };
        let summary = tokio_test::block_on(lenient.materialize(&StaticSource, &mut lenient_batch)).unwrap();
        assert_eq!(summary.download_failures, 1);
        assert_eq!(summary.converted, 1);
        assert!(lenient_batch.records[1].document_content.is_none());
        assert!(lenient_batch.records[1].document_text.is_none());
    }
}
