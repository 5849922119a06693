//! Batch fetch, extract and annotate pipeline.
//!
//! Papers run concurrently under a semaphore; one paper failing (or
//! panicking) never cancels its siblings.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::annotate::AnnotationOrchestrator;
use crate::cache::{AnnotationCache, CachePartition};
use crate::config::{Config, Settings};
use crate::extract::{DocumentExtractor, ExtractionError};
use crate::fetch::{ar5iv_url, FetchError, PageFetcher};
use crate::llm::{LlmClient, LlmError};
use crate::models::{AnnotatedPaper, Document};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Extract(#[from] ExtractionError),
    #[error("failed to set up model client: {0}")]
    Llm(#[from] LlmError),
}

/// Progress events for the CLI.
#[derive(Debug, Clone)]
pub enum PipelineEvent {
    Started { total: usize },
    PaperExtracted { paper_id: String, title: String },
    PaperAnnotated { paper_id: String, completed: usize },
    PaperFailed { paper_id: String, error: String },
    Complete { stats: PipelineStats },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PipelineStats {
    pub extracted: usize,
    pub failed: usize,
    pub annotated: usize,
}

/// Documents (and, when annotating, records) in input order.
#[derive(Debug, Default)]
pub struct BatchResult {
    pub documents: Vec<Document>,
    pub records: Vec<AnnotatedPaper>,
    pub stats: PipelineStats,
}

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub site_base_url: String,
    /// Pause after each network fetch.
    pub request_delay: Duration,
    /// Papers in flight at once.
    pub concurrency: usize,
}

impl PipelineOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            site_base_url: settings.site_base_url.clone(),
            request_delay: settings.request_delay(),
            concurrency: settings.concurrency,
        }
    }
}

/// Cheap to clone; clones share the cache, client and orchestrator.
#[derive(Clone)]
pub struct PaperPipeline {
    fetcher: PageFetcher,
    extractor: DocumentExtractor,
    cache: AnnotationCache,
    orchestrator: Arc<AnnotationOrchestrator>,
    options: PipelineOptions,
}

struct PaperOutcome {
    document: Document,
    record: Option<AnnotatedPaper>,
}

impl PaperPipeline {
    pub fn new(
        fetcher: PageFetcher,
        extractor: DocumentExtractor,
        cache: AnnotationCache,
        orchestrator: Arc<AnnotationOrchestrator>,
        options: PipelineOptions,
    ) -> Self {
        Self {
            fetcher,
            extractor,
            cache,
            orchestrator,
            options,
        }
    }

    /// Wire up the Ollama client, cache and fetcher from configuration.
    pub fn from_settings(settings: &Settings, config: &Config) -> Result<Self, PipelineError> {
        let cache = AnnotationCache::new(&settings.cache_dir);
        let client = LlmClient::new(config.llm.clone())?;
        let orchestrator = AnnotationOrchestrator::new(
            Arc::new(client),
            cache.clone(),
            Arc::new(config.taxonomy()),
            &config.llm,
            settings.annotate_options(),
        );
        let fetcher = PageFetcher::new(
            &settings.user_agent,
            settings.request_timeout(),
            settings.fetch_policy(),
        )?;
        Ok(Self::new(
            fetcher,
            DocumentExtractor::new(settings.site_base_url.clone()),
            cache,
            Arc::new(orchestrator),
            PipelineOptions::from_settings(settings),
        ))
    }

    pub fn cache(&self) -> &AnnotationCache {
        &self.cache
    }

    pub fn orchestrator(&self) -> &AnnotationOrchestrator {
        &self.orchestrator
    }

    /// Cached document, or fetch and extract it.
    pub async fn extract_paper(&self, id: &str, force: bool) -> Result<Document, PipelineError> {
        if !force {
            if let Some(doc) = self.cache.read::<Document>(CachePartition::Documents, id).await {
                info!("Using cached document for {}", id);
                return Ok(doc);
            }
        }

        let url = ar5iv_url(&self.options.site_base_url, id);
        info!("Fetching {}", url);
        let fetched = self.fetcher.fetch(&url).await;
        tokio::time::sleep(self.options.request_delay).await;
        self.extract_html(&fetched?, id).await
    }

    /// Extract a page already on hand and cache the document.
    pub async fn extract_html(&self, html: &str, id: &str) -> Result<Document, PipelineError> {
        let doc = self.extractor.extract(html, id)?;
        info!(
            "Extracted {}: {} sections, {} figures, {} tables, {} equations",
            id,
            doc.sections().len(),
            doc.figures.len(),
            doc.tables.len(),
            doc.equations.len()
        );
        if let Err(e) = self.cache.write(CachePartition::Documents, id, &doc).await {
            warn!("Could not cache document {}: {}", id, e);
        }
        Ok(doc)
    }

    /// Annotate a document and store the merged record.
    pub async fn annotate(&self, doc: Document, force: bool) -> AnnotatedPaper {
        let record = self.orchestrator.annotate_document(doc, force).await;
        if let Err(e) = self
            .cache
            .write(CachePartition::Records, &record.paper_id, &record)
            .await
        {
            warn!("Could not store record for {}: {}", record.paper_id, e);
        }
        record
    }

    async fn process_one(
        &self,
        id: &str,
        force: bool,
        annotate: bool,
        events: &mpsc::Sender<PipelineEvent>,
    ) -> Result<PaperOutcome, PipelineError> {
        let document = self.extract_paper(id, force).await?;
        let _ = events
            .send(PipelineEvent::PaperExtracted {
                paper_id: id.to_string(),
                title: document.title.clone(),
            })
            .await;

        let record = if annotate {
            let record = self.annotate(document.clone(), force).await;
            let _ = events
                .send(PipelineEvent::PaperAnnotated {
                    paper_id: id.to_string(),
                    completed: record.completed().len(),
                })
                .await;
            Some(record)
        } else {
            None
        };
        Ok(PaperOutcome { document, record })
    }

    async fn run_batch(
        &self,
        ids: &[String],
        force: bool,
        annotate: bool,
        events: mpsc::Sender<PipelineEvent>,
    ) -> BatchResult {
        let _ = events.send(PipelineEvent::Started { total: ids.len() }).await;

        let semaphore = Arc::new(Semaphore::new(self.options.concurrency.max(1)));
        let mut tasks = JoinSet::new();
        for (position, id) in ids.iter().enumerate() {
            let pipeline = self.clone();
            let semaphore = semaphore.clone();
            let events = events.clone();
            let id = id.clone();
            tasks.spawn(async move {
                let outcome = match semaphore.acquire_owned().await {
                    Ok(_permit) => pipeline.process_one(&id, force, annotate, &events).await,
                    Err(_) => return (position, id, None),
                };
                match outcome {
                    Ok(outcome) => (position, id, Some(outcome)),
                    Err(e) => {
                        error!("Failed to process {}: {}", id, e);
                        let _ = events
                            .send(PipelineEvent::PaperFailed {
                                paper_id: id.clone(),
                                error: e.to_string(),
                            })
                            .await;
                        (position, id, None)
                    }
                }
            });
        }

        let mut stats = PipelineStats::default();
        let mut finished: Vec<(usize, PaperOutcome)> = Vec::with_capacity(ids.len());
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((position, _, Some(outcome))) => {
                    stats.extracted += 1;
                    if outcome.record.is_some() {
                        stats.annotated += 1;
                    }
                    finished.push((position, outcome));
                }
                Ok((_, _, None)) => stats.failed += 1,
                Err(e) => {
                    error!("Paper task aborted: {}", e);
                    stats.failed += 1;
                }
            }
        }
        finished.sort_by_key(|(position, _)| *position);

        let mut result = BatchResult {
            stats,
            ..BatchResult::default()
        };
        for (_, outcome) in finished {
            result.documents.push(outcome.document);
            result.records.extend(outcome.record);
        }

        info!(
            "Batch done: {} extracted, {} annotated, {} failed",
            stats.extracted, stats.annotated, stats.failed
        );
        let _ = events.send(PipelineEvent::Complete { stats }).await;
        result
    }

    /// Extract many papers concurrently.
    pub async fn extract_papers(
        &self,
        ids: &[String],
        force: bool,
        events: mpsc::Sender<PipelineEvent>,
    ) -> BatchResult {
        self.run_batch(ids, force, false, events).await
    }

    /// Extract and annotate many papers concurrently.
    pub async fn process_papers(
        &self,
        ids: &[String],
        force: bool,
        events: mpsc::Sender<PipelineEvent>,
    ) -> BatchResult {
        self.run_batch(ids, force, true, events).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotate::AnnotateOptions;
    use crate::fetch::FetchPolicy;
    use crate::llm::{GenerateRequest, LlmConfig, TextGenerator};
    use crate::models::CategoryTaxonomy;
    use async_trait::async_trait;
    use axum::{extract::Path as UrlPath, http::StatusCode, response::IntoResponse, routing::get, Router};
    use tempfile::tempdir;

    const PAGE: &str = r#"<html><body>
<h1 class="ltx_title ltx_title_document">Served Paper</h1>
<div class="ltx_abstract"><p class="ltx_p">An abstract long enough to keep.</p></div>
<section class="ltx_section"><h2 class="ltx_title">1 Intro</h2>
<div class="ltx_para"><p class="ltx_p">The introduction paragraph text.</p></div></section>
</body></html>"#;

    struct Unavailable;

    #[async_trait]
    impl TextGenerator for Unavailable {
        async fn generate(&self, _request: GenerateRequest<'_>) -> Result<String, LlmError> {
            Err(LlmError::Transport("offline".into()))
        }

        async fn health(&self) -> bool {
            false
        }
    }

    async fn serve() -> String {
        let app = Router::new().route(
            "/html/:id",
            get(|UrlPath(id): UrlPath<String>| async move {
                match id.as_str() {
                    "boom" => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
                    "empty" => "<html><body></body></html>".into_response(),
                    "missing" => StatusCode::NOT_FOUND.into_response(),
                    _ => PAGE.into_response(),
                }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn build_pipeline(base: &str, cache_dir: &std::path::Path) -> PaperPipeline {
        let cache = AnnotationCache::new(cache_dir);
        let orchestrator = AnnotationOrchestrator::new(
            Arc::new(Unavailable),
            cache.clone(),
            Arc::new(CategoryTaxonomy::default()),
            &LlmConfig::base_default(),
            AnnotateOptions::default(),
        );
        let fetcher = PageFetcher::new(
            "papertrail-test",
            Duration::from_secs(5),
            FetchPolicy {
                max_retries: 0,
                rate_limit_backoff: Duration::from_millis(1),
                retry_backoff: Duration::from_millis(1),
            },
        )
        .unwrap();
        PaperPipeline::new(
            fetcher,
            DocumentExtractor::new(base),
            cache,
            Arc::new(orchestrator),
            PipelineOptions {
                site_base_url: base.to_string(),
                request_delay: Duration::ZERO,
                concurrency: 2,
            },
        )
    }

    fn ids(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_extract_paper_uses_cache() {
        let base = serve().await;
        let dir = tempdir().unwrap();
        let pipeline = build_pipeline(&base, dir.path());

        let doc = pipeline.extract_paper("2401.00001", false).await.unwrap();
        assert_eq!(doc.title, "Served Paper");
        assert!(pipeline
            .cache()
            .contains(CachePartition::Documents, "2401.00001")
            .await);

        // A pipeline pointed at a dead server still answers from cache.
        let offline = build_pipeline("http://127.0.0.1:9", dir.path());
        let cached = offline.extract_paper("2401.00001", false).await.unwrap();
        assert_eq!(cached, doc);
        assert!(offline.extract_paper("2401.00001", true).await.is_err());
    }

    #[tokio::test]
    async fn test_batch_isolates_failures() {
        let base = serve().await;
        let dir = tempdir().unwrap();
        let pipeline = build_pipeline(&base, dir.path());
        let (tx, mut rx) = mpsc::channel(100);
        let collector = tokio::spawn(async move {
            let mut failed = Vec::new();
            while let Some(event) = rx.recv().await {
                if let PipelineEvent::PaperFailed { paper_id, .. } = event {
                    failed.push(paper_id);
                }
            }
            failed.sort();
            failed
        });

        let result = pipeline
            .extract_papers(&ids(&["a", "boom", "b", "missing", "empty"]), false, tx)
            .await;
        assert_eq!(
            result.stats,
            PipelineStats {
                extracted: 2,
                failed: 3,
                annotated: 0
            }
        );
        let got: Vec<&str> = result.documents.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(got, vec!["a", "b"]);
        assert_eq!(collector.await.unwrap(), vec!["boom", "empty", "missing"]);
    }

    #[tokio::test]
    async fn test_process_writes_partial_records() {
        let base = serve().await;
        let dir = tempdir().unwrap();
        let pipeline = build_pipeline(&base, dir.path());
        let (tx, rx) = mpsc::channel(100);
        drop(rx);

        let result = pipeline.process_papers(&ids(&["p1"]), false, tx).await;
        assert_eq!(result.stats.annotated, 1);
        let record = &result.records[0];
        assert!(record.completed().is_empty());
        let stored: AnnotatedPaper = pipeline
            .cache()
            .read(CachePartition::Records, "p1")
            .await
            .unwrap();
        assert_eq!(stored.paper_id, "p1");
        assert_eq!(stored.content.title, "Served Paper");
    }
}
