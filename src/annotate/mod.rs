//! LLM annotation of extracted papers.
//!
//! Every kind follows the same path: cache lookup, prompt, generate, parse,
//! validate, cache write. Failures are logged and counted, never raised.

pub mod prompts;
mod stats;
mod types;

use std::sync::Arc;

use chrono::Utc;
use futures::future::join_all;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::cache::AnnotationCache;
use crate::extract::text::truncate_text;
use crate::llm::{parse_json_object, GenerateRequest, LlmConfig, TextGenerator};
use crate::models::{
    AnnotatedPaper, AnnotationKind, CategoryTaxonomy, ClassificationResult, CommentsResult,
    Document, Importance, KeywordsResult, LabelsResult, ParagraphComment, SectionParagraph,
};

pub use stats::{AnnotationStats, KindStats, StatsSnapshot};
pub use types::{AnnotationFailure, DEFAULT_CONFIDENCE};

/// Keyword entries kept per language.
pub const MAX_KEYWORDS: usize = 10;
/// Label entries kept per language.
pub const MAX_LABELS: usize = 5;
/// Characters of a paragraph stored alongside its comment.
pub const PARAGRAPH_EXCERPT_CHARS: usize = 100;

/// Tunables for an orchestrator run.
#[derive(Debug, Clone, PartialEq)]
pub struct AnnotateOptions {
    /// Longest paragraphs commented per paper.
    pub max_paragraphs: usize,
    /// Generate calls in flight for one paper's comments.
    pub concurrency: usize,
    /// Characters of full text used when a paper has no abstract.
    pub excerpt_chars: usize,
}

impl Default for AnnotateOptions {
    fn default() -> Self {
        Self {
            max_paragraphs: 20,
            concurrency: 3,
            excerpt_chars: prompts::ABSTRACT_CHARS,
        }
    }
}

/// Runs classification, keywords, labels and paragraph comments for papers.
pub struct AnnotationOrchestrator {
    generator: Arc<dyn TextGenerator>,
    cache: AnnotationCache,
    taxonomy: Arc<CategoryTaxonomy>,
    model_small: String,
    model_large: String,
    max_tokens: u32,
    options: AnnotateOptions,
    stats: AnnotationStats,
}

impl AnnotationOrchestrator {
    pub fn new(
        generator: Arc<dyn TextGenerator>,
        cache: AnnotationCache,
        taxonomy: Arc<CategoryTaxonomy>,
        llm: &LlmConfig,
        options: AnnotateOptions,
    ) -> Self {
        Self {
            generator,
            cache,
            taxonomy,
            model_small: llm.model_small.clone(),
            model_large: llm.model_large.clone(),
            max_tokens: llm.max_tokens,
            options,
            stats: AnnotationStats::default(),
        }
    }

    pub fn options(&self) -> &AnnotateOptions {
        &self.options
    }

    pub fn cache(&self) -> &AnnotationCache {
        &self.cache
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Whether the model backend answers.
    pub async fn backend_available(&self) -> bool {
        self.generator.health().await
    }

    fn model_for(&self, kind: AnnotationKind) -> &str {
        match kind {
            AnnotationKind::Comments => &self.model_large,
            _ => &self.model_small,
        }
    }

    /// Generate and parse one response.
    async fn request(
        &self,
        kind: AnnotationKind,
        prompt: String,
    ) -> Result<(Map<String, Value>, String), AnnotationFailure> {
        let text = self
            .generator
            .generate(GenerateRequest {
                model: self.model_for(kind),
                prompt,
                system: Some(prompts::system_prompt(kind)),
                temperature: prompts::temperature(kind),
                max_tokens: self.max_tokens,
            })
            .await?;
        if text.trim().is_empty() {
            return Err(AnnotationFailure::EmptyResponse);
        }
        match parse_json_object(&text) {
            Some(obj) => Ok((obj, text)),
            None => Err(AnnotationFailure::Parse {
                excerpt: truncate_text(text.trim(), 100, "..."),
            }),
        }
    }

    /// Shared cache-check / generate / cache-write path for document-level kinds.
    async fn annotate<T, F>(
        &self,
        kind: AnnotationKind,
        paper_id: &str,
        force: bool,
        prompt: String,
        build: F,
    ) -> Option<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce(&Map<String, Value>, String) -> T,
    {
        if !force {
            if let Some(cached) = self.cache.read::<T>(kind, paper_id).await {
                debug!("Using cached {} for {}", kind, paper_id);
                return Some(cached);
            }
        }

        let (obj, raw) = match self.request(kind, prompt).await {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!("{} failed for {}: {}", kind, paper_id, e);
                self.stats.record_failure(kind);
                return None;
            }
        };

        let result = build(&obj, raw);
        if let Err(e) = self.cache.write(kind, paper_id, &result).await {
            warn!("Could not cache {} for {}: {}", kind, paper_id, e);
        }
        self.stats.record_success(kind);
        Some(result)
    }

    /// Classify a paper into the taxonomy.
    pub async fn classify(
        &self,
        paper_id: &str,
        title: &str,
        abstract_text: &str,
        force: bool,
    ) -> Option<ClassificationResult> {
        let prompt = prompts::classify(&self.taxonomy, title, abstract_text);
        self.annotate(
            AnnotationKind::Classification,
            paper_id,
            force,
            prompt,
            |obj, raw| {
                let category = self.taxonomy.resolve(&types::category_id(obj));
                ClassificationResult {
                    paper_id: paper_id.to_string(),
                    category: category.id.clone(),
                    category_name: category.name.clone(),
                    category_name_zh: category.name_zh.clone(),
                    confidence: types::confidence(obj),
                    reasoning: types::optional_string(obj, "reasoning"),
                    raw_response: raw,
                    generated_at: Utc::now(),
                }
            },
        )
        .await
    }

    pub async fn extract_keywords(
        &self,
        paper_id: &str,
        title: &str,
        abstract_text: &str,
        force: bool,
    ) -> Option<KeywordsResult> {
        let prompt = prompts::keywords(title, abstract_text);
        self.annotate(
            AnnotationKind::Keywords,
            paper_id,
            force,
            prompt,
            |obj, raw| KeywordsResult {
                paper_id: paper_id.to_string(),
                keywords: types::string_list(obj, "keywords", MAX_KEYWORDS),
                keywords_zh: types::string_list(obj, "keywords_zh", MAX_KEYWORDS),
                raw_response: raw,
                generated_at: Utc::now(),
            },
        )
        .await
    }

    /// Labels build on keywords; the first few are included in the prompt.
    pub async fn extract_labels(
        &self,
        paper_id: &str,
        title: &str,
        abstract_text: &str,
        keywords: &[String],
        force: bool,
    ) -> Option<LabelsResult> {
        let prompt = prompts::labels(title, abstract_text, keywords);
        self.annotate(
            AnnotationKind::Labels,
            paper_id,
            force,
            prompt,
            |obj, raw| LabelsResult {
                paper_id: paper_id.to_string(),
                labels: types::string_list(obj, "labels", MAX_LABELS),
                labels_zh: types::string_list(obj, "labels_zh", MAX_LABELS),
                raw_response: raw,
                generated_at: Utc::now(),
            },
        )
        .await
    }

    async fn comment_on(
        &self,
        title: &str,
        paragraph: &SectionParagraph<'_>,
        index: usize,
    ) -> Result<ParagraphComment, AnnotationFailure> {
        let prompt = prompts::comment(title, paragraph.section_title, paragraph.text, index);
        let (obj, raw) = self.request(AnnotationKind::Comments, prompt).await?;
        Ok(ParagraphComment {
            paragraph_index: index,
            paragraph_text: truncate_text(paragraph.text, PARAGRAPH_EXCERPT_CHARS, "..."),
            section_title: paragraph.section_title.to_string(),
            key_points: types::string_list(&obj, "key_points", usize::MAX),
            reading_notes: types::string_field(&obj, "reading_notes"),
            importance: Importance::parse(&types::string_field(&obj, "importance")),
            raw_response: raw,
        })
    }

    /// Reading notes for the longest paragraphs of a paper.
    ///
    /// Paragraphs are ranked by length and the top `max_paragraphs` are
    /// commented concurrently, at most `concurrency` at a time. Paragraphs
    /// whose generation fails are dropped; the result exists if at least one
    /// comment was produced.
    pub async fn generate_comments(&self, doc: &Document, force: bool) -> Option<CommentsResult> {
        let kind = AnnotationKind::Comments;
        if !force {
            if let Some(cached) = self.cache.read::<CommentsResult>(kind, &doc.id).await {
                debug!("Using cached {} for {}", kind, doc.id);
                return Some(cached);
            }
        }

        let selected = select_paragraphs(doc, self.options.max_paragraphs);
        if selected.is_empty() {
            warn!("{} failed for {}: {}", kind, doc.id, AnnotationFailure::NoInput);
            self.stats.record_failure(kind);
            return None;
        }

        let semaphore = Semaphore::new(self.options.concurrency.max(1));
        let tasks = selected.iter().enumerate().map(|(index, paragraph)| {
            let semaphore = &semaphore;
            async move {
                let _permit = semaphore.acquire().await.ok()?;
                match self.comment_on(&doc.title, paragraph, index).await {
                    Ok(comment) => Some(comment),
                    Err(e) => {
                        debug!("Paragraph {} of {} dropped: {}", index, doc.id, e);
                        None
                    }
                }
            }
        });
        let comments: Vec<ParagraphComment> = join_all(tasks).await.into_iter().flatten().collect();

        if comments.is_empty() {
            warn!("{} failed for {}: no paragraph produced a comment", kind, doc.id);
            self.stats.record_failure(kind);
            return None;
        }

        let high = comments
            .iter()
            .filter(|c| c.importance == Importance::High)
            .count();
        let result = CommentsResult {
            paper_id: doc.id.clone(),
            summary: format!(
                "Analyzed {} key paragraphs, {} of high importance",
                comments.len(),
                high
            ),
            comments,
            generated_at: Utc::now(),
        };
        if let Err(e) = self.cache.write(kind, &doc.id, &result).await {
            warn!("Could not cache {} for {}: {}", kind, doc.id, e);
        }
        self.stats.record_success(kind);
        Some(result)
    }

    /// Run all four annotations and merge them with the document.
    ///
    /// Kinds that fail are left empty; the record is produced regardless.
    pub async fn annotate_document(&self, doc: Document, force: bool) -> AnnotatedPaper {
        let mut paper = AnnotatedPaper::new(doc);
        let content = &paper.content;
        info!("Annotating {}: {}", content.id, content.title);

        let (classification, keywords, labels) =
            match content.abstract_or_excerpt(self.options.excerpt_chars) {
                Some(abstract_text) => {
                    let classification = self
                        .classify(&content.id, &content.title, &abstract_text, force)
                        .await;
                    let keywords = self
                        .extract_keywords(&content.id, &content.title, &abstract_text, force)
                        .await;
                    let keyword_list = keywords
                        .as_ref()
                        .map(|k| k.keywords.clone())
                        .unwrap_or_default();
                    let labels = self
                        .extract_labels(
                            &content.id,
                            &content.title,
                            &abstract_text,
                            &keyword_list,
                            force,
                        )
                        .await;
                    (classification, keywords, labels)
                }
                None => {
                    warn!("{} has no abstract or text; skipping summary annotations", content.id);
                    for kind in [
                        AnnotationKind::Classification,
                        AnnotationKind::Keywords,
                        AnnotationKind::Labels,
                    ] {
                        self.stats.record_failure(kind);
                    }
                    (None, None, None)
                }
            };
        let comments = self.generate_comments(content, force).await;

        paper.classification = classification;
        paper.keywords = keywords;
        paper.labels = labels;
        paper.comments = comments;
        paper.updated_at = Utc::now();
        paper
    }
}

/// The `max` longest paragraphs, longest first. Ties keep document order.
pub fn select_paragraphs(doc: &Document, max: usize) -> Vec<SectionParagraph<'_>> {
    let mut paragraphs = doc.sections().paragraphs();
    paragraphs.sort_by_key(|p| std::cmp::Reverse(p.text.chars().count()));
    paragraphs.truncate(max);
    paragraphs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::LlmError;
    use crate::models::SectionTree;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;
    use tempfile::tempdir;

    /// Replies by matching the system prompt; counts calls and peak concurrency.
    #[derive(Default)]
    struct FakeGenerator {
        replies: Mutex<Vec<(&'static str, String)>>,
        calls: AtomicUsize,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
        delay_ms: u64,
    }

    impl FakeGenerator {
        fn reply(self, system: &'static str, body: &str) -> Self {
            self.replies.lock().unwrap().push((system, body.to_string()));
            self
        }
    }

    #[async_trait]
    impl TextGenerator for FakeGenerator {
        async fn generate(&self, request: GenerateRequest<'_>) -> Result<String, LlmError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            if self.delay_ms > 0 {
                tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            let system = request.system.unwrap_or_default();
            let reply = self
                .replies
                .lock()
                .unwrap()
                .iter()
                .find(|(s, _)| *s == system)
                .map(|(_, body)| body.clone());
            reply.ok_or(LlmError::Server {
                status: 500,
                body: "no reply configured".into(),
            })
        }

        async fn health(&self) -> bool {
            true
        }
    }

    fn orchestrator(fake: Arc<FakeGenerator>, dir: &std::path::Path) -> AnnotationOrchestrator {
        AnnotationOrchestrator::new(
            fake,
            AnnotationCache::new(dir),
            Arc::new(CategoryTaxonomy::default()),
            &LlmConfig::base_default(),
            AnnotateOptions::default(),
        )
    }

    fn paper_with_paragraphs(count: usize) -> Document {
        let mut doc = Document::new("2401.00001", "Paper");
        doc.abstract_text = Some("An abstract.".into());
        // Paragraph i has length 20 + i, alternating between two sections.
        let mut in_a = Vec::new();
        let mut in_b = Vec::new();
        for i in 0..count {
            let text = format!("{:0>width$}", i, width = 20 + i);
            if i % 2 == 0 {
                in_a.push(text);
            } else {
                in_b.push(text);
            }
        }
        let mut tree = SectionTree::new();
        tree.push(None, "A", 2, in_a);
        tree.push(None, "B", 2, in_b);
        doc.set_sections(tree);
        doc
    }

    #[tokio::test]
    async fn test_unknown_category_folds_to_other() {
        let dir = tempdir().unwrap();
        let fake = Arc::new(FakeGenerator::default().reply(
            prompts::CLASSIFY_SYSTEM,
            r#"{"category": "banana", "confidence": 3.5}"#,
        ));
        let orch = orchestrator(fake, dir.path());

        let result = orch.classify("p1", "T", "A", false).await.unwrap();
        assert_eq!(result.category, "other");
        assert_eq!(result.category_name, "Other");
        assert_eq!(result.confidence, 1.0);
        assert_eq!(orch.stats().classification.success, 1);
    }

    #[tokio::test]
    async fn test_cache_hit_skips_generation() {
        let dir = tempdir().unwrap();
        let fake = Arc::new(FakeGenerator::default().reply(
            prompts::CLASSIFY_SYSTEM,
            "```json\n{\"category\": \"robotics\"}\n```",
        ));
        let orch = orchestrator(fake.clone(), dir.path());

        let first = orch.classify("p1", "T", "A", false).await.unwrap();
        let second = orch.classify("p1", "T", "A", false).await.unwrap();
        assert_eq!(fake.calls.load(Ordering::SeqCst), 1);
        assert_eq!(first, second);
        assert_eq!(second.confidence, DEFAULT_CONFIDENCE);

        orch.classify("p1", "T", "A", true).await.unwrap();
        assert_eq!(fake.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_failures_are_counted_not_raised() {
        let dir = tempdir().unwrap();
        let fake = Arc::new(
            FakeGenerator::default()
                .reply(prompts::KEYWORDS_SYSTEM, "I cannot answer that.")
                .reply(prompts::LABELS_SYSTEM, "   "),
        );
        let orch = orchestrator(fake, dir.path());

        assert!(orch.classify("p", "T", "A", false).await.is_none());
        assert!(orch.extract_keywords("p", "T", "A", false).await.is_none());
        assert!(orch.extract_labels("p", "T", "A", &[], false).await.is_none());
        let stats = orch.stats();
        assert_eq!(stats.classification.failure, 1);
        assert_eq!(stats.keywords.failure, 1);
        assert_eq!(stats.labels.failure, 1);
        assert!(!orch.cache().contains(AnnotationKind::Keywords, "p").await);
    }

    #[tokio::test]
    async fn test_list_caps() {
        let dir = tempdir().unwrap();
        let many: Vec<String> = (0..30).map(|i| format!("\"k{i}\"")).collect();
        let list = many.join(",");
        let fake = Arc::new(
            FakeGenerator::default()
                .reply(
                    prompts::KEYWORDS_SYSTEM,
                    &format!(r#"{{"keywords": [{list}], "keywords_zh": [{list}]}}"#),
                )
                .reply(
                    prompts::LABELS_SYSTEM,
                    &format!(r#"{{"labels": [{list}], "labels_zh": "a, b, c, d, e, f"}}"#),
                ),
        );
        let orch = orchestrator(fake, dir.path());

        let kw = orch.extract_keywords("p", "T", "A", false).await.unwrap();
        assert_eq!(kw.keywords.len(), MAX_KEYWORDS);
        assert_eq!(kw.keywords_zh.len(), MAX_KEYWORDS);
        let labels = orch
            .extract_labels("p", "T", "A", &kw.keywords, false)
            .await
            .unwrap();
        assert_eq!(labels.labels.len(), MAX_LABELS);
        assert_eq!(labels.labels_zh, vec!["a", "b", "c", "d", "e"]);
    }

    #[test]
    fn test_select_paragraphs_takes_longest_first() {
        let doc = paper_with_paragraphs(25);
        let selected = select_paragraphs(&doc, 20);
        assert_eq!(selected.len(), 20);
        let lengths: Vec<usize> = selected.iter().map(|p| p.text.len()).collect();
        let expected: Vec<usize> = (5..25).rev().map(|i| 20 + i).collect();
        assert_eq!(lengths, expected);
        assert_eq!(selected[0].section_title, "A");
        assert_eq!(selected[1].section_title, "B");
    }

    #[tokio::test]
    async fn test_comments_bounded_and_indexed_by_rank() {
        let dir = tempdir().unwrap();
        let fake = Arc::new(FakeGenerator {
            delay_ms: 20,
            ..FakeGenerator::default()
        }
        .reply(
            prompts::COMMENT_SYSTEM,
            r#"{"key_points": ["p"], "reading_notes": "n", "importance": "high"}"#,
        ));
        let orch = orchestrator(fake.clone(), dir.path());
        let doc = paper_with_paragraphs(25);

        let result = orch.generate_comments(&doc, false).await.unwrap();
        assert_eq!(result.comments.len(), 20);
        let indices: Vec<usize> = result.comments.iter().map(|c| c.paragraph_index).collect();
        assert_eq!(indices, (0..20).collect::<Vec<_>>());
        assert_eq!(result.comments[0].paragraph_text.chars().count(), 44);
        assert_eq!(result.summary, "Analyzed 20 key paragraphs, 20 of high importance");
        assert_eq!(fake.calls.load(Ordering::SeqCst), 20);
        let peak = fake.peak.load(Ordering::SeqCst);
        assert!(peak <= 3, "peak concurrency {peak} exceeded the semaphore");
        assert!(peak >= 2);
    }

    #[tokio::test]
    async fn test_annotate_document_keeps_partial_results() {
        let dir = tempdir().unwrap();
        let fake = Arc::new(
            FakeGenerator::default()
                .reply(prompts::CLASSIFY_SYSTEM, r#"{"category": "efficiency"}"#)
                .reply(prompts::KEYWORDS_SYSTEM, r#"{"keywords": ["moe"]}"#),
        );
        let orch = orchestrator(fake, dir.path());

        let paper = orch.annotate_document(paper_with_paragraphs(3), false).await;
        assert_eq!(
            paper.classification.as_ref().map(|c| c.category.as_str()),
            Some("efficiency")
        );
        assert_eq!(paper.keywords.as_ref().unwrap().keywords, vec!["moe"]);
        assert!(paper.labels.is_none());
        assert!(paper.comments.is_none());
        assert_eq!(orch.stats().comments.failure, 1);
    }
}
