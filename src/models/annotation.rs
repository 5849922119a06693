//! LLM annotation results and the merged per-paper record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use super::document::Document;

/// Which annotation a result (or a cache entry) belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnnotationKind {
    Classification,
    Keywords,
    Labels,
    Comments,
}

impl AnnotationKind {
    pub const ALL: [AnnotationKind; 4] = [
        AnnotationKind::Classification,
        AnnotationKind::Keywords,
        AnnotationKind::Labels,
        AnnotationKind::Comments,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AnnotationKind::Classification => "classification",
            AnnotationKind::Keywords => "keywords",
            AnnotationKind::Labels => "labels",
            AnnotationKind::Comments => "comments",
        }
    }
}

impl std::fmt::Display for AnnotationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub paper_id: String,
    pub category: String,
    pub category_name: String,
    pub category_name_zh: String,
    /// Always within `[0, 1]`.
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
    #[serde(default)]
    pub raw_response: String,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeywordsResult {
    pub paper_id: String,
    pub keywords: Vec<String>,
    #[serde(default)]
    pub keywords_zh: Vec<String>,
    #[serde(default)]
    pub raw_response: String,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelsResult {
    pub paper_id: String,
    pub labels: Vec<String>,
    #[serde(default)]
    pub labels_zh: Vec<String>,
    #[serde(default)]
    pub raw_response: String,
    pub generated_at: DateTime<Utc>,
}

/// How much a paragraph matters for understanding the paper.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Importance {
    Low,
    #[default]
    Medium,
    High,
}

impl Importance {
    /// Lenient parse; anything unrecognised is `Medium`.
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Importance::Low,
            "high" => Importance::High,
            _ => Importance::Medium,
        }
    }
}

impl<'de> Deserialize<'de> for Importance {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(Importance::parse(&s))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParagraphComment {
    /// Position of the paragraph within the selected (length-ordered) batch.
    pub paragraph_index: usize,
    /// Paragraph excerpt, at most 100 characters.
    pub paragraph_text: String,
    #[serde(default)]
    pub section_title: String,
    #[serde(default)]
    pub key_points: Vec<String>,
    #[serde(default)]
    pub reading_notes: String,
    #[serde(default)]
    pub importance: Importance,
    #[serde(default)]
    pub raw_response: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommentsResult {
    pub paper_id: String,
    pub comments: Vec<ParagraphComment>,
    #[serde(default)]
    pub summary: String,
    pub generated_at: DateTime<Utc>,
}

impl CommentsResult {
    pub fn high_importance_count(&self) -> usize {
        self.comments
            .iter()
            .filter(|c| c.importance == Importance::High)
            .count()
    }
}

/// Extracted content merged with every annotation that succeeded.
///
/// This is the record handed to downstream sync.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotatedPaper {
    pub paper_id: String,
    pub title: String,
    pub authors: Vec<String>,
    #[serde(rename = "abstract")]
    pub abstract_text: Option<String>,
    pub content: Document,
    pub classification: Option<ClassificationResult>,
    pub keywords: Option<KeywordsResult>,
    pub labels: Option<LabelsResult>,
    pub comments: Option<CommentsResult>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AnnotatedPaper {
    /// Wrap a document with no annotations yet.
    pub fn new(content: Document) -> Self {
        let now = Utc::now();
        Self {
            paper_id: content.id.clone(),
            title: content.title.clone(),
            authors: content.authors.clone(),
            abstract_text: content.abstract_text.clone(),
            content,
            classification: None,
            keywords: None,
            labels: None,
            comments: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Kinds that produced a result.
    pub fn completed(&self) -> Vec<AnnotationKind> {
        let mut kinds = Vec::new();
        if self.classification.is_some() {
            kinds.push(AnnotationKind::Classification);
        }
        if self.keywords.is_some() {
            kinds.push(AnnotationKind::Keywords);
        }
        if self.labels.is_some() {
            kinds.push(AnnotationKind::Labels);
        }
        if self.comments.is_some() {
            kinds.push(AnnotationKind::Comments);
        }
        kinds
    }

    pub fn is_complete(&self) -> bool {
        self.completed().len() == AnnotationKind::ALL.len()
    }
}
