//! Prompt templates for each annotation kind.
//!
//! Templates use `{placeholder}` markers. [`fill`] substitutes them in a single
//! pass, so values containing `{...}` are never rescanned.

use crate::extract::text::truncate_text;
use crate::models::{AnnotationKind, CategoryTaxonomy};

pub const CLASSIFY_SYSTEM: &str =
    "You are an academic paper classifier. Respond only with valid JSON. /no_think";
pub const KEYWORDS_SYSTEM: &str =
    "You are a keyword extractor for academic papers. Respond only with valid JSON. /no_think";
pub const LABELS_SYSTEM: &str =
    "You are a semantic label generator. Respond only with valid JSON. /no_think";
pub const COMMENT_SYSTEM: &str = "You are an expert academic paper reader. Provide insightful reading notes. Respond only with valid JSON. /no_think";

/// Abstract characters sent with classify and keyword prompts.
pub const ABSTRACT_CHARS: usize = 500;
/// Abstract characters sent with label prompts.
pub const LABELS_ABSTRACT_CHARS: usize = 400;
/// Paragraph characters sent with comment prompts.
pub const PARAGRAPH_CHARS: usize = 800;
/// Keywords fed into the label prompt.
pub const LABEL_PROMPT_KEYWORDS: usize = 5;

const CLASSIFY_TEMPLATE: &str = r#"Classify this academic paper into ONE category.

CATEGORIES:
{categories}

PAPER:
Title: {title}
Abstract: {abstract}

Respond with ONLY a JSON object:
{"category": "category_id", "confidence": 0.0-1.0, "reasoning": "brief reason"}"#;

const KEYWORDS_TEMPLATE: &str = r#"Extract key technical terms and concepts from this academic paper.

PAPER:
Title: {title}
Abstract: {abstract}

Respond with ONLY a JSON object:
{"keywords": ["keyword1", "keyword2", ...], "keywords_zh": ["关键词1", "关键词2", ...]}

Extract 5-10 specific technical keywords. Include both English and Chinese versions."#;

const LABELS_TEMPLATE: &str = r#"Generate semantic labels/tags for this academic paper.

PAPER:
Title: {title}
Abstract: {abstract}
Keywords: {keywords}

Generate 3-5 high-level semantic labels that describe:
- Research area
- Methodology
- Application domain
- Contribution type

Respond with ONLY a JSON object:
{"labels": ["label1", "label2", ...], "labels_zh": ["标签1", "标签2", ...]}"#;

const COMMENT_TEMPLATE: &str = r#"As an expert reader, provide reading notes for this paragraph from an academic paper.

PAPER: {title}
SECTION: {section}
PARAGRAPH {index}:
{paragraph}

Provide:
1. Key points (2-3 bullet points)
2. Reading notes (1-2 sentences about what readers should focus on)
3. Importance level (low/medium/high)

Respond with ONLY a JSON object:
{
  "key_points": ["point1", "point2"],
  "reading_notes": "explanation",
  "importance": "medium"
}"#;

/// Sampling temperature for each kind.
pub fn temperature(kind: AnnotationKind) -> f32 {
    match kind {
        AnnotationKind::Classification => 0.2,
        AnnotationKind::Keywords | AnnotationKind::Labels => 0.3,
        AnnotationKind::Comments => 0.4,
    }
}

pub fn system_prompt(kind: AnnotationKind) -> &'static str {
    match kind {
        AnnotationKind::Classification => CLASSIFY_SYSTEM,
        AnnotationKind::Keywords => KEYWORDS_SYSTEM,
        AnnotationKind::Labels => LABELS_SYSTEM,
        AnnotationKind::Comments => COMMENT_SYSTEM,
    }
}

/// Replace each `{name}` in `template` with its value. Unknown markers and
/// literal braces are copied through.
pub fn fill(template: &str, values: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let marker = &rest[start + 1..];
        let hit = values.iter().find_map(|(name, value)| {
            marker
                .strip_prefix(name)
                .and_then(|after| after.strip_prefix('}'))
                .map(|after| (*value, after))
        });
        match hit {
            Some((value, after)) => {
                out.push_str(value);
                rest = after;
            }
            None => {
                out.push('{');
                rest = marker;
            }
        }
    }
    out.push_str(rest);
    out
}

pub fn classify(taxonomy: &CategoryTaxonomy, title: &str, abstract_text: &str) -> String {
    fill(
        CLASSIFY_TEMPLATE,
        &[
            ("categories", taxonomy.describe().as_str()),
            ("title", title),
            ("abstract", truncate_text(abstract_text, ABSTRACT_CHARS, "...").as_str()),
        ],
    )
}

pub fn keywords(title: &str, abstract_text: &str) -> String {
    fill(
        KEYWORDS_TEMPLATE,
        &[
            ("title", title),
            ("abstract", truncate_text(abstract_text, ABSTRACT_CHARS, "...").as_str()),
        ],
    )
}

pub fn labels(title: &str, abstract_text: &str, keywords: &[String]) -> String {
    let keywords: Vec<&str> = keywords
        .iter()
        .take(LABEL_PROMPT_KEYWORDS)
        .map(String::as_str)
        .collect();
    fill(
        LABELS_TEMPLATE,
        &[
            ("title", title),
            (
                "abstract",
                truncate_text(abstract_text, LABELS_ABSTRACT_CHARS, "...").as_str(),
            ),
            ("keywords", keywords.join(", ").as_str()),
        ],
    )
}

pub fn comment(title: &str, section_title: &str, paragraph: &str, index: usize) -> String {
    fill(
        COMMENT_TEMPLATE,
        &[
            ("title", title),
            ("section", section_title),
            ("index", index.to_string().as_str()),
            ("paragraph", truncate_text(paragraph, PARAGRAPH_CHARS, "...").as_str()),
        ],
    )
}
