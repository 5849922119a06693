//! Extracted paper content.

use serde::{Deserialize, Serialize};

use super::section::SectionTree;

/// A figure with its resolved image source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Figure {
    pub src: String,
    #[serde(default)]
    pub alt: String,
    #[serde(default)]
    pub caption: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table {
    #[serde(default)]
    pub caption: String,
    #[serde(default)]
    pub headers: Vec<String>,
    #[serde(default)]
    pub rows: Vec<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Equation {
    #[serde(default)]
    pub latex: String,
    /// Serialized MathML, at most [`MATHML_MAX_CHARS`] characters.
    #[serde(default)]
    pub mathml: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

pub const MATHML_MAX_CHARS: usize = 1000;

/// Structured content of one paper.
///
/// `full_text` is always derived from `sections`; both are private so the
/// two cannot drift apart. Deserialization recomputes the text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "DocumentRecord")]
pub struct Document {
    pub id: String,
    pub title: String,
    pub authors: Vec<String>,
    pub affiliations: Vec<String>,
    #[serde(rename = "abstract")]
    pub abstract_text: Option<String>,
    sections: SectionTree,
    pub figures: Vec<Figure>,
    pub tables: Vec<Table>,
    pub equations: Vec<Equation>,
    pub references: Vec<String>,
    full_text: String,
    /// SHA-256 of the HTML this document was extracted from.
    #[serde(default)]
    pub source_sha256: String,
}

/// Wire form of [`Document`]; any stored `full_text` is ignored.
#[derive(Deserialize)]
struct DocumentRecord {
    id: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    authors: Vec<String>,
    #[serde(default)]
    affiliations: Vec<String>,
    #[serde(default, rename = "abstract")]
    abstract_text: Option<String>,
    #[serde(default)]
    sections: SectionTree,
    #[serde(default)]
    figures: Vec<Figure>,
    #[serde(default)]
    tables: Vec<Table>,
    #[serde(default)]
    equations: Vec<Equation>,
    #[serde(default)]
    references: Vec<String>,
    #[serde(default)]
    source_sha256: String,
}

impl From<DocumentRecord> for Document {
    fn from(r: DocumentRecord) -> Self {
        let mut doc = Document::new(r.id, r.title);
        doc.authors = r.authors;
        doc.affiliations = r.affiliations;
        doc.abstract_text = r.abstract_text;
        doc.figures = r.figures;
        doc.tables = r.tables;
        doc.equations = r.equations;
        doc.references = r.references;
        doc.source_sha256 = r.source_sha256;
        doc.set_sections(r.sections);
        doc
    }
}

impl Document {
    /// Create an empty document.
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            authors: Vec::new(),
            affiliations: Vec::new(),
            abstract_text: None,
            sections: SectionTree::new(),
            figures: Vec::new(),
            tables: Vec::new(),
            equations: Vec::new(),
            references: Vec::new(),
            full_text: String::new(),
            source_sha256: String::new(),
        }
    }

    pub fn sections(&self) -> &SectionTree {
        &self.sections
    }

    pub fn full_text(&self) -> &str {
        &self.full_text
    }

    /// Replace the section tree and rebuild the full text.
    pub fn set_sections(&mut self, sections: SectionTree) {
        self.full_text = sections.render_text();
        self.sections = sections;
    }

    /// Abstract text, or the head of the full text when the page had none.
    pub fn abstract_or_excerpt(&self, max_chars: usize) -> Option<String> {
        match self.abstract_text.as_deref().map(str::trim) {
            Some(a) if !a.is_empty() => Some(a.to_string()),
            _ if !self.full_text.trim().is_empty() => {
                Some(self.full_text.trim().chars().take(max_chars).collect())
            }
            _ => None,
        }
    }
}
