//! Structured extraction of ar5iv (LaTeXML) paper pages.

mod strategies;
pub mod text;

use scraper::{ElementRef, Html};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::debug;

use crate::models::{
    Document, Equation, Figure, SectionId, SectionTree, Table, MATHML_MAX_CHARS, ROOT_LEVEL,
};

use strategies::{
    child_sections, enclosing_caption, first_match, first_match_in, section_title,
    ABSTRACT_STRATEGIES, AFFILIATION_STRATEGIES, AUTHOR_STRATEGIES, CELL, EQUATION,
    EQUATION_TAG, FIGCAPTION, FIGURE, FIGURE_LABEL, IMG, MATH, NON_PROSE_TITLE,
    PARAGRAPH_STRATEGIES, ROW, TABLE, TABLE_LABEL, TBODY, THEAD_CELL, TITLE_STRATEGIES,
    TOP_SECTION,
};
pub use strategies::{DocumentStrategy, ElementStrategy, MIN_PARAGRAPH_CHARS};
use text::{element_text, take_chars};

/// Title used when no strategy finds one.
pub const UNKNOWN_TITLE: &str = "Unknown Title";

/// Why a page could not be turned into a [`Document`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ExtractionError {
    #[error("empty HTML for {0}")]
    EmptyInput(String),
    #[error("no paper content found for {0}")]
    NoContent(String),
}

/// Turns one ar5iv HTML page into a [`Document`].
#[derive(Debug, Clone)]
pub struct DocumentExtractor {
    site_base_url: String,
}

impl Default for DocumentExtractor {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_SITE_BASE_URL)
    }
}

impl DocumentExtractor {
    pub fn new(site_base_url: impl Into<String>) -> Self {
        Self {
            site_base_url: site_base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Extract a document. All-or-nothing: either a full `Document` or an error.
    pub fn extract(&self, html: &str, id: &str) -> Result<Document, ExtractionError> {
        if html.trim().is_empty() {
            return Err(ExtractionError::EmptyInput(id.to_string()));
        }

        let page = Html::parse_document(html);

        let title = first_match(&page, TITLE_STRATEGIES);
        let abstract_text = first_match(&page, ABSTRACT_STRATEGIES);
        let sections = parse_sections(&page);
        let references = strategies::references(&page);

        if title.is_none() && abstract_text.is_none() && sections.is_empty() && references.is_empty()
        {
            return Err(ExtractionError::NoContent(id.to_string()));
        }

        let mut doc = Document::new(id, title.unwrap_or_else(|| UNKNOWN_TITLE.to_string()));
        doc.authors = first_match(&page, AUTHOR_STRATEGIES).unwrap_or_default();
        doc.affiliations = first_match(&page, AFFILIATION_STRATEGIES).unwrap_or_default();
        doc.abstract_text = abstract_text;
        doc.figures = self.figures(&page, id);
        doc.tables = tables(&page);
        doc.equations = equations(&page);
        doc.references = references;
        doc.source_sha256 = hex::encode(Sha256::digest(html.as_bytes()));
        doc.set_sections(sections);

        debug!(
            "Extracted {}: {} sections, {} figures, {} tables, {} equations, {} references",
            id,
            doc.sections().len(),
            doc.figures.len(),
            doc.tables.len(),
            doc.equations.len(),
            doc.references.len()
        );

        Ok(doc)
    }

    /// Base URL that relative figure sources are resolved against.
    fn page_base(&self, id: &str) -> String {
        format!("{}/html/{}/", self.site_base_url, id)
    }

    fn figures(&self, page: &Html, id: &str) -> Vec<Figure> {
        let base = self.page_base(id);
        page.select(&FIGURE)
            .filter_map(|fig| {
                let img = fig.select(&IMG).next()?;
                let src = img.value().attr("src").unwrap_or_default();
                if src.is_empty() {
                    return None;
                }
                let label = fig
                    .value()
                    .id()
                    .filter(|id| FIGURE_LABEL.is_match(id))
                    .map(str::to_string);
                Some(Figure {
                    src: resolve_url(&base, src),
                    alt: img.value().attr("alt").unwrap_or_default().to_string(),
                    caption: fig
                        .select(&FIGCAPTION)
                        .next()
                        .map(element_text)
                        .unwrap_or_default(),
                    label,
                })
            })
            .collect()
    }
}

/// Resolve a possibly-relative URL against `base_url`.
pub fn resolve_url(base_url: &str, path: &str) -> String {
    if path.starts_with("http://") || path.starts_with("https://") {
        return path.to_string();
    }

    if let Ok(base) = url::Url::parse(base_url) {
        if let Ok(resolved) = base.join(path) {
            return resolved.to_string();
        }
    }

    let base = base_url.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    format!("{}/{}", base, path)
}

/// Build the section tree with an explicit work stack.
fn parse_sections(page: &Html) -> SectionTree {
    let mut tree = SectionTree::new();
    let mut stack: Vec<(ElementRef<'_>, u8, Option<SectionId>)> = page
        .select(&TOP_SECTION)
        .map(|el| (el, ROOT_LEVEL, None))
        .collect();
    stack.reverse();

    while let Some((container, level, parent)) = stack.pop() {
        let Some(title) = section_title(container, level) else {
            continue;
        };
        if NON_PROSE_TITLE.is_match(&title) {
            debug!("Skipping non-prose section: {}", title);
            continue;
        }
        let paragraphs = first_match_in(container, PARAGRAPH_STRATEGIES).unwrap_or_default();
        let id = tree.push(parent, title, level, paragraphs);
        let children = child_sections(container, level);
        stack.extend(
            children
                .into_iter()
                .rev()
                .map(|child| (child, level + 1, Some(id))),
        );
    }

    tree
}

fn tables(page: &Html) -> Vec<Table> {
    page.select(&TABLE)
        .filter_map(|table| {
            let headers: Vec<String> = table.select(&THEAD_CELL).map(element_text).collect();
            let body = table.select(&TBODY).next().unwrap_or(table);
            let rows: Vec<Vec<String>> = body
                .select(&ROW)
                .map(|tr| tr.select(&CELL).map(element_text).collect::<Vec<_>>())
                .filter(|row| !row.is_empty())
                .collect();
            if headers.is_empty() && rows.is_empty() {
                return None;
            }
            let (enclosing, caption) = enclosing_caption(table, "ltx_table");
            let label = enclosing
                .and_then(|e| e.value().id())
                .filter(|id| TABLE_LABEL.is_match(id))
                .map(str::to_string);
            Some(Table {
                caption,
                headers,
                rows,
                label,
            })
        })
        .collect()
}

fn equations(page: &Html) -> Vec<Equation> {
    page.select(&EQUATION)
        .filter_map(|eq| {
            let math = eq.select(&MATH).next()?;
            let label = eq
                .select(&EQUATION_TAG)
                .next()
                .map(element_text)
                .filter(|t| !t.is_empty());
            Some(Equation {
                latex: math.value().attr("alttext").unwrap_or_default().to_string(),
                mathml: take_chars(&math.html(), MATHML_MAX_CHARS),
                label,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"<!DOCTYPE html>
<html><head><title>[2401.00001] Sparse Mixtures - ar5iv</title></head>
<body><article class="ltx_document">
<h1 class="ltx_title ltx_title_document">Sparse Mixtures of Experts</h1>
<div class="ltx_authors">
  <span class="ltx_creator ltx_role_author"><span class="ltx_personname">Ada Lovelace</span></span>
  <span class="ltx_contact ltx_role_affiliation">Analytical Engine Lab</span>
  <span class="ltx_contact ltx_role_email">ada@example.org</span>
</div>
<div class="ltx_abstract"><h6 class="ltx_title ltx_title_abstract">Abstract</h6>
  <p class="ltx_p">We route tokens to experts.</p>
</div>
<section id="S1" class="ltx_section">
  <h2 class="ltx_title ltx_title_section">1 Introduction</h2>
  <div class="ltx_para"><p class="ltx_p">Mixtures of experts scale model capacity cheaply.</p></div>
  <div class="ltx_para"><p class="ltx_p">tiny</p></div>
  <section id="S1.SS1" class="ltx_subsection">
    <h3 class="ltx_title ltx_title_subsection">1.1 Background</h3>
    <div class="ltx_para"><p class="ltx_p">Gating networks pick a subset of experts.</p></div>
    <section id="S1.SS1.SSS1" class="ltx_subsubsection">
      <h4 class="ltx_title">1.1.1 Routing</h4>
      <div class="ltx_para"><p class="ltx_p">Top-k routing keeps compute constant.</p></div>
    </section>
  </section>
  <section id="S1.SS2" class="ltx_subsection">
    <h3 class="ltx_title ltx_title_subsection">References to prior art</h3>
    <div class="ltx_para"><p class="ltx_p">This subsection must never show up.</p></div>
  </section>
  <figure id="S1.F1" class="ltx_figure"><img src="x1.png" alt="Diagram">
    <figcaption class="ltx_caption">Figure 1: Architecture.</figcaption></figure>
  <figure id="S1.T1" class="ltx_table">
    <figcaption class="ltx_caption">Table 1: Results.</figcaption>
    <table class="ltx_tabular">
      <thead><tr><th>Model</th><th>Acc</th></tr></thead>
      <tbody><tr><td>MoE</td><td>91.2</td></tr></tbody>
    </table>
  </figure>
  <table class="ltx_tabular"><tbody></tbody></table>
  <table id="S1.E1" class="ltx_equation"><tr><td>
    <math alttext="y = Wx" display="block"><mi>y</mi><mo>=</mo><mi>W</mi><mi>x</mi></math>
  </td><td><span class="ltx_tag">(1)</span></td></tr></table>
</section>
<section id="S2" class="ltx_section">
  <h2 class="ltx_title">2 Method</h2>
  <p class="ltx_p">Direct paragraph child of the method section.</p>
  <figure id="S2.F2" class="ltx_figure"><img src="/html/2401.00001/assets/x2.png"></figure>
</section>
<section id="bib" class="ltx_section">
  <h2 class="ltx_title">Bibliography</h2>
  <div class="ltx_para"><p class="ltx_p">Bibliography prose that is not a section.</p></div>
</section>
<section class="ltx_bibliography"><ul>
  <li class="ltx_bibitem">[1] Shazeer et al. Outrageously large neural networks.</li>
</ul></section>
</article></body></html>"#;

    fn extractor() -> DocumentExtractor {
        DocumentExtractor::new("https://ar5iv.labs.arxiv.org")
    }

    #[test]
    fn test_extracts_metadata() {
        let doc = extractor().extract(PAGE, "2401.00001").unwrap();
        assert_eq!(doc.title, "Sparse Mixtures of Experts");
        assert_eq!(doc.authors, vec!["Ada Lovelace"]);
        assert_eq!(doc.affiliations, vec!["Analytical Engine Lab"]);
        assert_eq!(doc.abstract_text.as_deref(), Some("We route tokens to experts."));
        assert_eq!(
            doc.references,
            vec!["Shazeer et al. Outrageously large neural networks."]
        );
        assert_eq!(doc.source_sha256.len(), 64);
    }

    #[test]
    fn test_section_tree_shape() {
        let doc = extractor().extract(PAGE, "2401.00001").unwrap();
        assert_eq!(
            doc.sections().titles(),
            vec!["1 Introduction", "1.1 Background", "1.1.1 Routing", "2 Method"]
        );
        let levels: Vec<u8> = doc
            .sections()
            .preorder()
            .into_iter()
            .map(|id| doc.sections().get(id).unwrap().level)
            .collect();
        assert_eq!(levels, vec![2, 3, 4, 2]);
        let intro = doc.sections().get(doc.sections().roots()[0]).unwrap();
        assert_eq!(
            intro.paragraphs,
            vec!["Mixtures of experts scale model capacity cheaply."]
        );
        let method = doc.sections().get(doc.sections().roots()[1]).unwrap();
        assert_eq!(
            method.paragraphs,
            vec!["Direct paragraph child of the method section."]
        );
    }

    #[test]
    fn test_reference_like_sections_never_reach_full_text() {
        let doc = extractor().extract(PAGE, "2401.00001").unwrap();
        assert!(!doc.full_text().contains("References"));
        assert!(!doc.full_text().contains("Bibliography"));
        assert!(!doc.full_text().contains("must never show up"));
        assert!(doc.full_text().starts_with("## 1 Introduction\n\n"));
        assert!(doc.full_text().contains("#### 1.1.1 Routing"));
    }

    #[test]
    fn test_figures_tables_equations() {
        let doc = extractor().extract(PAGE, "2401.00001").unwrap();
        assert_eq!(doc.figures.len(), 2);
        assert_eq!(
            doc.figures[0].src,
            "https://ar5iv.labs.arxiv.org/html/2401.00001/x1.png"
        );
        assert_eq!(doc.figures[0].label.as_deref(), Some("S1.F1"));
        assert_eq!(doc.figures[0].caption, "Figure 1: Architecture.");
        assert_eq!(
            doc.figures[1].src,
            "https://ar5iv.labs.arxiv.org/html/2401.00001/assets/x2.png"
        );

        assert_eq!(doc.tables.len(), 1);
        assert_eq!(doc.tables[0].headers, vec!["Model", "Acc"]);
        assert_eq!(doc.tables[0].rows, vec![vec!["MoE", "91.2"]]);
        assert_eq!(doc.tables[0].caption, "Table 1: Results.");
        assert_eq!(doc.tables[0].label.as_deref(), Some("S1.T1"));

        assert_eq!(doc.equations.len(), 1);
        assert_eq!(doc.equations[0].latex, "y = Wx");
        assert_eq!(doc.equations[0].label.as_deref(), Some("(1)"));
        assert!(doc.equations[0].mathml.starts_with("<math"));
    }

    #[test]
    fn test_mathml_is_capped() {
        let body = "<mi>x</mi>".repeat(500);
        let html = format!(
            r#"<html><body><h1 class="ltx_title">T</h1><table class="ltx_equation"><tr><td><math alttext="x">{body}</math></td></tr></table></body></html>"#
        );
        let doc = extractor().extract(&html, "1").unwrap();
        assert_eq!(doc.equations[0].mathml.chars().count(), MATHML_MAX_CHARS);
    }

    #[test]
    fn test_extraction_is_idempotent() {
        let a = extractor().extract(PAGE, "2401.00001").unwrap();
        let b = extractor().extract(PAGE, "2401.00001").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_failures() {
        assert_eq!(
            extractor().extract("   ", "x"),
            Err(ExtractionError::EmptyInput("x".into()))
        );
        assert_eq!(
            extractor().extract("<html><body><div>nothing</div></body></html>", "x"),
            Err(ExtractionError::NoContent("x".into()))
        );
    }

    #[test]
    fn test_title_falls_back_to_sentinel() {
        let html = r#"<html><body><div class="ltx_abstract"><p class="ltx_p">Only an abstract.</p></div></body></html>"#;
        let doc = extractor().extract(html, "x").unwrap();
        assert_eq!(doc.title, UNKNOWN_TITLE);
    }

    #[test]
    fn test_resolve_url() {
        assert_eq!(
            resolve_url("https://ar5iv.labs.arxiv.org/html/1/", "/assets/a.png"),
            "https://ar5iv.labs.arxiv.org/assets/a.png"
        );
        assert_eq!(
            resolve_url("https://ar5iv.labs.arxiv.org/html/1/", "https://cdn.example/a.png"),
            "https://cdn.example/a.png"
        );
    }
}
