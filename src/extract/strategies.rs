//! Selector strategies for LaTeXML/ar5iv markup.
//!
//! Each field has an ordered list of pure functions; [`first_match`] and
//! [`first_match_in`] run them in order and keep the first `Some`.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};

use super::text::{clean_text, element_text};

/// One way of pulling a field out of a whole page.
pub type DocumentStrategy<T> = fn(&Html) -> Option<T>;

/// One way of pulling a field out of a single container element.
pub type ElementStrategy<T> = fn(ElementRef<'_>) -> Option<T>;

/// Apply page strategies in order; the first one that yields a value wins.
pub fn first_match<T>(html: &Html, strategies: &[DocumentStrategy<T>]) -> Option<T> {
    strategies.iter().find_map(|strategy| strategy(html))
}

/// Apply element strategies in order; the first one that yields a value wins.
pub fn first_match_in<T>(element: ElementRef<'_>, strategies: &[ElementStrategy<T>]) -> Option<T> {
    strategies.iter().find_map(|strategy| strategy(element))
}

fn selector(css: &str) -> Selector {
    Selector::parse(css).unwrap_or_else(|e| panic!("invalid built-in selector {css:?}: {e}"))
}

static TITLE_HEADING: LazyLock<Selector> = LazyLock::new(|| selector("h1.ltx_title"));
static PAGE_TITLE: LazyLock<Selector> = LazyLock::new(|| selector("title"));
static AUTHOR: LazyLock<Selector> = LazyLock::new(|| selector(".ltx_author"));
static PERSON_NAME: LazyLock<Selector> = LazyLock::new(|| selector(".ltx_personname"));
static CONTACT: LazyLock<Selector> = LazyLock::new(|| selector(".ltx_contact"));
static ABSTRACT: LazyLock<Selector> = LazyLock::new(|| selector(".ltx_abstract"));
static LTX_TITLE: LazyLock<Selector> = LazyLock::new(|| selector(".ltx_title"));
static LTX_P: LazyLock<Selector> = LazyLock::new(|| selector(".ltx_p"));
static PARAGRAPH: LazyLock<Selector> = LazyLock::new(|| selector("p.ltx_p"));
static BIBITEM: LazyLock<Selector> = LazyLock::new(|| selector(".ltx_bibitem"));
pub(super) static TOP_SECTION: LazyLock<Selector> =
    LazyLock::new(|| selector("section.ltx_section"));
pub(super) static FIGURE: LazyLock<Selector> = LazyLock::new(|| selector("figure.ltx_figure"));
pub(super) static IMG: LazyLock<Selector> = LazyLock::new(|| selector("img"));
pub(super) static FIGCAPTION: LazyLock<Selector> = LazyLock::new(|| selector("figcaption"));
pub(super) static TABLE: LazyLock<Selector> = LazyLock::new(|| selector("table.ltx_tabular"));
pub(super) static THEAD_CELL: LazyLock<Selector> =
    LazyLock::new(|| selector("thead th, thead td"));
pub(super) static TBODY: LazyLock<Selector> = LazyLock::new(|| selector("tbody"));
pub(super) static ROW: LazyLock<Selector> = LazyLock::new(|| selector("tr"));
pub(super) static CELL: LazyLock<Selector> = LazyLock::new(|| selector("td"));
pub(super) static EQUATION: LazyLock<Selector> =
    LazyLock::new(|| selector(".ltx_equation, .ltx_equationgroup"));
pub(super) static MATH: LazyLock<Selector> = LazyLock::new(|| selector("math"));
pub(super) static EQUATION_TAG: LazyLock<Selector> = LazyLock::new(|| selector(".ltx_tag"));

static SITE_SUFFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\s*-\s*ar5iv.*$").unwrap());
static REFERENCE_NUMBER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\[\d+\]\s*").unwrap());
pub(super) static NON_PROSE_TITLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^(references|bibliography|appendix)").unwrap());
pub(super) static FIGURE_LABEL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^S\d+\.F\d+$").unwrap());
pub(super) static TABLE_LABEL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^S\d+\.T\d+$").unwrap());

/// Minimum length (in characters) of a paragraph worth keeping.
pub const MIN_PARAGRAPH_CHARS: usize = 10;

pub const TITLE_STRATEGIES: &[DocumentStrategy<String>] = &[title_from_heading, title_from_page];
pub const AUTHOR_STRATEGIES: &[DocumentStrategy<Vec<String>>] =
    &[authors_from_author_blocks, authors_from_person_names];
pub const AFFILIATION_STRATEGIES: &[DocumentStrategy<Vec<String>>] =
    &[affiliations_from_contacts];
pub const ABSTRACT_STRATEGIES: &[DocumentStrategy<String>] =
    &[abstract_from_paragraphs, abstract_from_container];
pub const PARAGRAPH_STRATEGIES: &[ElementStrategy<Vec<String>>] =
    &[paragraphs_direct, paragraphs_in_para_blocks];

fn non_empty(text: String) -> Option<String> {
    (!text.is_empty()).then_some(text)
}

fn non_empty_list(list: Vec<String>) -> Option<Vec<String>> {
    (!list.is_empty()).then_some(list)
}

pub fn title_from_heading(html: &Html) -> Option<String> {
    html.select(&TITLE_HEADING)
        .next()
        .map(element_text)
        .and_then(non_empty)
}

pub fn title_from_page(html: &Html) -> Option<String> {
    let raw: String = html.select(&PAGE_TITLE).next()?.text().collect();
    non_empty(clean_text(&SITE_SUFFIX.replace(&raw, "")))
}

fn names(html: &Html, selector: &Selector) -> Option<Vec<String>> {
    non_empty_list(
        html.select(selector)
            .map(element_text)
            .filter(|name| name.chars().count() > 1)
            .collect(),
    )
}

pub fn authors_from_author_blocks(html: &Html) -> Option<Vec<String>> {
    names(html, &AUTHOR)
}

pub fn authors_from_person_names(html: &Html) -> Option<Vec<String>> {
    names(html, &PERSON_NAME)
}

pub fn affiliations_from_contacts(html: &Html) -> Option<Vec<String>> {
    non_empty_list(
        html.select(&CONTACT)
            .map(element_text)
            .filter(|text| !text.is_empty() && !text.contains('@'))
            .collect(),
    )
}

/// Text of `element`, skipping any subtree matched by `exclude`.
fn text_excluding(element: ElementRef<'_>, exclude: &Selector) -> String {
    let skipped: HashSet<_> = element.select(exclude).map(|e| e.id()).collect();
    let mut out = String::new();
    for node in element.descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let hidden = node
            .ancestors()
            .take_while(|a| a.id() != element.id())
            .any(|a| skipped.contains(&a.id()));
        if !hidden {
            out.push_str(text);
        }
    }
    out
}

pub fn abstract_from_paragraphs(html: &Html) -> Option<String> {
    let container = html.select(&ABSTRACT).next()?;
    let titles: HashSet<_> = container.select(&LTX_TITLE).map(|e| e.id()).collect();
    let parts: Vec<String> = container
        .select(&LTX_P)
        .filter(|p| !p.ancestors().any(|a| titles.contains(&a.id())))
        .map(|p| p.text().collect::<String>())
        .collect();
    if parts.is_empty() {
        return None;
    }
    non_empty(clean_text(&parts.join(" ")))
}

pub fn abstract_from_container(html: &Html) -> Option<String> {
    let container = html.select(&ABSTRACT).next()?;
    non_empty(clean_text(&text_excluding(container, &LTX_TITLE)))
}

/// Bibliography entries with their leading `[n]` marker removed.
pub fn references(html: &Html) -> Vec<String> {
    html.select(&BIBITEM)
        .map(element_text)
        .filter(|text| !text.is_empty())
        .map(|text| REFERENCE_NUMBER.replace(&text, "").into_owned())
        .collect()
}

fn has_class(element: &ElementRef<'_>, class: &str) -> bool {
    element.value().classes().any(|c| c == class)
}

fn keep_paragraph(text: String) -> Option<String> {
    (text.chars().count() >= MIN_PARAGRAPH_CHARS).then_some(text)
}

/// `p.ltx_p` elements that are direct children of the container.
pub fn paragraphs_direct(container: ElementRef<'_>) -> Option<Vec<String>> {
    non_empty_list(
        container
            .children()
            .filter_map(ElementRef::wrap)
            .filter(|e| e.value().name() == "p" && has_class(e, "ltx_p"))
            .map(element_text)
            .filter_map(keep_paragraph)
            .collect(),
    )
}

/// `p.ltx_p` elements nested in direct `.ltx_para` children.
pub fn paragraphs_in_para_blocks(container: ElementRef<'_>) -> Option<Vec<String>> {
    non_empty_list(
        container
            .children()
            .filter_map(ElementRef::wrap)
            .filter(|e| has_class(e, "ltx_para"))
            .flat_map(|para| para.select(&PARAGRAPH).collect::<Vec<_>>())
            .map(element_text)
            .filter_map(keep_paragraph)
            .collect(),
    )
}

/// True when the nearest `<section>` above `element` is `container`.
fn owned_by(element: &ElementRef<'_>, container: ElementRef<'_>) -> bool {
    element
        .ancestors()
        .filter_map(ElementRef::wrap)
        .find(|a| a.value().name() == "section")
        .is_some_and(|a| a.id() == container.id())
}

/// Heading text for a section container at `level`.
///
/// Prefers an `h{level}.ltx_title`, then any `.ltx_title`. Headings of nested
/// subsections never count.
pub fn section_title(container: ElementRef<'_>, level: u8) -> Option<String> {
    let heading = format!("h{level}");
    let own_titles: Vec<ElementRef<'_>> = container
        .select(&LTX_TITLE)
        .filter(|e| owned_by(e, container))
        .collect();
    own_titles
        .iter()
        .find(|e| e.value().name() == heading)
        .or_else(|| own_titles.first())
        .copied()
        .map(element_text)
        .and_then(non_empty)
}

/// Container class holding subsections one rank below `level`.
pub fn child_section_class(level: u8) -> Option<&'static str> {
    match level {
        2 => Some("ltx_subsection"),
        3 => Some("ltx_subsubsection"),
        4 => Some("ltx_paragraph"),
        _ => None,
    }
}

/// Subsection containers whose nearest enclosing `<section>` is `container`.
pub fn child_sections<'a>(container: ElementRef<'a>, level: u8) -> Vec<ElementRef<'a>> {
    let Some(class) = child_section_class(level) else {
        return Vec::new();
    };
    container
        .descendants()
        .skip(1)
        .filter_map(ElementRef::wrap)
        .filter(|e| e.value().name() == "section" && has_class(e, class))
        .filter(|e| owned_by(e, container))
        .collect()
}

/// Caption text and anchor id of the nearest enclosing element with `class`.
pub fn enclosing_caption<'a>(
    element: ElementRef<'a>,
    class: &str,
) -> (Option<ElementRef<'a>>, String) {
    let enclosing = element
        .ancestors()
        .filter_map(ElementRef::wrap)
        .find(|a| has_class(a, class));
    let caption = enclosing
        .and_then(|e| e.select(&FIGCAPTION).next())
        .map(element_text)
        .unwrap_or_default();
    (enclosing, caption)
}
