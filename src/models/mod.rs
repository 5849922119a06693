//! Data models for papertrail.

mod annotation;
mod category;
mod document;
mod section;

pub use annotation::{
    AnnotatedPaper, AnnotationKind, ClassificationResult, CommentsResult, Importance,
    KeywordsResult, LabelsResult, ParagraphComment,
};
pub use category::{Category, CategoryTaxonomy, FALLBACK_CATEGORY};
pub use document::{Document, Equation, Figure, Table, MATHML_MAX_CHARS};
pub use section::{Section, SectionId, SectionNode, SectionParagraph, SectionTree, ROOT_LEVEL};
