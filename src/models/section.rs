//! Section hierarchy of an extracted paper.
//!
//! Sections live in a flat arena addressed by [`SectionId`]. Every walk over
//! the tree is an explicit stack loop, so deeply nested markup cannot exhaust
//! the call stack. On the wire the tree is a plain nested list of [`Section`].

use serde::{Deserialize, Serialize};

/// Heading level of a top-level section.
pub const ROOT_LEVEL: u8 = 2;

/// Index of a node inside a [`SectionTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SectionId(usize);

impl SectionId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// One node of the arena.
#[derive(Debug, Clone, PartialEq)]
pub struct SectionNode {
    pub title: String,
    pub level: u8,
    pub paragraphs: Vec<String>,
    pub parent: Option<SectionId>,
    pub children: Vec<SectionId>,
}

/// Nested, serializable view of a section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Section {
    pub title: String,
    pub level: u8,
    #[serde(default)]
    pub paragraphs: Vec<String>,
    #[serde(default)]
    pub subsections: Vec<Section>,
}

/// A paragraph together with the section it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct SectionParagraph<'a> {
    pub section_title: &'a str,
    pub text: &'a str,
}

/// Arena-backed section tree.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<Section>", into = "Vec<Section>")]
pub struct SectionTree {
    nodes: Vec<SectionNode>,
    roots: Vec<SectionId>,
}

impl SectionTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a node under `parent` (or as a new root) and return its id.
    pub fn push(
        &mut self,
        parent: Option<SectionId>,
        title: impl Into<String>,
        level: u8,
        paragraphs: Vec<String>,
    ) -> SectionId {
        let id = SectionId(self.nodes.len());
        self.nodes.push(SectionNode {
            title: title.into(),
            level,
            paragraphs,
            parent,
            children: Vec::new(),
        });
        match parent {
            Some(p) => self.nodes[p.0].children.push(id),
            None => self.roots.push(id),
        }
        id
    }

    pub fn get(&self, id: SectionId) -> Option<&SectionNode> {
        self.nodes.get(id.0)
    }

    pub fn roots(&self) -> &[SectionId] {
        &self.roots
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Node ids in document (pre-order) order.
    pub fn preorder(&self) -> Vec<SectionId> {
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut stack: Vec<SectionId> = self.roots.iter().rev().copied().collect();
        while let Some(id) = stack.pop() {
            order.push(id);
            stack.extend(self.nodes[id.0].children.iter().rev().copied());
        }
        order
    }

    /// All section titles in document order.
    pub fn titles(&self) -> Vec<&str> {
        self.preorder()
            .into_iter()
            .map(|id| self.nodes[id.0].title.as_str())
            .collect()
    }

    /// Every paragraph in document order, tagged with its section title.
    pub fn paragraphs(&self) -> Vec<SectionParagraph<'_>> {
        self.preorder()
            .into_iter()
            .flat_map(|id| {
                let node = &self.nodes[id.0];
                node.paragraphs.iter().map(move |p| SectionParagraph {
                    section_title: node.title.as_str(),
                    text: p.as_str(),
                })
            })
            .collect()
    }

    /// Render the tree as markdown-ish plain text.
    ///
    /// Each section contributes `"#" * level + " " + title`, a blank line,
    /// then every paragraph followed by a blank line.
    pub fn render_text(&self) -> String {
        let mut lines: Vec<&str> = Vec::new();
        let mut headings: Vec<String> = Vec::with_capacity(self.nodes.len());
        let order = self.preorder();
        for id in &order {
            let node = &self.nodes[id.0];
            headings.push(format!(
                "{} {}",
                "#".repeat(node.level as usize),
                node.title
            ));
        }
        for (heading, id) in headings.iter().zip(&order) {
            lines.push(heading);
            lines.push("");
            for p in &self.nodes[id.0].paragraphs {
                lines.push(p);
                lines.push("");
            }
        }
        lines.join("\n")
    }

    /// Build the nested view without recursion.
    fn to_nested(&self) -> Vec<Section> {
        // Post-order: children are always finished before their parent.
        let mut built: Vec<Option<Section>> = vec![None; self.nodes.len()];
        let mut stack: Vec<(SectionId, bool)> =
            self.roots.iter().rev().map(|&id| (id, false)).collect();
        while let Some((id, expanded)) = stack.pop() {
            let node = &self.nodes[id.0];
            if expanded {
                let subsections = node
                    .children
                    .iter()
                    .filter_map(|c| built[c.0].take())
                    .collect();
                built[id.0] = Some(Section {
                    title: node.title.clone(),
                    level: node.level,
                    paragraphs: node.paragraphs.clone(),
                    subsections,
                });
            } else {
                stack.push((id, true));
                stack.extend(node.children.iter().rev().map(|&c| (c, false)));
            }
        }
        self.roots
            .iter()
            .filter_map(|r| built[r.0].take())
            .collect()
    }
}

impl From<Vec<Section>> for SectionTree {
    fn from(sections: Vec<Section>) -> Self {
        let mut tree = SectionTree::new();
        let mut stack: Vec<(Option<SectionId>, Section)> =
            sections.into_iter().rev().map(|s| (None, s)).collect();
        while let Some((parent, section)) = stack.pop() {
            let Section {
                title,
                level,
                paragraphs,
                subsections,
            } = section;
            let id = tree.push(parent, title, level, paragraphs);
            stack.extend(subsections.into_iter().rev().map(|s| (Some(id), s)));
        }
        tree
    }
}

impl From<SectionTree> for Vec<Section> {
    fn from(tree: SectionTree) -> Self {
        tree.to_nested()
    }
}
