//! Fixed research-area taxonomy used for classification.

use serde::{Deserialize, Serialize};

/// Category id every unknown classification folds into.
pub const FALLBACK_CATEGORY: &str = "other";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: String,
    pub name: String,
    pub name_zh: String,
    #[serde(default)]
    pub keywords: Vec<String>,
}

impl Category {
    fn new(id: &str, name: &str, name_zh: &str, keywords: &[&str]) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            name_zh: name_zh.to_string(),
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
        }
    }
}

/// Immutable, ordered set of categories.
///
/// Always contains [`FALLBACK_CATEGORY`]; constructors add it when missing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryTaxonomy {
    categories: Vec<Category>,
}

impl Default for CategoryTaxonomy {
    fn default() -> Self {
        Self::from_categories(vec![
            Category::new(
                "language_models",
                "Language Models",
                "语言模型",
                &["llm", "gpt", "bert", "transformer", "language model", "nlp"],
            ),
            Category::new(
                "computer_vision",
                "Computer Vision",
                "计算机视觉",
                &["vision", "image", "video", "cnn", "detection", "segmentation"],
            ),
            Category::new(
                "multimodal",
                "Multimodal",
                "多模态",
                &["multimodal", "vision-language", "clip", "dalle", "text-to-image"],
            ),
            Category::new(
                "reinforcement_learning",
                "Reinforcement Learning",
                "强化学习",
                &["reinforcement", "rl", "policy", "reward", "agent"],
            ),
            Category::new(
                "generative_models",
                "Generative Models",
                "生成模型",
                &["diffusion", "gan", "vae", "generation", "synthesis"],
            ),
            Category::new(
                "alignment",
                "Alignment & Safety",
                "对齐与安全",
                &["alignment", "rlhf", "safety", "harmless", "helpful"],
            ),
            Category::new(
                "efficiency",
                "Efficiency",
                "效率优化",
                &["quantization", "pruning", "distillation", "efficient", "compression"],
            ),
            Category::new(
                "robotics",
                "Robotics",
                "机器人",
                &["robot", "manipulation", "navigation", "embodied"],
            ),
            Category::new(
                "speech_audio",
                "Speech & Audio",
                "语音与音频",
                &["speech", "audio", "tts", "asr", "voice"],
            ),
            Category::new(
                "graphs_knowledge",
                "Graphs & Knowledge",
                "图与知识",
                &["graph", "knowledge", "reasoning", "retrieval", "rag"],
            ),
            Category::new(FALLBACK_CATEGORY, "Other", "其他", &[]),
        ])
    }
}

impl CategoryTaxonomy {
    /// Build a taxonomy, appending the fallback category if absent.
    pub fn from_categories(mut categories: Vec<Category>) -> Self {
        if !categories.iter().any(|c| c.id == FALLBACK_CATEGORY) {
            categories.push(Category::new(FALLBACK_CATEGORY, "Other", "其他", &[]));
        }
        Self { categories }
    }

    pub fn get(&self, id: &str) -> Option<&Category> {
        self.categories.iter().find(|c| c.id == id)
    }

    /// Look up `id`, folding anything unknown into the fallback category.
    pub fn resolve(&self, id: &str) -> &Category {
        let id = id.trim();
        self.get(id)
            .or_else(|| self.get(FALLBACK_CATEGORY))
            .unwrap_or(&self.categories[self.categories.len() - 1])
    }

    pub fn iter(&self) -> impl Iterator<Item = &Category> {
        self.categories.iter()
    }

    pub fn len(&self) -> usize {
        self.categories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }

    /// One `- id: Name (名称)` line per category, for prompts.
    pub fn describe(&self) -> String {
        self.categories
            .iter()
            .map(|c| format!("- {}: {} ({})", c.id, c.name, c.name_zh))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_taxonomy() {
        let taxonomy = CategoryTaxonomy::default();
        assert_eq!(taxonomy.len(), 11);
        assert_eq!(taxonomy.resolve("alignment").name, "Alignment & Safety");
    }

    #[test]
    fn test_unknown_ids_fold_to_other() {
        let taxonomy = CategoryTaxonomy::default();
        assert_eq!(taxonomy.resolve("banana").id, "other");
        assert_eq!(taxonomy.resolve("").id, "other");
        assert_eq!(taxonomy.resolve(" robotics ").id, "robotics");
    }

    #[test]
    fn test_custom_taxonomy_always_has_fallback() {
        let taxonomy = CategoryTaxonomy::from_categories(vec![Category::new(
            "robotics",
            "Robotics",
            "机器人",
            &[],
        )]);
        assert_eq!(taxonomy.len(), 2);
        assert_eq!(taxonomy.resolve("nope").id, FALLBACK_CATEGORY);
    }

    #[test]
    fn test_describe_lists_every_category() {
        let text = CategoryTaxonomy::default().describe();
        assert!(text.starts_with("- language_models: Language Models (语言模型)"));
        assert_eq!(text.lines().count(), 11);
    }
}
