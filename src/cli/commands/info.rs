//! Read-only commands: show, health, categories.

use console::style;

use crate::cache::{AnnotationCache, CachePartition};
use crate::config::{Config, Settings};
use crate::llm::{LlmClient, TextGenerator};
use crate::models::{AnnotatedPaper, Document, Importance};

use crate::cli::helpers::truncate;

/// Print the merged record for a paper, or its document when not yet annotated.
pub async fn cmd_show(settings: &Settings, id: &str, json: bool) -> anyhow::Result<()> {
    let cache = AnnotationCache::new(&settings.cache_dir);

    if let Some(record) = cache
        .read::<AnnotatedPaper>(CachePartition::Records, id)
        .await
    {
        if json {
            println!("{}", serde_json::to_string_pretty(&record)?);
            return Ok(());
        }
        print_document(&record.content);
        println!();
        match record.classification {
            Some(c) => println!(
                "{} {} ({}) confidence {:.2}",
                style("category:").bold(),
                c.category_name,
                c.category_name_zh,
                c.confidence
            ),
            None => println!("{} -", style("category:").bold()),
        }
        if let Some(k) = record.keywords {
            println!("{} {}", style("keywords:").bold(), k.keywords.join(", "));
            if !k.keywords_zh.is_empty() {
                println!("          {}", k.keywords_zh.join(", "));
            }
        }
        if let Some(l) = record.labels {
            println!("{} {}", style("labels:").bold(), l.labels.join(", "));
        }
        if let Some(c) = record.comments {
            println!("{} {}", style("comments:").bold(), c.summary);
            for comment in c.comments.iter().filter(|c| c.importance == Importance::High) {
                println!(
                    "  {} [{}] {}",
                    style("★").yellow(),
                    comment.section_title,
                    comment.reading_notes
                );
            }
        }
        return Ok(());
    }

    match cache.read::<Document>(CachePartition::Documents, id).await {
        Some(doc) if json => println!("{}", serde_json::to_string_pretty(&doc)?),
        Some(doc) => {
            print_document(&doc);
            println!("  {} not annotated yet", style("→").dim());
        }
        None => {
            println!("{} Nothing cached for {}", style("✗").red(), id);
            anyhow::bail!("no cached document for {}", id);
        }
    }
    Ok(())
}

fn print_document(doc: &Document) {
    println!("{} {}", style(&doc.id).cyan(), style(&doc.title).bold());
    if !doc.authors.is_empty() {
        println!("  {}", truncate(&doc.authors.join(", "), 100));
    }
    if let Some(ref a) = doc.abstract_text {
        println!("  {}", truncate(a, 200));
    }
    for title in doc.sections().titles() {
        println!("  - {}", title);
    }
    println!(
        "  {} figures, {} tables, {} equations, {} references",
        doc.figures.len(),
        doc.tables.len(),
        doc.equations.len(),
        doc.references.len()
    );
}

/// Check the Ollama backend.
pub async fn cmd_health(config: &Config) -> anyhow::Result<()> {
    let llm = &config.llm;
    let client = LlmClient::new(llm.clone())?;
    if !llm.enabled {
        println!("{} LLM annotation is disabled", style("!").yellow());
        return Ok(());
    }
    if client.health().await {
        println!("{} Ollama reachable at {}", style("✓").green(), llm.endpoint);
        println!("  small model: {}", llm.model_small);
        println!("  large model: {}", llm.model_large);
        Ok(())
    } else {
        println!("{} Ollama not reachable at {}", style("✗").red(), llm.endpoint);
        println!("  Make sure Ollama is running: ollama serve");
        anyhow::bail!("LLM service unavailable")
    }
}

/// List the taxonomy used for classification.
pub fn cmd_categories(config: &Config) -> anyhow::Result<()> {
    for category in config.taxonomy().iter() {
        println!(
            "{} {} ({})",
            style(&category.id).cyan(),
            category.name,
            category.name_zh
        );
        if !category.keywords.is_empty() {
            println!("    {}", style(category.keywords.join(", ")).dim());
        }
    }
    Ok(())
}
