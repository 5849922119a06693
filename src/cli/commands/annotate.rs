//! Annotation commands.

use console::style;
use tokio::sync::mpsc;

use crate::cache::CachePartition;
use crate::config::{Config, Settings};
use crate::models::Document;
use crate::pipeline::{PaperPipeline, PipelineEvent};

use crate::cli::helpers::{spawn_progress, truncate};

/// Bail out early when the model backend is off or unreachable.
async fn require_backend(pipeline: &PaperPipeline, config: &Config) -> anyhow::Result<()> {
    if !config.llm.enabled {
        println!(
            "{} LLM annotation is disabled in configuration",
            style("!").yellow()
        );
        println!("  Set llm.enabled = true or LLM_ENABLED=1");
        anyhow::bail!("LLM annotation disabled");
    }
    if !pipeline.orchestrator().backend_available().await {
        println!(
            "{} LLM service not available at {}",
            style("✗").red(),
            config.llm.endpoint
        );
        println!("  Make sure Ollama is running: ollama serve");
        anyhow::bail!("LLM service unavailable");
    }
    println!(
        "{} Connected to LLM at {} (models: {}, {})",
        style("✓").green(),
        config.llm.endpoint,
        config.llm.model_small,
        config.llm.model_large
    );
    Ok(())
}

/// Annotate papers whose documents are already cached.
pub async fn cmd_annotate(
    settings: &Settings,
    config: &Config,
    ids: &[String],
    force: bool,
) -> anyhow::Result<()> {
    settings.ensure_directories()?;
    let pipeline = PaperPipeline::from_settings(settings, config)?;
    require_backend(&pipeline, config).await?;

    let mut missing = 0;
    for id in ids {
        let Some(doc) = pipeline
            .cache()
            .read::<Document>(CachePartition::Documents, id)
            .await
        else {
            println!(
                "{} {} not extracted; run `papertrail extract {}` first",
                style("✗").red(),
                id,
                id
            );
            missing += 1;
            continue;
        };

        println!(
            "{} Annotating {}: {}",
            style("→").cyan(),
            id,
            truncate(&doc.title, 60)
        );
        let record = pipeline.annotate(doc, force).await;

        if let Some(ref c) = record.classification {
            println!(
                "  category: {} ({}) {:.2}",
                c.category_name, c.category_name_zh, c.confidence
            );
        }
        if let Some(ref k) = record.keywords {
            println!("  keywords: {}", k.keywords.join(", "));
        }
        if let Some(ref l) = record.labels {
            println!("  labels: {}", l.labels.join(", "));
        }
        if let Some(ref c) = record.comments {
            println!("  comments: {}", c.summary);
        }
    }

    println!(
        "{} {}",
        style("✓").green(),
        pipeline.orchestrator().stats()
    );
    if missing > 0 {
        anyhow::bail!("{} paper(s) had no cached document", missing);
    }
    Ok(())
}

/// Extract and annotate papers, writing merged records.
pub async fn cmd_process(
    settings: &Settings,
    config: &Config,
    ids: &[String],
    force: bool,
) -> anyhow::Result<()> {
    settings.ensure_directories()?;
    let pipeline = PaperPipeline::from_settings(settings, config)?;
    require_backend(&pipeline, config).await?;

    let (event_tx, event_rx) = mpsc::channel::<PipelineEvent>(100);
    let event_handler = spawn_progress(event_rx, true);
    let result = pipeline.process_papers(ids, force, event_tx).await;
    let _ = event_handler.await;

    println!(
        "  {} {}",
        style("→").dim(),
        pipeline.orchestrator().stats()
    );
    println!(
        "  {} Records written to {}",
        style("→").dim(),
        settings.cache_dir.join("records").display()
    );
    if result.stats.failed > 0 {
        anyhow::bail!("{} paper(s) failed", result.stats.failed);
    }
    Ok(())
}
