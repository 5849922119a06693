//! Extraction commands.

use std::path::Path;

use console::style;
use tokio::sync::mpsc;

use crate::config::{Config, Settings};
use crate::pipeline::{PaperPipeline, PipelineEvent};

use crate::cli::helpers::{spawn_progress, truncate};

/// Fetch and extract papers.
pub async fn cmd_extract(
    settings: &Settings,
    config: &Config,
    ids: &[String],
    force: bool,
) -> anyhow::Result<()> {
    settings.ensure_directories()?;
    let pipeline = PaperPipeline::from_settings(settings, config)?;

    println!(
        "{} Extracting {} paper(s) from {}",
        style("→").cyan(),
        ids.len(),
        settings.site_base_url
    );

    let (event_tx, event_rx) = mpsc::channel::<PipelineEvent>(100);
    let event_handler = spawn_progress(event_rx, false);
    let result = pipeline.extract_papers(ids, force, event_tx).await;
    let _ = event_handler.await;

    println!(
        "  {} Documents cached in {}",
        style("→").dim(),
        settings.cache_dir.join("documents").display()
    );
    if result.stats.failed > 0 {
        anyhow::bail!("{} paper(s) failed to extract", result.stats.failed);
    }
    Ok(())
}

/// Extract a local HTML file under the given id.
pub async fn cmd_extract_file(
    settings: &Settings,
    config: &Config,
    ids: &[String],
    path: &Path,
) -> anyhow::Result<()> {
    let [id] = ids else {
        anyhow::bail!("--html takes exactly one paper id, got {}", ids.len());
    };
    settings.ensure_directories()?;
    let pipeline = PaperPipeline::from_settings(settings, config)?;

    let html = tokio::fs::read_to_string(path).await?;
    let doc = pipeline.extract_html(&html, id).await?;

    println!(
        "{} {} {}",
        style("✓").green(),
        doc.id,
        truncate(&doc.title, 60)
    );
    println!(
        "  {} sections, {} paragraphs, {} figures, {} tables, {} equations, {} references",
        doc.sections().len(),
        doc.sections().paragraphs().len(),
        doc.figures.len(),
        doc.tables.len(),
        doc.equations.len(),
        doc.references.len()
    );
    Ok(())
}
