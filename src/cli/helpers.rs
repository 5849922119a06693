//! Shared helpers for CLI commands.

use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::extract::text::truncate_text;
use crate::pipeline::PipelineEvent;

/// Truncate for single-line display.
pub fn truncate(s: &str, max_chars: usize) -> String {
    truncate_text(s, max_chars, "...")
}

fn progress_bar(total: usize, verb: &str) -> ProgressBar {
    let progress = ProgressBar::new(total as u64);
    if let Ok(bar_style) =
        ProgressStyle::default_bar().template("{spinner:.green} [{bar:30.cyan/blue}] {pos}/{len} {wide_msg}")
    {
        progress.set_style(bar_style.progress_chars("█▓░"));
    }
    progress.set_message(format!("{}...", verb));
    progress
}

/// Drive a progress bar from pipeline events until the sender side closes.
pub fn spawn_progress(
    mut events: mpsc::Receiver<PipelineEvent>,
    annotating: bool,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut progress: Option<ProgressBar> = None;
        while let Some(event) = events.recv().await {
            match event {
                PipelineEvent::Started { total } => {
                    let verb = if annotating { "Processing" } else { "Extracting" };
                    progress = Some(progress_bar(total, verb));
                }
                PipelineEvent::PaperExtracted { paper_id, title } => {
                    if let Some(ref progress) = progress {
                        if annotating {
                            progress.set_message(format!("{}: {}", paper_id, truncate(&title, 40)));
                        } else {
                            progress.println(format!(
                                "{} {} {}",
                                style("✓").green(),
                                paper_id,
                                truncate(&title, 60)
                            ));
                            progress.inc(1);
                        }
                    }
                }
                PipelineEvent::PaperAnnotated {
                    paper_id,
                    completed,
                } => {
                    if let Some(ref progress) = progress {
                        let mark = if completed == 4 {
                            style("✓").green()
                        } else {
                            style("!").yellow()
                        };
                        progress.println(format!(
                            "{} {} ({}/4 annotations)",
                            mark, paper_id, completed
                        ));
                        progress.inc(1);
                    }
                }
                PipelineEvent::PaperFailed { paper_id, error } => {
                    if let Some(ref progress) = progress {
                        progress.println(format!("{} {}: {}", style("✗").red(), paper_id, error));
                        progress.inc(1);
                    }
                }
                PipelineEvent::Complete { stats } => {
                    if let Some(progress) = progress.take() {
                        progress.finish_and_clear();
                    }
                    if annotating {
                        println!(
                            "{} Done: {} extracted, {} annotated, {} failed",
                            style("✓").green(),
                            stats.extracted,
                            stats.annotated,
                            stats.failed
                        );
                    } else {
                        println!(
                            "{} Done: {} extracted, {} failed",
                            style("✓").green(),
                            stats.extracted,
                            stats.failed
                        );
                    }
                }
            }
        }
    })
}
