//! CLI parser and dispatch to command modules.

mod annotate;
mod extract;
mod info;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::{load_settings_with_options, LoadOptions};

#[derive(Parser)]
#[command(name = "papertrail")]
#[command(about = "Extract and annotate arXiv papers from ar5iv HTML")]
#[command(version)]
pub struct Cli {
    /// Config file path (overrides auto-discovery)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Data directory (overrides config file)
    #[arg(long, global = true, env = "PAPERTRAIL_DATA")]
    data: Option<PathBuf>,

    /// Resolve relative paths from current working directory instead of config file location
    #[arg(long, global = true)]
    cwd: bool,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch and extract papers into the document cache
    Extract {
        /// arXiv ids (e.g. 2401.00001)
        #[arg(required = true)]
        ids: Vec<String>,
        /// Extract a saved HTML file instead of fetching (single id only)
        #[arg(long)]
        html: Option<PathBuf>,
        /// Ignore cached documents
        #[arg(short, long)]
        force: bool,
        /// Papers fetched at once
        #[arg(long)]
        concurrency: Option<usize>,
    },

    /// Annotate already-extracted papers
    Annotate {
        #[arg(required = true)]
        ids: Vec<String>,
        /// Ignore cached annotations
        #[arg(short, long)]
        force: bool,
        /// Longest paragraphs to comment on
        #[arg(long)]
        max_paragraphs: Option<usize>,
        /// Comment requests in flight per paper
        #[arg(long)]
        concurrency: Option<usize>,
    },

    /// Extract and annotate papers, writing merged records
    Process {
        #[arg(required = true)]
        ids: Vec<String>,
        /// Ignore all cached results
        #[arg(short, long)]
        force: bool,
        #[arg(long)]
        max_paragraphs: Option<usize>,
        /// Papers in flight, and comment requests per paper
        #[arg(long)]
        concurrency: Option<usize>,
    },

    /// Show what is cached for a paper
    Show {
        id: String,
        /// Print the cached JSON instead of a summary
        #[arg(long)]
        json: bool,
    },

    /// Check that the Ollama backend is reachable
    Health,

    /// List the classification categories
    Categories,
}

/// Run the CLI.
pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let options = LoadOptions {
        config_path: cli.config,
        use_cwd: cli.cwd,
        data: cli.data,
    };
    let (mut settings, config) = load_settings_with_options(options).await;

    match cli.command {
        Commands::Extract {
            ids,
            html,
            force,
            concurrency,
        } => {
            if let Some(n) = concurrency {
                settings.concurrency = n.max(1);
            }
            match html {
                Some(path) => extract::cmd_extract_file(&settings, &config, &ids, &path).await,
                None => extract::cmd_extract(&settings, &config, &ids, force).await,
            }
        }
        Commands::Annotate {
            ids,
            force,
            max_paragraphs,
            concurrency,
        } => {
            if let Some(n) = max_paragraphs {
                settings.max_paragraphs = n;
            }
            if let Some(n) = concurrency {
                settings.concurrency = n.max(1);
            }
            annotate::cmd_annotate(&settings, &config, &ids, force).await
        }
        Commands::Process {
            ids,
            force,
            max_paragraphs,
            concurrency,
        } => {
            if let Some(n) = max_paragraphs {
                settings.max_paragraphs = n;
            }
            if let Some(n) = concurrency {
                settings.concurrency = n.max(1);
            }
            annotate::cmd_process(&settings, &config, &ids, force).await
        }
        Commands::Show { id, json } => info::cmd_show(&settings, &id, json).await,
        Commands::Health => info::cmd_health(&config).await,
        Commands::Categories => info::cmd_categories(&config),
    }
}
