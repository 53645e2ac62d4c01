use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use coderag::config::{Config, DEFAULT_CONFIG_FILE};
use coderag::embedder::Embedder;
use coderag::embedder::download::download_model_files;
use coderag::embedder::onnx::OnnxEmbedder;
use coderag::progress::{BuildEvent, BuildProgress};
use coderag::repo::{GitCli, RepoAcquirer, read_repo_readme};
use coderag::retriever::{IndexedRepo, Retriever};

#[derive(Parser)]
#[command(name = "coderag")]
#[command(version, about = "Semantic code search over a git repository")]
struct Cli {
    /// Path to the JSON configuration file
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Clone a repository and build (or load) its index
    Index {
        /// Repository URL
        #[arg(value_name = "REPO")]
        repo: String,
    },
    /// Retrieve the chunks most relevant to a question
    Ask {
        /// Repository URL
        #[arg(value_name = "REPO")]
        repo: String,

        /// Question text
        #[arg(value_name = "QUERY", required = true, num_args = 1..)]
        query: Vec<String>,

        /// Number of chunks to return (defaults to search_top_k)
        #[arg(short = 'k', long)]
        top_k: Option<usize>,

        /// Print hits as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print the repository README
    Readme {
        /// Repository URL
        #[arg(value_name = "REPO")]
        repo: String,
    },
}

/// Renders build events on stderr.
struct BarProgress {
    bar: ProgressBar,
}

impl BarProgress {
    fn new() -> Self {
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::default_bar()
                .template("  {msg:>10} {bar:40.cyan/blue} {pos}/{len}")
                .expect("valid template")
                .progress_chars("█▓░"),
        );
        Self { bar }
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl BuildProgress for BarProgress {
    fn report(&self, event: BuildEvent) {
        match event {
            BuildEvent::Scanning => self.bar.set_message("scanning"),
            BuildEvent::Chunking { done, total } => {
                self.bar.set_message("chunking");
                self.bar.set_length(total as u64);
                self.bar.set_position(done as u64);
            }
            BuildEvent::Embedding { done, total } => {
                self.bar.set_message("embedding");
                self.bar.set_length(total as u64);
                self.bar.set_position(done as u64);
            }
            BuildEvent::Persisting => self.bar.set_message("writing"),
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config = Config::load(&cli.config)?;
    config.validate().context("invalid configuration")?;

    match cli.command {
        Commands::Index { repo } => {
            let indexed = open_repo(&config, &repo)?;
            match indexed.report() {
                Some(report) => {
                    println!(
                        "Indexed {} chunks from {} of {} files ({} failed)",
                        report.chunks,
                        report.files_indexed,
                        report.files_seen,
                        report.failed()
                    );
                    for failure in &report.failures {
                        println!("  skipped: {failure}");
                    }
                }
                None => println!(
                    "Index already present: {} chunks",
                    indexed.index().len()
                ),
            }
        }
        Commands::Ask {
            repo,
            query,
            top_k,
            json,
        } => {
            let indexed = open_repo(&config, &repo)?;
            let query = query.join(" ");
            let hits = indexed
                .retrieve_k(&query, top_k.unwrap_or(config.search_top_k))
                .context("query failed")?;

            if json {
                println!("{}", serde_json::to_string_pretty(&hits)?);
            } else {
                for (i, hit) in hits.iter().enumerate() {
                    println!("Result {}: {}", i + 1, hit.source_file_path);
                    println!("{}", hit.text);
                    println!();
                }
            }
        }
        Commands::Readme { repo } => {
            let acquirer = RepoAcquirer::new(
                config.data_path(),
                GitCli {
                    shallow: config.acquire.shallow,
                },
            );
            let local = acquirer.acquire(&repo)?;
            match read_repo_readme(&local.root) {
                Some(readme) => println!("{readme}"),
                None => println!("No README.md in {}", local.root.display()),
            }
        }
    }

    Ok(())
}

fn open_repo(config: &Config, locator: &str) -> Result<IndexedRepo> {
    let model_dir = config.model_path();
    download_model_files(&model_dir, &config.model)?;
    let embedder: Arc<dyn Embedder> = Arc::new(
        OnnxEmbedder::new(&model_dir, &config.model).context("failed to load embedding model")?,
    );
    info!("Embedding model: {}", embedder.model_id());

    let retriever = Retriever::new(
        config.clone(),
        embedder,
        GitCli {
            shallow: config.acquire.shallow,
        },
    )?;

    let progress = BarProgress::new();
    let indexed = retriever.build_index(locator, &progress);
    progress.finish();
    Ok(indexed?)
}
