//! # svn-harvest CLI
//!
//! ```bash
//! svn-harvest --config ./svn-harvest.toml crawl --start 100 --end 200
//! svn-harvest --config ./svn-harvest.toml watch
//! svn-harvest latest
//! svn-harvest checkpoint show
//! ```
//!
//! Logs go to stderr; `crawl` writes bulk NDJSON to stdout unless an output
//! file is given.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use svn_harvest::checkpoint::RevisionCheckpoint;
use svn_harvest::config::Config;
use svn_harvest::crawler::Crawler;
use svn_harvest::repository::ConnectorRegistry;
use svn_harvest::river::River;
use svn_harvest::sink::{NdjsonSink, revision_actions, submit_all};
use tokio_util::sync::CancellationToken;

const VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("GIT_COMMIT_HASH"),
    ", built ",
    env!("BUILD_TIMESTAMP"),
    ")"
);

/// Incremental Subversion history crawler feeding a search index
#[derive(Parser)]
#[command(name = "svn-harvest", version = VERSION)]
struct Cli {
    /// Configuration file (TOML); defaults to the platform config directory
    #[arg(long, global = true, env = "SVN_HARVEST_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Crawl once and write the records as bulk NDJSON
    Crawl {
        /// First revision to read (overrides the configuration)
        #[arg(long)]
        start: Option<u64>,

        /// Last revision to read (overrides the configuration)
        #[arg(long)]
        end: Option<u64>,

        /// Output file instead of stdout
        #[arg(long, short)]
        output: Option<PathBuf>,
    },

    /// Crawl repeatedly from the checkpoint until Ctrl-C
    Watch {
        /// Output file instead of stdout
        #[arg(long, short)]
        output: Option<PathBuf>,
    },

    /// Print the latest revision of the repository
    Latest,

    /// Inspect or reset the revision checkpoint
    Checkpoint {
        #[command(subcommand)]
        action: CheckpointAction,
    },
}

#[derive(Subcommand)]
enum CheckpointAction {
    /// Print the last indexed revision of the configured path
    Show,
    /// Forget the configured path so the next run starts over
    Reset,
}

fn open_sink(config: &Config, output: Option<&Path>) -> Result<NdjsonSink<Box<dyn Write + Send>>> {
    let writer: Box<dyn Write + Send> = match output.or(config.index.output.as_deref()) {
        Some(path) => Box::new(BufWriter::new(
            File::create(path).with_context(|| format!("Failed to create {}", path.display()))?,
        )),
        None => Box::new(std::io::stdout()),
    };
    Ok(NdjsonSink::new(writer, config.index.name.clone()))
}

fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Received Ctrl-C, stopping");
            token.cancel();
        }
    });
    cancel
}

async fn crawl(
    config: Config,
    start: Option<u64>,
    end: Option<u64>,
    output: Option<PathBuf>,
) -> Result<()> {
    let mut sink = open_sink(&config, output.as_deref())?;
    let address = config.address()?;
    let mut params = config.crawl_parameters(start)?;
    if end.is_some() {
        params = params.with_end_revision(end);
    }
    let bulk_size = config.index.bulk_size;
    let cancel = cancel_on_ctrl_c();

    let (sink, report) = tokio::task::spawn_blocking(move || -> Result<_> {
        let crawler = Crawler::new(ConnectorRegistry::with_defaults());
        let outcome = crawler.crawl(&address, &params, &cancel)?;

        let mut actions = Vec::new();
        for revision in &outcome.revisions {
            actions.extend(revision_actions(revision)?);
        }
        let report = submit_all(&mut sink, &actions, bulk_size)?;
        tracing::info!(
            "Crawl {:?}: {} revisions, {} documents, {} actions written",
            outcome.state,
            outcome.revisions.len(),
            outcome.document_count(),
            report.submitted
        );
        Ok((sink, report))
    })
    .await
    .context("Crawl task panicked")??;

    sink.into_inner().flush().context("Failed to flush output")?;
    if report.has_failures() {
        anyhow::bail!("{} actions could not be written", report.failures.len());
    }
    Ok(())
}

async fn watch(config: Config, output: Option<PathBuf>) -> Result<()> {
    let sink = open_sink(&config, output.as_deref())?;
    let crawler = Arc::new(Crawler::new(ConnectorRegistry::with_defaults()));
    let river = River::new(crawler, config);

    let sink = river.run(sink, cancel_on_ctrl_c()).await?;
    sink.into_inner().flush().context("Failed to flush output")?;
    Ok(())
}

async fn latest(config: Config) -> Result<()> {
    let address = config.address()?;
    let credentials = config.credentials();
    let head = tokio::task::spawn_blocking(move || {
        Crawler::new(ConnectorRegistry::with_defaults())
            .latest_revision(&address, credentials.as_ref())
    })
    .await
    .context("Latest revision task panicked")??;
    println!("{}", head);
    Ok(())
}

fn checkpoint(config: Config, action: CheckpointAction) -> Result<()> {
    let key = config.checkpoint_key()?;
    let path = &config.checkpoint.path;
    let mut checkpoint = RevisionCheckpoint::load(path)?;

    match action {
        CheckpointAction::Show => match checkpoint.last_revision(&key) {
            Some(revision) => println!("{}\t{}", key, revision),
            None => println!("{}\tnot indexed", key),
        },
        CheckpointAction::Reset => {
            if checkpoint.remove(&key) {
                checkpoint.save(path)?;
                println!("Reset checkpoint of {}", key);
            } else {
                println!("No checkpoint for {}", key);
            }
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // stdout carries NDJSON, so logs go to stderr
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Crawl { start, end, output } => crawl(config, start, end, output).await,
        Commands::Watch { output } => watch(config, output).await,
        Commands::Latest => latest(config).await,
        Commands::Checkpoint { action } => checkpoint(config, action),
    }
}
