use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use feedpipe::batch::{BatchRunner, BatchSummary};
use feedpipe::config::Config;
use feedpipe::feed::Fetcher;
use feedpipe::reader::{ItemQuery, ItemReader};
use feedpipe::storage::Database;
use feedpipe::util::{validate_url, HostPolicy};

#[derive(Parser, Debug)]
#[command(name = "feedpipe", version, about = "RSS/Atom ingestion pipeline")]
struct Args {
    /// TOML config file (defaults apply when absent)
    #[arg(long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run one ingestion batch over all active feeds
    Run,
    /// Print a page of stored items as JSON
    Items {
        #[arg(long)]
        feed_id: Option<i64>,
        #[arg(long)]
        limit: Option<u32>,
        #[arg(long)]
        offset: Option<u32>,
    },
    /// Register a feed (updates the name if the URL already exists)
    AddFeed { name: String, url: String },
    /// Print recent run-log rows as JSON
    Logs {
        #[arg(long)]
        feed_id: Option<i64>,
        #[arg(long, default_value_t = 50)]
        limit: i64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so JSON on stdout stays clean
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config = match &args.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("Failed to load config from '{}'", path.display()))?,
        None => Config::default(),
    };

    let db = Database::open(&config.database_path)
        .await
        .with_context(|| format!("Failed to open database '{}'", config.database_path))?;

    match args.command {
        Command::Run => {
            let fetcher = Fetcher::new(&config.fetch).context("Failed to build HTTP client")?;
            let runner = BatchRunner::new(db, fetcher, config.batch.clone());
            let summary = runner.run_batch().await;
            print_summary(&summary);
            if let Some(e) = summary.load_error {
                anyhow::bail!("Batch could not start: {}", e);
            }
        }
        Command::Items {
            feed_id,
            limit,
            offset,
        } => {
            let reader = ItemReader::new(db);
            let page = reader
                .get_items(&ItemQuery {
                    feed_id,
                    limit,
                    offset,
                })
                .await
                .context("Failed to read items")?;
            println!("{}", serde_json::to_string_pretty(&page)?);
        }
        Command::AddFeed { name, url } => {
            let policy = HostPolicy::from_allow_private(config.fetch.allow_private_hosts);
            let url = validate_url(&url, policy).context("Refusing feed URL")?;
            let id = db
                .insert_feed(name.trim(), url.as_str())
                .await
                .context("Failed to add feed")?;
            println!("Feed {} registered: {}", id, url);
        }
        Command::Logs { feed_id, limit } => {
            let logs = match feed_id {
                Some(id) => db.get_run_logs_for_feed(id, limit).await,
                None => db.get_recent_run_logs(limit).await,
            }
            .context("Failed to read run logs")?;
            println!("{}", serde_json::to_string_pretty(&logs)?);
        }
    }

    Ok(())
}

fn print_summary(summary: &BatchSummary) {
    for outcome in &summary.outcomes {
        match &outcome.error {
            None => println!(
                "[{}] {} ({}): {} fetched, {} new",
                outcome.status, outcome.feed_name, outcome.feed_id, outcome.items_fetched, outcome.items_created
            ),
            Some(e) => println!(
                "[{}] {} ({}): {}",
                outcome.status, outcome.feed_name, outcome.feed_id, e
            ),
        }
    }
    println!(
        "{} succeeded, {} failed, {} inactive skipped, {} new items in {}s",
        summary.succeeded(),
        summary.failed(),
        summary.skipped_inactive,
        summary.items_created(),
        summary.finished_at - summary.started_at
    );
}
