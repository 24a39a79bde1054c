//! Batch orchestrator: one ingestion pass over every active feed.
//!
//! Each feed goes fetch → parse → store and gets exactly one
//! `feed_batch_logs` row, whatever happens. Stages return `Result`s that are
//! matched at the feed boundary, so one feed's failure is recorded in its own
//! row and never reaches the other feeds or the caller.

use futures::stream::{self, StreamExt};
use thiserror::Error;

use crate::config::BatchConfig;
use crate::feed::{parse_feed, FetchError, Fetcher, ParseError};
use crate::storage::{Database, Feed, RunCompletion, RunStatus, StoreError};
use crate::util::now_timestamp;

/// Why one feed's ingestion stopped. The `Display` text becomes the run
/// log's `error_message`.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),
    #[error("parse failed: {0}")]
    Parse(#[from] ParseError),
    #[error("store failed: {0}")]
    Store(#[from] StoreError),
}

/// Result of processing one feed in a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedOutcome {
    pub feed_id: i64,
    pub feed_name: String,
    /// `None` when the run-log row could not be opened
    pub run_log_id: Option<i64>,
    pub status: RunStatus,
    pub items_fetched: usize,
    pub items_created: usize,
    pub error: Option<String>,
}

/// Aggregate of one [`BatchRunner::run_batch`] invocation.
#[derive(Debug, Clone, Default)]
pub struct BatchSummary {
    pub started_at: i64,
    pub finished_at: i64,
    /// One entry per active feed, ordered by feed ID
    pub outcomes: Vec<FeedOutcome>,
    pub skipped_inactive: usize,
    /// Set when the feed list itself could not be loaded
    pub load_error: Option<String>,
}

impl BatchSummary {
    pub fn succeeded(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.status == RunStatus::Success)
            .count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.status == RunStatus::Failed)
            .count()
    }

    pub fn items_created(&self) -> usize {
        self.outcomes.iter().map(|o| o.items_created).sum()
    }
}

/// Counters filled in as stages complete, so a late failure still logs
/// what earlier stages did.
#[derive(Debug, Default)]
struct IngestProgress {
    items_fetched: usize,
    items_created: usize,
}

/// Drives fetch → parse → store for every active feed.
#[derive(Clone)]
pub struct BatchRunner {
    db: Database,
    fetcher: Fetcher,
    config: BatchConfig,
}

impl BatchRunner {
    pub fn new(db: Database, fetcher: Fetcher, config: BatchConfig) -> Self {
        Self {
            db,
            fetcher,
            config,
        }
    }

    /// Run one ingestion pass.
    ///
    /// Never fails: per-feed errors land in the run log and in the returned
    /// summary. Feeds are processed with at most `max_concurrency` in flight;
    /// inactive feeds are skipped without a log row. There are no retries
    /// within a run.
    pub async fn run_batch(&self) -> BatchSummary {
        let started_at = now_timestamp();

        let feeds = match self.db.get_feeds().await {
            Ok(feeds) => feeds,
            Err(e) => {
                tracing::error!(error = %e, "Failed to load feeds, batch aborted before start");
                return BatchSummary {
                    started_at,
                    finished_at: now_timestamp(),
                    load_error: Some(e.to_string()),
                    ..Default::default()
                };
            }
        };

        let (active, inactive): (Vec<Feed>, Vec<Feed>) =
            feeds.into_iter().partition(|f| f.is_active);
        if !inactive.is_empty() {
            tracing::debug!(skipped = inactive.len(), "Skipping inactive feeds");
        }

        let concurrency = self.config.max_concurrency.max(1);
        tracing::info!(
            feeds = active.len(),
            concurrency = concurrency,
            "Batch started"
        );

        let mut outcomes: Vec<FeedOutcome> = stream::iter(active)
            .map(|feed| self.run_feed(feed))
            .buffer_unordered(concurrency)
            .collect()
            .await;
        outcomes.sort_by_key(|o| o.feed_id);

        let summary = BatchSummary {
            started_at,
            finished_at: now_timestamp(),
            outcomes,
            skipped_inactive: inactive.len(),
            load_error: None,
        };
        tracing::info!(
            succeeded = summary.succeeded(),
            failed = summary.failed(),
            skipped_inactive = summary.skipped_inactive,
            items_created = summary.items_created(),
            elapsed_secs = summary.finished_at - summary.started_at,
            "Batch finished"
        );
        summary
    }

    /// Process a single feed and write its run-log row.
    pub async fn run_feed(&self, feed: Feed) -> FeedOutcome {
        let started_at = now_timestamp();
        let run_log_id = match self.db.open_run_log(feed.id, started_at).await {
            Ok(id) => Some(id),
            Err(e) => {
                tracing::warn!(feed_id = feed.id, error = %e, "Failed to open run log");
                None
            }
        };

        let mut progress = IngestProgress::default();
        let result = self.ingest(&feed, &mut progress).await;

        let (status, error) = match &result {
            Ok(()) => (RunStatus::Success, None),
            Err(e) => (RunStatus::Failed, Some(e.to_string())),
        };

        match &result {
            Ok(()) => tracing::info!(
                feed_id = feed.id,
                feed = %feed.name,
                fetched = progress.items_fetched,
                created = progress.items_created,
                "Feed ingested"
            ),
            Err(e) => tracing::warn!(
                feed_id = feed.id,
                feed = %feed.name,
                url = %feed.url,
                timeout = matches!(e, IngestError::Fetch(f) if f.is_timeout()),
                error = %e,
                "Feed ingestion failed"
            ),
        }

        if let Some(id) = run_log_id {
            let completion = RunCompletion {
                status,
                items_fetched: progress.items_fetched as i64,
                items_created: progress.items_created as i64,
                error_message: error.clone(),
                finished_at: now_timestamp(),
            };
            match self.db.close_run_log(id, &completion).await {
                Ok(true) => {}
                Ok(false) => {
                    tracing::warn!(feed_id = feed.id, run_log_id = id, "Run log already closed")
                }
                Err(e) => {
                    tracing::warn!(feed_id = feed.id, run_log_id = id, error = %e, "Failed to close run log")
                }
            }
        }

        FeedOutcome {
            feed_id: feed.id,
            feed_name: feed.name,
            run_log_id,
            status,
            items_fetched: progress.items_fetched,
            items_created: progress.items_created,
            error,
        }
    }

    async fn ingest(&self, feed: &Feed, progress: &mut IngestProgress) -> Result<(), IngestError> {
        let payload = self.fetcher.fetch(&feed.url).await?;

        let parsed = parse_feed(&payload)?;
        if parsed.skipped > 0 {
            tracing::warn!(
                feed_id = feed.id,
                skipped = parsed.skipped,
                "Entries without link or id skipped"
            );
        }
        progress.items_fetched = parsed.items.len();

        let upserted = self.db.upsert_items(feed.id, &parsed.items).await?;
        progress.items_created = upserted.created;

        let fetched_at = now_timestamp();
        let next_fetch_at = fetched_at.saturating_add(self.config.fetch_interval_secs());
        self.db
            .update_feed_schedule(feed.id, fetched_at, next_fetch_at)
            .await?;

        Ok(())
    }
}
