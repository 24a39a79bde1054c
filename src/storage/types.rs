use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Errors raised by the persistence layer.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Schema creation failed while opening the database
    #[error("Database migration failed: {0}")]
    Migration(String),

    /// A run-log row carried a status string this build does not know
    #[error("Unknown run status in database: {0}")]
    InvalidStatus(String),

    /// Generic database error
    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),
}

// ============================================================================
// Run Status
// ============================================================================

/// Lifecycle of one `feed_batch_logs` row.
///
/// `Pending` is only ever observed on a row that has been opened and not yet
/// closed. The terminal states are `Success`, `Partial` and `Failed`.
/// `Partial` is never produced by the current pipeline (a feed either parses
/// as a whole or fails as a whole) but remains a valid stored value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Pending,
    Success,
    Partial,
    Failed,
}

impl RunStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Pending => "pending",
            RunStatus::Success => "success",
            RunStatus::Partial => "partial",
            RunStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, RunStatus::Pending)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunStatus {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(RunStatus::Pending),
            "success" => Ok(RunStatus::Success),
            "partial" => Ok(RunStatus::Partial),
            "failed" => Ok(RunStatus::Failed),
            other => Err(StoreError::InvalidStatus(other.to_string())),
        }
    }
}

// ============================================================================
// Helper Types
// ============================================================================

/// A normalized entry produced by the feed parser. Never stored as-is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedItem {
    pub guid: String,
    pub url: String,
    pub title: String,
    pub description: Option<String>,
    pub author: Option<String>,
    pub published_at: Option<i64>,
    pub categories: Vec<String>,
}

/// Result of [`Database::upsert_items`](super::Database::upsert_items).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpsertOutcome {
    pub created: usize,
    pub skipped: usize,
}

/// Values written when a run-log row is closed.
#[derive(Debug, Clone)]
pub struct RunCompletion {
    pub status: RunStatus,
    pub items_fetched: i64,
    pub items_created: i64,
    pub error_message: Option<String>,
    pub finished_at: i64,
}

/// Internal row type for run-log queries; status is checked on conversion.
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct RunLogRow {
    pub id: i64,
    pub feed_id: i64,
    pub status: String,
    pub items_fetched: i64,
    pub items_created: i64,
    pub error_message: Option<String>,
    pub started_at: i64,
    pub finished_at: Option<i64>,
    pub created_at: i64,
}

impl RunLogRow {
    pub(crate) fn into_run_log(self) -> Result<BatchRunLog, StoreError> {
        Ok(BatchRunLog {
            id: self.id,
            feed_id: self.feed_id,
            status: self.status.parse()?,
            items_fetched: self.items_fetched,
            items_created: self.items_created,
            error_message: self.error_message,
            started_at: self.started_at,
            finished_at: self.finished_at,
            created_at: self.created_at,
        })
    }
}

// ============================================================================
// Data Structures
// ============================================================================

/// A configured RSS/Atom source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Feed {
    pub id: i64,
    pub name: String,
    pub url: String,
    pub is_active: bool,
    pub last_fetched_at: Option<i64>,
    pub next_fetch_at: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// A persisted entry, unique per `(feed_id, guid)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct FeedItem {
    pub id: i64,
    pub feed_id: i64,
    pub guid: String,
    pub url: String,
    pub title: String,
    pub description: Option<String>,
    pub published_at: Option<i64>,
    pub fetched_at: i64,
    pub created_at: i64,
}

/// Audit record of one ingestion attempt for one feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchRunLog {
    pub id: i64,
    pub feed_id: i64,
    pub status: RunStatus,
    pub items_fetched: i64,
    pub items_created: i64,
    pub error_message: Option<String>,
    pub started_at: i64,
    pub finished_at: Option<i64>,
    pub created_at: i64,
}
