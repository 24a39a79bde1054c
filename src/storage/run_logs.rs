use super::schema::Database;
use super::types::{BatchRunLog, RunCompletion, RunLogRow, RunStatus, StoreError};

const RUN_LOG_COLUMNS: &str = "id, feed_id, status, items_fetched, items_created, error_message, \
     started_at, finished_at, created_at";

/// Hard cap on run-log listings
const MAX_RUN_LOGS: i64 = 1000;

impl Database {
    // ========================================================================
    // Run Log (append-only audit trail)
    // ========================================================================

    /// Open a `pending` run-log row for a feed and return its ID
    pub async fn open_run_log(&self, feed_id: i64, started_at: i64) -> Result<i64, StoreError> {
        let (id,): (i64,) = sqlx::query_as(
            r#"
            INSERT INTO feed_batch_logs (feed_id, status, started_at, created_at)
            VALUES (?, ?, ?, ?)
            RETURNING id
        "#,
        )
        .bind(feed_id)
        .bind(RunStatus::Pending.as_str())
        .bind(started_at)
        .bind(started_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    /// Close a run-log row with its terminal values.
    ///
    /// Only rows whose `finished_at` is still NULL are touched, so a row is
    /// closed at most once and is immutable afterwards. Returns `false` when
    /// the row was missing or already closed.
    pub async fn close_run_log(
        &self,
        run_log_id: i64,
        completion: &RunCompletion,
    ) -> Result<bool, StoreError> {
        debug_assert!(completion.status.is_terminal());

        let result = sqlx::query(
            r#"
            UPDATE feed_batch_logs
            SET status = ?, items_fetched = ?, items_created = ?, error_message = ?, finished_at = ?
            WHERE id = ? AND finished_at IS NULL
        "#,
        )
        .bind(completion.status.as_str())
        .bind(completion.items_fetched)
        .bind(completion.items_created)
        .bind(&completion.error_message)
        .bind(completion.finished_at)
        .bind(run_log_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Run logs for one feed, most recent first
    pub async fn get_run_logs_for_feed(
        &self,
        feed_id: i64,
        limit: i64,
    ) -> Result<Vec<BatchRunLog>, StoreError> {
        let rows = sqlx::query_as::<_, RunLogRow>(&format!(
            "SELECT {RUN_LOG_COLUMNS} FROM feed_batch_logs WHERE feed_id = ? \
             ORDER BY started_at DESC, id DESC LIMIT ?"
        ))
        .bind(feed_id)
        .bind(limit.clamp(1, MAX_RUN_LOGS))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(RunLogRow::into_run_log).collect()
    }

    /// Run logs across all feeds, most recent first
    pub async fn get_recent_run_logs(&self, limit: i64) -> Result<Vec<BatchRunLog>, StoreError> {
        let rows = sqlx::query_as::<_, RunLogRow>(&format!(
            "SELECT {RUN_LOG_COLUMNS} FROM feed_batch_logs ORDER BY started_at DESC, id DESC LIMIT ?"
        ))
        .bind(limit.clamp(1, MAX_RUN_LOGS))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(RunLogRow::into_run_log).collect()
    }
}
