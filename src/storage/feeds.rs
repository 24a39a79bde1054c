use super::schema::Database;
use super::types::{Feed, StoreError};

const FEED_COLUMNS: &str =
    "id, name, url, is_active, last_fetched_at, next_fetch_at, created_at, updated_at";

impl Database {
    // ========================================================================
    // Feed Operations
    // ========================================================================

    /// Insert a feed, or refresh its name if the URL is already configured.
    ///
    /// Returns the feed ID (existing ID on conflict). New feeds start active.
    pub async fn insert_feed(&self, name: &str, url: &str) -> Result<i64, StoreError> {
        let now = chrono::Utc::now().timestamp();
        let (id,): (i64,) = sqlx::query_as(
            r#"
            INSERT INTO feeds (name, url, is_active, created_at, updated_at)
            VALUES (?, ?, 1, ?, ?)
            ON CONFLICT(url) DO UPDATE SET
                name = excluded.name,
                updated_at = excluded.updated_at
            RETURNING id
        "#,
        )
        .bind(name)
        .bind(url)
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    /// Get every configured feed, active or not, ordered by ID
    pub async fn get_feeds(&self) -> Result<Vec<Feed>, StoreError> {
        let feeds = sqlx::query_as::<_, Feed>(&format!(
            "SELECT {FEED_COLUMNS} FROM feeds ORDER BY id"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(feeds)
    }

    pub async fn get_feed(&self, feed_id: i64) -> Result<Option<Feed>, StoreError> {
        let feed = sqlx::query_as::<_, Feed>(&format!(
            "SELECT {FEED_COLUMNS} FROM feeds WHERE id = ?"
        ))
        .bind(feed_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(feed)
    }

    /// Enable or disable polling for a feed. Returns whether the feed exists.
    pub async fn set_feed_active(&self, feed_id: i64, active: bool) -> Result<bool, StoreError> {
        let now = chrono::Utc::now().timestamp();
        let result = sqlx::query("UPDATE feeds SET is_active = ?, updated_at = ? WHERE id = ?")
            .bind(active)
            .bind(now)
            .bind(feed_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Record a completed fetch and when the feed is next due
    pub async fn update_feed_schedule(
        &self,
        feed_id: i64,
        fetched_at: i64,
        next_fetch_at: i64,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE feeds SET last_fetched_at = ?, next_fetch_at = ?, updated_at = ? WHERE id = ?",
        )
        .bind(fetched_at)
        .bind(next_fetch_at)
        .bind(fetched_at)
        .bind(feed_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
