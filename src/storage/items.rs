use sqlx::QueryBuilder;
use std::collections::HashMap;

use super::schema::Database;
use super::types::{FeedItem, ParsedItem, StoreError, UpsertOutcome};

// ============================================================================
// Query Limit Constants
// ============================================================================

/// Rows per INSERT statement: 8 columns * 50 = 400 binds, under SQLite's 999 limit
const BATCH_SIZE: usize = 50;

/// Maximum number of IDs bound into a single `IN (...)` lookup
const MAX_LOOKUP_BATCH: usize = 500;

impl Database {
    // ========================================================================
    // Item Ingestion
    // ========================================================================

    /// Insert items that are new for this feed and skip the rest.
    ///
    /// Identity is `(feed_id, guid)`, enforced by the table's UNIQUE
    /// constraint. `INSERT OR IGNORE` lets the constraint decide, so an item
    /// already present, duplicated within `items`, or inserted concurrently
    /// by another writer is counted as skipped instead of raising an error.
    /// Existing rows are never updated.
    ///
    /// All chunks run in one transaction: either every new item of the call
    /// lands or none does.
    pub async fn upsert_items(
        &self,
        feed_id: i64,
        items: &[ParsedItem],
    ) -> Result<UpsertOutcome, StoreError> {
        if items.is_empty() {
            return Ok(UpsertOutcome::default());
        }

        let now = chrono::Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;
        let mut created: usize = 0;

        for chunk in items.chunks(BATCH_SIZE) {
            let mut builder: QueryBuilder<sqlx::Sqlite> = QueryBuilder::new(
                "INSERT OR IGNORE INTO feed_items \
                 (feed_id, guid, url, title, description, published_at, fetched_at, created_at) ",
            );

            builder.push_values(chunk, |mut b, item| {
                b.push_bind(feed_id)
                    .push_bind(&item.guid)
                    .push_bind(&item.url)
                    .push_bind(&item.title)
                    .push_bind(&item.description)
                    .push_bind(item.published_at)
                    .push_bind(now)
                    .push_bind(now);
            });

            let result = builder.build().execute(&mut *tx).await?;
            created += result.rows_affected() as usize;
        }

        tx.commit().await?;

        let outcome = UpsertOutcome {
            created,
            skipped: items.len() - created,
        };
        tracing::debug!(
            feed_id = feed_id,
            created = outcome.created,
            skipped = outcome.skipped,
            "Items upserted"
        );
        Ok(outcome)
    }

    // ========================================================================
    // Item Queries
    // ========================================================================

    /// Page through items, newest first, optionally scoped to one feed.
    ///
    /// Ordering is `published_at DESC, fetched_at DESC, id DESC`; rows
    /// without a publish date sort after dated ones and `id` breaks ties so
    /// pages never overlap.
    pub async fn get_items_page(
        &self,
        feed_id: Option<i64>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<FeedItem>, StoreError> {
        let mut builder: QueryBuilder<sqlx::Sqlite> = QueryBuilder::new(
            "SELECT id, feed_id, guid, url, title, description, published_at, fetched_at, created_at \
             FROM feed_items ",
        );
        if let Some(feed_id) = feed_id {
            builder.push("WHERE feed_id = ");
            builder.push_bind(feed_id);
        }
        builder.push(" ORDER BY published_at DESC, fetched_at DESC, id DESC LIMIT ");
        builder.push_bind(limit);
        builder.push(" OFFSET ");
        builder.push_bind(offset);

        let items: Vec<FeedItem> = builder.build_query_as().fetch_all(&self.pool).await?;
        Ok(items)
    }

    /// Count items under the same filter as [`get_items_page`](Self::get_items_page)
    pub async fn count_items(&self, feed_id: Option<i64>) -> Result<i64, StoreError> {
        let (count,): (i64,) = match feed_id {
            Some(feed_id) => {
                sqlx::query_as("SELECT COUNT(*) FROM feed_items WHERE feed_id = ?")
                    .bind(feed_id)
                    .fetch_one(&self.pool)
                    .await?
            }
            None => {
                sqlx::query_as("SELECT COUNT(*) FROM feed_items")
                    .fetch_one(&self.pool)
                    .await?
            }
        };
        Ok(count)
    }

    /// Resolve feed IDs to display names in batched `IN (...)` queries.
    ///
    /// IDs with no matching feed are simply absent from the map.
    pub async fn get_feed_names(&self, feed_ids: &[i64]) -> Result<HashMap<i64, String>, StoreError> {
        let mut names = HashMap::with_capacity(feed_ids.len());
        if feed_ids.is_empty() {
            return Ok(names);
        }

        for chunk in feed_ids.chunks(MAX_LOOKUP_BATCH) {
            let mut builder: QueryBuilder<sqlx::Sqlite> =
                QueryBuilder::new("SELECT id, name FROM feeds WHERE id IN (");
            let mut separated = builder.separated(", ");
            for id in chunk {
                separated.push_bind(*id);
            }
            separated.push_unseparated(")");

            let rows: Vec<(i64, String)> = builder.build_query_as().fetch_all(&self.pool).await?;
            names.extend(rows);
        }

        Ok(names)
    }
}
