use sqlx::QueryBuilder;
use std::collections::HashSet;

use super::schema::Database;
use super::types::StoreError;

/// Maximum number of URLs bound into a single `IN (...)` lookup
const MAX_LOOKUP_BATCH: usize = 500;

impl Database {
    // ========================================================================
    // Saved Items (membership lookups only)
    // ========================================================================

    /// Return the subset of `urls` present in the saved-items index
    pub async fn get_saved_urls(&self, urls: &[&str]) -> Result<HashSet<String>, StoreError> {
        let mut saved = HashSet::new();
        if urls.is_empty() {
            return Ok(saved);
        }

        for chunk in urls.chunks(MAX_LOOKUP_BATCH) {
            let mut builder: QueryBuilder<sqlx::Sqlite> =
                QueryBuilder::new("SELECT url FROM saved_items WHERE url IN (");
            let mut separated = builder.separated(", ");
            for url in chunk {
                separated.push_bind(*url);
            }
            separated.push_unseparated(")");

            let rows: Vec<(String,)> = builder.build_query_as().fetch_all(&self.pool).await?;
            saved.extend(rows.into_iter().map(|(url,)| url));
        }

        Ok(saved)
    }

    /// Add a URL to the saved-items index.
    ///
    /// The index is maintained by the bookmarking side of the system; this is
    /// here for seeding local databases and tests. Saving twice is a no-op.
    pub async fn insert_saved_url(&self, url: &str) -> Result<(), StoreError> {
        let now = chrono::Utc::now().timestamp();
        sqlx::query("INSERT OR IGNORE INTO saved_items (url, created_at) VALUES (?, ?)")
            .bind(url)
            .bind(now)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
