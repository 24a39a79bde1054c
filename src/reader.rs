//! Paginated, enriched reads over ingested items.

use serde::Serialize;
use std::collections::{HashMap, HashSet};
use thiserror::Error;

use crate::storage::{Database, FeedItem, StoreError};

/// Page size when the caller gives none
pub const DEFAULT_PAGE_LIMIT: u32 = 20;
/// Display name for items whose feed row cannot be found
pub const UNKNOWN_FEED_NAME: &str = "Unknown feed";

#[derive(Debug, Error)]
pub enum ReadError {
    #[error("Failed to fetch items: {0}")]
    FetchFailed(#[from] StoreError),
}

/// Filter and window for [`ItemReader::get_items`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ItemQuery {
    pub feed_id: Option<i64>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

impl ItemQuery {
    /// Requested limit, or [`DEFAULT_PAGE_LIMIT`]. Zero yields an empty page.
    pub fn effective_limit(&self) -> u32 {
        self.limit.unwrap_or(DEFAULT_PAGE_LIMIT)
    }

    pub fn effective_offset(&self) -> u32 {
        self.offset.unwrap_or(0)
    }
}

/// A stored item plus the per-request fields derived at read time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrichedItem {
    pub id: i64,
    pub feed_id: i64,
    pub guid: String,
    pub url: String,
    pub title: String,
    pub description: Option<String>,
    pub published_at: Option<i64>,
    pub fetched_at: i64,
    pub created_at: i64,
    pub is_saved: bool,
    pub feed_name: String,
}

impl EnrichedItem {
    fn from_item(item: FeedItem, is_saved: bool, feed_name: String) -> Self {
        Self {
            id: item.id,
            feed_id: item.feed_id,
            guid: item.guid,
            url: item.url,
            title: item.title,
            description: item.description,
            published_at: item.published_at,
            fetched_at: item.fetched_at,
            created_at: item.created_at,
            is_saved,
            feed_name,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemPage {
    pub items: Vec<EnrichedItem>,
    /// Items matching the filter, ignoring the window
    pub total: i64,
    pub has_more: bool,
}

/// Stateless read accessor; cheap to clone.
#[derive(Clone)]
pub struct ItemReader {
    db: Database,
}

impl ItemReader {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Return one page of items, newest first, with saved state and feed
    /// names attached.
    ///
    /// One extra row is requested to decide `has_more` without a second
    /// query. An empty page returns `total = 0` and skips the enrichment and
    /// count queries, even when `offset` ran past existing rows.
    pub async fn get_items(&self, query: &ItemQuery) -> Result<ItemPage, ReadError> {
        let limit = query.effective_limit();
        let offset = query.effective_offset();

        let mut rows = self
            .db
            .get_items_page(query.feed_id, i64::from(limit) + 1, i64::from(offset))
            .await?;

        let has_more = rows.len() > limit as usize;
        rows.truncate(limit as usize);
        if rows.is_empty() {
            return Ok(ItemPage::default());
        }

        let urls: Vec<&str> = {
            let unique: HashSet<&str> = rows.iter().map(|r| r.url.as_str()).collect();
            unique.into_iter().collect()
        };
        let saved = self.db.get_saved_urls(&urls).await?;

        let feed_ids: Vec<i64> = {
            let unique: HashSet<i64> = rows.iter().map(|r| r.feed_id).collect();
            unique.into_iter().collect()
        };
        let names = self.db.get_feed_names(&feed_ids).await?;

        let total = self.db.count_items(query.feed_id).await?;

        tracing::debug!(
            feed_id = ?query.feed_id,
            limit = limit,
            offset = offset,
            returned = rows.len(),
            total = total,
            "Items page read"
        );

        Ok(ItemPage {
            items: enrich(rows, &saved, &names),
            total,
            has_more,
        })
    }
}

fn enrich(
    rows: Vec<FeedItem>,
    saved: &HashSet<String>,
    names: &HashMap<i64, String>,
) -> Vec<EnrichedItem> {
    rows.into_iter()
        .map(|item| {
            let is_saved = saved.contains(&item.url);
            let feed_name = names
                .get(&item.feed_id)
                .cloned()
                .unwrap_or_else(|| UNKNOWN_FEED_NAME.to_string());
            EnrichedItem::from_item(item, is_saved, feed_name)
        })
        .collect()
}
