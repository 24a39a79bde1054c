//! feedpipe: scheduled RSS/Atom ingestion into SQLite.
//!
//! [`batch::BatchRunner`] fetches every active feed, normalizes RSS 2.0 and
//! Atom entries into one item shape, inserts new items idempotently and
//! records one run-log row per feed attempt. [`reader::ItemReader`] pages
//! through the stored items with saved-state and feed-name enrichment.

pub mod batch;
pub mod config;
pub mod feed;
pub mod reader;
pub mod storage;
pub mod util;
