//! SQLite persistence for feeds, ingested items, the run log and the
//! saved-items lookup.
//!
//! Every operation is an `impl Database` block in the submodule for its
//! table; [`Database`] itself only owns the pool and the schema.

mod feeds;
mod items;
mod run_logs;
mod saved;
mod schema;
mod types;

pub use schema::Database;
pub use types::{
    BatchRunLog, Feed, FeedItem, ParsedItem, RunCompletion, RunStatus, StoreError, UpsertOutcome,
};
