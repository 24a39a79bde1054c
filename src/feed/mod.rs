//! Feed retrieval and normalization.
//!
//! - [`fetcher`] - single-shot HTTP GET with a time budget and size cap
//! - [`parser`] - RSS 2.0 / Atom detection and normalization into
//!   [`ParsedItem`](crate::storage::ParsedItem)s
//! - [`xml`] - the owned element tree the parser reads from
//!
//! Neither stage touches the database; the batch runner wires them to storage.

mod fetcher;
mod parser;
pub mod xml;

pub use fetcher::{FetchError, Fetcher};
pub use parser::{parse_feed, parse_items, FeedFormat, ParseError, ParseOutcome};
