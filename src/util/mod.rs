//! Small helpers shared across the pipeline.
//!
//! - **URL validation**: refuse non-HTTP schemes and internal hosts before a
//!   feed is fetched

mod url_validator;

pub use url_validator::{validate_url, HostPolicy, UrlValidationError};

/// Current time as Unix seconds (UTC)
pub fn now_timestamp() -> i64 {
    chrono::Utc::now().timestamp()
}
