//! Feed aggregation and synthesis.
//!
//! Turns a [`MergedFeedSpec`] into one Atom document:
//!
//! - **Fetching**: one GET per source, failures reported as [`FetchError`]
//! - **Parsing**: RSS/Atom extraction into prefixed [`FeedEntry`] values
//! - **Aggregation**: concurrent fan-out, fan-in in source order
//! - **Synthesis**: Atom 1.0 rendering
//!
//! # Architecture
//!
//! - [`fetcher`] - HTTP retrieval of a single source
//! - [`parser`] - Entry extraction and per-entry validation using `feed-rs`
//! - [`aggregator`] - Task-per-source fan-out joined behind one barrier
//! - [`atom`] - Document rendering with `quick-xml`
//!
//! Only metadata resolution can fail a request. Every source-level or
//! entry-level failure degrades to an empty contribution, so
//! [`generate_feed`] always yields a well-formed document.
//!
//! # Example
//!
//! ```ignore
//! use feed_masher::feed::{generate_feed, MergeOptions, MergedFeedSpec};
//!
//! let spec = MergedFeedSpec {
//!     id: "tech".into(),
//!     title: "Tech feeds".into(),
//!     author: "Me".into(),
//!     sources: vec!["https://example.com/rss".into()],
//! };
//! let xml = generate_feed(&client, &spec, &MergeOptions::default()).await?;
//! ```

pub mod aggregator;
pub mod atom;
pub mod fetcher;
pub mod parser;
mod types;

pub use aggregator::{aggregate, AggregateOptions};
pub use atom::{format_timestamp, render_atom, FeedUrls, SynthError};
pub use fetcher::{fetch_source, FetchError};
pub use parser::{extract_entries, parse_feed, ParseError, ParseResult, SkipReason};
pub use types::{FeedEntry, MergedFeedSpec};

use chrono::Utc;

pub const DEFAULT_BASE_URL: &str = "https://feed-masher.deno.dev";

/// Everything a merge needs besides the [`MergedFeedSpec`] itself.
#[derive(Debug, Clone)]
pub struct MergeOptions {
    /// Public base URL for the feed's home link, self link and id
    pub base_url: String,
    pub aggregate: AggregateOptions,
}

impl Default for MergeOptions {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            aggregate: AggregateOptions::default(),
        }
    }
}

/// Aggregates all sources of `spec` and renders the merged Atom feed.
///
/// Source failures never surface here; an error means the document itself
/// could not be written.
pub async fn generate_feed(
    client: &reqwest::Client,
    spec: &MergedFeedSpec,
    options: &MergeOptions,
) -> Result<String, SynthError> {
    tracing::debug!(id = %spec.id, sources = spec.sources.len(), "Generating merged feed");
    let entries = aggregate(client, &spec.sources, &options.aggregate).await;
    render_atom(spec, &options.base_url, &entries, Utc::now())
}
