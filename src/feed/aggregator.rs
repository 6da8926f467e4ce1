use crate::feed::fetcher::fetch_source;
use crate::feed::parser::extract_entries;
use crate::feed::types::FeedEntry;
use futures::stream::{self, StreamExt};
use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

/// Knobs for one aggregation run.
#[derive(Debug, Clone)]
pub struct AggregateOptions {
    /// Entries kept per source (the extractor's truncation limit)
    pub max_entries_per_source: usize,
    /// `None` fans out to every source at once; `Some(n)` keeps at most
    /// `n` pipelines in flight.
    pub max_concurrency: Option<NonZeroUsize>,
    /// Per-source fetch timeout
    pub fetch_timeout: Option<Duration>,
}

impl Default for AggregateOptions {
    fn default() -> Self {
        Self {
            max_entries_per_source: crate::feed::parser::DEFAULT_MAX_ENTRIES,
            max_concurrency: None,
            fetch_timeout: None,
        }
    }
}

/// Fetches and extracts every source concurrently and concatenates the
/// results in source-list order.
///
/// Each source runs as its own spawned task (fetch, then extract). The
/// call returns once every task has finished, successfully or not. A
/// source that fails at any stage contributes an empty list at its
/// position, so it neither reorders nor shrinks anyone else's entries.
///
/// Entries are grouped by source and never re-sorted by timestamp.
pub async fn aggregate(
    client: &reqwest::Client,
    sources: &[String],
    options: &AggregateOptions,
) -> Vec<FeedEntry> {
    if sources.is_empty() {
        return Vec::new();
    }

    let started = Instant::now();
    let contributions = collect_contributions(client, sources, options).await;

    let failed = contributions.iter().filter(|c| c.is_empty()).count();
    let entries: Vec<FeedEntry> = contributions.into_iter().flatten().collect();

    tracing::info!(
        sources = sources.len(),
        empty_sources = failed,
        entries = entries.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Aggregated source feeds"
    );

    entries
}

/// One entry list per source, index-aligned with `sources`.
async fn collect_contributions(
    client: &reqwest::Client,
    sources: &[String],
    options: &AggregateOptions,
) -> Vec<Vec<FeedEntry>> {
    let width = options
        .max_concurrency
        .map(NonZeroUsize::get)
        .unwrap_or(sources.len());

    // `buffered` (not `buffer_unordered`) yields results in input order
    stream::iter(sources.iter().cloned())
        .map(|url| {
            let client = client.clone();
            let limit = options.max_entries_per_source;
            let timeout = options.fetch_timeout;

            async move {
                let task_url = url.clone();
                let handle = tokio::spawn(async move {
                    run_pipeline(&client, &task_url, limit, timeout).await
                });

                match handle.await {
                    Ok(entries) => entries,
                    Err(e) => {
                        tracing::error!(url = %url, error = %e, "Feed pipeline task failed");
                        Vec::new()
                    }
                }
            }
        })
        .buffered(width)
        .collect()
        .await
}

async fn run_pipeline(
    client: &reqwest::Client,
    url: &str,
    limit: usize,
    timeout: Option<Duration>,
) -> Vec<FeedEntry> {
    match fetch_source(client, url, timeout).await {
        Ok(bytes) => extract_entries(&bytes, url, limit),
        Err(_) => Vec::new(),
    }
}
