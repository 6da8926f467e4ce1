use crate::feed::types::FeedEntry;
use feed_rs::model::Entry;
use feed_rs::parser;
use thiserror::Error;

/// Number of entries taken from each source feed unless configured otherwise.
pub const DEFAULT_MAX_ENTRIES: usize = 10;

/// Source-level extraction failures. The whole source contributes nothing.
#[derive(Debug, Error)]
pub enum ParseError {
    /// Document is neither well-formed RSS nor Atom
    #[error("Parse error: {0}")]
    Malformed(String),
    /// Feed has no usable title to prefix its entries with
    #[error("Missing title in feed")]
    MissingFeedTitle,
}

/// Why a single entry was left out of a source's contribution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SkipReason {
    #[error("Missing link in feed entry")]
    MissingLink,
    #[error("Missing title in feed entry")]
    MissingTitle,
    #[error("Missing updated date in feed entry")]
    MissingUpdated,
}

impl SkipReason {
    /// Name of the absent field, for structured logs.
    pub fn field(&self) -> &'static str {
        match self {
            SkipReason::MissingLink => "link",
            SkipReason::MissingTitle => "title",
            SkipReason::MissingUpdated => "updated",
        }
    }
}

/// Per-entry outcome, in source order.
pub type EntryOutcome = Result<FeedEntry, SkipReason>;

/// Result of extracting one parsed source document.
#[derive(Debug)]
pub struct ParseResult {
    /// Feed-level title, already used as the prefix of every entry title
    pub feed_title: String,
    /// One outcome per considered entry (at most `limit`), in source order
    pub outcomes: Vec<EntryOutcome>,
}

impl ParseResult {
    /// Entries that passed validation, in source order.
    pub fn into_entries(self) -> Vec<FeedEntry> {
        self.outcomes.into_iter().filter_map(Result::ok).collect()
    }

    pub fn skipped(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_err()).count()
    }
}

/// Parses an RSS or Atom document into tagged entry outcomes.
///
/// Takes the first `limit` entries exactly as the document orders them.
/// No timestamp-based sorting is applied; the source's own ordering is
/// trusted to be newest-first.
///
/// # Errors
///
/// - [`ParseError::Malformed`] if the bytes are not a recognizable feed
/// - [`ParseError::MissingFeedTitle`] if the feed title is absent or blank
pub fn parse_feed(bytes: &[u8], limit: usize) -> Result<ParseResult, ParseError> {
    let feed = parser::parse(bytes).map_err(|e| ParseError::Malformed(e.to_string()))?;

    let feed_title = feed
        .title
        .map(|t| t.content.trim().to_string())
        .filter(|t| !t.is_empty())
        .ok_or(ParseError::MissingFeedTitle)?;

    let outcomes = feed
        .entries
        .iter()
        .take(limit)
        .map(|entry| build_entry(&feed_title, entry))
        .collect();

    Ok(ParseResult {
        feed_title,
        outcomes,
    })
}

/// Extracts the entries one source contributes to the merged feed.
///
/// Never fails: a malformed document or a feed without a title is logged
/// against `source_url` and contributes an empty list, and each entry
/// missing a required field is logged and dropped on its own.
pub fn extract_entries(bytes: &[u8], source_url: &str, limit: usize) -> Vec<FeedEntry> {
    let result = match parse_feed(bytes, limit) {
        Ok(result) => result,
        Err(e) => {
            tracing::warn!(url = %source_url, error = %e, "Unusable feed, skipping source");
            return Vec::new();
        }
    };

    for reason in result.outcomes.iter().filter_map(|o| o.as_ref().err()) {
        tracing::warn!(
            url = %source_url,
            field = reason.field(),
            "{}",
            reason
        );
    }

    let skipped = result.skipped();
    let entries = result.into_entries();
    tracing::debug!(
        url = %source_url,
        kept = entries.len(),
        skipped = skipped,
        "Extracted feed entries"
    );
    entries
}

fn build_entry(feed_title: &str, entry: &Entry) -> EntryOutcome {
    let link = entry
        .links
        .first()
        .map(|l| l.href.trim())
        .filter(|href| !href.is_empty())
        .ok_or(SkipReason::MissingLink)?;

    let title = entry
        .title
        .as_ref()
        .map(|t| t.content.trim())
        .filter(|t| !t.is_empty())
        .ok_or(SkipReason::MissingTitle)?;

    // RSS items only carry pubDate, which surfaces as `published`
    let updated = entry
        .updated
        .or(entry.published)
        .ok_or(SkipReason::MissingUpdated)?;

    Ok(FeedEntry {
        link: link.to_string(),
        title: format!("{} | {}", feed_title, title),
        updated,
    })
}
