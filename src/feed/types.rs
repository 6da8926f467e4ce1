use chrono::{DateTime, Utc};

/// One syndicated item, already tagged with the feed it came from.
///
/// Only the extractor builds these, and only when link, title and
/// timestamp were all present in the source document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedEntry {
    /// Absolute URL of the item. Doubles as its Atom id.
    pub link: String,
    /// `"<source feed title> | <item title>"`
    pub title: String,
    pub updated: DateTime<Utc>,
}

/// A request to merge a set of source feeds into one Atom document.
///
/// Built per request (from config, CLI flags or a [`SourceResolver`]) and
/// discarded after a single synthesis.
///
/// [`SourceResolver`]: crate::resolver::SourceResolver
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergedFeedSpec {
    /// Stable identifier, used for both the feed id and its self link.
    pub id: String,
    pub title: String,
    /// Author display name.
    pub author: String,
    /// Source feed URLs, in the order their entries should appear.
    pub sources: Vec<String>,
}
