//! Atom 1.0 rendering of a merged feed.

use crate::feed::types::{FeedEntry, MergedFeedSpec};
use chrono::{DateTime, SecondsFormat, Utc};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use std::io::Cursor;
use thiserror::Error;

const ATOM_NS: &str = "http://www.w3.org/2005/Atom";

#[derive(Debug, Error)]
pub enum SynthError {
    #[error("XML write error: {0}")]
    Xml(String),
    #[error("Generated feed contains invalid UTF-8")]
    InvalidUtf8,
}

/// Canonical URLs of a merged feed, all derived from its id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedUrls {
    /// `<base>/`
    pub home: String,
    /// `<base>/<id>/feed.xml`
    pub self_link: String,
    /// `<base>/<id>`, used as the Atom `<id>`
    pub id: String,
}

impl FeedUrls {
    pub fn new(base_url: &str, feed_id: &str) -> Self {
        let base = base_url.trim_end_matches('/');
        Self {
            home: format!("{}/", base),
            self_link: format!("{}/{}/feed.xml", base, feed_id),
            id: format!("{}/{}", base, feed_id),
        }
    }
}

/// Formats a timestamp the way every `<updated>` element is written:
/// RFC 3339, UTC, millisecond precision, `Z` suffix.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Renders the merged feed as an Atom 1.0 document.
///
/// The feed-level `<updated>` is `now`; everything else is a pure function
/// of `spec`, `base_url` and `entries`. Each entry's link doubles as its
/// `<id>`.
///
/// # Arguments
///
/// * `spec` - Feed metadata (id, title, author)
/// * `base_url` - Public base the home link, self link and feed id hang off
/// * `entries` - Aggregated entries, written in the given order
/// * `now` - Generation time
pub fn render_atom(
    spec: &MergedFeedSpec,
    base_url: &str,
    entries: &[FeedEntry],
    now: DateTime<Utc>,
) -> Result<String, SynthError> {
    let urls = FeedUrls::new(base_url, &spec.id);
    let mut writer = Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 2);

    write(
        &mut writer,
        Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)),
    )?;

    let mut feed = BytesStart::new("feed");
    feed.push_attribute(("xmlns", ATOM_NS));
    write(&mut writer, Event::Start(feed))?;

    write_text_element(&mut writer, "title", &spec.title)?;
    write_link(&mut writer, &urls.home, None)?;
    write_link(&mut writer, &urls.self_link, Some("self"))?;
    write_text_element(&mut writer, "updated", &format_timestamp(&now))?;
    write_text_element(&mut writer, "id", &urls.id)?;

    write(&mut writer, Event::Start(BytesStart::new("author")))?;
    write_text_element(&mut writer, "name", &spec.author)?;
    write(&mut writer, Event::End(BytesEnd::new("author")))?;

    for entry in entries {
        write(&mut writer, Event::Start(BytesStart::new("entry")))?;
        write_text_element(&mut writer, "title", &entry.title)?;
        write_link(&mut writer, &entry.link, None)?;
        write_text_element(&mut writer, "updated", &format_timestamp(&entry.updated))?;
        write_text_element(&mut writer, "id", &entry.link)?;
        write(&mut writer, Event::End(BytesEnd::new("entry")))?;
    }

    write(&mut writer, Event::End(BytesEnd::new("feed")))?;

    let bytes = writer.into_inner().into_inner();
    String::from_utf8(bytes).map_err(|_| SynthError::InvalidUtf8)
}

fn write(writer: &mut Writer<Cursor<Vec<u8>>>, event: Event<'_>) -> Result<(), SynthError> {
    writer
        .write_event(event)
        .map_err(|e| SynthError::Xml(e.to_string()))
}

fn write_text_element(
    writer: &mut Writer<Cursor<Vec<u8>>>,
    name: &str,
    text: &str,
) -> Result<(), SynthError> {
    write(writer, Event::Start(BytesStart::new(name)))?;
    write(writer, Event::Text(BytesText::new(text)))?;
    write(writer, Event::End(BytesEnd::new(name)))
}

fn write_link(
    writer: &mut Writer<Cursor<Vec<u8>>>,
    href: &str,
    rel: Option<&str>,
) -> Result<(), SynthError> {
    let mut link = BytesStart::new("link");
    link.push_attribute(("href", href));
    if let Some(rel) = rel {
        link.push_attribute(("rel", rel));
    }
    write(writer, Event::Empty(link))
}
