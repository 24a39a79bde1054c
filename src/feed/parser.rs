use chrono::DateTime;
use thiserror::Error;

use super::xml::{XmlElement, XmlError};
use crate::storage::ParsedItem;

const UNTITLED: &str = "Untitled";

/// Errors produced while turning a payload into items.
#[derive(Debug, Error)]
pub enum ParseError {
    /// The payload is not well-formed XML
    #[error("Malformed XML: {0}")]
    Malformed(#[from] XmlError),

    /// Well-formed XML that is neither RSS 2.0 nor Atom
    #[error("Unsupported feed format: root element <{0}>")]
    UnsupportedFormat(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedFormat {
    Rss2,
    Atom,
}

/// Items extracted from one payload, plus how many entries were dropped
/// because they carried neither a link nor an identifier.
#[derive(Debug, Clone)]
pub struct ParseOutcome {
    pub format: FeedFormat,
    pub items: Vec<ParsedItem>,
    pub skipped: usize,
}

/// Detect the feed format and normalize every entry into a [`ParsedItem`].
///
/// Pure: no I/O, no clock. An RSS 2.0 document is an `<rss>` root with a
/// `<channel>`; an Atom document is a `<feed>` root. Anything else is
/// [`ParseError::UnsupportedFormat`], never an empty success.
pub fn parse_feed(raw: &str) -> Result<ParseOutcome, ParseError> {
    let mut root = XmlElement::parse_document(raw)?;

    // `<atom:feed>` and friends: drop the root's prefix throughout the tree
    if let Some((prefix, _)) = root.name.split_once(':') {
        let prefix = prefix.to_string();
        root.strip_prefix(&prefix);
    }

    let (format, entries): (FeedFormat, Vec<&XmlElement>) = match root.name.as_str() {
        "rss" => match root.child("channel") {
            Some(channel) => (FeedFormat::Rss2, channel.children_named("item").collect()),
            None => return Err(ParseError::UnsupportedFormat(root.name.clone())),
        },
        "feed" => (FeedFormat::Atom, root.children_named("entry").collect()),
        other => return Err(ParseError::UnsupportedFormat(other.to_string())),
    };

    let total = entries.len();
    let items: Vec<ParsedItem> = entries
        .into_iter()
        .filter(|entry| !entry.is_empty())
        .filter_map(|entry| match format {
            FeedFormat::Rss2 => rss_item(entry),
            FeedFormat::Atom => atom_entry(entry),
        })
        .collect();

    Ok(ParseOutcome {
        format,
        skipped: total - items.len(),
        items,
    })
}

/// Convenience wrapper returning only the items
pub fn parse_items(raw: &str) -> Result<Vec<ParsedItem>, ParseError> {
    parse_feed(raw).map(|outcome| outcome.items)
}

// ============================================================================
// RSS 2.0
// ============================================================================

fn rss_item(item: &XmlElement) -> Option<ParsedItem> {
    let guid_node = item.child("guid");
    let guid = guid_node.and_then(XmlElement::trimmed_text);

    // A guid is a permalink unless isPermaLink="false"; it then doubles as
    // the link when <link> is missing
    let guid_is_permalink = guid_node
        .and_then(|g| g.attr_typed("isPermaLink"))
        .and_then(|v| v.as_bool())
        .unwrap_or(true);
    let url = item
        .child_text("link")
        .or_else(|| guid.clone().filter(|_| guid_is_permalink))?;

    Some(ParsedItem {
        guid: guid.unwrap_or_else(|| url.clone()),
        title: item.child_text("title").unwrap_or_else(|| UNTITLED.to_string()),
        description: item.child_text("description"),
        author: item
            .child_text("author")
            .or_else(|| item.child_text("dc:creator")),
        published_at: item.child_text("pubDate").as_deref().and_then(parse_date),
        categories: item
            .children_named("category")
            .filter_map(XmlElement::trimmed_text)
            .collect(),
        url,
    })
}

// ============================================================================
// Atom
// ============================================================================

fn atom_entry(entry: &XmlElement) -> Option<ParsedItem> {
    let url = atom_link(entry);
    let id = entry.child_text("id");

    // Atom requires both; tolerate feeds that only provide one of them
    let (guid, url) = match (id, url) {
        (Some(id), Some(url)) => (id, url),
        (None, Some(url)) => (url.clone(), url),
        (Some(id), None) => (id.clone(), id),
        (None, None) => return None,
    };

    Some(ParsedItem {
        guid,
        url,
        title: entry.child_text("title").unwrap_or_else(|| UNTITLED.to_string()),
        description: entry
            .child_text("summary")
            .or_else(|| entry.child("content").and_then(XmlElement::deep_text)),
        author: entry.child("author").and_then(|a| a.child_text("name")),
        published_at: entry
            .child_text("updated")
            .or_else(|| entry.child_text("published"))
            .as_deref()
            .and_then(parse_date),
        categories: entry
            .children_named("category")
            .filter_map(|c| c.attr_or_child("term"))
            .collect(),
    })
}

/// Prefer the `rel="alternate"` link, otherwise the first link; take its `href`.
fn atom_link(entry: &XmlElement) -> Option<String> {
    let links: Vec<&XmlElement> = entry.children_named("link").collect();
    let chosen = links
        .iter()
        .find(|l| l.attr("rel") == Some("alternate"))
        .or_else(|| links.first())?;

    chosen
        .attr_or_child("href")
        .or_else(|| chosen.trimmed_text())
}

// ============================================================================
// Dates
// ============================================================================

/// Parse an RSS (RFC 2822) or Atom (RFC 3339) date into Unix seconds.
///
/// Unparseable dates yield `None` rather than failing the item.
fn parse_date(raw: &str) -> Option<i64> {
    DateTime::parse_from_rfc2822(raw)
        .or_else(|_| DateTime::parse_from_rfc3339(raw))
        .map(|dt| dt.timestamp())
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    const RSS_FIXTURE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0" xmlns:dc="http://purl.org/dc/elements/1.1/">
  <channel>
    <title>Example</title>
    <link>https://example.com/</link>
    <item>
      <title>First post</title>
      <link>https://example.com/posts/1</link>
      <guid isPermaLink="false">post-1</guid>
      <description><![CDATA[<p>Hello</p>]]></description>
      <author>alice@example.com (Alice)</author>
      <pubDate>Wed, 13 Dec 2023 18:30:02 +0000</pubDate>
      <category>rust</category>
      <category>feeds</category>
    </item>
    <item>
      <title>Second post</title>
      <link>https://example.com/posts/2</link>
      <dc:creator>Bob</dc:creator>
      <pubDate>Thu, 14 Dec 2023 08:00:00 GMT</pubDate>
      <category>news</category>
    </item>
  </channel>
</rss>"#;

    const ATOM_FIXTURE: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>Example</title>
  <id>urn:example</id>
  <updated>2023-12-14T08:00:00Z</updated>
  <entry>
    <title>First post</title>
    <link rel="self" href="https://example.com/api/posts/1"/>
    <link rel="alternate" type="text/html" href="https://example.com/posts/1"/>
    <id>urn:uuid:post-1</id>
    <updated>2023-12-13T18:30:02Z</updated>
    <summary>Hello</summary>
    <author><name>Alice</name></author>
    <category term="rust"/>
    <category><term>feeds</term></category>
  </entry>
  <entry>
    <title>Second post</title>
    <link href="https://example.com/posts/2"/>
    <id>urn:uuid:post-2</id>
    <updated>2023-12-14T08:00:00Z</updated>
    <content type="html">Full body</content>
  </entry>
</feed>"#;

    #[test]
    fn test_rss_items_normalized() {
        let outcome = parse_feed(RSS_FIXTURE).unwrap();
        assert_eq!(outcome.format, FeedFormat::Rss2);
        assert_eq!(outcome.skipped, 0);

        let items = outcome.items;
        assert_eq!(items.len(), 2);

        assert_eq!(
            items[0],
            ParsedItem {
                guid: "post-1".to_string(),
                url: "https://example.com/posts/1".to_string(),
                title: "First post".to_string(),
                description: Some("<p>Hello</p>".to_string()),
                author: Some("alice@example.com (Alice)".to_string()),
                published_at: Some(1702492202),
                categories: vec!["rust".to_string(), "feeds".to_string()],
            }
        );

        // No <guid>: identity falls back to the link
        assert_eq!(items[1].guid, "https://example.com/posts/2");
        assert_eq!(items[1].author.as_deref(), Some("Bob"));
        assert_eq!(items[1].categories, vec!["news".to_string()]);
        assert_eq!(items[1].published_at, Some(1702540800));
    }

    #[test]
    fn test_atom_entries_normalized() {
        let outcome = parse_feed(ATOM_FIXTURE).unwrap();
        assert_eq!(outcome.format, FeedFormat::Atom);

        let items = outcome.items;
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].guid, "urn:uuid:post-1");
        assert_eq!(items[0].url, "https://example.com/posts/1");
        assert_eq!(items[0].description.as_deref(), Some("Hello"));
        assert_eq!(items[0].author.as_deref(), Some("Alice"));
        assert_eq!(items[0].categories, vec!["rust".to_string(), "feeds".to_string()]);

        // Single link without rel; description falls back to content
        assert_eq!(items[1].url, "https://example.com/posts/2");
        assert_eq!(items[1].description.as_deref(), Some("Full body"));
        assert!(items[1].author.is_none());
    }

    #[test]
    fn test_rss_and_atom_agree_on_shared_fields() {
        let rss = parse_items(RSS_FIXTURE).unwrap();
        let atom = parse_items(ATOM_FIXTURE).unwrap();

        let shared = |items: &[ParsedItem]| -> Vec<(String, String, Option<i64>)> {
            items
                .iter()
                .map(|i| (i.title.clone(), i.url.clone(), i.published_at))
                .collect()
        };
        assert_eq!(shared(&rss), shared(&atom));
    }

    #[test]
    fn test_atom_link_falls_back_to_first() {
        let xml = r#"<feed><entry><id>e1</id>
            <link rel="self" href="https://example.com/self"/>
            <link rel="enclosure" href="https://example.com/audio.mp3"/>
        </entry></feed>"#;
        let items = parse_items(xml).unwrap();
        assert_eq!(items[0].url, "https://example.com/self");
    }

    #[test]
    fn test_atom_published_used_when_updated_missing() {
        let xml = r#"<feed><entry><id>e1</id><link href="https://example.com/1"/>
            <published>2024-01-01T00:00:00Z</published></entry></feed>"#;
        let items = parse_items(xml).unwrap();
        assert_eq!(items[0].published_at, Some(1704067200));
    }

    #[test]
    fn test_single_item_channel() {
        let xml = r#"<rss version="2.0"><channel>
            <item><title>Only</title><link>https://example.com/only</link></item>
        </channel></rss>"#;
        let items = parse_items(xml).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].title, "Only");
    }

    #[test]
    fn test_empty_channel_is_ok() {
        let xml = r#"<rss version="2.0"><channel><title>Quiet</title></channel></rss>"#;
        let outcome = parse_feed(xml).unwrap();
        assert!(outcome.items.is_empty());
        assert_eq!(outcome.skipped, 0);
    }

    #[test]
    fn test_empty_and_linkless_items_are_skipped() {
        let xml = r#"<rss version="2.0"><channel>
            <item/>
            <item><title>No link, no guid</title></item>
            <item><title>Kept</title><link>https://example.com/kept</link></item>
        </channel></rss>"#;
        let outcome = parse_feed(xml).unwrap();
        assert_eq!(outcome.items.len(), 1);
        assert_eq!(outcome.skipped, 2);
    }

    #[test]
    fn test_permalink_guid_used_as_url() {
        let xml = r#"<rss version="2.0"><channel>
            <item><title>A</title><guid isPermaLink="true">https://example.com/a</guid></item>
            <item><title>B</title><guid isPermaLink="false">opaque-b</guid></item>
        </channel></rss>"#;
        let outcome = parse_feed(xml).unwrap();
        assert_eq!(outcome.items.len(), 1);
        assert_eq!(outcome.items[0].url, "https://example.com/a");
        assert_eq!(outcome.skipped, 1);
    }

    #[test]
    fn test_guid_without_attribute_is_permalink() {
        let xml = r#"<rss version="2.0"><channel>
            <item><title>A</title><guid>https://example.com/a</guid></item>
        </channel></rss>"#;
        let items = parse_items(xml).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].url, "https://example.com/a");
        assert_eq!(items[0].guid, "https://example.com/a");
    }

    #[test]
    fn test_prefixed_atom_root_detected() {
        let xml = r#"<atom:feed xmlns:atom="http://www.w3.org/2005/Atom">
            <atom:entry>
                <atom:id>urn:uuid:p-1</atom:id>
                <atom:title>Prefixed</atom:title>
                <atom:link href="https://example.com/p/1"/>
                <atom:updated>2023-12-14T08:00:00Z</atom:updated>
            </atom:entry>
        </atom:feed>"#;
        let outcome = parse_feed(xml).unwrap();
        assert_eq!(outcome.format, FeedFormat::Atom);
        assert_eq!(outcome.items.len(), 1);
        assert_eq!(outcome.items[0].title, "Prefixed");
        assert_eq!(outcome.items[0].url, "https://example.com/p/1");
        assert_eq!(outcome.items[0].published_at, Some(1702540800));
    }

    #[test]
    fn test_atom_xhtml_content_used_as_description() {
        let xml = r#"<feed xmlns="http://www.w3.org/2005/Atom"><entry>
            <id>urn:x</id>
            <link href="https://example.com/x"/>
            <content type="xhtml"><div xmlns="http://www.w3.org/1999/xhtml"><p>Hello</p><p>world</p></div></content>
        </entry></feed>"#;
        let items = parse_items(xml).unwrap();
        assert_eq!(items[0].description.as_deref(), Some("Hello world"));
    }

    #[test]
    fn test_missing_title_and_bad_date() {
        let xml = r#"<rss version="2.0"><channel>
            <item><link>https://example.com/x</link><pubDate>yesterday-ish</pubDate></item>
        </channel></rss>"#;
        let items = parse_items(xml).unwrap();
        assert_eq!(items[0].title, "Untitled");
        assert!(items[0].published_at.is_none());
        assert!(items[0].description.is_none());
    }

    #[test]
    fn test_unsupported_format_rejected() {
        match parse_feed("<root><foo/></root>") {
            Err(ParseError::UnsupportedFormat(root)) => assert_eq!(root, "root"),
            other => panic!("Expected UnsupportedFormat, got {:?}", other),
        }
    }

    #[test]
    fn test_rss_without_channel_rejected() {
        assert!(matches!(
            parse_feed(r#"<rss version="2.0"><item/></rss>"#),
            Err(ParseError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_rss1_rdf_rejected() {
        let xml = r#"<rdf:RDF xmlns:rdf="http://www.w3.org/1999/02/22-rdf-syntax-ns#"><channel/></rdf:RDF>"#;
        assert!(matches!(parse_feed(xml), Err(ParseError::UnsupportedFormat(_))));
    }

    #[test]
    fn test_malformed_xml_is_parse_error() {
        assert!(matches!(
            parse_feed("<not valid xml"),
            Err(ParseError::Malformed(_))
        ));
        assert!(matches!(
            parse_feed("<rss><channel></rss>"),
            Err(ParseError::Malformed(_))
        ));
    }

    #[test]
    fn test_parse_date_formats() {
        assert_eq!(parse_date("Mon, 01 Jan 2024 00:00:00 +0000"), Some(1704067200));
        assert_eq!(parse_date("2024-01-01T01:00:00+01:00"), Some(1704067200));
        assert_eq!(parse_date(""), None);
        assert_eq!(parse_date("not a date"), None);
    }

    fn rss_with_items(n: usize) -> String {
        let items: String = (0..n)
            .map(|i| {
                format!(
                    "<item><title>T{i}</title><link>https://example.com/{i}</link></item>"
                )
            })
            .collect();
        format!(r#"<rss version="2.0"><channel><title>P</title>{items}</channel></rss>"#)
    }

    fn atom_with_entries(n: usize) -> String {
        let entries: String = (0..n)
            .map(|i| format!(r#"<entry><id>e{i}</id><link href="https://example.com/{i}"/></entry>"#))
            .collect();
        format!(r#"<feed xmlns="http://www.w3.org/2005/Atom">{entries}</feed>"#)
    }

    proptest! {
        #[test]
        fn prop_rss_item_count_preserved(n in 0usize..40) {
            let items = parse_items(&rss_with_items(n)).unwrap();
            prop_assert_eq!(items.len(), n);
        }

        #[test]
        fn prop_atom_entry_count_preserved(n in 0usize..40) {
            let items = parse_items(&atom_with_entries(n)).unwrap();
            prop_assert_eq!(items.len(), n);
        }
    }
}
