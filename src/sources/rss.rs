use std::sync::Arc;

use async_trait::async_trait;
use feed_rs::model::{Entry, Feed};
use reqwest::header::ACCEPT;
use sha2::{Digest, Sha256};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::SourceError;
use crate::models::SourceType;
use crate::normalize::RawItem;
use crate::normalize::html::strip_html;
use crate::normalize::rss::{Enclosure, RssEntry, RssFeedInfo, RssItem};
use crate::paginate::{Page, paginate};
use crate::sources::SourceClient;

const FEED_ACCEPT: &str = "application/rss+xml, application/atom+xml, application/xml, text/xml, */*";

/// Fetches RSS and Atom feeds over HTTP.
pub struct RssClient {
    http: reqwest::Client,
    default_limit: usize,
}

impl RssClient {
    pub fn new(http: reqwest::Client, default_limit: usize) -> Self {
        Self { http, default_limit }
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>, SourceError> {
        debug!(url = %url, "fetching feed");

        let response = self
            .http
            .get(url)
            .header(ACCEPT, FEED_ACCEPT)
            .send()
            .await
            .map_err(|e| SourceError::http(url, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SourceError::status(url, status.as_u16(), &body));
        }

        let body = response.bytes().await.map_err(|e| SourceError::http(url, e))?;
        Ok(body.to_vec())
    }
}

#[async_trait]
impl SourceClient for RssClient {
    fn source_type(&self) -> SourceType {
        SourceType::Rss
    }

    async fn fetch_items(
        &self,
        external_id: &str,
        limit: Option<usize>,
        cursor: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<Page<RawItem>, SourceError> {
        let limit = limit.unwrap_or(self.default_limit);
        if limit == 0 {
            return Ok(Page::empty());
        }

        let body = tokio::select! {
            _ = cancel.cancelled() => return Err(SourceError::cancelled()),
            body = self.download(external_id) => body?,
        };

        let items = parse_feed(&body, external_id)?;
        if items.is_empty() {
            warn!(url = %external_id, "feed returned no entries");
        }

        Ok(paginate(
            items.into_iter().map(RawItem::Rss),
            |item| item.external_id().to_string(),
            cursor,
            Some(limit),
        ))
    }
}

/// Parse a feed document into items, in document order.
pub fn parse_feed(body: &[u8], url: &str) -> Result<Vec<RssItem>, SourceError> {
    let feed = feed_rs::parser::parse(body)
        .map_err(|e| SourceError::parse(format!("Parse error: {e}")).with_url(url))?;

    let info = Arc::new(feed_info(&feed, url));
    Ok(feed
        .entries
        .into_iter()
        .map(|entry| RssItem {
            entry: adapt_entry(entry),
            feed: Arc::clone(&info),
        })
        .collect())
}

fn feed_info(feed: &Feed, url: &str) -> RssFeedInfo {
    let title = feed
        .title
        .as_ref()
        .map(|t| strip_html(&t.content))
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| url.to_string());

    RssFeedInfo {
        title,
        author: feed.authors.first().map(|a| a.name.clone()),
        image_url: feed
            .logo
            .as_ref()
            .or(feed.icon.as_ref())
            .map(|image| image.uri.clone()),
    }
}

fn adapt_entry(entry: Entry) -> RssEntry {
    let title = entry.title.map(|t| strip_html(&t.content)).unwrap_or_default();
    let link = entry.links.first().map(|l| l.href.clone()).unwrap_or_default();

    let content = entry
        .content
        .and_then(|c| c.body)
        .or_else(|| entry.summary.map(|s| s.content))
        .unwrap_or_default();

    // GUID if available, else link, title, then SHA-256 of link + title
    let id = if !entry.id.is_empty() {
        entry.id
    } else if !link.is_empty() {
        link.clone()
    } else if !title.is_empty() {
        title.clone()
    } else {
        let mut hasher = Sha256::new();
        hasher.update(&link);
        hasher.update("|");
        hasher.update(&title);
        format!("sha256:{:x}", hasher.finalize())
    };

    let mut enclosures: Vec<Enclosure> = Vec::new();
    for media in &entry.media {
        for content in &media.content {
            if let Some(url) = &content.url {
                enclosures.push(Enclosure {
                    url: url.to_string(),
                    content_type: content.content_type.as_ref().map(|m| m.to_string()).unwrap_or_default(),
                });
            }
        }
        for thumbnail in &media.thumbnails {
            enclosures.push(Enclosure {
                url: thumbnail.image.uri.clone(),
                content_type: "image/jpeg".to_string(),
            });
        }
    }
    for l in entry.links.iter().filter(|l| l.rel.as_deref() == Some("enclosure")) {
        if enclosures.iter().all(|e| e.url != l.href) {
            enclosures.push(Enclosure {
                url: l.href.clone(),
                content_type: l.media_type.clone().unwrap_or_default(),
            });
        }
    }

    let tags = entry
        .categories
        .into_iter()
        .map(|c| c.label.unwrap_or(c.term))
        .filter(|t| !t.trim().is_empty())
        .collect();

    RssEntry {
        id,
        title,
        content,
        link,
        published: entry.published.or(entry.updated),
        author: entry.authors.first().map(|a| a.name.clone()),
        enclosures,
        tags,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RSS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0">
  <channel>
    <title>Example News</title>
    <link>https://example.com</link>
    <description>Test feed</description>
    <image>
      <url>https://example.com/logo.png</url>
      <title>Example News</title>
      <link>https://example.com</link>
    </image>
    <item>
      <guid>https://example.com/article/3</guid>
      <title>Third Article</title>
      <link>https://example.com/article/3</link>
      <description><![CDATA[<p>Third <b>body</b></p>]]></description>
      <pubDate>Wed, 03 Dec 2025 10:00:00 GMT</pubDate>
      <category>rust</category>
      <enclosure url="https://example.com/cover.jpg" length="1000" type="image/jpeg"/>
    </item>
    <item>
      <guid>https://example.com/article/2</guid>
      <title>Second Article</title>
      <link>https://example.com/article/2</link>
      <description>Second body</description>
      <pubDate>Tue, 02 Dec 2025 10:00:00 GMT</pubDate>
    </item>
    <item>
      <guid>https://example.com/article/1</guid>
      <title>First Article</title>
      <link>https://example.com/article/1</link>
      <description>First body</description>
      <pubDate>Mon, 01 Dec 2025 10:00:00 GMT</pubDate>
    </item>
  </channel>
</rss>"#;

    #[test]
    fn parses_entries_in_document_order() {
        let items = parse_feed(RSS.as_bytes(), "https://example.com/feed.xml").unwrap();
        let ids: Vec<&str> = items.iter().map(|i| i.entry.id.as_str()).collect();
        assert_eq!(
            ids,
            vec![
                "https://example.com/article/3",
                "https://example.com/article/2",
                "https://example.com/article/1",
            ]
        );

        let first = &items[0].entry;
        assert_eq!(first.title, "Third Article");
        assert_eq!(first.link, "https://example.com/article/3");
        assert!(first.content.contains("<b>body</b>"));
        assert_eq!(first.tags, vec!["rust".to_string()]);
        assert_eq!(first.published.unwrap().to_rfc3339(), "2025-12-03T10:00:00+00:00");
        assert_eq!(
            first.enclosures,
            vec![Enclosure {
                url: "https://example.com/cover.jpg".to_string(),
                content_type: "image/jpeg".to_string(),
            }]
        );
    }

    #[test]
    fn feed_info_comes_from_channel() {
        let items = parse_feed(RSS.as_bytes(), "https://example.com/feed.xml").unwrap();
        let info = &items[0].feed;
        assert_eq!(info.title, "Example News");
        assert_eq!(info.image_url.as_deref(), Some("https://example.com/logo.png"));
        assert!(Arc::ptr_eq(&items[0].feed, &items[2].feed));
    }

    #[test]
    fn cursor_window_over_parsed_feed() {
        let items = parse_feed(RSS.as_bytes(), "https://example.com/feed.xml").unwrap();
        let page = paginate(
            items.into_iter().map(RawItem::Rss),
            |item| item.external_id().to_string(),
            Some("https://example.com/article/3"),
            Some(1),
        );
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.next_cursor.as_deref(), Some("https://example.com/article/2"));
    }

    #[test]
    fn atom_feed_uses_url_when_untitled() {
        let atom = r#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <id>urn:uuid:60a76c80-d399-11d9-b93C-0003939e0af6</id>
  <updated>2025-12-01T10:00:00Z</updated>
  <entry>
    <id>urn:uuid:1225c695-cfb8-4ebb-aaaa-80da344efa6a</id>
    <title>Atom entry</title>
    <link href="https://example.org/2025/12/01/atom"/>
    <link rel="enclosure" type="audio/mpeg" href="https://example.org/ep1.mp3"/>
    <updated>2025-12-01T10:00:00Z</updated>
    <author><name>John Doe</name></author>
    <summary>Some text.</summary>
  </entry>
</feed>"#;
        let items = parse_feed(atom.as_bytes(), "https://example.org/atom.xml").unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].feed.title, "https://example.org/atom.xml");

        let entry = &items[0].entry;
        assert_eq!(entry.id, "urn:uuid:1225c695-cfb8-4ebb-aaaa-80da344efa6a");
        assert_eq!(entry.author.as_deref(), Some("John Doe"));
        assert_eq!(entry.content, "Some text.");
        assert!(entry.published.is_some());
        assert!(
            entry
                .enclosures
                .iter()
                .any(|e| e.url == "https://example.org/ep1.mp3" && e.content_type == "audio/mpeg")
        );
    }

    #[test]
    fn malformed_feed_is_a_parse_error() {
        let err = parse_feed(b"this is not xml at all", "https://example.com/feed.xml").unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::Parse);
        assert!(err.to_string().starts_with("Parse error"));
        assert_eq!(err.url.as_deref(), Some("https://example.com/feed.xml"));
    }
}
