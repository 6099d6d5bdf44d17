use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::media::{ExtensionHint, MediaCollector};
use crate::models::{FetchedPost, MediaUploadJob, PostAuthor, PostMetrics, SourceType};
use crate::normalize::html::strip_html;

const MAX_TAGS: usize = 10;
const MAX_USERNAME_LEN: usize = 50;

#[derive(Debug, Clone, PartialEq)]
pub struct Enclosure {
    pub url: String,
    /// Declared MIME type, empty when the feed omits it.
    pub content_type: String,
}

#[derive(Debug, Clone)]
pub struct RssEntry {
    /// GUID, falling back to link, title, then a content hash.
    pub id: String,
    /// Plain-text title.
    pub title: String,
    /// Raw body as found in the feed, possibly HTML.
    pub content: String,
    pub link: String,
    pub published: Option<DateTime<Utc>>,
    pub author: Option<String>,
    pub enclosures: Vec<Enclosure>,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct RssFeedInfo {
    pub title: String,
    pub author: Option<String>,
    pub image_url: Option<String>,
}

/// An entry together with the feed it came from.
#[derive(Debug, Clone)]
pub struct RssItem {
    pub entry: RssEntry,
    pub feed: Arc<RssFeedInfo>,
}

/// Replace anything outside `[A-Za-z0-9_]` with `_`, cap the length and trim
/// the padding underscores.
pub fn sanitize_username(name: &str) -> String {
    let replaced: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .take(MAX_USERNAME_LEN)
        .collect();
    let trimmed = replaced.trim_matches('_');
    if trimmed.is_empty() {
        "unknown".to_string()
    } else {
        trimmed.to_string()
    }
}

fn extract_author(entry: &RssEntry, feed: &RssFeedInfo) -> PostAuthor {
    let name = entry
        .author
        .as_deref()
        .filter(|a| !a.trim().is_empty())
        .or_else(|| feed.author.as_deref().filter(|a| !a.trim().is_empty()))
        .unwrap_or(&feed.title);

    PostAuthor {
        username: sanitize_username(name),
        display_name: name.to_string(),
        avatar_url: feed.image_url.clone(),
    }
}

fn build_content(entry: &RssEntry) -> String {
    let body = strip_html(&entry.content);
    let mut parts = Vec::new();

    if !entry.title.is_empty() && !body.contains(&entry.title) {
        parts.push(format!("**{}**", entry.title));
    }
    if !body.is_empty() {
        parts.push(body);
    }
    if !entry.tags.is_empty() {
        let tags: Vec<String> = entry
            .tags
            .iter()
            .take(MAX_TAGS)
            .map(|tag| format!("#{}", tag.replace(' ', "_")))
            .collect();
        parts.push(tags.join(" "));
    }

    parts.join("\n\n")
}

pub fn to_fetched_post(item: &RssItem, source_id: &str) -> (FetchedPost, Vec<MediaUploadJob>) {
    let entry = &item.entry;

    let mut media = MediaCollector::new(SourceType::Rss, source_id, &entry.id);
    for enclosure in &entry.enclosures {
        media.add(&enclosure.url, ExtensionHint::ContentType(enclosure.content_type.clone()));
    }
    let (media_urls, jobs) = media.finish();

    let published_at = entry.published.unwrap_or_else(Utc::now).to_rfc3339();

    let fetched = FetchedPost {
        external_id: entry.id.clone(),
        content: build_content(entry),
        media_urls,
        published_at,
        author: extract_author(entry, &item.feed),
        metrics: Some(PostMetrics::default()),
        link: Some(entry.link.clone()),
        title: Some(entry.title.clone()),
    };

    (fetched, jobs)
}
