//! Mapping of source records into the canonical post shape.

pub mod html;
pub mod instagram;
pub mod rss;
pub mod twitter;

use crate::models::{FetchedPost, MediaUploadJob};

pub use instagram::InstagramPost;
pub use rss::RssItem;
pub use twitter::TwitterPost;

/// A source record after its client adapter ran, ready for normalization.
#[derive(Debug, Clone)]
pub enum RawItem {
    Instagram(InstagramPost),
    Twitter(TwitterPost),
    Rss(RssItem),
}

impl RawItem {
    /// Native id of the record, also used as the pagination cursor.
    pub fn external_id(&self) -> &str {
        match self {
            RawItem::Instagram(post) => &post.shortcode,
            RawItem::Twitter(post) => &post.id,
            RawItem::Rss(item) => &item.entry.id,
        }
    }
}

/// Map one raw item into a post plus the upload jobs for its media.
pub fn normalize(item: &RawItem, source_id: &str) -> (FetchedPost, Vec<MediaUploadJob>) {
    match item {
        RawItem::Instagram(post) => instagram::to_fetched_post(post, source_id),
        RawItem::Twitter(post) => twitter::to_fetched_post(post, source_id),
        RawItem::Rss(item) => rss::to_fetched_post(item, source_id),
    }
}
