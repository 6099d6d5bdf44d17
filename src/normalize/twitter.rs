use chrono::{DateTime, Utc};

use crate::media::{ExtensionHint, MediaCollector};
use crate::models::{FetchedPost, MediaUploadJob, PostAuthor, PostMetrics, SourceType};

#[derive(Debug, Clone)]
pub struct TwitterProfile {
    pub username: String,
    pub display_name: String,
    pub avatar_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct TwitterPost {
    pub id: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub author: TwitterProfile,
    /// Photos, then best video variants, then animated GIFs.
    pub media_urls: Vec<String>,
    pub likes: Option<i64>,
    pub retweets: Option<i64>,
    pub replies: Option<i64>,
}

fn looks_like_video(url: &str) -> bool {
    let lower = url.to_ascii_lowercase();
    [".mp4", ".mov", ".webm", "video"].iter().any(|marker| lower.contains(marker))
}

pub fn to_fetched_post(post: &TwitterPost, source_id: &str) -> (FetchedPost, Vec<MediaUploadJob>) {
    let mut media = MediaCollector::new(SourceType::Twitter, source_id, &post.id);
    for url in &post.media_urls {
        let hint = if looks_like_video(url) {
            ExtensionHint::Video
        } else {
            ExtensionHint::SocialUrl
        };
        media.add(url, hint);
    }
    let (media_urls, jobs) = media.finish();

    let fetched = FetchedPost {
        external_id: post.id.clone(),
        content: post.content.clone(),
        media_urls,
        published_at: post.created_at.to_rfc3339(),
        author: PostAuthor {
            username: post.author.username.clone(),
            display_name: post.author.display_name.clone(),
            avatar_url: post.author.avatar_url.clone(),
        },
        // Twitter always tracks these counters.
        metrics: Some(PostMetrics {
            likes: Some(post.likes.unwrap_or(0)),
            comments: Some(post.replies.unwrap_or(0)),
            shares: Some(post.retweets.unwrap_or(0)),
        }),
        link: None,
        title: None,
    };

    (fetched, jobs)
}
