use chrono::{DateTime, Utc};
use tracing::warn;

use crate::media::{ExtensionHint, MediaCollector};
use crate::models::{FetchedPost, MediaUploadJob, PostAuthor, PostMetrics, SourceType};

#[derive(Debug, Clone, PartialEq)]
pub struct MediaRef {
    pub url: String,
    pub is_video: bool,
}

#[derive(Debug, Clone)]
pub struct InstagramOwner {
    pub username: String,
    pub full_name: Option<String>,
    pub profile_pic_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct InstagramPost {
    pub shortcode: String,
    pub caption: Option<String>,
    pub date_utc: DateTime<Utc>,
    pub primary: Option<MediaRef>,
    /// `None` for single-media posts; `Err` when the carousel could not be
    /// resolved upstream.
    pub sidecar: Option<Result<Vec<MediaRef>, String>>,
    pub owner: InstagramOwner,
    pub likes: Option<i64>,
    pub comments: Option<i64>,
}

fn add_ref(media: &mut MediaCollector<'_>, media_ref: &MediaRef) {
    let hint = if media_ref.is_video {
        ExtensionHint::Video
    } else {
        ExtensionHint::SocialUrl
    };
    media.add(&media_ref.url, hint);
}

pub fn to_fetched_post(post: &InstagramPost, source_id: &str) -> (FetchedPost, Vec<MediaUploadJob>) {
    let mut media = MediaCollector::new(SourceType::Instagram, source_id, &post.shortcode);

    match &post.sidecar {
        None => {
            if let Some(primary) = &post.primary {
                add_ref(&mut media, primary);
            }
        }
        Some(Ok(nodes)) => {
            for node in nodes {
                add_ref(&mut media, node);
            }
        }
        Some(Err(reason)) => {
            warn!(shortcode = %post.shortcode, error = %reason, "failed to extract sidecar media, using primary media");
            if let Some(primary) = &post.primary {
                add_ref(&mut media, primary);
            }
        }
    }

    let (media_urls, jobs) = media.finish();

    let owner = &post.owner;
    let author = PostAuthor {
        username: owner.username.clone(),
        display_name: owner
            .full_name
            .clone()
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| owner.username.clone()),
        avatar_url: owner.profile_pic_url.clone().filter(|u| !u.is_empty()),
    };

    let fetched = FetchedPost {
        external_id: post.shortcode.clone(),
        content: post.caption.clone().unwrap_or_default(),
        media_urls,
        published_at: post.date_utc.to_rfc3339(),
        author,
        metrics: Some(PostMetrics {
            likes: post.likes,
            comments: post.comments,
            shares: None,
        }),
        link: None,
        title: None,
    };

    (fetched, jobs)
}
