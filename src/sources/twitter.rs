use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::SourceError;
use crate::models::SourceType;
use crate::normalize::RawItem;
use crate::normalize::twitter::{TwitterPost, TwitterProfile};
use crate::paginate::{CursorWindow, Page};
use crate::sources::{BridgeClient, SourceClient};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BridgeUser {
    username: String,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    profile_image_url: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TweetsPage {
    #[serde(default)]
    tweets: Vec<BridgeTweet>,
    #[serde(default)]
    next_page: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BridgeTweet {
    id: String,
    #[serde(default)]
    raw_content: Option<String>,
    date: DateTime<Utc>,
    #[serde(default)]
    media: BridgeMedia,
    #[serde(default)]
    like_count: Option<i64>,
    #[serde(default)]
    retweet_count: Option<i64>,
    #[serde(default)]
    reply_count: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
struct BridgeMedia {
    #[serde(default)]
    photos: Vec<Photo>,
    #[serde(default)]
    videos: Vec<Video>,
    #[serde(default)]
    animated: Vec<Animated>,
}

#[derive(Debug, Deserialize)]
struct Photo {
    #[serde(default)]
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Video {
    #[serde(default)]
    thumbnail_url: Option<String>,
    #[serde(default)]
    variants: Vec<Variant>,
}

#[derive(Debug, Deserialize)]
struct Variant {
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    bitrate: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Animated {
    #[serde(default)]
    video_url: Option<String>,
    #[serde(default)]
    thumbnail_url: Option<String>,
}

fn non_empty(url: &Option<String>) -> Option<&String> {
    url.as_ref().filter(|u| !u.is_empty())
}

impl Video {
    /// Highest-bitrate variant; a variant without bitrate only counts when
    /// nothing better was seen.
    fn best_url(&self) -> Option<String> {
        if self.variants.is_empty() {
            return non_empty(&self.thumbnail_url).cloned();
        }

        let mut best: Option<&String> = None;
        let mut best_bitrate = 0;
        for variant in &self.variants {
            match (variant.bitrate, non_empty(&variant.url)) {
                (Some(bitrate), Some(url)) if bitrate > best_bitrate => {
                    best_bitrate = bitrate;
                    best = Some(url);
                }
                (None | Some(0), Some(url)) if best.is_none() => best = Some(url),
                _ => {}
            }
        }
        best.cloned()
    }
}

impl BridgeMedia {
    /// Photos, then videos, then animated GIFs.
    fn urls(&self) -> Vec<String> {
        let photos = self.photos.iter().filter_map(|p| non_empty(&p.url).cloned());
        let videos = self.videos.iter().filter_map(Video::best_url);
        let animated = self
            .animated
            .iter()
            .filter_map(|a| non_empty(&a.video_url).or(non_empty(&a.thumbnail_url)).cloned());
        photos.chain(videos).chain(animated).collect()
    }
}

fn adapt_tweet(tweet: BridgeTweet, author: &TwitterProfile) -> TwitterPost {
    TwitterPost {
        media_urls: tweet.media.urls(),
        id: tweet.id,
        content: tweet.raw_content.unwrap_or_default(),
        created_at: tweet.date,
        author: author.clone(),
        likes: tweet.like_count,
        retweets: tweet.retweet_count,
        replies: tweet.reply_count,
    }
}

/// Reads a user's timeline, newest first, from the Twitter bridge.
pub struct TwitterClient {
    bridge: BridgeClient,
}

impl TwitterClient {
    pub fn new(bridge: BridgeClient) -> Self {
        Self { bridge }
    }

    async fn profile(&self, username: &str, cancel: &CancellationToken) -> Result<TwitterProfile, SourceError> {
        let user: BridgeUser = self
            .bridge
            .get_json(&["twitter", "users", username], &[], cancel)
            .await?;
        Ok(TwitterProfile {
            display_name: user
                .display_name
                .filter(|n| !n.is_empty())
                .unwrap_or_else(|| user.username.clone()),
            username: user.username,
            avatar_url: user.profile_image_url,
        })
    }
}

#[async_trait]
impl SourceClient for TwitterClient {
    fn source_type(&self) -> SourceType {
        SourceType::Twitter
    }

    async fn fetch_items(
        &self,
        external_id: &str,
        limit: Option<usize>,
        cursor: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<Page<RawItem>, SourceError> {
        let mut window = CursorWindow::new(cursor, Some(limit.unwrap_or(self.bridge.default_limit)));
        if window.is_full() {
            return Ok(window.finish());
        }

        let author = self.profile(external_id, cancel).await?;
        let mut page_token: Option<String> = None;

        loop {
            let query: Vec<(&str, String)> = page_token.iter().map(|p| ("page", p.clone())).collect();
            let page: TweetsPage = self
                .bridge
                .get_json(&["twitter", "users", external_id, "tweets"], &query, cancel)
                .await?;
            debug!(user = %external_id, tweets = page.tweets.len(), "received tweets page");

            for tweet in page.tweets {
                let post = adapt_tweet(tweet, &author);
                let id = post.id.clone();
                if window.offer(&id, RawItem::Twitter(post)).is_break() {
                    break;
                }
            }

            match page.next_page {
                Some(next) if !window.is_full() => {
                    page_token = Some(next);
                    self.bridge.pause(cancel).await?;
                }
                _ => break,
            }
        }

        Ok(window.finish())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tweet(value: serde_json::Value) -> BridgeTweet {
        serde_json::from_value(value).unwrap()
    }

    fn author() -> TwitterProfile {
        TwitterProfile {
            username: "rustlang".to_string(),
            display_name: "Rust Language".to_string(),
            avatar_url: None,
        }
    }

    #[test]
    fn media_order_is_photos_videos_gifs() {
        let t = tweet(serde_json::json!({
            "id": "100",
            "rawContent": "release",
            "date": "2025-12-01T10:00:00Z",
            "media": {
                "animated": [{"videoUrl": "https://video.twimg.com/tweet_video/gif.mp4"}],
                "videos": [{
                    "thumbnailUrl": "https://pbs.twimg.com/thumb.jpg",
                    "variants": [
                        {"url": "https://video.twimg.com/v/pl.m3u8"},
                        {"url": "https://video.twimg.com/v/480.mp4", "bitrate": 832000},
                        {"url": "https://video.twimg.com/v/720.mp4", "bitrate": 2176000},
                        {"url": "https://video.twimg.com/v/360.mp4", "bitrate": 256000}
                    ]
                }],
                "photos": [{"url": "https://pbs.twimg.com/media/a.jpg"}]
            },
            "likeCount": 7
        }));
        let post = adapt_tweet(t, &author());
        assert_eq!(
            post.media_urls,
            vec![
                "https://pbs.twimg.com/media/a.jpg",
                "https://video.twimg.com/v/720.mp4",
                "https://video.twimg.com/tweet_video/gif.mp4",
            ]
        );
        assert_eq!(post.likes, Some(7));
        assert_eq!(post.retweets, None);
        assert_eq!(post.author.username, "rustlang");
    }

    #[test]
    fn video_without_variants_uses_thumbnail() {
        let video = Video {
            thumbnail_url: Some("https://pbs.twimg.com/thumb.jpg".to_string()),
            variants: vec![],
        };
        assert_eq!(video.best_url().as_deref(), Some("https://pbs.twimg.com/thumb.jpg"));
    }

    #[test]
    fn variant_without_bitrate_is_a_fallback() {
        let video = Video {
            thumbnail_url: None,
            variants: vec![Variant {
                url: Some("https://video.twimg.com/v/pl.m3u8".to_string()),
                bitrate: None,
            }],
        };
        assert_eq!(video.best_url().as_deref(), Some("https://video.twimg.com/v/pl.m3u8"));
    }

    #[test]
    fn gif_falls_back_to_thumbnail_and_missing_media_is_empty() {
        let t = tweet(serde_json::json!({
            "id": "101",
            "date": "2025-12-01T10:00:00Z",
            "media": {"animated": [{"thumbnailUrl": "https://pbs.twimg.com/gif_thumb.jpg"}]}
        }));
        let post = adapt_tweet(t, &author());
        assert_eq!(post.media_urls, vec!["https://pbs.twimg.com/gif_thumb.jpg"]);
        assert_eq!(post.content, "");

        let t = tweet(serde_json::json!({"id": "102", "date": "2025-12-01T10:00:00Z"}));
        assert!(adapt_tweet(t, &author()).media_urls.is_empty());
    }
}
