use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::SourceError;
use crate::models::SourceType;
use crate::normalize::RawItem;
use crate::normalize::instagram::{InstagramOwner, InstagramPost, MediaRef};
use crate::paginate::{CursorWindow, Page};
use crate::sources::{BridgeClient, SourceClient};

const SIDECAR_TYPENAME: &str = "GraphSidecar";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PostsPage {
    #[serde(default)]
    posts: Vec<BridgePost>,
    #[serde(default)]
    next_page: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BridgePost {
    shortcode: String,
    #[serde(default)]
    caption: Option<String>,
    taken_at: DateTime<Utc>,
    #[serde(default)]
    typename: String,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    video_url: Option<String>,
    #[serde(default)]
    is_video: bool,
    #[serde(default)]
    likes: Option<i64>,
    #[serde(default)]
    comments: Option<i64>,
    owner: BridgeOwner,
    #[serde(default)]
    sidecar: Vec<BridgeNode>,
    #[serde(default)]
    sidecar_error: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BridgeOwner {
    username: String,
    #[serde(default)]
    full_name: Option<String>,
    #[serde(default)]
    profile_pic_url: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BridgeNode {
    #[serde(default)]
    display_url: Option<String>,
    #[serde(default)]
    video_url: Option<String>,
    #[serde(default)]
    is_video: bool,
}

fn media_ref(is_video: bool, video_url: Option<String>, display_url: Option<String>) -> Option<MediaRef> {
    let url = if is_video { video_url } else { display_url };
    url.filter(|u| !u.is_empty()).map(|url| MediaRef { url, is_video })
}

impl From<BridgePost> for InstagramPost {
    fn from(post: BridgePost) -> Self {
        let sidecar = if post.typename == SIDECAR_TYPENAME {
            Some(match post.sidecar_error {
                Some(reason) => Err(reason),
                None => Ok(post
                    .sidecar
                    .into_iter()
                    .filter_map(|node| media_ref(node.is_video, node.video_url, node.display_url))
                    .collect()),
            })
        } else {
            None
        };

        InstagramPost {
            shortcode: post.shortcode,
            caption: post.caption,
            date_utc: post.taken_at,
            primary: media_ref(post.is_video, post.video_url, post.url),
            sidecar,
            owner: InstagramOwner {
                username: post.owner.username,
                full_name: post.owner.full_name,
                profile_pic_url: post.owner.profile_pic_url,
            },
            likes: post.likes,
            comments: post.comments,
        }
    }
}

/// Reads a profile's posts, newest first, from the Instagram bridge.
pub struct InstagramClient {
    bridge: BridgeClient,
}

impl InstagramClient {
    pub fn new(bridge: BridgeClient) -> Self {
        Self { bridge }
    }
}

#[async_trait]
impl SourceClient for InstagramClient {
    fn source_type(&self) -> SourceType {
        SourceType::Instagram
    }

    async fn fetch_items(
        &self,
        external_id: &str,
        limit: Option<usize>,
        cursor: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<Page<RawItem>, SourceError> {
        let mut window = CursorWindow::new(cursor, Some(limit.unwrap_or(self.bridge.default_limit)));
        let mut page_token: Option<String> = None;

        while !window.is_full() {
            let query: Vec<(&str, String)> = page_token.iter().map(|p| ("page", p.clone())).collect();
            let page: PostsPage = self
                .bridge
                .get_json(&["instagram", "profiles", external_id, "posts"], &query, cancel)
                .await?;
            debug!(profile = %external_id, posts = page.posts.len(), "received posts page");

            for post in page.posts {
                let post = InstagramPost::from(post);
                let id = post.shortcode.clone();
                if window.offer(&id, RawItem::Instagram(post)).is_break() {
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
