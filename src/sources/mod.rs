//! Upstream clients producing raw items for one source family each.

pub mod instagram;
pub mod rss;
pub mod twitter;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::config::{BridgeConfig, Config, parse_duration};
use crate::error::SourceError;
use crate::models::SourceType;
use crate::normalize::RawItem;
use crate::paginate::Page;

/// Fetches a cursor-bounded window of items, newest first.
#[async_trait]
pub trait SourceClient: Send + Sync {
    fn source_type(&self) -> SourceType;

    /// `limit = None` applies the client's configured default.
    async fn fetch_items(
        &self,
        external_id: &str,
        limit: Option<usize>,
        cursor: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<Page<RawItem>, SourceError>;
}

pub(crate) fn http_client(timeout: Duration, user_agent: &str) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(user_agent)
        .build()
        .context("building HTTP client")
}

/// Build the client serving `source_type` from configuration.
pub fn build_client(config: &Config, source_type: SourceType) -> Result<Arc<dyn SourceClient>> {
    let client: Arc<dyn SourceClient> = match source_type {
        SourceType::Rss => {
            let timeout = parse_duration("rss.request_timeout", &config.rss.request_timeout)?;
            Arc::new(rss::RssClient::new(
                http_client(timeout, &config.rss.user_agent)?,
                config.rss.max_entries as usize,
            ))
        }
        SourceType::Instagram => Arc::new(instagram::InstagramClient::new(bridge("instagram", &config.instagram)?)),
        SourceType::Twitter => Arc::new(twitter::TwitterClient::new(bridge("twitter", &config.twitter)?)),
    };
    Ok(client)
}

const BRIDGE_USER_AGENT: &str = concat!("social-collector/", env!("CARGO_PKG_VERSION"));

fn bridge(section: &str, bridge: &BridgeConfig) -> Result<BridgeClient> {
    let base_url = bridge
        .bridge_url
        .clone()
        .with_context(|| format!("{section}: bridge_url is not configured"))?;
    let timeout = parse_duration(&format!("{section}.request_timeout"), &bridge.request_timeout)?;
    let page_delay = parse_duration(&format!("{section}.rate_limit_delay"), &bridge.rate_limit_delay)?;
    let base_url = reqwest::Url::parse(&base_url).with_context(|| format!("{section}: invalid bridge_url"))?;
    Ok(BridgeClient {
        http: http_client(timeout, BRIDGE_USER_AGENT)?,
        base_url,
        page_delay,
        default_limit: bridge.max_items as usize,
    })
}

/// HTTP JSON bridge shared by the social clients.
#[derive(Debug, Clone)]
pub struct BridgeClient {
    pub http: reqwest::Client,
    pub base_url: reqwest::Url,
    /// Pause between consecutive page requests.
    pub page_delay: Duration,
    pub default_limit: usize,
}

impl BridgeClient {
    /// `base_url` extended by `segments`, each percent-encoded as one path
    /// segment.
    pub fn endpoint(&self, segments: &[&str]) -> reqwest::Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    /// GET the endpoint at `segments` and decode the JSON body.
    pub async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        segments: &[&str],
        query: &[(&str, String)],
        cancel: &CancellationToken,
    ) -> Result<T, SourceError> {
        let url = self.endpoint(segments);

        let request = async {
            let response = self
                .http
                .get(url.clone())
                .query(query)
                .send()
                .await
                .map_err(|e| SourceError::http(url.as_str(), e))?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(SourceError::status(url.as_str(), status.as_u16(), &body));
            }

            response.json::<T>().await.map_err(|e| SourceError::http(url.as_str(), e))
        };

        tokio::select! {
            _ = cancel.cancelled() => Err(SourceError::cancelled()),
            result = request => result,
        }
    }

    /// Sleep for the page delay unless cancelled first.
    pub async fn pause(&self, cancel: &CancellationToken) -> Result<(), SourceError> {
        if self.page_delay.is_zero() {
            return Ok(());
        }
        tokio::select! {
            _ = cancel.cancelled() => Err(SourceError::cancelled()),
            _ = tokio::time::sleep(self.page_delay) => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bridge_at(base: &str) -> BridgeClient {
        BridgeClient {
            http: reqwest::Client::new(),
            base_url: reqwest::Url::parse(base).unwrap(),
            page_delay: Duration::ZERO,
            default_limit: 10,
        }
    }

    #[test]
    fn endpoint_appends_segments() {
        let bridge = bridge_at("http://bridge.test:8080");
        assert_eq!(
            bridge.endpoint(&["twitter", "users", "rustlang", "tweets"]).as_str(),
            "http://bridge.test:8080/twitter/users/rustlang/tweets"
        );

        let bridge = bridge_at("http://bridge.test/api/");
        assert_eq!(
            bridge.endpoint(&["instagram", "profiles", "natgeo", "posts"]).as_str(),
            "http://bridge.test/api/instagram/profiles/natgeo/posts"
        );
    }

    #[test]
    fn endpoint_escapes_external_ids() {
        let bridge = bridge_at("http://bridge.test");
        let url = bridge.endpoint(&["twitter", "users", "a/b?c#d", "tweets"]);
        assert_eq!(url.as_str(), "http://bridge.test/twitter/users/a%2Fb%3Fc%23d/tweets");
        assert_eq!(url.query(), None);
        assert_eq!(url.fragment(), None);
    }
}
