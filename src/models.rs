use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    Instagram,
    Twitter,
    Rss,
}

impl SourceType {
    pub const ALL: [SourceType; 3] = [SourceType::Instagram, SourceType::Twitter, SourceType::Rss];

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::Instagram => "instagram",
            SourceType::Twitter => "twitter",
            SourceType::Rss => "rss",
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "instagram" => Ok(SourceType::Instagram),
            "twitter" => Ok(SourceType::Twitter),
            "rss" => Ok(SourceType::Rss),
            other => Err(format!("unknown source type '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_fetched_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_cursor: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fetch_config: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectorJobMetadata {
    pub orchestrator_job_id: String,
    pub scheduled_at: DateTime<Utc>,
    pub source_metadata: SourceMetadata,
}

/// Input payload of a collector job.
///
/// `source_type` is kept as a string so that a job routed to the wrong worker
/// still parses and can be reported as a classified failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectorJobData {
    pub source_id: String,
    pub source_type: String,
    pub external_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cursor: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
    pub priority: i64,
    pub metadata: CollectorJobMetadata,
}

impl CollectorJobData {
    pub fn parse(payload: &serde_json::Value) -> Result<Self, serde_json::Error> {
        Self::deserialize(payload)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostAuthor {
    pub username: String,
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PostMetrics {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub likes: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comments: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shares: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchedPost {
    pub external_id: String,
    pub content: String,
    /// Storage keys, not source URLs.
    pub media_urls: Vec<String>,
    pub published_at: String,
    pub author: PostAuthor,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<PostMetrics>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaSource {
    Url,
    Buffer,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaUploadJob {
    pub source_type: SourceType,
    pub source_id: String,
    pub post_external_id: String,
    pub media_index: u32,
    pub target_path: String,
    pub content_type: String,
    pub source: MediaSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
    /// Base64-encoded payload when `source` is `buffer`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub buffer: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultStatus {
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorData {
    pub code: String,
    pub message: String,
    pub retryable: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultJobMetadata {
    pub collector_job_id: String,
    pub orchestrator_job_id: String,
    pub fetched_at: DateTime<Utc>,
}

/// Outcome envelope published to the results queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultJobData {
    pub source_id: String,
    pub source_type: SourceType,
    pub status: ResultStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub posts: Option<Vec<FetchedPost>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorData>,
    pub processing_time: u64,
    pub metadata: ResultJobMetadata,
}

impl ResultJobData {
    pub fn success(
        source_type: SourceType,
        job: &CollectorJobData,
        metadata: ResultJobMetadata,
        posts: Vec<FetchedPost>,
        next_cursor: Option<String>,
        processing_time: u64,
    ) -> Self {
        // A cursor only makes sense when something was processed.
        let next_cursor = next_cursor.filter(|_| !posts.is_empty());
        Self {
            source_id: job.source_id.clone(),
            source_type,
            status: ResultStatus::Success,
            posts: Some(posts),
            next_cursor,
            error: None,
            processing_time,
            metadata,
        }
    }

    pub fn error(
        source_type: SourceType,
        job: &CollectorJobData,
        metadata: ResultJobMetadata,
        error: ErrorData,
        processing_time: u64,
    ) -> Self {
        Self {
            source_id: job.source_id.clone(),
            source_type,
            status: ResultStatus::Error,
            posts: None,
            next_cursor: None,
            error: Some(error),
            processing_time,
            metadata,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job_json() -> serde_json::Value {
        serde_json::json!({
            "sourceId": "src-123",
            "sourceType": "rss",
            "externalId": "https://example.com/feed.xml",
            "priority": 1,
            "metadata": {
                "orchestratorJobId": "orch-123",
                "scheduledAt": "2025-12-01T10:00:00Z",
                "sourceMetadata": {}
            }
        })
    }

    #[test]
    fn collector_job_parses_without_optional_fields() {
        let job = CollectorJobData::parse(&job_json()).unwrap();
        assert_eq!(job.source_id, "src-123");
        assert_eq!(job.source_type, "rss");
        assert!(job.cursor.is_none());
        assert!(job.limit.is_none());
        assert_eq!(job.metadata.orchestrator_job_id, "orch-123");
    }

    #[test]
    fn collector_job_parses_cursor_and_limit() {
        let mut value = job_json();
        value["cursor"] = "last-entry-id".into();
        value["limit"] = 50.into();
        value["metadata"]["sourceMetadata"]["lastCursor"] = "last-entry-id".into();
        let job = CollectorJobData::parse(&value).unwrap();
        assert_eq!(job.cursor.as_deref(), Some("last-entry-id"));
        assert_eq!(job.limit, Some(50));
        assert_eq!(job.metadata.source_metadata.last_cursor.as_deref(), Some("last-entry-id"));
    }

    #[test]
    fn collector_job_missing_metadata_is_rejected() {
        let mut value = job_json();
        value.as_object_mut().unwrap().remove("metadata");
        assert!(CollectorJobData::parse(&value).is_err());
    }

    fn metadata() -> ResultJobMetadata {
        ResultJobMetadata {
            collector_job_id: "col-1".to_string(),
            orchestrator_job_id: "orch-123".to_string(),
            fetched_at: Utc::now(),
        }
    }

    #[test]
    fn success_result_uses_wire_field_names() {
        let job = CollectorJobData::parse(&job_json()).unwrap();
        let post = FetchedPost {
            external_id: "1".to_string(),
            content: "Content".to_string(),
            media_urls: vec![],
            published_at: "2025-12-01T00:00:00+00:00".to_string(),
            author: PostAuthor {
                username: "test".to_string(),
                display_name: "Test".to_string(),
                avatar_url: None,
            },
            metrics: None,
            link: None,
            title: None,
        };
        let result = ResultJobData::success(SourceType::Rss, &job, metadata(), vec![post], Some("1".into()), 1500);
        let value = serde_json::to_value(&result).unwrap();

        assert_eq!(value["status"], "success");
        assert_eq!(value["sourceType"], "rss");
        assert_eq!(value["nextCursor"], "1");
        assert_eq!(value["processingTime"], 1500);
        assert_eq!(value["metadata"]["collectorJobId"], "col-1");
        assert_eq!(value["posts"][0]["externalId"], "1");
        assert!(value["posts"][0].get("avatarUrl").is_none());
        assert!(value.get("error").is_none());
    }

    #[test]
    fn success_without_posts_drops_cursor() {
        let job = CollectorJobData::parse(&job_json()).unwrap();
        let result = ResultJobData::success(SourceType::Rss, &job, metadata(), vec![], Some("x".into()), 3);
        assert!(result.next_cursor.is_none());
        assert_eq!(result.posts.as_deref().map(|p| p.len()), Some(0));
    }

    #[test]
    fn error_result_has_no_posts() {
        let job = CollectorJobData::parse(&job_json()).unwrap();
        let error = ErrorData {
            code: "RATE_LIMIT_ERROR".to_string(),
            message: "Too many requests".to_string(),
            retryable: true,
        };
        let result = ResultJobData::error(SourceType::Rss, &job, metadata(), error, 500);
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["status"], "error");
        assert!(value.get("posts").is_none());
        assert!(value.get("nextCursor").is_none());
        assert_eq!(value["error"]["code"], "RATE_LIMIT_ERROR");
        assert_eq!(value["error"]["retryable"], true);
    }

    #[test]
    fn media_job_serializes_source_kind() {
        let job = MediaUploadJob {
            source_type: SourceType::Instagram,
            source_id: "src1".to_string(),
            post_external_id: "ABC123".to_string(),
            media_index: 1,
            target_path: "instagram/src1/ABC123/1.jpg".to_string(),
            content_type: "image/jpeg".to_string(),
            source: MediaSource::Url,
            source_url: Some("https://cdn.test/a.jpg".to_string()),
            buffer: None,
        };
        let value = serde_json::to_value(&job).unwrap();
        assert_eq!(value["source"], "url");
        assert_eq!(value["sourceType"], "instagram");
        assert_eq!(value["mediaIndex"], 1);
        assert!(value.get("buffer").is_none());
    }

    #[test]
    fn source_type_round_trips_through_str() {
        for source_type in SourceType::ALL {
            assert_eq!(source_type.as_str().parse::<SourceType>().unwrap(), source_type);
        }
        assert!("facebook".parse::<SourceType>().is_err());
    }
}
