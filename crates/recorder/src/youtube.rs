//! YouTube Data API v3 metadata gateway.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use serde::Deserialize;

use crate::metadata::{LookupError, MetadataGateway, VideoInfo};

const VIDEOS_ENDPOINT: &str = "https://www.googleapis.com/youtube/v3/videos";

/// Member-limited archives stay visible to the Data API but refuse
/// embedding; the oEmbed endpoint answers 401/403 for them.
const OEMBED_ENDPOINT: &str = "https://www.youtube.com/oembed";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Production metadata gateway backed by the YouTube Data API v3.
pub struct YouTubeGateway {
    http: reqwest::Client,
    api_key: String,
}

impl YouTubeGateway {
    pub fn new(api_key: impl Into<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            http,
            api_key: api_key.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct VideoListResponse {
    #[serde(default)]
    items: Vec<VideoItem>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VideoItem {
    snippet: Option<Snippet>,
    live_streaming_details: Option<LiveStreamingDetails>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Snippet {
    channel_id: String,
    channel_title: String,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct LiveStreamingDetails {
    scheduled_start_time: Option<DateTime<Utc>>,
    actual_start_time: Option<DateTime<Utc>>,
    actual_end_time: Option<DateTime<Utc>>,
}

/// The Data API answers 400/403 both for fatal key problems and for
/// transient quota exhaustion; only a key problem may abort the session.
fn classify_api_error(status: StatusCode, body: &str) -> LookupError {
    if body.contains("API key") || body.contains("keyInvalid") {
        LookupError::Auth(format!("HTTP {status}: {body}"))
    } else {
        LookupError::Transient(format!("HTTP {status}: {body}"))
    }
}

#[async_trait]
impl MetadataGateway for YouTubeGateway {
    async fn lookup(&self, video_id: &str) -> Result<Option<VideoInfo>, LookupError> {
        let response = self
            .http
            .get(VIDEOS_ENDPOINT)
            .query(&[
                ("part", "snippet,liveStreamingDetails"),
                ("id", video_id),
                ("key", &self.api_key),
            ])
            .send()
            .await
            .map_err(|e| LookupError::Transient(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::BAD_REQUEST || status == StatusCode::FORBIDDEN {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_api_error(status, &body));
        }
        if !status.is_success() {
            return Err(LookupError::Transient(format!("HTTP {status}")));
        }

        let list: VideoListResponse = response
            .json()
            .await
            .map_err(|e| LookupError::Transient(e.to_string()))?;

        let Some(item) = list.items.into_iter().next() else {
            return Ok(None);
        };
        let Some(snippet) = item.snippet else {
            return Ok(None);
        };
        let details = item.live_streaming_details.unwrap_or_default();

        Ok(Some(VideoInfo {
            channel_id: snippet.channel_id,
            channel_title: snippet.channel_title,
            scheduled_start: details.scheduled_start_time,
            actual_start: details.actual_start_time,
            actual_end: details.actual_end_time,
        }))
    }

    async fn is_member_only(&self, video_id: &str) -> Result<bool, LookupError> {
        let watch_url = format!("https://www.youtube.com/watch?v={video_id}");
        let response = self
            .http
            .get(OEMBED_ENDPOINT)
            .query(&[("url", watch_url.as_str()), ("format", "json")])
            .send()
            .await
            .map_err(|e| LookupError::Transient(e.to_string()))?;

        Ok(matches!(
            response.status(),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN
        ))
    }
}
