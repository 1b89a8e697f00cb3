use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use url::Url;

use super::{assemble_playlist, MetadataProvider, PlaylistEnvelope};
use crate::config::YouTubeConfig;
use crate::duration::parse_iso8601_duration;
use crate::error::{MetadataError, MetadataResult};
use crate::model::{Playlist, Video};

pub const DEFAULT_BASE_URL: &str = "https://www.googleapis.com/youtube/v3";
/// Largest page the Data API serves.
pub const MAX_PAGE_SIZE: u32 = 50;

// === URL parsing ===

fn is_youtube_host(host: &str) -> bool {
    host == "youtube.com" || host.ends_with(".youtube.com")
}

fn is_valid_id(id: &str) -> bool {
    !id.is_empty() && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

fn query_value(url: &Url, key: &str) -> Option<String> {
    url.query_pairs()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.into_owned())
        .filter(|v| is_valid_id(v))
}

/// Playlist ID from the `list` parameter of a youtube.com URL.
pub fn extract_playlist_id(input: &str) -> Option<String> {
    let url = Url::parse(input.trim()).ok()?;
    let host = url.host_str()?.to_ascii_lowercase();
    if !is_youtube_host(&host) {
        return None;
    }
    query_value(&url, "list")
}

/// Video ID from `watch?v=`, `youtu.be/<id>`, `/shorts/<id>` or `/embed/<id>` URLs.
pub fn extract_video_id(input: &str) -> Option<String> {
    let url = Url::parse(input.trim()).ok()?;
    let host = url.host_str()?.to_ascii_lowercase();
    let mut segments = url.path_segments()?;

    if host == "youtu.be" {
        return segments.next().filter(|id| is_valid_id(id)).map(str::to_string);
    }
    if !is_youtube_host(&host) {
        return None;
    }
    match segments.next()? {
        "watch" => query_value(&url, "v"),
        "shorts" | "embed" | "live" => segments.next().filter(|id| is_valid_id(id)).map(str::to_string),
        _ => None,
    }
}

// === API response shapes ===

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListResponse<T> {
    #[serde(default = "Vec::new")]
    items: Vec<T>,
    next_page_token: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct Thumbnail {
    url: String,
}

#[derive(Debug, Default, Deserialize)]
struct Thumbnails {
    default: Option<Thumbnail>,
    medium: Option<Thumbnail>,
    high: Option<Thumbnail>,
}

impl Thumbnails {
    fn best(&self) -> String {
        self.high
            .as_ref()
            .or(self.medium.as_ref())
            .or(self.default.as_ref())
            .map(|t| t.url.clone())
            .unwrap_or_default()
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResourceId {
    video_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Snippet {
    #[serde(default)]
    title: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    thumbnails: Thumbnails,
    #[serde(default)]
    resource_id: Option<ResourceId>,
}

#[derive(Debug, Deserialize)]
struct PlaylistResource {
    id: String,
    #[serde(default)]
    snippet: Snippet,
}

#[derive(Debug, Deserialize)]
struct PlaylistItemResource {
    #[serde(default)]
    snippet: Snippet,
}

#[derive(Debug, Deserialize)]
struct ContentDetails {
    #[serde(default)]
    duration: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VideoStatus {
    privacy_status: Option<String>,
    embeddable: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VideoResource {
    id: String,
    #[serde(default)]
    snippet: Option<Snippet>,
    content_details: Option<ContentDetails>,
    status: Option<VideoStatus>,
}

impl VideoResource {
    fn duration_seconds(&self) -> u64 {
        self.content_details
            .as_ref()
            .map(|c| parse_iso8601_duration(&c.duration))
            .unwrap_or(0)
    }

    fn is_private(&self) -> bool {
        self.status
            .as_ref()
            .and_then(|s| s.privacy_status.as_deref())
            == Some("private")
    }

    fn is_embeddable(&self) -> bool {
        self.status.as_ref().and_then(|s| s.embeddable).unwrap_or(true)
    }
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    #[serde(default)]
    message: String,
    #[serde(default)]
    errors: Vec<ApiErrorItem>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorItem {
    #[serde(default)]
    reason: String,
}

/// Map a non-success Data API response onto a typed error.
fn map_api_error(status: u16, body: &str) -> MetadataError {
    let Ok(parsed) = serde_json::from_str::<ApiErrorBody>(body) else {
        return MetadataError::Api {
            status,
            message: body.trim().to_string(),
        };
    };
    let message = parsed.error.message;
    let reasons: Vec<&str> = parsed.error.errors.iter().map(|e| e.reason.as_str()).collect();

    if reasons.contains(&"keyInvalid")
        || (reasons.contains(&"badRequest") && message.contains("API key"))
    {
        MetadataError::InvalidApiKey
    } else if reasons
        .iter()
        .any(|r| matches!(*r, "quotaExceeded" | "dailyLimitExceeded"))
    {
        MetadataError::QuotaExceeded
    } else if status == 404 || reasons.iter().any(|r| r.ends_with("NotFound")) {
        MetadataError::NotFound(message)
    } else {
        MetadataError::Api { status, message }
    }
}

/// YouTube Data API v3 client
pub struct YouTubeClient {
    http: Client,
    api_key: Option<String>,
    base_url: String,
    page_size: u32,
}

impl YouTubeClient {
    pub fn new(api_key: Option<String>) -> Self {
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(format!("audiobook-player/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_default();
        Self {
            http,
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            base_url: DEFAULT_BASE_URL.to_string(),
            page_size: MAX_PAGE_SIZE,
        }
    }

    pub fn from_config(config: &YouTubeConfig) -> Self {
        Self::new(config.api_key.clone())
            .with_base_url(&config.base_url)
            .with_page_size(config.page_size)
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.clamp(1, MAX_PAGE_SIZE);
        self
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    fn api_key(&self) -> MetadataResult<&str> {
        self.api_key.as_deref().ok_or(MetadataError::MissingApiKey)
    }

    async fn get<T: DeserializeOwned>(&self, endpoint: &str, params: &[(&str, &str)]) -> MetadataResult<T> {
        let key = self.api_key()?;
        let response = self
            .http
            .get(format!("{}/{}", self.base_url, endpoint))
            .query(params)
            .query(&[("key", key)])
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            let err = map_api_error(status.as_u16(), &body);
            tracing::warn!("YouTube {} request failed: {}", endpoint, err);
            return Err(err);
        }
        serde_json::from_str(&body).map_err(|e| MetadataError::Decode(format!("{}: {}", endpoint, e)))
    }

    /// Look up duration and status of up to one page of videos, keyed by ID.
    async fn video_details(&self, ids: &[String]) -> MetadataResult<HashMap<String, VideoResource>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let joined = ids.join(",");
        let response: ListResponse<VideoResource> = self
            .get("videos", &[("part", "contentDetails,status"), ("id", joined.as_str())])
            .await?;
        Ok(response.items.into_iter().map(|v| (v.id.clone(), v)).collect())
    }
}

#[async_trait]
impl MetadataProvider for YouTubeClient {
    fn provider_name(&self) -> &str {
        "youtube"
    }

    async fn fetch_playlist(&self, url: &str) -> MetadataResult<Playlist> {
        let playlist_id =
            extract_playlist_id(url).ok_or_else(|| MetadataError::InvalidUrl(url.to_string()))?;

        let info: ListResponse<PlaylistResource> = self
            .get("playlists", &[("part", "snippet"), ("id", playlist_id.as_str())])
            .await?;
        let info = info
            .items
            .into_iter()
            .next()
            .ok_or_else(|| MetadataError::NotFound(format!("playlist {}", playlist_id)))?;

        let page_size = self.page_size.to_string();
        let mut videos = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut params = vec![
                ("part", "snippet"),
                ("playlistId", playlist_id.as_str()),
                ("maxResults", page_size.as_str()),
            ];
            if let Some(token) = page_token.as_deref() {
                params.push(("pageToken", token));
            }
            let page: ListResponse<PlaylistItemResource> = self.get("playlistItems", &params).await?;

            let ids: Vec<String> = page
                .items
                .iter()
                .filter_map(|item| item.snippet.resource_id.as_ref()?.video_id.clone())
                .collect();
            let details = self.video_details(&ids).await?;

            for item in page.items {
                let Some(video_id) = item.snippet.resource_id.and_then(|r| r.video_id) else {
                    continue;
                };
                // Private and deleted videos have no details
                let Some(detail) = details.get(&video_id) else {
                    tracing::debug!("Skipping unavailable playlist entry {}", video_id);
                    continue;
                };
                if detail.is_private() {
                    tracing::debug!("Skipping private playlist entry {}", video_id);
                    continue;
                }
                videos.push(Video::new(
                    video_id,
                    item.snippet.title,
                    item.snippet.thumbnails.best(),
                    detail.duration_seconds(),
                ));
            }

            match page.next_page_token {
                Some(token) if page_token.as_deref() != Some(token.as_str()) => page_token = Some(token),
                _ => break,
            }
        }

        tracing::info!("Fetched playlist {} with {} videos", playlist_id, videos.len());
        let envelope = PlaylistEnvelope {
            id: info.id,
            title: info.snippet.title,
            description: info.snippet.description,
            thumbnail: info.snippet.thumbnails.best(),
            url: url.to_string(),
        };
        Ok(assemble_playlist(envelope, videos))
    }

    async fn fetch_video(&self, url: &str) -> MetadataResult<Playlist> {
        let video_id =
            extract_video_id(url).ok_or_else(|| MetadataError::InvalidUrl(url.to_string()))?;

        let response: ListResponse<VideoResource> = self
            .get(
                "videos",
                &[("part", "snippet,contentDetails,status"), ("id", video_id.as_str())],
            )
            .await?;
        let resource = response
            .items
            .into_iter()
            .next()
            .ok_or_else(|| MetadataError::NotFound(format!("video {}", video_id)))?;

        if resource.is_private() {
            return Err(MetadataError::Unavailable(format!("video {} is private", video_id)));
        }
        if !resource.is_embeddable() {
            return Err(MetadataError::Unavailable(format!(
                "video {} does not allow embedded playback",
                video_id
            )));
        }

        let duration_seconds = resource.duration_seconds();
        let snippet = resource.snippet.unwrap_or_default();
        let thumbnail = snippet.thumbnails.best();
        let video = Video::new(video_id.clone(), snippet.title.clone(), thumbnail.clone(), duration_seconds);

        let envelope = PlaylistEnvelope {
            id: video_id,
            title: snippet.title,
            description: snippet.description,
            thumbnail,
            url: url.to_string(),
        };
        Ok(assemble_playlist(envelope, vec![video]))
    }
}
