use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{error::UpstreamError, types::VideoItem};

static YOUTUBE_SEARCH_URL: &str = "https://www.googleapis.com/youtube/v3/search";
static IMAGE_MODEL: &str = "dall-e-3";

#[async_trait]
pub(crate) trait VideoSource: Send + Sync {
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<VideoItem>, UpstreamError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ImageSize {
    Square,
    Portrait,
    Landscape,
}

impl ImageSize {
    pub(crate) fn dimensions(self) -> &'static str {
        match self {
            ImageSize::Square => "1024x1024",
            ImageSize::Portrait => "1024x1792",
            ImageSize::Landscape => "1792x1024",
        }
    }
}

#[async_trait]
pub(crate) trait ImageGenerator: Send + Sync {
    /// Returns the URL of the generated image.
    async fn generate(&self, prompt: &str, size: ImageSize) -> Result<String, UpstreamError>;
}

/// Stand-in used when a collaborator has no credentials. Every call fails,
/// so callers serve their fallback content.
pub(crate) struct Unconfigured(pub &'static str);

#[async_trait]
impl VideoSource for Unconfigured {
    async fn search(&self, _query: &str, _max_results: usize) -> Result<Vec<VideoItem>, UpstreamError> {
        Err(UpstreamError::Unconfigured(self.0))
    }
}

#[async_trait]
impl ImageGenerator for Unconfigured {
    async fn generate(&self, _prompt: &str, _size: ImageSize) -> Result<String, UpstreamError> {
        Err(UpstreamError::Unconfigured(self.0))
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<SearchResult>,
}

#[derive(Debug, Deserialize)]
struct SearchResult {
    id: SearchResultId,
    snippet: Snippet,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchResultId {
    video_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Snippet {
    title: String,
    #[serde(default)]
    channel_title: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    thumbnails: Thumbnails,
}

#[derive(Debug, Default, Deserialize)]
struct Thumbnails {
    medium: Option<Thumbnail>,
    high: Option<Thumbnail>,
    default: Option<Thumbnail>,
}

#[derive(Debug, Deserialize)]
struct Thumbnail {
    url: String,
}

impl SearchResponse {
    /// Channel and playlist hits carry no video id and are skipped.
    fn into_items(self) -> Vec<VideoItem> {
        self.items
            .into_iter()
            .filter_map(|result| {
                let id = result.id.video_id?;
                let thumbnails = result.snippet.thumbnails;
                let thumbnail_url = thumbnails
                    .medium
                    .or(thumbnails.high)
                    .or(thumbnails.default)
                    .map(|thumbnail| thumbnail.url)
                    .unwrap_or_default();
                Some(VideoItem {
                    id,
                    title: result.snippet.title,
                    channel_title: result.snippet.channel_title,
                    thumbnail_url,
                    description: result.snippet.description,
                })
            })
            .collect()
    }
}

/// YouTube Data API v3 search.
pub(crate) struct YouTubeSource {
    http: reqwest::Client,
    api_key: String,
}

impl YouTubeSource {
    pub(crate) fn new(http: reqwest::Client, api_key: impl Into<String>) -> Self {
        Self {
            http,
            api_key: api_key.into(),
        }
    }
}

#[async_trait]
impl VideoSource for YouTubeSource {
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<VideoItem>, UpstreamError> {
        let max_results = max_results.clamp(1, 50).to_string();
        let response: SearchResponse = self
            .http
            .get(YOUTUBE_SEARCH_URL)
            .query(&[
                ("part", "snippet"),
                ("type", "video"),
                ("safeSearch", "strict"),
                ("videoEmbeddable", "true"),
                ("q", query),
                ("maxResults", max_results.as_str()),
                ("key", self.api_key.as_str()),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        let items = response.into_items();
        log::debug!("youtube search {:?} returned {} videos", query, items.len());
        Ok(items)
    }
}

#[derive(Debug, Serialize)]
struct ImageRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    n: u8,
    size: &'a str,
}

#[derive(Debug, Deserialize)]
struct ImageResponse {
    #[serde(default)]
    data: Vec<GeneratedImage>,
}

#[derive(Debug, Deserialize)]
struct GeneratedImage {
    url: Option<String>,
}

/// OpenAI images endpoint. `openai_api_rust` cannot select the image model,
/// so this one talks HTTP directly.
pub(crate) struct OpenAiImageGenerator {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl OpenAiImageGenerator {
    pub(crate) fn new(
        http: reqwest::Client,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }
}

#[async_trait]
impl ImageGenerator for OpenAiImageGenerator {
    async fn generate(&self, prompt: &str, size: ImageSize) -> Result<String, UpstreamError> {
        let url = format!("{}/images/generations", self.base_url.trim_end_matches('/'));
        let response: ImageResponse = self
            .http
            .post(url)
            .bearer_auth(&self.api_key)
            .json(&ImageRequest {
                model: IMAGE_MODEL,
                prompt,
                n: 1,
                size: size.dimensions(),
            })
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        response
            .data
            .into_iter()
            .find_map(|image| image.url)
            .ok_or(UpstreamError::Empty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_response_maps_to_video_items() {
        let raw = r#"{
            "kind": "youtube#searchListResponse",
            "items": [
                {
                    "id": {"kind": "youtube#video", "videoId": "abc123"},
                    "snippet": {
                        "title": "10 Minute Meditation for Anxiety",
                        "channelTitle": "Calm Corner",
                        "description": "Breathe with me.",
                        "thumbnails": {
                            "default": {"url": "https://i.ytimg.com/vi/abc123/default.jpg"},
                            "medium": {"url": "https://i.ytimg.com/vi/abc123/mqdefault.jpg"}
                        }
                    }
                },
                {
                    "id": {"kind": "youtube#channel", "channelId": "UC000"},
                    "snippet": {"title": "Calm Corner", "channelTitle": "Calm Corner"}
                }
            ]
        }"#;
        let response: SearchResponse = serde_json::from_str(raw).unwrap();
        let items = response.into_items();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].id, "abc123");
        assert_eq!(items[0].channel_title, "Calm Corner");
        assert_eq!(
            items[0].thumbnail_url,
            "https://i.ytimg.com/vi/abc123/mqdefault.jpg"
        );
    }

    #[test]
    fn image_sizes_follow_orientation() {
        assert_eq!(ImageSize::Square.dimensions(), "1024x1024");
        assert_eq!(ImageSize::Portrait.dimensions(), "1024x1792");
        assert_eq!(ImageSize::Landscape.dimensions(), "1792x1024");
    }

    #[tokio::test]
    async fn unconfigured_collaborators_always_fail() {
        let source = Unconfigured("YOUTUBE_API_KEY");
        assert!(matches!(
            source.search("calm", 3).await,
            Err(UpstreamError::Unconfigured("YOUTUBE_API_KEY"))
        ));
    }
}
