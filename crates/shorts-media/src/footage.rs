//! Stock footage search.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, info_span, Instrument};
use url::Url;

use shorts_models::{ClipRef, Orientation};

use crate::error::{MediaError, MediaResult};
use crate::metrics::record_request;
use crate::retry::RetryPolicy;

const SERVICE: &str = "pexels";
const MAX_PER_PAGE: usize = 80;

/// Longest side accepted when choosing among a video's renditions.
const MAX_RENDITION_SIDE: u32 = 1920;

/// A footage search.
#[derive(Debug, Clone, PartialEq)]
pub struct ClipQuery {
    /// Search terms; `None` queries the provider's unfiltered catalog
    pub terms: Option<String>,
    pub min_duration_secs: f64,
    pub exclude_ids: HashSet<String>,
    pub orientation: Orientation,
    /// Maximum number of clips wanted
    pub count: usize,
    /// Result page, for varying unfiltered queries
    pub page: Option<u32>,
}

impl ClipQuery {
    pub fn terms(terms: impl Into<String>, orientation: Orientation, count: usize) -> Self {
        Self {
            terms: Some(terms.into()),
            min_duration_secs: 0.0,
            exclude_ids: HashSet::new(),
            orientation,
            count,
            page: None,
        }
    }

    pub fn unfiltered(orientation: Orientation, count: usize) -> Self {
        Self {
            terms: None,
            ..Self::terms("", orientation, count)
        }
    }

    pub fn with_min_duration(mut self, secs: f64) -> Self {
        self.min_duration_secs = secs;
        self
    }

    pub fn with_excluded(mut self, ids: HashSet<String>) -> Self {
        self.exclude_ids = ids;
        self
    }

    pub fn with_page(mut self, page: u32) -> Self {
        self.page = Some(page);
        self
    }

    /// Whether a clip satisfies the duration, exclusion and orientation filters.
    pub fn accepts(&self, clip: &ClipRef) -> bool {
        clip.duration_secs >= self.min_duration_secs
            && !self.exclude_ids.contains(&clip.id)
            && self.orientation.matches(clip.width, clip.height)
    }
}

#[async_trait]
pub trait FootageSearch: Send + Sync {
    /// Clips matching the query, at most `query.count`.
    async fn search(&self, query: &ClipQuery) -> MediaResult<Vec<ClipRef>>;

    /// Exact lookup of a clip by its file URL.
    async fn by_url(&self, url: &str) -> MediaResult<ClipRef>;
}

#[derive(Debug, Deserialize)]
struct PexelsPage {
    #[serde(default)]
    videos: Vec<PexelsVideo>,
}

#[derive(Debug, Deserialize)]
struct PexelsVideo {
    id: u64,
    #[serde(default)]
    duration: f64,
    #[serde(default)]
    video_files: Vec<PexelsFile>,
}

#[derive(Debug, Deserialize)]
struct PexelsFile {
    #[serde(default)]
    file_type: Option<String>,
    #[serde(default)]
    width: Option<u32>,
    #[serde(default)]
    height: Option<u32>,
    link: String,
}

impl PexelsVideo {
    /// Best MP4 rendition for the orientation, preferring `link` when present.
    fn to_clip(&self, orientation: Orientation, link: Option<&str>) -> Option<ClipRef> {
        let usable = |f: &&PexelsFile| {
            f.file_type.as_deref().map_or(true, |t| t == "video/mp4")
                && f.width.unwrap_or(0) > 0
                && f.height.unwrap_or(0) > 0
        };

        let chosen = match link {
            Some(link) => self.video_files.iter().find(|f| f.link == link),
            None => None,
        }
        .or_else(|| {
            self.video_files
                .iter()
                .filter(usable)
                .filter(|f| orientation.matches(f.width.unwrap_or(0), f.height.unwrap_or(0)))
                .filter(|f| f.width.unwrap_or(0).max(f.height.unwrap_or(0)) <= MAX_RENDITION_SIDE)
                .max_by_key(|f| u64::from(f.width.unwrap_or(0)) * u64::from(f.height.unwrap_or(0)))
        })?;

        Some(ClipRef {
            id: self.id.to_string(),
            url: chosen.link.clone(),
            width: chosen.width.unwrap_or(0),
            height: chosen.height.unwrap_or(0),
            duration_secs: self.duration,
            local_path: None,
        })
    }
}

/// Extract the Pexels video ID from a file or page URL.
///
/// Handles `.../video-files/<id>/<file>.mp4` and `.../video/<slug>-<id>/`.
pub fn pexels_id_from_url(url: &str) -> Option<u64> {
    let parsed = Url::parse(url).ok()?;
    let segments: Vec<&str> = parsed.path_segments()?.filter(|s| !s.is_empty()).collect();

    if let Some(pos) = segments.iter().position(|s| *s == "video-files") {
        return segments.get(pos + 1)?.parse().ok();
    }
    segments
        .iter()
        .rev()
        .find_map(|s| s.rsplit('-').next().and_then(|tail| tail.parse().ok()))
}

#[derive(Debug, Clone)]
pub struct PexelsConfig {
    pub api_key: String,
    pub base_url: Url,
    pub timeout: Duration,
}

impl PexelsConfig {
    pub fn new(api_key: impl Into<String>) -> MediaResult<Self> {
        let base_url = Url::parse("https://api.pexels.com/")
            .map_err(|e| MediaError::invalid_response(e.to_string()))?;
        Ok(Self {
            api_key: api_key.into(),
            base_url,
            timeout: Duration::from_secs(30),
        })
    }

    pub fn with_base_url(mut self, base_url: Url) -> Self {
        self.base_url = base_url;
        self
    }
}

/// Pexels video API client.
pub struct PexelsClient {
    http: Client,
    config: PexelsConfig,
    retry: RetryPolicy,
}

impl PexelsClient {
    pub fn new(config: PexelsConfig, retry: RetryPolicy) -> MediaResult<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(Duration::from_secs(10))
            .user_agent(concat!("shorts-media/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { http, config, retry })
    }

    fn endpoint(&self, path: &str) -> MediaResult<Url> {
        self.config
            .base_url
            .join(path)
            .map_err(|e| MediaError::invalid_response(format!("bad Pexels URL {}: {}", path, e)))
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: Url,
        params: &[(&str, String)],
    ) -> MediaResult<T> {
        let response = self
            .http
            .get(url)
            .header("Authorization", &self.config.api_key)
            .query(params)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(MediaError::not_found("pexels video"));
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(MediaError::http(SERVICE, status.as_u16(), message));
        }
        Ok(response.json().await?)
    }
}

#[async_trait]
impl FootageSearch for PexelsClient {
    async fn search(&self, query: &ClipQuery) -> MediaResult<Vec<ClipRef>> {
        if query.count == 0 {
            return Ok(Vec::new());
        }

        let per_page = (query.count * 3).clamp(15, MAX_PER_PAGE);
        let mut params = vec![
            ("per_page", per_page.to_string()),
            ("orientation", query.orientation.as_str().to_string()),
            ("page", query.page.unwrap_or(1).to_string()),
        ];
        if query.min_duration_secs > 0.0 {
            params.push(("min_duration", (query.min_duration_secs.ceil() as u64).to_string()));
        }

        let url = match &query.terms {
            Some(terms) => {
                params.push(("query", terms.clone()));
                self.endpoint("videos/search")?
            }
            None => self.endpoint("videos/popular")?,
        };

        let span = info_span!("pexels_search", terms = ?query.terms, count = query.count);
        let result = self
            .retry
            .run("pexels_search", || self.get_json::<PexelsPage>(url.clone(), &params))
            .instrument(span)
            .await;
        record_request(SERVICE, result.is_ok());
        let page = result?;

        let mut seen = HashSet::new();
        let clips: Vec<ClipRef> = page
            .videos
            .iter()
            .filter_map(|v| v.to_clip(query.orientation, None))
            .filter(|c| query.accepts(c) && seen.insert(c.id.clone()))
            .take(query.count)
            .collect();

        debug!(
            terms = ?query.terms,
            returned = page.videos.len(),
            accepted = clips.len(),
            "Footage search finished"
        );
        Ok(clips)
    }

    async fn by_url(&self, url: &str) -> MediaResult<ClipRef> {
        let id = pexels_id_from_url(url)
            .ok_or_else(|| MediaError::not_found(format!("no Pexels video ID in {}", url)))?;

        let endpoint = self.endpoint(&format!("videos/videos/{}", id))?;
        let result = self
            .retry
            .run("pexels_lookup", || self.get_json::<PexelsVideo>(endpoint.clone(), &[]))
            .await;
        record_request(SERVICE, result.is_ok());
        let video = result?;

        let mut clip = video
            .to_clip(Orientation::Portrait, Some(url))
            .or_else(|| video.to_clip(Orientation::Landscape, None))
            .or_else(|| video.to_clip(Orientation::Square, None))
            .ok_or_else(|| MediaError::not_found(format!("no usable rendition for {}", url)))?;

        // Explicitly assigned URLs are used as given
        clip.url = url.to_string();
        Ok(clip)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn video_json(id: u64, duration: f64, width: u32, height: u32) -> serde_json::Value {
        serde_json::json!({
            "id": id,
            "duration": duration,
            "video_files": [
                {
                    "file_type": "video/mp4",
                    "width": width,
                    "height": height,
                    "link": format!("https://videos.pexels.com/video-files/{id}/{id}-hd.mp4")
                },
                {
                    "file_type": "video/mp4",
                    "width": width * 2,
                    "height": height * 2,
                    "link": format!("https://videos.pexels.com/video-files/{id}/{id}-uhd.mp4")
                }
            ]
        })
    }

    async fn client(server: &MockServer) -> PexelsClient {
        let config = PexelsConfig::new("test-key")
            .unwrap()
            .with_base_url(Url::parse(&format!("{}/", server.uri())).unwrap());
        PexelsClient::new(config, RetryPolicy::none()).unwrap()
    }

    #[test]
    fn test_id_from_url() {
        assert_eq!(
            pexels_id_from_url("https://videos.pexels.com/video-files/3571264/3571264-uhd_2560_1440_30fps.mp4"),
            Some(3571264)
        );
        assert_eq!(
            pexels_id_from_url("https://www.pexels.com/video/waves-crashing-on-rocks-1409899/"),
            Some(1409899)
        );
        assert_eq!(pexels_id_from_url("https://example.com/clip.mp4"), None);
    }

    #[tokio::test]
    async fn test_search_filters_and_limits() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/videos/search"))
            .and(query_param("query", "ocean waves"))
            .and(query_param("orientation", "portrait"))
            .and(header("Authorization", "test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "videos": [
                    video_json(1, 12.0, 720, 1280),
                    video_json(2, 3.0, 720, 1280),
                    video_json(3, 20.0, 720, 1280),
                    video_json(4, 20.0, 720, 1280)
                ]
            })))
            .mount(&server)
            .await;

        let query = ClipQuery::terms("ocean waves", Orientation::Portrait, 2)
            .with_min_duration(5.0)
            .with_excluded(HashSet::from(["3".to_string()]));
        let clips = client(&server).await.search(&query).await.unwrap();

        let ids: Vec<&str> = clips.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "4"]);
        // The 2x rendition exceeds the size cap
        assert!(clips[0].url.ends_with("1-hd.mp4"));
    }

    #[tokio::test]
    async fn test_unfiltered_uses_popular() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/videos/popular"))
            .and(query_param("page", "3"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "videos": [video_json(9, 30.0, 720, 1280)]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let query = ClipQuery::unfiltered(Orientation::Portrait, 1).with_page(3);
        let clips = client(&server).await.search(&query).await.unwrap();
        assert_eq!(clips.len(), 1);
    }

    #[tokio::test]
    async fn test_by_url() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/videos/videos/42"))
            .respond_with(ResponseTemplate::new(200).set_body_json(video_json(42, 8.0, 720, 1280)))
            .mount(&server)
            .await;

        let url = "https://videos.pexels.com/video-files/42/42-uhd.mp4";
        let clip = client(&server).await.by_url(url).await.unwrap();
        assert_eq!(clip.id, "42");
        assert_eq!(clip.url, url);
        assert_eq!((clip.width, clip.height), (1440, 2560));
    }

    #[tokio::test]
    async fn test_by_url_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/videos/videos/7"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let err = client(&server)
            .await
            .by_url("https://videos.pexels.com/video-files/7/7-hd.mp4")
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::NotFound(_)));
    }
}
