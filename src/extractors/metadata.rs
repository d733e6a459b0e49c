use reqwest::{redirect, Client};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

use super::{platform_client, transport_error, VideoId, VideoMetadata};
use crate::config::{PlatformConfig, RewriteRule, VIDEO_ID_PLACEHOLDER};
use crate::PipelineError;

/// Script assignment carrying the page state on share pages
const ROUTER_DATA_MARKER: &str = "window._ROUTER_DATA";

/// `loaderData` keys for regular videos and image notes
const PAGE_KEYS: &[&str] = &["video_(id)/page", "note_(id)/page"];

/// Router state embedded in share pages
#[derive(Debug, Deserialize)]
struct RouterData {
    #[serde(rename = "loaderData")]
    loader_data: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct PageData {
    #[serde(rename = "videoInfoRes")]
    video_info_res: Option<VideoInfoRes>,
}

#[derive(Debug, Deserialize)]
struct VideoInfoRes {
    item_list: Vec<AwemeItem>,
}

/// One entry of `item_list`. `video.play_addr` is the only required part.
#[derive(Debug, Deserialize)]
pub struct AwemeItem {
    #[serde(default)]
    desc: Option<String>,
    #[serde(default)]
    author: Option<Author>,
    video: VideoSection,
}

#[derive(Debug, Deserialize)]
struct Author {
    #[serde(default)]
    nickname: Option<String>,
}

#[derive(Debug, Deserialize)]
struct VideoSection {
    play_addr: UrlList,
    #[serde(default)]
    cover: Option<UrlList>,
    /// Milliseconds
    #[serde(default)]
    duration: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct UrlList {
    #[serde(default)]
    url_list: Vec<String>,
}

/// Fetches video metadata from the platform's share page
pub struct MetadataFetcher {
    client: Client,
    url_template: String,
    rules: Vec<RewriteRule>,
    timeout_secs: u64,
}

impl MetadataFetcher {
    pub fn new(config: &PlatformConfig) -> crate::Result<Self> {
        let client = platform_client(
            config,
            redirect::Policy::limited(config.max_redirects),
            Duration::from_secs(config.request_timeout_secs),
        )?;

        Ok(Self {
            client,
            url_template: config.metadata_url.clone(),
            rules: config.watermark_rules.clone(),
            timeout_secs: config.request_timeout_secs,
        })
    }

    /// Fetch metadata for a video id
    pub async fn fetch(&self, video_id: &VideoId) -> Result<VideoMetadata, PipelineError> {
        let url = self
            .url_template
            .replace(VIDEO_ID_PLACEHOLDER, video_id.as_str());

        tracing::debug!(%video_id, %url, "Fetching video metadata");

        let response = self.client.get(&url).send().await.map_err(|e| {
            transport_error(
                e,
                "metadata fetch",
                self.timeout_secs,
                PipelineError::MetadataUnavailable,
            )
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(PipelineError::MetadataUnavailable(format!(
                "HTTP {} from {}",
                status, url
            )));
        }

        let body = response.text().await.map_err(|e| {
            transport_error(
                e,
                "metadata fetch",
                self.timeout_secs,
                PipelineError::MetadataUnavailable,
            )
        })?;

        parse_item(&body)?.into_metadata(video_id, &self.rules)
    }
}

impl AwemeItem {
    /// Convert into metadata, rewriting the play URL to its watermark-free form
    pub fn into_metadata(
        self,
        video_id: &VideoId,
        rules: &[RewriteRule],
    ) -> Result<VideoMetadata, PipelineError> {
        let raw_play_url = first_url(self.video.play_addr.url_list).ok_or_else(|| {
            PipelineError::ParseError("video.play_addr.url_list is empty".to_string())
        })?;

        let title = self
            .desc
            .map(|desc| desc.trim().to_string())
            .filter(|desc| !desc.is_empty())
            .unwrap_or_else(|| format!("douyin_{}", video_id));

        let author = self
            .author
            .and_then(|author| author.nickname)
            .unwrap_or_default();

        let cover_url = self
            .video
            .cover
            .and_then(|cover| first_url(cover.url_list))
            .unwrap_or_default();

        let duration_seconds = self
            .video
            .duration
            .filter(|ms| *ms > 0)
            .map(|ms| ms as f64 / 1000.0);

        Ok(VideoMetadata {
            video_id: video_id.clone(),
            title,
            author,
            cover_url,
            play_url: remove_watermark(&raw_play_url, rules),
            duration_seconds,
        })
    }
}

fn first_url(urls: Vec<String>) -> Option<String> {
    urls.into_iter().find(|url| !url.trim().is_empty())
}

/// Rewrite a watermarked play URL into its watermark-free form.
///
/// Rules are applied in order. This is the single place the platform-specific rewrite lives,
/// so an upstream change only needs new rules in the configuration.
pub fn remove_watermark(play_url: &str, rules: &[RewriteRule]) -> String {
    rules
        .iter()
        .filter(|rule| !rule.find.is_empty())
        .fold(play_url.to_string(), |url, rule| {
            url.replace(&rule.find, &rule.replace)
        })
}

/// Decode the first item of a metadata response (JSON document or share page HTML)
pub fn parse_item(body: &str) -> Result<AwemeItem, PipelineError> {
    let document = locate_json(body)?;

    let value: serde_json::Value = serde_json::from_str(document)
        .map_err(|e| PipelineError::ParseError(format!("invalid JSON: {}", e)))?;

    let info = if value.get("loaderData").is_some() {
        video_info_from_router(value)?
    } else {
        VideoInfoRes::deserialize(&value).map_err(|e| PipelineError::ParseError(e.to_string()))?
    };

    info.item_list
        .into_iter()
        .next()
        .ok_or_else(|| PipelineError::ParseError("item_list is empty".to_string()))
}

fn video_info_from_router(value: serde_json::Value) -> Result<VideoInfoRes, PipelineError> {
    let router: RouterData =
        serde_json::from_value(value).map_err(|e| PipelineError::ParseError(e.to_string()))?;

    for key in PAGE_KEYS {
        if let Some(page) = router.loader_data.get(*key) {
            let page = PageData::deserialize(page)
                .map_err(|e| PipelineError::ParseError(format!("{}: {}", key, e)))?;
            if let Some(info) = page.video_info_res {
                return Ok(info);
            }
        }
    }

    Err(PipelineError::ParseError(
        "loaderData has no video or note page".to_string(),
    ))
}

/// Slice the JSON document out of a response body
fn locate_json(body: &str) -> Result<&str, PipelineError> {
    let trimmed = body.trim();
    if trimmed.starts_with('{') {
        return Ok(trimmed);
    }

    let start = body.find(ROUTER_DATA_MARKER).ok_or_else(|| {
        PipelineError::ParseError(format!("page does not embed {}", ROUTER_DATA_MARKER))
    })?;

    let assignment = body[start + ROUTER_DATA_MARKER.len()..]
        .trim_start()
        .strip_prefix('=')
        .ok_or_else(|| {
            PipelineError::ParseError(format!("{} is not assigned", ROUTER_DATA_MARKER))
        })?;

    let end = assignment.find("</script>").ok_or_else(|| {
        PipelineError::ParseError(format!("{} script is not terminated", ROUTER_DATA_MARKER))
    })?;

    Ok(assignment[..end].trim().trim_end_matches(';').trim_end())
}
