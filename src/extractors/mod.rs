use async_trait::async_trait;
use reqwest::{redirect, Client};
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub mod douyin;
pub mod metadata;
pub mod redirect_resolver;
pub mod share_link;

pub use douyin::DouyinExtractor;
pub use metadata::{remove_watermark, MetadataFetcher};
pub use redirect_resolver::{video_id_from_url, RedirectResolver};
pub use share_link::ShareLinkMatcher;

use crate::config::PlatformConfig;
use crate::PipelineError;

/// Platform-side identifier of a video
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VideoId(String);

impl VideoId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for VideoId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Metadata of a resolved video
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoMetadata {
    pub video_id: VideoId,

    /// Video description, or `douyin_<id>` when the author left it empty
    pub title: String,

    /// Author nickname (empty when the platform omits it)
    pub author: String,

    /// Cover image URL (empty when the platform omits it)
    pub cover_url: String,

    /// Direct, watermark-free play URL
    pub play_url: String,

    /// Duration in seconds if the platform reports one
    pub duration_seconds: Option<f64>,
}

/// Resolution stages for one video platform.
///
/// The orchestrator drives these in order; each one is a failure exit.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MediaExtractor: Send + Sync {
    /// Find the share link embedded in free-form text. Never touches the network.
    fn find_share_link(&self, input: &str) -> Result<String, PipelineError>;

    /// Follow the share link and recover the video id
    async fn resolve_video_id(&self, share_url: &str) -> Result<VideoId, PipelineError>;

    /// Fetch metadata and the watermark-free play URL
    async fn fetch_metadata(&self, video_id: &VideoId) -> Result<VideoMetadata, PipelineError>;

    /// Get the name of this platform
    fn platform_name(&self) -> &'static str;
}

/// Build an HTTP client that talks to the platform with its expected User-Agent
pub(crate) fn platform_client(
    config: &PlatformConfig,
    policy: redirect::Policy,
    timeout: Duration,
) -> crate::Result<Client> {
    let client = Client::builder()
        .user_agent(config.user_agent.as_str())
        .redirect(policy)
        .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
        .timeout(timeout)
        .build()?;

    Ok(client)
}

/// Map a transport error from a platform request onto the pipeline taxonomy
pub(crate) fn transport_error(
    err: reqwest::Error,
    stage: &'static str,
    timeout_secs: u64,
    wrap: fn(String) -> PipelineError,
) -> PipelineError {
    if err.is_timeout() {
        PipelineError::Timeout {
            stage,
            seconds: timeout_secs,
        }
    } else {
        wrap(err.to_string())
    }
}
