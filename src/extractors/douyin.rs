use anyhow::Context;
use async_trait::async_trait;

use super::{
    MediaExtractor, MetadataFetcher, RedirectResolver, ShareLinkMatcher, VideoId, VideoMetadata,
};
use crate::config::PlatformConfig;
use crate::PipelineError;

/// Douyin extractor: share text -> short link -> video id -> metadata
pub struct DouyinExtractor {
    matcher: ShareLinkMatcher,
    resolver: RedirectResolver,
    fetcher: MetadataFetcher,
}

impl DouyinExtractor {
    pub fn new(config: &PlatformConfig) -> crate::Result<Self> {
        let matcher = ShareLinkMatcher::new(&config.share_link_pattern)
            .context("Invalid share link pattern")?;

        Ok(Self {
            matcher,
            resolver: RedirectResolver::new(config).context("Failed to build redirect client")?,
            fetcher: MetadataFetcher::new(config).context("Failed to build metadata client")?,
        })
    }
}

#[async_trait]
impl MediaExtractor for DouyinExtractor {
    fn find_share_link(&self, input: &str) -> Result<String, PipelineError> {
        self.matcher.find(input)
    }

    async fn resolve_video_id(&self, share_url: &str) -> Result<VideoId, PipelineError> {
        self.resolver.resolve(share_url).await
    }

    async fn fetch_metadata(&self, video_id: &VideoId) -> Result<VideoMetadata, PipelineError> {
        self.fetcher.fetch(video_id).await
    }

    fn platform_name(&self) -> &'static str {
        "Douyin"
    }
}
