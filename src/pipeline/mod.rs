use futures_util::FutureExt;
use serde::Serialize;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tracing::Instrument;
use uuid::Uuid;

use crate::audio::{AudioDownloader, AudioFormat};
use crate::config::{Config, TranscriptionConfig};
use crate::extractors::{DouyinExtractor, MediaExtractor, VideoMetadata};
use crate::transcribe::{build_recognizer, ApiKey, SpeechRecognizer};
use crate::PipelineError;

/// Context attached to every failed link resolution
pub const LINK_FAILURE_MESSAGE: &str = "获取下载链接失败";

/// Result of the `get_download_link` tool
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum LinkToolResult {
    Success(VideoMetadata),
    Failure { error: String, message: String },
}

impl LinkToolResult {
    fn failure(err: &PipelineError) -> Self {
        LinkToolResult::Failure {
            error: err.to_string(),
            message: LINK_FAILURE_MESSAGE.to_string(),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, LinkToolResult::Failure { .. })
    }
}

/// Share link resolution and transcription pipeline.
///
/// Holds only immutable configuration and HTTP client handles, so one instance serves any
/// number of concurrent tool invocations.
pub struct Pipeline {
    extractor: Arc<dyn MediaExtractor>,
    downloader: AudioDownloader,
    recognizer: Arc<dyn SpeechRecognizer>,
    transcription: TranscriptionConfig,
}

impl Pipeline {
    /// Create the pipeline described by the configuration
    pub fn new(config: &Config) -> crate::Result<Self> {
        let extractor = Arc::new(DouyinExtractor::new(&config.platform)?);
        let downloader = AudioDownloader::new(&config.platform, &config.audio)?;
        let recognizer = build_recognizer(&config.transcription)?;

        Ok(Self::with_components(
            extractor,
            downloader,
            recognizer,
            config.transcription.clone(),
        ))
    }

    /// Assemble a pipeline from explicit components
    pub fn with_components(
        extractor: Arc<dyn MediaExtractor>,
        downloader: AudioDownloader,
        recognizer: Arc<dyn SpeechRecognizer>,
        transcription: TranscriptionConfig,
    ) -> Self {
        Self {
            extractor,
            downloader,
            recognizer,
            transcription,
        }
    }

    /// Share text -> share link -> video id -> metadata
    pub async fn resolve(&self, share_text: &str) -> Result<VideoMetadata, PipelineError> {
        let share_url = self.extractor.find_share_link(share_text)?;
        tracing::info!(
            platform = self.extractor.platform_name(),
            %share_url,
            "Share link found"
        );

        let video_id = self.extractor.resolve_video_id(&share_url).await?;
        tracing::info!(%video_id, "Share link resolved");

        let metadata = self.extractor.fetch_metadata(&video_id).await?;
        tracing::debug!(title = %metadata.title, author = %metadata.author, "Metadata fetched");

        Ok(metadata)
    }

    /// Resolve, download and transcribe
    pub async fn transcribe(
        &self,
        share_text: &str,
        model: &str,
        api_key: &ApiKey,
    ) -> Result<String, PipelineError> {
        let metadata = self.resolve(share_text).await?;

        let payload = self
            .downloader
            .acquire(&metadata.play_url, self.recognizer.needs_audio_bytes())
            .await?;

        tracing::info!(
            provider = self.recognizer.provider_name(),
            model,
            video_id = %metadata.video_id,
            "Submitting audio for transcription"
        );

        self.recognizer.transcribe(payload, model, api_key).await
    }

    /// Download the media behind a play URL, e.g. to save the clean video locally
    pub async fn download_media(
        &self,
        play_url: &str,
    ) -> Result<(Vec<u8>, Option<AudioFormat>), PipelineError> {
        let (data, content_type) = self.downloader.download(play_url).await?;
        let format = AudioFormat::detect(&data, content_type.as_deref(), play_url);
        Ok((data, format))
    }

    /// `get_download_link` tool: metadata, or `{ error, message }`
    pub async fn get_download_link(&self, share_link: &str) -> LinkToolResult {
        let span = tracing::info_span!("get_download_link", invocation_id = %Uuid::new_v4());

        async {
            let start = Instant::now();
            match guarded(self.resolve(share_link)).await {
                Ok(metadata) => {
                    tracing::info!(
                        video_id = %metadata.video_id,
                        elapsed_ms = start.elapsed().as_millis() as u64,
                        "Download link resolved"
                    );
                    LinkToolResult::Success(metadata)
                }
                Err(err) => {
                    tracing::warn!(kind = err.kind(), error = %err, "Download link resolution failed");
                    LinkToolResult::failure(&err)
                }
            }
        }
        .instrument(span)
        .await
    }

    /// `extract_text` tool: the transcript, or a message starting with the error marker.
    ///
    /// The credential is checked before anything touches the network.
    pub async fn extract_text(&self, share_link: &str, model: Option<&str>) -> String {
        let span = tracing::info_span!("extract_text", invocation_id = %Uuid::new_v4());

        async {
            let Some(api_key) = self.transcription.resolve_api_key() else {
                let err = PipelineError::MissingCredential {
                    env: self.transcription.api_key_env.clone(),
                };
                tracing::warn!(kind = err.kind(), "Text extraction refused");
                return err.to_tool_text();
            };

            let model = model
                .map(str::trim)
                .filter(|model| !model.is_empty())
                .unwrap_or(self.transcription.default_model.as_str());

            let start = Instant::now();
            match guarded(self.transcribe(share_link, model, &api_key)).await {
                Ok(text) => {
                    tracing::info!(
                        chars = text.chars().count(),
                        elapsed_ms = start.elapsed().as_millis() as u64,
                        "Text extracted"
                    );
                    text
                }
                Err(err) => {
                    tracing::warn!(kind = err.kind(), error = %err, "Text extraction failed");
                    err.to_tool_text()
                }
            }
        }
        .instrument(span)
        .await
    }

    /// Model used when a caller does not pick one
    pub fn default_model(&self) -> &str {
        &self.transcription.default_model
    }
}

/// Turn a panic inside a stage into `UnknownFailure` so it never crosses the tool boundary
async fn guarded<T, F>(stage: F) -> Result<T, PipelineError>
where
    F: std::future::Future<Output = Result<T, PipelineError>>,
{
    match AssertUnwindSafe(stage).catch_unwind().await {
        Ok(result) => result,
        Err(panic) => {
            let detail = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "stage panicked".to_string());
            Err(PipelineError::UnknownFailure(detail))
        }
    }
}
