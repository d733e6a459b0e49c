use futures_util::StreamExt;
use reqwest::header::CONTENT_TYPE;
use reqwest::{redirect, Client};
use std::time::Duration;

use super::{AudioDemuxer, AudioFormat, AudioPayload};
use crate::config::{AudioConfig, PlatformConfig};
use crate::utils::{extract_domain, format_file_size};
use crate::PipelineError;

const STAGE: &str = "media download";

/// Downloads media behind a play URL with a hard size ceiling
pub struct AudioDownloader {
    client: Client,
    max_bytes: u64,
    timeout_secs: u64,
    demuxer: Option<AudioDemuxer>,
}

impl AudioDownloader {
    pub fn new(platform: &PlatformConfig, audio: &AudioConfig) -> crate::Result<Self> {
        // CDN play URLs bounce through a few redirects before serving bytes
        let client = Client::builder()
            .user_agent(platform.user_agent.as_str())
            .redirect(redirect::Policy::limited(10))
            .connect_timeout(Duration::from_secs(platform.connect_timeout_secs))
            .timeout(Duration::from_secs(audio.download_timeout_secs))
            .build()?;

        let demuxer = audio
            .extract_audio
            .then(|| AudioDemuxer::new(audio.ffmpeg_path.clone(), audio.demux_timeout_secs));

        Ok(Self {
            client,
            max_bytes: audio.max_bytes,
            timeout_secs: audio.download_timeout_secs,
            demuxer,
        })
    }

    /// Download the play URL and package it for transcription.
    ///
    /// When `demux` is set and the media is a video container, the audio track is extracted.
    pub async fn acquire(&self, play_url: &str, demux: bool) -> Result<AudioPayload, PipelineError> {
        let (data, content_type) = self.download(play_url).await?;

        let format = AudioFormat::detect(&data, content_type.as_deref(), play_url).ok_or_else(|| {
            PipelineError::UnsupportedFormat(format!(
                "unrecognized media (content type {})",
                content_type.as_deref().unwrap_or("unknown")
            ))
        })?;

        tracing::info!(
            format = format.as_str(),
            size = %format_file_size(data.len() as u64),
            "Media downloaded"
        );

        let payload = AudioPayload {
            data,
            format,
            source_url: play_url.to_string(),
        };

        match &self.demuxer {
            Some(demuxer) if demux && format.is_video_container() => {
                demuxer.extract_audio(payload).await
            }
            _ => Ok(payload),
        }
    }

    /// Download a URL into memory, rejecting bodies larger than the configured ceiling.
    ///
    /// Returns the body and its `Content-Type`.
    pub async fn download(&self, url: &str) -> Result<(Vec<u8>, Option<String>), PipelineError> {
        tracing::debug!(
            host = extract_domain(url).as_deref().unwrap_or("unknown"),
            "Downloading media"
        );

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| self.map_transport(e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PipelineError::DownloadFailed(format!("HTTP {}", status)));
        }

        if let Some(length) = response.content_length() {
            if length > self.max_bytes {
                return Err(PipelineError::SizeLimitExceeded {
                    limit: self.max_bytes,
                });
            }
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|ct| ct.to_str().ok())
            .map(|s| s.to_string());

        let capacity = response.content_length().unwrap_or(0) as usize;
        let mut data = Vec::with_capacity(capacity);
        let mut stream = response.bytes_stream();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| self.map_transport(e))?;
            if data.len() as u64 + chunk.len() as u64 > self.max_bytes {
                return Err(PipelineError::SizeLimitExceeded {
                    limit: self.max_bytes,
                });
            }
            data.extend_from_slice(&chunk);
        }

        if data.is_empty() {
            return Err(PipelineError::DownloadFailed(
                "empty response body".to_string(),
            ));
        }

        Ok((data, content_type))
    }

    fn map_transport(&self, err: reqwest::Error) -> PipelineError {
        if err.is_timeout() {
            PipelineError::Timeout {
                stage: STAGE,
                seconds: self.timeout_secs,
            }
        } else {
            PipelineError::DownloadFailed(err.to_string())
        }
    }
}
