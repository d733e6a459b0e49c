use std::io::ErrorKind;
use std::time::Duration;
use tempfile::TempDir;
use tokio::process::Command;

use super::{AudioFormat, AudioPayload};
use crate::PipelineError;

/// Pulls the audio track out of a video container with ffmpeg
#[derive(Debug, Clone)]
pub struct AudioDemuxer {
    ffmpeg_path: String,
    timeout_secs: u64,
}

impl AudioDemuxer {
    pub fn new(ffmpeg_path: impl Into<String>, timeout_secs: u64) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
            timeout_secs,
        }
    }

    /// Convert a payload to mono 16 kHz MP3.
    ///
    /// Without an ffmpeg binary the original container is returned unchanged; both providers
    /// accept MP4 directly, only with a larger upload.
    pub async fn extract_audio(&self, payload: AudioPayload) -> Result<AudioPayload, PipelineError> {
        let temp_dir = TempDir::new().map_err(|e| {
            PipelineError::UnknownFailure(format!("failed to create temporary directory: {}", e))
        })?;

        let input_path = temp_dir
            .path()
            .join(format!("input.{}", payload.format.as_str()));
        let output_path = temp_dir.path().join("audio.mp3");

        tokio::fs::write(&input_path, &payload.data)
            .await
            .map_err(|e| PipelineError::UnknownFailure(format!("failed to stage media: {}", e)))?;

        tracing::debug!("Extracting audio from {} with {}", input_path.display(), self.ffmpeg_path);

        let run = Command::new(&self.ffmpeg_path)
            .args([
                "-hide_banner",
                "-loglevel", "error",
                "-i", &input_path.to_string_lossy(),
                "-vn", // No video
                "-acodec", "libmp3lame",
                "-ab", "64k",
                "-ar", "16000", // Speech models work at 16 kHz
                "-ac", "1",
                "-y",
                &output_path.to_string_lossy(),
            ])
            .kill_on_drop(true)
            .output();

        // Dropping the timed-out future kills the child
        let output = tokio::time::timeout(Duration::from_secs(self.timeout_secs), run)
            .await
            .map_err(|_| PipelineError::Timeout {
                stage: "audio extraction",
                seconds: self.timeout_secs,
            })?;

        let output = match output {
            Ok(output) => output,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::warn!(
                    "{} not found, sending the {} container as is",
                    self.ffmpeg_path,
                    payload.format.as_str()
                );
                return Ok(payload);
            }
            Err(e) => {
                return Err(PipelineError::UnknownFailure(format!(
                    "failed to run {}: {}",
                    self.ffmpeg_path, e
                )))
            }
        };

        if !output.status.success() {
            let error = String::from_utf8_lossy(&output.stderr);
            return Err(PipelineError::UnsupportedFormat(format!(
                "could not extract an audio track: {}",
                error.trim()
            )));
        }

        let data = tokio::fs::read(&output_path).await.map_err(|e| {
            PipelineError::UnknownFailure(format!("failed to read extracted audio: {}", e))
        })?;

        tracing::debug!(
            before = payload.data.len(),
            after = data.len(),
            "Audio track extracted"
        );

        Ok(AudioPayload {
            data,
            format: AudioFormat::Mp3,
            source_url: payload.source_url,
        })
    }
}
