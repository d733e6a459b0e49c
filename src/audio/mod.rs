use serde::{Deserialize, Serialize};
use std::path::Path;
use url::Url;

pub mod demux;
pub mod download;

pub use demux::AudioDemuxer;
pub use download::AudioDownloader;

/// Media formats accepted by the transcription providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AudioFormat {
    Mp3,
    M4a,
    Mp4,
    Wav,
    Flac,
    Ogg,
    Webm,
}

impl AudioFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            AudioFormat::Mp3 => "mp3",
            AudioFormat::M4a => "m4a",
            AudioFormat::Mp4 => "mp4",
            AudioFormat::Wav => "wav",
            AudioFormat::Flac => "flac",
            AudioFormat::Ogg => "ogg",
            AudioFormat::Webm => "webm",
        }
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "mp3" => Some(AudioFormat::Mp3),
            "m4a" | "aac" => Some(AudioFormat::M4a),
            "mp4" | "m4v" | "mov" => Some(AudioFormat::Mp4),
            "wav" => Some(AudioFormat::Wav),
            "flac" => Some(AudioFormat::Flac),
            "ogg" | "opus" => Some(AudioFormat::Ogg),
            "webm" => Some(AudioFormat::Webm),
            _ => None,
        }
    }

    /// Map a `Content-Type` header value onto a format.
    ///
    /// Only the MIME essence is compared, so playlist types such as `application/x-mpegURL`
    /// are not mistaken for MPEG audio.
    pub fn from_content_type(content_type: &str) -> Option<Self> {
        let essence = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();

        match essence.as_str() {
            "audio/mpeg" | "audio/mp3" | "audio/mpeg3" | "audio/x-mpeg" | "audio/x-mp3" => {
                Some(AudioFormat::Mp3)
            }
            "video/mp4" | "video/quicktime" | "video/x-m4v" => Some(AudioFormat::Mp4),
            "audio/mp4" | "audio/m4a" | "audio/x-m4a" | "audio/aac" | "audio/x-aac" => {
                Some(AudioFormat::M4a)
            }
            "audio/wav" | "audio/x-wav" | "audio/wave" | "audio/vnd.wave" => Some(AudioFormat::Wav),
            "audio/flac" | "audio/x-flac" => Some(AudioFormat::Flac),
            "audio/ogg" | "audio/opus" | "application/ogg" | "video/ogg" => Some(AudioFormat::Ogg),
            "audio/webm" | "video/webm" => Some(AudioFormat::Webm),
            _ => None,
        }
    }

    /// Recognize a format from its leading bytes
    pub fn sniff(data: &[u8]) -> Option<Self> {
        match data {
            [b'I', b'D', b'3', ..] => Some(AudioFormat::Mp3),
            [0xFF, second, ..] if second & 0xE0 == 0xE0 => Some(AudioFormat::Mp3),
            [_, _, _, _, b'f', b't', b'y', b'p', brand @ ..] => {
                if brand.starts_with(b"M4A") || brand.starts_with(b"M4B") {
                    Some(AudioFormat::M4a)
                } else {
                    Some(AudioFormat::Mp4)
                }
            }
            [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'A', b'V', b'E', ..] => {
                Some(AudioFormat::Wav)
            }
            [b'f', b'L', b'a', b'C', ..] => Some(AudioFormat::Flac),
            [b'O', b'g', b'g', b'S', ..] => Some(AudioFormat::Ogg),
            [0x1A, 0x45, 0xDF, 0xA3, ..] => Some(AudioFormat::Webm),
            _ => None,
        }
    }

    /// Determine the format from content, then headers, then URL extension
    pub fn detect(data: &[u8], content_type: Option<&str>, url: &str) -> Option<Self> {
        Self::sniff(data)
            .or_else(|| content_type.and_then(Self::from_content_type))
            .or_else(|| {
                Url::parse(url)
                    .ok()?
                    .path_segments()?
                    .next_back()
                    .and_then(|filename| Path::new(filename).extension())
                    .and_then(|ext| Self::from_extension(&ext.to_string_lossy()))
            })
    }

    /// Get MIME type for the format
    pub fn mime_type(&self) -> &'static str {
        match self {
            AudioFormat::Mp3 => "audio/mpeg",
            AudioFormat::M4a => "audio/mp4",
            AudioFormat::Mp4 => "video/mp4",
            AudioFormat::Wav => "audio/wav",
            AudioFormat::Flac => "audio/flac",
            AudioFormat::Ogg => "audio/ogg",
            AudioFormat::Webm => "video/webm",
        }
    }

    /// Containers that usually carry a video track next to the audio
    pub fn is_video_container(&self) -> bool {
        matches!(self, AudioFormat::Mp4 | AudioFormat::Webm)
    }
}

/// Media bytes ready for a speech-recognition provider.
///
/// Lives for a single tool invocation and is consumed by exactly one transcription call.
#[derive(Debug, Clone)]
pub struct AudioPayload {
    pub data: Vec<u8>,
    pub format: AudioFormat,
    /// Remote location the bytes were downloaded from
    pub source_url: String,
}

impl AudioPayload {
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// File name to announce in multipart uploads
    pub fn file_name(&self) -> String {
        format!("audio.{}", self.format.as_str())
    }
}
