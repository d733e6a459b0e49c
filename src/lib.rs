//! Douyin MCP - resolve Douyin share links and transcribe their audio
//!
//! This library turns an opaque share blob (the text the Douyin app copies to the clipboard)
//! into a watermark-free video URL plus metadata, and optionally into the spoken transcript
//! of that video using a third-party speech-recognition service. The same pipeline is exposed
//! as two tools over an HTTP tool-calling endpoint and as a small CLI.

pub mod audio;
pub mod cli;
pub mod config;
pub mod extractors;
pub mod output;
pub mod pipeline;
pub mod server;
pub mod transcribe;
pub mod utils;

pub use cli::{Cli, Commands, OutputFormat};
pub use config::Config;
pub use extractors::{MediaExtractor, VideoId, VideoMetadata};
pub use pipeline::{LinkToolResult, Pipeline};
pub use transcribe::{ApiKey, SpeechRecognizer};

/// Result type used by the binary and configuration code
pub type Result<T> = anyhow::Result<T>;

/// Marker every failed `extract_text` result starts with
pub const ERROR_PREFIX: &str = "错误：";

/// Failures of the resolution and transcription pipeline.
///
/// Every stage returns one of these; the orchestrator maps them onto the tool-facing
/// result shapes and never lets one escape as a fault.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum PipelineError {
    #[error("no Douyin share link found in input")]
    NoLinkFound,

    #[error("failed to follow share link redirect: {0}")]
    RedirectFailed(String),

    #[error("share link did not redirect: {0}")]
    NoRedirect(String),

    #[error("no video id found in resolved URL: {0}")]
    IdNotFound(String),

    #[error("video metadata unavailable: {0}")]
    MetadataUnavailable(String),

    #[error("unexpected metadata response: {0}")]
    ParseError(String),

    #[error("media download failed: {0}")]
    DownloadFailed(String),

    #[error("media exceeds the {limit} byte limit")]
    SizeLimitExceeded { limit: u64 },

    #[error("unsupported media format: {0}")]
    UnsupportedFormat(String),

    #[error("{env} is not set; configure a speech-recognition API key before extracting text")]
    MissingCredential { env: String },

    #[error("speech recognition failed: {0}")]
    ProviderError(String),

    #[error("{stage} timed out after {seconds}s")]
    Timeout { stage: &'static str, seconds: u64 },

    #[error("unexpected failure: {0}")]
    UnknownFailure(String),
}

impl PipelineError {
    /// Stable name of the error kind, used as a structured log field
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::NoLinkFound => "no_link_found",
            PipelineError::RedirectFailed(_) => "redirect_failed",
            PipelineError::NoRedirect(_) => "no_redirect",
            PipelineError::IdNotFound(_) => "id_not_found",
            PipelineError::MetadataUnavailable(_) => "metadata_unavailable",
            PipelineError::ParseError(_) => "parse_error",
            PipelineError::DownloadFailed(_) => "download_failed",
            PipelineError::SizeLimitExceeded { .. } => "size_limit_exceeded",
            PipelineError::UnsupportedFormat(_) => "unsupported_format",
            PipelineError::MissingCredential { .. } => "missing_credential",
            PipelineError::ProviderError(_) => "provider_error",
            PipelineError::Timeout { .. } => "timeout",
            PipelineError::UnknownFailure(_) => "unknown_failure",
        }
    }

    /// Render the error the way the text tool reports it
    pub fn to_tool_text(&self) -> String {
        format!("{}{}", ERROR_PREFIX, self)
    }
}
