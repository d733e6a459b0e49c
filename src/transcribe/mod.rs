use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

pub mod dashscope;
pub mod openai;

pub use dashscope::DashScopeRecognizer;
pub use openai::OpenAiCompatibleRecognizer;

use crate::audio::AudioPayload;
use crate::config::{TranscriptionConfig, TranscriptionProvider};
use crate::PipelineError;

const STAGE: &str = "transcription";

/// Credential for the speech-recognition provider. Never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ApiKey(***)")
    }
}

/// A speech-to-text service
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SpeechRecognizer: Send + Sync {
    /// Transcribe the payload with the given model, returning plain text
    async fn transcribe(
        &self,
        audio: AudioPayload,
        model: &str,
        api_key: &ApiKey,
    ) -> Result<String, PipelineError>;

    /// Whether the provider uploads `audio.data`; URL-based providers only read `source_url`
    fn needs_audio_bytes(&self) -> bool {
        true
    }

    /// Get the name of this provider
    fn provider_name(&self) -> &'static str;
}

/// Build the recognizer selected in the configuration
pub fn build_recognizer(config: &TranscriptionConfig) -> crate::Result<Arc<dyn SpeechRecognizer>> {
    let recognizer: Arc<dyn SpeechRecognizer> = match config.provider {
        TranscriptionProvider::Dashscope => Arc::new(DashScopeRecognizer::new(config)?),
        TranscriptionProvider::OpenaiCompatible => {
            Arc::new(OpenAiCompatibleRecognizer::new(config)?)
        }
    };

    Ok(recognizer)
}

/// HTTP client for provider calls; each request is bounded by the overall deadline
pub(crate) fn provider_client(timeout_secs: u64) -> crate::Result<Client> {
    let client = Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .timeout(Duration::from_secs(timeout_secs))
        .build()?;

    Ok(client)
}

/// Run a whole recognition call under one deadline
pub(crate) async fn with_deadline<F>(timeout_secs: u64, call: F) -> Result<String, PipelineError>
where
    F: Future<Output = Result<String, PipelineError>>,
{
    tokio::time::timeout(Duration::from_secs(timeout_secs), call)
        .await
        .map_err(|_| PipelineError::Timeout {
            stage: STAGE,
            seconds: timeout_secs,
        })?
}

/// Transport failures are reported apart from provider-side errors
pub(crate) fn transport_error(err: reqwest::Error, timeout_secs: u64) -> PipelineError {
    if err.is_timeout() {
        PipelineError::Timeout {
            stage: STAGE,
            seconds: timeout_secs,
        }
    } else {
        PipelineError::ProviderError(format!("network error: {}", err))
    }
}

/// Error body shapes used by the supported providers
#[derive(Debug, Default, Deserialize)]
pub(crate) struct ProviderErrorBody {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<NestedError>,
}

#[derive(Debug, Default, Deserialize)]
struct NestedError {
    #[serde(default)]
    code: Option<serde_json::Value>,
    #[serde(default)]
    message: Option<String>,
}

impl ProviderErrorBody {
    /// Describe a non-success response from its status and body
    pub(crate) fn describe(status: reqwest::StatusCode, body: &str) -> PipelineError {
        let parsed: ProviderErrorBody = serde_json::from_str(body).unwrap_or_default();

        let nested = parsed.error.unwrap_or_default();
        let code = parsed.code.or_else(|| {
            nested.code.map(|code| match code {
                serde_json::Value::String(code) => code,
                other => other.to_string(),
            })
        });
        let message = parsed.message.or(nested.message).unwrap_or_else(|| {
            let trimmed = body.trim();
            if trimmed.is_empty() {
                "no details".to_string()
            } else {
                trimmed.chars().take(200).collect()
            }
        });

        match code {
            Some(code) => PipelineError::ProviderError(format!(
                "{} (HTTP {}): {}",
                code,
                status.as_u16(),
                message
            )),
            None => PipelineError::ProviderError(format!("HTTP {}: {}", status.as_u16(), message)),
        }
    }
}

/// Join non-empty transcript fragments, failing when nothing was recognized
pub(crate) fn join_transcripts<I>(fragments: I) -> Result<String, PipelineError>
where
    I: IntoIterator<Item = String>,
{
    let text = fragments
        .into_iter()
        .map(|fragment| fragment.trim().to_string())
        .filter(|fragment| !fragment.is_empty())
        .collect::<Vec<_>>()
        .join("\n");

    if text.is_empty() {
        Err(PipelineError::ProviderError(
            "provider returned an empty transcript".to_string(),
        ))
    } else {
        Ok(text)
    }
}
