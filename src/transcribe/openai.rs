use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::Deserialize;

use super::{
    join_transcripts, provider_client, transport_error, with_deadline, ApiKey, ProviderErrorBody,
    SpeechRecognizer,
};
use crate::audio::AudioPayload;
use crate::config::TranscriptionConfig;
use crate::PipelineError;

const TRANSCRIPTIONS_PATH: &str = "/v1/audio/transcriptions";

#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    #[serde(default)]
    text: String,
}

/// Recognizer for services exposing the `/v1/audio/transcriptions` upload API
pub struct OpenAiCompatibleRecognizer {
    client: Client,
    endpoint: String,
    language: Option<String>,
    timeout_secs: u64,
}

impl OpenAiCompatibleRecognizer {
    pub fn new(config: &TranscriptionConfig) -> crate::Result<Self> {
        Ok(Self {
            client: provider_client(config.timeout_secs)?,
            endpoint: format!(
                "{}{}",
                config.base_url.trim_end_matches('/'),
                TRANSCRIPTIONS_PATH
            ),
            // The upload API takes a single language; the first hint is the primary one
            language: config.language_hints.first().cloned(),
            timeout_secs: config.timeout_secs,
        })
    }

    async fn run(&self, audio: AudioPayload, model: &str, api_key: &ApiKey) -> Result<String, PipelineError> {
        let file_name = audio.file_name();
        let size = audio.len();

        let part = Part::bytes(audio.data)
            .file_name(file_name)
            .mime_str(audio.format.mime_type())
            .map_err(|e| PipelineError::UnknownFailure(format!("invalid MIME type: {}", e)))?;

        let mut form = Form::new()
            .text("model", model.to_string())
            .text("response_format", "json")
            .part("file", part);

        if let Some(language) = &self.language {
            form = form.text("language", language.clone());
        }

        tracing::info!(model, size, format = audio.format.as_str(), "Uploading audio for transcription");

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(api_key.expose())
            .multipart(form)
            .send()
            .await
            .map_err(|e| transport_error(e, self.timeout_secs))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| transport_error(e, self.timeout_secs))?;

        if !status.is_success() {
            return Err(ProviderErrorBody::describe(status, &body));
        }

        let parsed: TranscriptionResponse = serde_json::from_str(&body).map_err(|e| {
            PipelineError::ProviderError(format!("invalid transcription response: {}", e))
        })?;

        join_transcripts([parsed.text])
    }
}

#[async_trait]
impl SpeechRecognizer for OpenAiCompatibleRecognizer {
    async fn transcribe(
        &self,
        audio: AudioPayload,
        model: &str,
        api_key: &ApiKey,
    ) -> Result<String, PipelineError> {
        with_deadline(self.timeout_secs, self.run(audio, model, api_key)).await
    }

    fn provider_name(&self) -> &'static str {
        "OpenAI-compatible"
    }
}
