use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tokio::time::sleep;

use super::{
    join_transcripts, provider_client, transport_error, with_deadline, ApiKey, ProviderErrorBody,
    SpeechRecognizer,
};
use crate::audio::AudioPayload;
use crate::config::TranscriptionConfig;
use crate::PipelineError;

const SUBMIT_PATH: &str = "/api/v1/services/audio/asr/transcription";
const TASKS_PATH: &str = "/api/v1/tasks";

#[derive(Debug, Serialize)]
struct SubmitRequest<'a> {
    model: &'a str,
    input: SubmitInput<'a>,
    #[serde(skip_serializing_if = "Option::is_none")]
    parameters: Option<SubmitParameters<'a>>,
}

#[derive(Debug, Serialize)]
struct SubmitInput<'a> {
    file_urls: Vec<&'a str>,
}

#[derive(Debug, Serialize)]
struct SubmitParameters<'a> {
    language_hints: &'a [String],
}

/// Envelope of submit and task-query responses
#[derive(Debug, Deserialize)]
struct TaskEnvelope {
    #[serde(default)]
    output: Option<TaskOutput>,
}

#[derive(Debug, Deserialize)]
struct TaskOutput {
    task_id: String,
    task_status: TaskStatus,
    #[serde(default)]
    results: Vec<SubtaskResult>,
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
enum TaskStatus {
    Pending,
    Running,
    Suspended,
    Succeeded,
    Failed,
    Canceled,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Deserialize)]
struct SubtaskResult {
    #[serde(default)]
    transcription_url: Option<String>,
    #[serde(default)]
    subtask_status: Option<String>,
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// Result file referenced by `transcription_url`
#[derive(Debug, Deserialize)]
struct TranscriptionDocument {
    #[serde(default)]
    transcripts: Vec<TranscriptChannel>,
}

#[derive(Debug, Deserialize)]
struct TranscriptChannel {
    #[serde(default)]
    text: String,
}

/// DashScope file transcription (paraformer family).
///
/// The service fetches the media itself from `source_url`, so the downloaded bytes are only
/// used to validate the media before a job is created.
pub struct DashScopeRecognizer {
    client: Client,
    base_url: String,
    language_hints: Vec<String>,
    timeout_secs: u64,
    poll_interval: Duration,
    max_poll_interval: Duration,
}

impl DashScopeRecognizer {
    pub fn new(config: &TranscriptionConfig) -> crate::Result<Self> {
        Ok(Self {
            client: provider_client(config.timeout_secs)?,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            language_hints: config.language_hints.clone(),
            timeout_secs: config.timeout_secs,
            poll_interval: Duration::from_millis(config.poll_interval_ms.max(1)),
            max_poll_interval: Duration::from_millis(
                config.max_poll_interval_ms.max(config.poll_interval_ms.max(1)),
            ),
        })
    }

    /// Create a transcription task and return its id
    async fn submit(&self, file_url: &str, model: &str, api_key: &ApiKey) -> Result<String, PipelineError> {
        let request = SubmitRequest {
            model,
            input: SubmitInput {
                file_urls: vec![file_url],
            },
            parameters: (!self.language_hints.is_empty()).then(|| SubmitParameters {
                language_hints: &self.language_hints,
            }),
        };

        let response = self
            .client
            .post(format!("{}{}", self.base_url, SUBMIT_PATH))
            .bearer_auth(api_key.expose())
            .header("X-DashScope-Async", "enable")
            .json(&request)
            .send()
            .await
            .map_err(|e| transport_error(e, self.timeout_secs))?;

        let output = self.read_task(response).await?;
        tracing::info!(task_id = %output.task_id, model, "Transcription task submitted");

        Ok(output.task_id)
    }

    /// Poll the task until it leaves the queue, backing off between checks
    async fn wait_for_completion(&self, task_id: &str, api_key: &ApiKey) -> Result<TaskOutput, PipelineError> {
        let start_time = Instant::now();
        let mut check_count: u32 = 0;

        loop {
            check_count += 1;

            let response = self
                .client
                .get(format!("{}{}/{}", self.base_url, TASKS_PATH, task_id))
                .bearer_auth(api_key.expose())
                .send()
                .await
                .map_err(|e| transport_error(e, self.timeout_secs))?;

            let output = self.read_task(response).await?;

            match output.task_status {
                TaskStatus::Pending | TaskStatus::Running | TaskStatus::Suspended => {
                    tracing::debug!(
                        task_id,
                        status = ?output.task_status,
                        elapsed_secs = start_time.elapsed().as_secs(),
                        check_count,
                        "Transcription in progress"
                    );

                    // Linear back-off, capped
                    let wait_time = self
                        .poll_interval
                        .saturating_mul(check_count)
                        .min(self.max_poll_interval);
                    sleep(wait_time).await;
                }
                TaskStatus::Succeeded => {
                    tracing::info!(
                        task_id,
                        elapsed_secs = start_time.elapsed().as_secs(),
                        "Transcription completed"
                    );
                    return Ok(output);
                }
                TaskStatus::Failed | TaskStatus::Canceled | TaskStatus::Unknown => {
                    return Err(PipelineError::ProviderError(format!(
                        "task {} ended as {:?}: {}",
                        task_id,
                        output.task_status,
                        describe(output.code.as_deref(), output.message.as_deref())
                    )));
                }
            }
        }
    }

    /// Download every result file and join their transcripts
    async fn collect_transcripts(&self, output: TaskOutput) -> Result<String, PipelineError> {
        let mut fragments = Vec::new();

        for result in output.results {
            if result
                .subtask_status
                .as_deref()
                .is_some_and(|status| status != "SUCCEEDED")
            {
                return Err(PipelineError::ProviderError(format!(
                    "subtask failed: {}",
                    describe(result.code.as_deref(), result.message.as_deref())
                )));
            }

            let Some(url) = result.transcription_url else {
                continue;
            };

            let response = self
                .client
                .get(&url)
                .send()
                .await
                .map_err(|e| transport_error(e, self.timeout_secs))?;

            let status = response.status();
            if !status.is_success() {
                return Err(PipelineError::ProviderError(format!(
                    "failed to download transcription result: HTTP {}",
                    status
                )));
            }

            let document: TranscriptionDocument = response.json().await.map_err(|e| {
                PipelineError::ProviderError(format!("invalid transcription result: {}", e))
            })?;

            fragments.extend(document.transcripts.into_iter().map(|channel| channel.text));
        }

        join_transcripts(fragments)
    }

    async fn read_task(&self, response: reqwest::Response) -> Result<TaskOutput, PipelineError> {
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| transport_error(e, self.timeout_secs))?;

        if !status.is_success() {
            return Err(ProviderErrorBody::describe(status, &body));
        }

        let envelope: TaskEnvelope = serde_json::from_str(&body)
            .map_err(|e| PipelineError::ProviderError(format!("invalid task response: {}", e)))?;

        envelope
            .output
            .ok_or_else(|| PipelineError::ProviderError("task response has no output".to_string()))
    }

    async fn run(&self, audio: AudioPayload, model: &str, api_key: &ApiKey) -> Result<String, PipelineError> {
        let task_id = self.submit(&audio.source_url, model, api_key).await?;
        let output = self.wait_for_completion(&task_id, api_key).await?;
        self.collect_transcripts(output).await
    }
}

fn describe(code: Option<&str>, message: Option<&str>) -> String {
    match (code, message) {
        (Some(code), Some(message)) => format!("{}: {}", code, message),
        (Some(code), None) => code.to_string(),
        (None, Some(message)) => message.to_string(),
        (None, None) => "Unknown error".to_string(),
    }
}

#[async_trait]
impl SpeechRecognizer for DashScopeRecognizer {
    async fn transcribe(
        &self,
        audio: AudioPayload,
        model: &str,
        api_key: &ApiKey,
    ) -> Result<String, PipelineError> {
        with_deadline(self.timeout_secs, self.run(audio, model, api_key)).await
    }

    fn needs_audio_bytes(&self) -> bool {
        false
    }

    fn provider_name(&self) -> &'static str {
        "DashScope"
    }
}
