//! In-process stand-ins for the share-link host, the share page, the media CDN and both
//! speech recognition providers.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use douyin_mcp::config::{Config, TranscriptionProvider};

pub const VIDEO_ID: &str = "7312345678901234567";
pub const API_KEY: &str = "test-key";

/// Smallest body the format sniffer accepts as MP4
pub const MP4_BYTES: &[u8] = b"\x00\x00\x00\x18ftypisom\x00\x00\x02\x00isomiso2mp41moov";

#[derive(Default)]
pub struct Hits {
    pub share: AtomicUsize,
    pub metadata: AtomicUsize,
    pub media: AtomicUsize,
    pub openai: AtomicUsize,
    pub submit: AtomicUsize,
    pub tasks: AtomicUsize,
    pub results: AtomicUsize,
}

impl Hits {
    pub fn total(&self) -> usize {
        [
            &self.share,
            &self.metadata,
            &self.media,
            &self.openai,
            &self.submit,
            &self.tasks,
            &self.results,
        ]
        .iter()
        .map(|counter| counter.load(Ordering::SeqCst))
        .sum()
    }
}

#[derive(Clone)]
struct UpstreamState {
    base: String,
    transcript: Arc<String>,
    hits: Arc<Hits>,
    submitted: Arc<Mutex<Vec<Value>>>,
}

pub struct MockUpstream {
    pub base: String,
    pub hits: Arc<Hits>,
    pub submitted: Arc<Mutex<Vec<Value>>>,
    handle: JoinHandle<()>,
}

impl Drop for MockUpstream {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

impl MockUpstream {
    pub async fn start() -> Self {
        Self::with_transcript("hello world").await
    }

    pub async fn with_transcript(transcript: &str) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());

        let hits = Arc::new(Hits::default());
        let submitted = Arc::new(Mutex::new(Vec::new()));
        let state = UpstreamState {
            base: base.clone(),
            transcript: Arc::new(transcript.to_string()),
            hits: hits.clone(),
            submitted: submitted.clone(),
        };

        let router = Router::new()
            .route("/s/{code}", get(share))
            .route("/hop/{code}", get(hop))
            .route("/share/video/{id}", get(share_page))
            .route("/aweme/v1/play/", get(play))
            .route("/aweme/v1/playwm/", get(play_watermarked))
            .route("/big.mp4", get(big))
            .route("/empty.mp4", get(empty))
            .route("/page.html", get(error_page))
            .route("/slow/{code}", get(slow))
            .route("/v1/audio/transcriptions", post(openai_transcribe))
            .route("/api/v1/services/audio/asr/transcription", post(dashscope_submit))
            .route("/api/v1/tasks/{id}", get(dashscope_task))
            .route("/results/{id}", get(dashscope_result))
            .with_state(state);

        let handle = tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        Self {
            base,
            hits,
            submitted,
            handle,
        }
    }

    pub fn share_url(&self) -> String {
        format!("{}/s/iRNBho6u", self.base)
    }

    /// Share text as the app copies it to the clipboard
    pub fn share_text(&self) -> String {
        format!(
            "7.43 复制打开抖音，看看【小明的作品】今天的晚霞 🌅 {} GIm:/ 02/11",
            self.share_url()
        )
    }

    pub fn config(&self, provider: TranscriptionProvider) -> Config {
        let mut config = Config::default();
        config.platform.share_link_pattern = r"http://127\.0\.0\.1:\d+/s/[A-Za-z0-9]+/?".to_string();
        config.platform.metadata_url = format!("{}/share/video/{{video_id}}", self.base);
        config.platform.request_timeout_secs = 5;
        config.audio.extract_audio = false;
        config.audio.download_timeout_secs = 5;
        config.transcription.provider = provider;
        config.transcription.base_url = self.base.clone();
        config.transcription.api_key = Some(API_KEY.to_string());
        config.transcription.api_key_env = "DOUYIN_MCP_TEST_UNSET_KEY".to_string();
        config.transcription.timeout_secs = 10;
        config.transcription.poll_interval_ms = 10;
        config.transcription.max_poll_interval_ms = 20;
        config
    }
}

fn authorized(headers: &HeaderMap) -> bool {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        == Some(format!("Bearer {}", API_KEY).as_str())
}

async fn share(State(state): State<UpstreamState>, Path(code): Path<String>) -> Response {
    state.hits.share.fetch_add(1, Ordering::SeqCst);
    match code.as_str() {
        "static" => (StatusCode::OK, "not a redirect").into_response(),
        "elsewhere" => redirect("https://www.example.com/video/123456"),
        "loop" => redirect("/s/loop"),
        _ => redirect(&format!("/hop/{}", code)),
    }
}

async fn hop(State(state): State<UpstreamState>, Path(_code): Path<String>) -> Response {
    state.hits.share.fetch_add(1, Ordering::SeqCst);
    redirect(&format!("{}/share/video/{}/?region=CN", state.base, VIDEO_ID))
}

fn redirect(location: &str) -> Response {
    (StatusCode::FOUND, [(header::LOCATION, location.to_string())]).into_response()
}

async fn share_page(State(state): State<UpstreamState>, Path(id): Path<String>) -> Response {
    state.hits.metadata.fetch_add(1, Ordering::SeqCst);
    if id != VIDEO_ID {
        return (StatusCode::NOT_FOUND, "gone").into_response();
    }

    let router_data = json!({
        "loaderData": {
            "_layout": null,
            "video_(id)/page": {
                "videoInfoRes": {
                    "item_list": [{
                        "aweme_id": VIDEO_ID,
                        "desc": "今天的晚霞",
                        "author": { "nickname": "小明" },
                        "video": {
                            "play_addr": {
                                "uri": "v0200",
                                "url_list": [format!("{}/aweme/v1/playwm/?video_id=v0200&ratio=720p", state.base)]
                            },
                            "cover": { "url_list": ["https://p3.example/cover.jpeg"] },
                            "duration": 15300
                        }
                    }]
                }
            }
        }
    });

    let html = format!(
        "<!DOCTYPE html><html><head><title>抖音</title></head><body>\
         <script>window._ROUTER_DATA = {};</script></body></html>",
        router_data
    );

    ([(header::CONTENT_TYPE, "text/html; charset=utf-8")], html).into_response()
}

async fn play(State(state): State<UpstreamState>) -> Response {
    state.hits.media.fetch_add(1, Ordering::SeqCst);
    ([(header::CONTENT_TYPE, "video/mp4")], MP4_BYTES).into_response()
}

async fn play_watermarked(State(state): State<UpstreamState>) -> Response {
    state.hits.media.fetch_add(1, Ordering::SeqCst);
    StatusCode::FORBIDDEN.into_response()
}

async fn big(State(state): State<UpstreamState>) -> Response {
    state.hits.media.fetch_add(1, Ordering::SeqCst);
    let mut body = MP4_BYTES.to_vec();
    body.resize(64 * 1024, 0);
    ([(header::CONTENT_TYPE, "video/mp4")], body).into_response()
}

async fn empty(State(state): State<UpstreamState>) -> Response {
    state.hits.media.fetch_add(1, Ordering::SeqCst);
    ([(header::CONTENT_TYPE, "video/mp4")], Vec::<u8>::new()).into_response()
}

/// A CDN error page served with a success status
async fn error_page(State(state): State<UpstreamState>) -> Response {
    state.hits.media.fetch_add(1, Ordering::SeqCst);
    (
        [(header::CONTENT_TYPE, "text/html; charset=utf-8")],
        "<html><body>访问受限</body></html>",
    )
        .into_response()
}

/// Answers only after every client timeout used in tests has elapsed
async fn slow(Path(_code): Path<String>) -> Response {
    tokio::time::sleep(std::time::Duration::from_secs(5)).await;
    redirect("/s/never")
}

async fn openai_transcribe(
    State(state): State<UpstreamState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    state.hits.openai.fetch_add(1, Ordering::SeqCst);

    if !authorized(&headers) {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": { "message": "Incorrect API key provided", "code": "invalid_api_key" } })),
        )
            .into_response();
    }

    if !body.windows(4).any(|window| window == b"ftyp") {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": { "message": "Invalid file format." } })),
        )
            .into_response();
    }

    Json(json!({ "text": state.transcript.as_str() })).into_response()
}

async fn dashscope_submit(
    State(state): State<UpstreamState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    state.hits.submit.fetch_add(1, Ordering::SeqCst);

    if !authorized(&headers) {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "code": "InvalidApiKey", "message": "Invalid API-key provided." })),
        )
            .into_response();
    }

    state.submitted.lock().unwrap().push(body);

    Json(json!({
        "request_id": "req-1",
        "output": { "task_id": "task-1", "task_status": "PENDING" }
    }))
    .into_response()
}

async fn dashscope_task(State(state): State<UpstreamState>, Path(id): Path<String>) -> Response {
    let checks = state.hits.tasks.fetch_add(1, Ordering::SeqCst);

    if checks == 0 {
        return Json(json!({ "output": { "task_id": &id, "task_status": "RUNNING" } })).into_response();
    }

    Json(json!({
        "request_id": "req-2",
        "output": {
            "task_id": &id,
            "task_status": "SUCCEEDED",
            "results": [{
                "file_url": "ignored",
                "transcription_url": format!("{}/results/{}", state.base, id),
                "subtask_status": "SUCCEEDED"
            }]
        }
    }))
    .into_response()
}

async fn dashscope_result(State(state): State<UpstreamState>, Path(_id): Path<String>) -> Response {
    state.hits.results.fetch_add(1, Ordering::SeqCst);
    Json(json!({
        "file_url": "ignored",
        "transcripts": [{ "channel_id": 0, "text": state.transcript.as_str() }]
    }))
    .into_response()
}
