// Mock inference service for integration tests
#![allow(dead_code)]

use std::{
    collections::HashMap,
    convert::Infallible,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use axum::{
    Json, Router,
    body::{Body, Bytes},
    extract::{Path, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use futures::stream::{self, StreamExt};
use serde_json::{Value, json};
use tokio::sync::RwLock;

/// Marker bytes that make the mock report a job error for that image
pub const FAIL_MARKER: &[u8] = b"FAIL";
/// Marker bytes that delay the result of that image
pub const SLOW_MARKER: &[u8] = b"SLOW";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StageBehavior {
    Ok,
    Status(u16),
    /// Well-formed JSON of the wrong shape
    Malformed,
    Delay(Duration),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ResultFormat {
    Json,
    EventStream,
    /// Event stream that stays open after the terminal event
    EventStreamHeldOpen,
    /// CRLF event stream whose separators straddle chunk boundaries, held open
    EventStreamSplit,
}

#[derive(Clone, Debug)]
pub struct MockServiceConfig {
    pub label: String,
    pub upload: StageBehavior,
    pub submit: StageBehavior,
    pub fetch: StageBehavior,
    pub result_format: ResultFormat,
    pub slow_delay: Duration,
}

impl Default for MockServiceConfig {
    fn default() -> Self {
        Self {
            label: "grizzly".to_string(),
            upload: StageBehavior::Ok,
            submit: StageBehavior::Ok,
            fetch: StageBehavior::Ok,
            result_format: ResultFormat::Json,
            slow_delay: Duration::from_millis(200),
        }
    }
}

#[derive(Clone, Debug)]
pub struct RecordedUpload {
    pub content_type: String,
    pub body: Vec<u8>,
}

impl RecordedUpload {
    pub fn body_contains(&self, needle: &[u8]) -> bool {
        contains(&self.body, needle)
    }
}

#[derive(Default)]
struct Calls {
    upload: AtomicUsize,
    submit: AtomicUsize,
    fetch: AtomicUsize,
}

#[derive(Default)]
struct Jobs {
    /// upload path -> raw multipart body
    uploads: HashMap<String, Vec<u8>>,
    /// event id -> upload path
    events: HashMap<String, String>,
    recorded: Vec<RecordedUpload>,
}

struct MockState {
    config: RwLock<MockServiceConfig>,
    calls: Calls,
    jobs: RwLock<Jobs>,
}

type SharedState = Arc<MockState>;

pub struct MockService {
    state: SharedState,
    base_url: Option<String>,
    shutdown_handle: Option<tokio::task::JoinHandle<()>>,
    shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
}

impl MockService {
    pub fn new(config: MockServiceConfig) -> Self {
        Self {
            state: Arc::new(MockState {
                config: RwLock::new(config),
                calls: Calls::default(),
                jobs: RwLock::new(Jobs::default()),
            }),
            base_url: None,
            shutdown_handle: None,
            shutdown_tx: None,
        }
    }

    /// Start the server on an ephemeral port and return the API base URL
    pub async fn start(&mut self) -> Result<String, Box<dyn std::error::Error>> {
        let listener = tokio::net::TcpListener::bind(("127.0.0.1", 0)).await?;
        let port = listener.local_addr()?.port();

        let app = Router::new()
            .route("/gradio_api/upload", post(upload_handler))
            .route("/gradio_api/call/predict", post(predict_handler))
            .route("/gradio_api/call/predict/{event_id}", get(result_handler))
            .with_state(self.state.clone());

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
        self.shutdown_tx = Some(shutdown_tx);

        let handle = tokio::spawn(async move {
            let server = axum::serve(listener, app).with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            });
            if let Err(e) = server.await {
                eprintln!("Mock service error: {}", e);
            }
        });
        self.shutdown_handle = Some(handle);

        let url = format!("http://127.0.0.1:{}/gradio_api", port);
        self.base_url = Some(url.clone());
        Ok(url)
    }

    pub async fn stop(&mut self) {
        if let Some(shutdown_tx) = self.shutdown_tx.take() {
            let _ = shutdown_tx.send(());
        }
        if let Some(handle) = self.shutdown_handle.take() {
            let _ = tokio::time::timeout(Duration::from_secs(5), handle).await;
        }
    }

    pub async fn configure(&self, f: impl FnOnce(&mut MockServiceConfig)) {
        f(&mut *self.state.config.write().await);
    }

    /// (upload, submit, fetch) call counts
    pub fn calls(&self) -> (usize, usize, usize) {
        (
            self.state.calls.upload.load(Ordering::SeqCst),
            self.state.calls.submit.load(Ordering::SeqCst),
            self.state.calls.fetch.load(Ordering::SeqCst),
        )
    }

    pub async fn uploads(&self) -> Vec<RecordedUpload> {
        self.state.jobs.read().await.recorded.clone()
    }
}

impl Drop for MockService {
    fn drop(&mut self) {
        if let Some(shutdown_tx) = self.shutdown_tx.take() {
            let _ = shutdown_tx.send(());
        }
    }
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}

/// Apply the configured behavior; `Some` short-circuits the handler.
async fn apply_behavior(behavior: &StageBehavior, malformed: Value) -> Option<Response> {
    match behavior {
        StageBehavior::Ok => None,
        StageBehavior::Status(code) => {
            let status = StatusCode::from_u16(*code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            Some((status, "mock failure").into_response())
        }
        StageBehavior::Malformed => Some(Json(malformed).into_response()),
        StageBehavior::Delay(delay) => {
            tokio::time::sleep(*delay).await;
            None
        }
    }
}

async fn upload_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let n = state.calls.upload.fetch_add(1, Ordering::SeqCst) + 1;
    let behavior = state.config.read().await.upload.clone();

    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    state.jobs.write().await.recorded.push(RecordedUpload {
        content_type: content_type.clone(),
        body: body.to_vec(),
    });

    if let Some(response) = apply_behavior(&behavior, json!({})).await {
        return response;
    }

    if !content_type.starts_with("multipart/form-data")
        || !contains(&body, b"name=\"files\"")
    {
        return (StatusCode::UNPROCESSABLE_ENTITY, "expected a 'files' part").into_response();
    }

    let path = format!("/tmp/gradio/{}/uploaded_image.jpg", n);
    state
        .jobs
        .write()
        .await
        .uploads
        .insert(path.clone(), body.to_vec());
    Json(json!([path])).into_response()
}

async fn predict_handler(
    State(state): State<SharedState>,
    Json(request): Json<Value>,
) -> Response {
    let n = state.calls.submit.fetch_add(1, Ordering::SeqCst) + 1;
    let behavior = state.config.read().await.submit.clone();

    if let Some(response) = apply_behavior(&behavior, json!({"status": "queued"})).await {
        return response;
    }

    let Some(path) = request["data"][0]["path"].as_str() else {
        return (StatusCode::UNPROCESSABLE_ENTITY, "missing data[0].path").into_response();
    };

    let mut jobs = state.jobs.write().await;
    if !jobs.uploads.contains_key(path) {
        return (StatusCode::NOT_FOUND, "unknown upload").into_response();
    }
    let event_id = format!("evt{:04}", n);
    jobs.events.insert(event_id.clone(), path.to_string());
    Json(json!({"event_id": event_id})).into_response()
}

async fn result_handler(
    State(state): State<SharedState>,
    Path(event_id): Path<String>,
) -> Response {
    state.calls.fetch.fetch_add(1, Ordering::SeqCst);
    let config = state.config.read().await.clone();

    if let Some(response) = apply_behavior(&config.fetch, json!({"data": []})).await {
        return response;
    }

    let upload = {
        let jobs = state.jobs.read().await;
        jobs.events
            .get(&event_id)
            .and_then(|path| jobs.uploads.get(path))
            .cloned()
    };
    let Some(upload) = upload else {
        return (StatusCode::NOT_FOUND, "unknown event").into_response();
    };

    if contains(&upload, SLOW_MARKER) {
        tokio::time::sleep(config.slow_delay).await;
    }
    let failed = contains(&upload, FAIL_MARKER);

    match config.result_format {
        ResultFormat::Json if failed => {
            (StatusCode::INTERNAL_SERVER_ERROR, "prediction failed").into_response()
        }
        ResultFormat::Json => Json(json!({
            "data": [{
                "label": config.label,
                "confidences": [{"label": config.label, "confidence": 0.97}]
            }]
        }))
        .into_response(),
        ResultFormat::EventStreamSplit => {
            let mut chunks = vec!["event: heartbeat\r\ndata: null\r\n\r".to_string()];
            chunks.extend((0..50).map(|_| "\nevent: heartbeat\r\ndata: null\r\n\r".to_string()));
            chunks.push(format!(
                "\nevent: complete\r\ndata: [{{\"label\": \"{}\"}}]\r",
                config.label
            ));
            chunks.push("\n\r\n".to_string());
            event_stream_response(chunks, true)
        }
        ResultFormat::EventStream | ResultFormat::EventStreamHeldOpen => {
            let terminal = if failed {
                "event: error\ndata: \"prediction failed\"\n\n".to_string()
            } else {
                format!(
                    "event: complete\ndata: [{{\"label\": \"{}\", \"confidences\": []}}]\n\n",
                    config.label
                )
            };
            let chunks = vec![
                "event: generating\ndata: null\n\n".to_string(),
                "event: heartbeat\ndata: null\n\n".to_string(),
                terminal,
            ];
            let held_open = config.result_format == ResultFormat::EventStreamHeldOpen;
            event_stream_response(chunks, held_open)
        }
    }
}

fn event_stream_response(chunks: Vec<String>, held_open: bool) -> Response {
    let chunks = stream::iter(chunks).map(|c| Ok::<_, Infallible>(Bytes::from(c)));
    let body = if held_open {
        Body::from_stream(chunks.chain(stream::pending()))
    } else {
        Body::from_stream(chunks)
    };
    (
        [(header::CONTENT_TYPE, "text/event-stream; charset=utf-8")],
        body,
    )
        .into_response()
}
