//! Wire shapes of the inference service and per-stage decoders
//!
//! Each decoder takes the raw response body and either yields the value the
//! next stage needs or a `PipelineError` describing why the shape was rejected.
//! Bodies are first parsed as untyped JSON so that "not JSON" (`Decode`) and
//! "JSON of the wrong shape" (`Protocol`) stay distinguishable.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    config::FetchMode,
    error::{PipelineError, PipelineResult},
    sse::{self, EVENT_ERROR},
    types::{JobHandle, UploadHandle},
};

/// Multipart field name the upload endpoint reads
pub const UPLOAD_FIELD_NAME: &str = "files";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRef {
    pub path: String,
}

/// Body of `POST {base}/call/predict`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PredictRequest {
    pub data: Vec<FileRef>,
}

impl PredictRequest {
    pub fn for_upload(handle: &UploadHandle) -> Self {
        Self {
            data: vec![FileRef {
                path: handle.as_str().to_string(),
            }],
        }
    }
}

fn parse_json(body: &[u8]) -> PipelineResult<Value> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(PipelineError::Decode("response body is empty".to_string()));
    }
    Ok(serde_json::from_slice(body)?)
}

/// Upload response: a JSON array whose first element is the server path.
pub fn decode_upload(body: &[u8]) -> PipelineResult<UploadHandle> {
    let value = parse_json(body)?;
    let items = value
        .as_array()
        .ok_or_else(|| PipelineError::protocol("upload response is not an array"))?;
    let first = items
        .first()
        .ok_or_else(|| PipelineError::protocol("upload response array is empty"))?;
    let path = first
        .as_str()
        .ok_or_else(|| PipelineError::protocol("first upload entry is not a string"))?;
    if path.is_empty() {
        return Err(PipelineError::protocol("upload path is empty"));
    }
    Ok(UploadHandle::new(path))
}

/// Submit response: a JSON object with a string `event_id`.
pub fn decode_submit(body: &[u8]) -> PipelineResult<JobHandle> {
    let value = parse_json(body)?;
    let object = value
        .as_object()
        .ok_or_else(|| PipelineError::protocol("submit response is not an object"))?;
    let event_id = match object.get("event_id") {
        Some(Value::String(id)) => id,
        Some(_) => return Err(PipelineError::protocol("event_id is not a string")),
        None => return Err(PipelineError::protocol("event_id missing from response")),
    };
    if event_id.is_empty() {
        return Err(PipelineError::protocol("event_id is empty"));
    }
    Ok(JobHandle::new(event_id.as_str()))
}

/// Fetch response, decoded according to `mode`.
///
/// `is_event_stream` is the transport's view of the content type; when it is
/// unknown the body itself is sniffed.
pub fn decode_result(
    body: &[u8],
    is_event_stream: bool,
    mode: FetchMode,
) -> PipelineResult<String> {
    let text = std::str::from_utf8(body)
        .map_err(|e| PipelineError::Decode(format!("result body is not UTF-8: {}", e)))?;
    if text.trim().is_empty() {
        return Err(PipelineError::protocol("no data received for job result"));
    }

    match mode {
        FetchMode::Verbatim => Ok(text.to_string()),
        FetchMode::Structured if is_event_stream || sse::looks_like_event_stream(text) => {
            decode_result_stream(text)
        }
        FetchMode::Structured => {
            let value: Value = serde_json::from_str(text)?;
            let data = value
                .as_object()
                .and_then(|o| o.get("data"))
                .ok_or_else(|| PipelineError::protocol("result has no data field"))?;
            label_from_outputs(data)
        }
    }
}

fn decode_result_stream(text: &str) -> PipelineResult<String> {
    let event = sse::find_terminal(text, true)
        .ok_or_else(|| PipelineError::protocol("result stream ended without a terminal event"))?;

    if event.event == Some(EVENT_ERROR) {
        let detail = match serde_json::from_str::<Value>(&event.data) {
            Ok(Value::String(message)) => message,
            Ok(Value::Null) => "no details provided".to_string(),
            _ if event.data.trim().is_empty() => "no details provided".to_string(),
            _ => event.data.to_string(),
        };
        return Err(PipelineError::protocol(format!(
            "service reported job error: {}",
            detail
        )));
    }

    let data: Value = serde_json::from_str(&event.data)?;
    label_from_outputs(&data)
}

/// `data` must be a non-empty array whose first element has a string `label`.
fn label_from_outputs(data: &Value) -> PipelineResult<String> {
    let outputs = data
        .as_array()
        .ok_or_else(|| PipelineError::protocol("result data is not an array"))?;
    let first = outputs
        .first()
        .ok_or_else(|| PipelineError::protocol("result data is empty"))?;
    match first.get("label") {
        Some(Value::String(label)) => Ok(label.clone()),
        Some(_) => Err(PipelineError::protocol("result label is not a string")),
        None => Err(PipelineError::protocol("result has no label")),
    }
}
