//! HTTP transport seam
//!
//! `Transport` is the only place network I/O happens. `HttpTransport` wraps a
//! single `reqwest::Client`, whose connection pool is shared by every
//! invocation; tests substitute scripted implementations.

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use log::debug;
use reqwest::{
    Client, Response,
    header::CONTENT_TYPE,
    multipart::{Form, Part},
};
use serde_json::Value;

use crate::{
    config::ClientConfig,
    error::{PipelineError, PipelineResult},
    sse,
};

const EVENT_STREAM_MIME: &str = "text/event-stream";

/// Compare the essence of a `Content-Type` value, ignoring parameters and case
fn is_event_stream_type(content_type: &str) -> bool {
    content_type
        .split(';')
        .next()
        .is_some_and(|essence| essence.trim().eq_ignore_ascii_case(EVENT_STREAM_MIME))
}

/// A file part of a multipart upload
#[derive(Debug, Clone)]
pub struct UploadFile {
    pub field_name: &'static str,
    pub file_name: String,
    pub media_type: String,
    pub content: Bytes,
}

/// Status, content type and fully read body of a response
#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Bytes,
}

impl TransportResponse {
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            content_type: None,
            body: body.into(),
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_event_stream(&self) -> bool {
        self.content_type.as_deref().is_some_and(is_event_stream_type)
    }

    /// Turn a non-2xx response into a `Status` error.
    pub fn error_for_status(self) -> PipelineResult<Self> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(PipelineError::status(self.status, &self.body))
        }
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// `POST` a multipart form holding a single file part
    async fn upload(&self, url: &str, file: UploadFile) -> PipelineResult<TransportResponse>;

    /// `POST` a JSON body
    async fn post_json(&self, url: &str, body: &Value) -> PipelineResult<TransportResponse>;

    /// `GET` a resource; event streams are read until their terminal event
    async fn get(&self, url: &str) -> PipelineResult<TransportResponse>;
}

#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(config: &ClientConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()?;
        Ok(Self { client })
    }

    async fn read_response(response: Response) -> PipelineResult<TransportResponse> {
        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let mut parsed = TransportResponse {
            status,
            content_type,
            body: Bytes::new(),
        };
        parsed.body = if parsed.is_success() && parsed.is_event_stream() {
            Self::read_event_stream(response).await?
        } else {
            response.bytes().await?
        };
        Ok(parsed)
    }

    /// Read chunks until a terminal event block has arrived or the server closes.
    ///
    /// Only bytes past the last complete block are scanned again on each chunk.
    async fn read_event_stream(response: Response) -> PipelineResult<Bytes> {
        let mut stream = response.bytes_stream();
        let mut buffer: Vec<u8> = Vec::new();
        let mut scanned = 0;

        while let Some(chunk) = stream.next().await {
            buffer.extend_from_slice(&chunk?);
            while let Some(len) = sse::first_block_end(&buffer[scanned..]) {
                let block = &buffer[scanned..scanned + len];
                let terminal = sse::parse_block(&String::from_utf8_lossy(block)).is_terminal();
                scanned += len;
                if terminal {
                    debug!("Terminal event received after {} bytes", buffer.len());
                    return Ok(Bytes::from(buffer));
                }
            }
        }

        Ok(Bytes::from(buffer))
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn upload(&self, url: &str, file: UploadFile) -> PipelineResult<TransportResponse> {
        let size = file.content.len();
        let part = Part::bytes(file.content.to_vec())
            .file_name(file.file_name)
            .mime_str(&file.media_type)
            .map_err(|e| {
                PipelineError::EmptyInput(format!(
                    "media type '{}' cannot be encoded: {}",
                    file.media_type, e
                ))
            })?;
        let form = Form::new().part(file.field_name, part);

        debug!("Uploading {} bytes to {}", size, url);
        let response = self.client.post(url).multipart(form).send().await?;
        Self::read_response(response).await
    }

    async fn post_json(&self, url: &str, body: &Value) -> PipelineResult<TransportResponse> {
        debug!("Posting JSON to {}", url);
        let response = self.client.post(url).json(body).send().await?;
        Self::read_response(response).await
    }

    async fn get(&self, url: &str) -> PipelineResult<TransportResponse> {
        debug!("Fetching {}", url);
        let response = self.client.get(url).send().await?;
        Self::read_response(response).await
    }
}
