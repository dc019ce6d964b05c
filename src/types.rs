//! Request-scoped value types flowing through the classification pipeline

use std::{fmt, path::Path};

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::{ErrorKind, PipelineError, PipelineResult};

/// Media type the service documents for uploads
pub const DEFAULT_MEDIA_TYPE: &str = "image/jpeg";

/// Filename placed in the multipart envelope when none is given
pub const DEFAULT_FILENAME: &str = "uploaded_image.jpg";

/// Raw image bytes plus the metadata needed for the multipart envelope.
///
/// Cloning is cheap: the content is reference counted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePayload {
    content: Bytes,
    media_type: String,
    filename: Option<String>,
}

impl ImagePayload {
    pub fn new(content: impl Into<Bytes>, media_type: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            media_type: media_type.into(),
            filename: None,
        }
    }

    /// JPEG payload, the shape the service expects
    pub fn jpeg(content: impl Into<Bytes>) -> Self {
        Self::new(content, DEFAULT_MEDIA_TYPE)
    }

    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    /// Read an image from disk, inferring its media type from the extension.
    pub async fn from_path(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref();
        let content = tokio::fs::read(path).await?;
        let image = Self::new(content, media_type_for_path(path));
        Ok(match path.file_name().and_then(|n| n.to_str()) {
            Some(name) => image.with_filename(name),
            None => image,
        })
    }

    pub fn content(&self) -> &Bytes {
        &self.content
    }

    pub fn media_type(&self) -> &str {
        &self.media_type
    }

    pub fn filename(&self) -> Option<&str> {
        self.filename.as_deref()
    }

    pub fn len(&self) -> usize {
        self.content.len()
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }

    /// Checked before any network call is made.
    pub fn validate(&self) -> PipelineResult<()> {
        if self.content.is_empty() {
            return Err(PipelineError::EmptyInput("image payload is empty".to_string()));
        }
        if self.media_type.trim().is_empty() {
            return Err(PipelineError::EmptyInput(
                "image payload has no media type".to_string(),
            ));
        }
        Ok(())
    }
}

fn media_type_for_path(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match ext.as_deref() {
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("bmp") => "image/bmp",
        _ => DEFAULT_MEDIA_TYPE,
    }
}

/// Server-side path of an uploaded file, passed through to the submit stage untouched
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UploadHandle(String);

impl UploadHandle {
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UploadHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a submitted prediction job
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JobHandle(String);

impl JobHandle {
    pub fn new(event_id: impl Into<String>) -> Self {
        Self(event_id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One network call of the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Upload,
    Submit,
    Fetch,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Upload => "upload",
            Stage::Submit => "submit",
            Stage::Fetch => "fetch",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal result of one `classify` invocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ClassificationOutcome {
    Success {
        label: String,
    },
    Failure {
        stage: Stage,
        kind: ErrorKind,
        message: String,
    },
}

impl ClassificationOutcome {
    pub fn failure(stage: Stage, error: &PipelineError) -> Self {
        ClassificationOutcome::Failure {
            stage,
            kind: error.kind(),
            message: error.to_string(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ClassificationOutcome::Success { .. })
    }

    pub fn label(&self) -> Option<&str> {
        match self {
            ClassificationOutcome::Success { label } => Some(label),
            ClassificationOutcome::Failure { .. } => None,
        }
    }

    pub fn failed_stage(&self) -> Option<Stage> {
        match self {
            ClassificationOutcome::Success { .. } => None,
            ClassificationOutcome::Failure { stage, .. } => Some(*stage),
        }
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            ClassificationOutcome::Success { .. } => None,
            ClassificationOutcome::Failure { kind, .. } => Some(*kind),
        }
    }
}

impl fmt::Display for ClassificationOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClassificationOutcome::Success { label } => write!(f, "{}", label),
            ClassificationOutcome::Failure { stage, message, .. } => {
                write!(f, "{} failed: {}", stage, message)
            }
        }
    }
}

/// Progress of a single invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Uploading,
    Submitting,
    Fetching,
    Done(ClassificationOutcome),
}

impl PipelineState {
    /// Legal edges: forward one stage at a time, or from any running state to `Done`.
    pub fn can_transition_to(&self, next: &PipelineState) -> bool {
        use PipelineState::*;
        matches!(
            (self, next),
            (Idle, Uploading)
                | (Uploading, Submitting)
                | (Submitting, Fetching)
                | (Uploading | Submitting | Fetching, Done(_))
        )
    }

    /// Stage currently executing, if any
    pub fn stage(&self) -> Option<Stage> {
        match self {
            PipelineState::Uploading => Some(Stage::Upload),
            PipelineState::Submitting => Some(Stage::Submit),
            PipelineState::Fetching => Some(Stage::Fetch),
            PipelineState::Idle | PipelineState::Done(_) => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineState::Done(_))
    }

    pub fn name(&self) -> &'static str {
        match self {
            PipelineState::Idle => "idle",
            PipelineState::Uploading => "uploading",
            PipelineState::Submitting => "submitting",
            PipelineState::Fetching => "fetching",
            PipelineState::Done(_) => "done",
        }
    }
}

/// What a presentation layer renders
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisplayState {
    Idle,
    Loading,
    Result(String),
    Error(String),
}

impl From<&PipelineState> for DisplayState {
    fn from(state: &PipelineState) -> Self {
        match state {
            PipelineState::Idle => DisplayState::Idle,
            PipelineState::Uploading | PipelineState::Submitting | PipelineState::Fetching => {
                DisplayState::Loading
            }
            PipelineState::Done(ClassificationOutcome::Success { label }) => {
                DisplayState::Result(label.clone())
            }
            PipelineState::Done(failure) => DisplayState::Error(failure.to_string()),
        }
    }
}
