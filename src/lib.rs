pub mod client;
pub mod config;
pub mod error;
pub mod io_struct;
pub mod logging;
pub mod sse;
pub mod transport;
pub mod types;

pub use client::{ClassificationHandle, InferenceClient};
pub use config::{ClientConfig, ClientConfigBuilder, ConfigError, FetchMode};
pub use error::{ClientError, ErrorKind, PipelineError, PipelineResult};
pub use transport::{HttpTransport, Transport, TransportResponse, UploadFile};
pub use types::{
    ClassificationOutcome, DisplayState, ImagePayload, JobHandle, PipelineState, Stage,
    UploadHandle,
};
