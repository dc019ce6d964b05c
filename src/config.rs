//! Client configuration
//!
//! `ClientConfig` carries the service base URL and the per-stage time budgets.
//! Build it directly or through `ClientConfigBuilder`, which validates on `build()`.

use std::time::Duration;

use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::types::{DEFAULT_FILENAME, JobHandle};

pub const DEFAULT_BASE_URL: &str = "https://qasimkhan001-bear-classifier.hf.space/gradio_api";

const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
const DEFAULT_UPLOAD_TIMEOUT_SECS: u64 = 60;
const DEFAULT_SUBMIT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 120;

/// How the fetch stage interprets the result body
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchMode {
    /// Decode `data[0].label` from a JSON object or from the terminal stream event
    #[default]
    Structured,
    /// Surface the whole body text as the label
    Verbatim,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid base URL {url}: {reason}")]
    InvalidBaseUrl { url: String, reason: String },

    #[error("Timeout for {name} must be greater than zero")]
    ZeroTimeout { name: &'static str },

    #[error("Upload filename must not be empty")]
    EmptyFilename,
}

pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    pub base_url: String,
    pub connect_timeout: Duration,
    pub upload_timeout: Duration,
    pub submit_timeout: Duration,
    pub fetch_timeout: Duration,
    pub fetch_mode: FetchMode,
    /// Used when the payload itself carries no filename
    pub upload_filename: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            upload_timeout: Duration::from_secs(DEFAULT_UPLOAD_TIMEOUT_SECS),
            submit_timeout: Duration::from_secs(DEFAULT_SUBMIT_TIMEOUT_SECS),
            fetch_timeout: Duration::from_secs(DEFAULT_FETCH_TIMEOUT_SECS),
            fetch_mode: FetchMode::default(),
            upload_filename: DEFAULT_FILENAME.to_string(),
        }
    }
}

impl ClientConfig {
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::new()
    }

    pub fn validate(&self) -> ConfigResult<()> {
        self.parsed_base_url()?;
        for (name, timeout) in [
            ("connect", self.connect_timeout),
            ("upload", self.upload_timeout),
            ("submit", self.submit_timeout),
            ("fetch", self.fetch_timeout),
        ] {
            if timeout.is_zero() {
                return Err(ConfigError::ZeroTimeout { name });
            }
        }
        if self.upload_filename.trim().is_empty() {
            return Err(ConfigError::EmptyFilename);
        }
        Ok(())
    }

    fn trimmed_base(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }

    fn parsed_base_url(&self) -> ConfigResult<Url> {
        let url = Url::parse(self.trimmed_base()).map_err(|e| ConfigError::InvalidBaseUrl {
            url: self.base_url.clone(),
            reason: e.to_string(),
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidBaseUrl {
                url: self.base_url.clone(),
                reason: format!("unsupported scheme '{}'", url.scheme()),
            });
        }
        if url.cannot_be_a_base() {
            return Err(ConfigError::InvalidBaseUrl {
                url: self.base_url.clone(),
                reason: "URL cannot be a base".to_string(),
            });
        }
        Ok(url)
    }

    pub fn upload_url(&self) -> String {
        format!("{}/upload", self.trimmed_base())
    }

    pub fn predict_url(&self) -> String {
        format!("{}/call/predict", self.trimmed_base())
    }

    /// Result endpoint for a job; the id is pushed as one escaped path segment.
    pub fn result_url(&self, job: &JobHandle) -> ConfigResult<String> {
        let mut url = self.parsed_base_url()?;
        url.path_segments_mut()
            .map_err(|_| ConfigError::InvalidBaseUrl {
                url: self.base_url.clone(),
                reason: "URL cannot be a base".to_string(),
            })?
            .pop_if_empty()
            .extend(["call", "predict", job.as_str()]);
        Ok(url.into())
    }
}

/// Builder for ClientConfig that wraps the config itself
#[derive(Debug, Clone, Default)]
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.config.base_url = url.into();
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    pub fn upload_timeout(mut self, timeout: Duration) -> Self {
        self.config.upload_timeout = timeout;
        self
    }

    pub fn submit_timeout(mut self, timeout: Duration) -> Self {
        self.config.submit_timeout = timeout;
        self
    }

    pub fn fetch_timeout(mut self, timeout: Duration) -> Self {
        self.config.fetch_timeout = timeout;
        self
    }

    /// Same budget for all three stages
    pub fn stage_timeout(self, timeout: Duration) -> Self {
        self.upload_timeout(timeout)
            .submit_timeout(timeout)
            .fetch_timeout(timeout)
    }

    pub fn fetch_mode(mut self, mode: FetchMode) -> Self {
        self.config.fetch_mode = mode;
        self
    }

    pub fn verbatim(self) -> Self {
        self.fetch_mode(FetchMode::Verbatim)
    }

    pub fn upload_filename(mut self, filename: impl Into<String>) -> Self {
        self.config.upload_filename = filename.into();
        self
    }

    pub fn build(self) -> ConfigResult<ClientConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
