// Shared helpers for integration tests
#![allow(dead_code)]

pub mod mock_service;

use std::time::Duration;

use bear_classifier::{ClientConfig, ClientConfigBuilder, ImagePayload, InferenceClient};
use mock_service::{MockService, MockServiceConfig};

/// A running mock service plus a client pointed at it
pub struct TestContext {
    pub service: MockService,
    pub client: InferenceClient,
    pub base_url: String,
}

impl TestContext {
    pub async fn new(config: MockServiceConfig) -> Self {
        Self::with_client_config(config, |builder| builder).await
    }

    pub async fn with_client_config(
        config: MockServiceConfig,
        customize: impl FnOnce(ClientConfigBuilder) -> ClientConfigBuilder,
    ) -> Self {
        let mut service = MockService::new(config);
        let base_url = service.start().await.unwrap();

        let builder = ClientConfig::builder()
            .base_url(&base_url)
            .stage_timeout(Duration::from_secs(5));
        let client = InferenceClient::new(customize(builder).build().unwrap()).unwrap();

        Self {
            service,
            client,
            base_url,
        }
    }

    pub async fn shutdown(mut self) {
        self.service.stop().await;
    }
}

/// A small fake JPEG; `marker` ends up inside the uploaded bytes
pub fn jpeg_with(marker: &[u8]) -> ImagePayload {
    let mut bytes = vec![0xff, 0xd8, 0xff, 0xe0, 0x00, 0x10];
    bytes.extend_from_slice(b"JFIF");
    bytes.extend_from_slice(marker);
    bytes.extend_from_slice(&[0xff, 0xd9]);
    ImagePayload::jpeg(bytes)
}

pub fn jpeg() -> ImagePayload {
    jpeg_with(b"")
}
