//! Client for a backend started by the runtime on localhost.

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::client::ProviderClient;
use crate::error::ProviderError;
use crate::openai::OpenAiClient;
use crate::options::ProviderOptions;
use crate::types::{Message, ProviderEvent, ProviderResponse, ToolDefinition};

pub const LOCAL_MAX_TOKENS: u32 = 4096;

/// OpenAI-compatible client without credentials.
#[derive(Clone)]
pub struct LocalClient {
    inner: OpenAiClient,
}

impl LocalClient {
    /// Talk to `http://localhost:<port>/v1`.
    pub fn new(model_id: impl Into<String>, port: u16) -> Result<Self, ProviderError> {
        Self::with_endpoint(model_id, format!("http://localhost:{port}/v1"))
    }

    /// Talk to an endpoint reported by the orchestrator.
    pub fn with_endpoint(
        model_id: impl Into<String>,
        endpoint: impl Into<String>,
    ) -> Result<Self, ProviderError> {
        let options = ProviderOptions::new(model_id).with_max_tokens(LOCAL_MAX_TOKENS);
        Ok(Self {
            inner: OpenAiClient::new(endpoint, None, options)?,
        })
    }

    pub fn endpoint(&self) -> &str {
        self.inner.base_url()
    }
}

#[async_trait]
impl ProviderClient for LocalClient {
    fn model(&self) -> &str {
        self.inner.model()
    }

    async fn send(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
        cancel: CancellationToken,
    ) -> Result<ProviderResponse, ProviderError> {
        self.inner.send(messages, tools, cancel).await
    }

    fn stream(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
        cancel: CancellationToken,
    ) -> mpsc::Receiver<ProviderEvent> {
        self.inner.stream(messages, tools, cancel)
    }
}
