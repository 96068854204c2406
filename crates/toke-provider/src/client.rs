use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::ProviderError;
use crate::types::{Message, ProviderEvent, ProviderResponse, ToolDefinition};

/// A chat-completion backend, remote or local.
#[async_trait]
pub trait ProviderClient: Send + Sync {
    /// Model identifier sent with each request.
    fn model(&self) -> &str;

    /// Single request, whole response.
    async fn send(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
        cancel: CancellationToken,
    ) -> Result<ProviderResponse, ProviderError>;

    /// Streamed request. Must be called within a Tokio runtime.
    ///
    /// The channel yields content and tool-call events and ends with exactly
    /// one `Complete` or `Error`. Cancelling `cancel` aborts the request and
    /// yields `Error(Cancelled)`.
    fn stream(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
        cancel: CancellationToken,
    ) -> mpsc::Receiver<ProviderEvent>;
}
