//! Generic OpenAI-compatible client.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::accumulator::StreamAccumulator;
use crate::auth::{StaticToken, TokenSource};
use crate::client::ProviderClient;
use crate::error::ProviderError;
use crate::options::ProviderOptions;
use crate::retry::RetryPolicy;
use crate::transport::Transport;
use crate::types::{
    FinishReason, Message, ProviderEvent, ProviderResponse, Role, ToolDefinition,
};
use crate::wire::{ChatCompletion, ChatRequest, StreamOptions, WireMessage, WireToolCall};

pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const COMPLETIONS_PATH: &str = "/chat/completions";

#[derive(Clone)]
pub struct OpenAiClient {
    transport: Transport,
    options: ProviderOptions,
}

impl OpenAiClient {
    /// Client for `base_url` (for example `https://api.openai.com/v1`).
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        options: ProviderOptions,
    ) -> Result<Self, ProviderError> {
        Self::with_token_source(base_url, Arc::new(StaticToken::new(api_key)), options)
    }

    pub fn with_token_source(
        base_url: impl Into<String>,
        tokens: Arc<dyn TokenSource>,
        options: ProviderOptions,
    ) -> Result<Self, ProviderError> {
        let transport = Transport::new(base_url, tokens, options.extra_headers.clone())?;
        Ok(Self { transport, options })
    }

    #[must_use]
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.transport.set_retry_policy(policy);
        self
    }

    pub fn base_url(&self) -> &str {
        self.transport.base_url()
    }

    pub const fn options(&self) -> &ProviderOptions {
        &self.options
    }

    fn request(&self, messages: &[Message], tools: &[ToolDefinition], stream: bool) -> ChatRequest {
        ChatRequest {
            model: self.options.model.clone(),
            messages: convert_messages(self.options.system_message(), messages),
            max_tokens: self.options.max_tokens,
            temperature: self.options.temperature,
            stream,
            stream_options: stream.then_some(StreamOptions {
                include_usage: true,
            }),
            tools: tools.iter().map(ToolDefinition::to_wire).collect(),
        }
    }
}

#[async_trait]
impl ProviderClient for OpenAiClient {
    fn model(&self) -> &str {
        &self.options.model
    }

    async fn send(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
        cancel: CancellationToken,
    ) -> Result<ProviderResponse, ProviderError> {
        let request = self.request(messages, tools, false);
        debug!(model = %request.model, messages = request.messages.len(), "Sending completion");
        let completion: ChatCompletion = self
            .transport
            .post_for_json(COMPLETIONS_PATH, &request, &cancel)
            .await?;
        completion.into_response(FinishReason::from_openai, FinishReason::Unknown)
    }

    fn stream(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
        cancel: CancellationToken,
    ) -> mpsc::Receiver<ProviderEvent> {
        let request = self.request(messages, tools, true);
        debug!(model = %request.model, messages = request.messages.len(), "Streaming completion");
        self.transport
            .spawn_stream(COMPLETIONS_PATH, request, StreamAccumulator::openai(), cancel)
    }
}

/// Conversation to OpenAI chat messages.
///
/// Tool results become one `tool` message each; assistant turns with neither
/// text nor calls are dropped.
pub(crate) fn convert_messages(system: Option<&str>, messages: &[Message]) -> Vec<WireMessage> {
    let mut wire = Vec::with_capacity(messages.len() + 1);
    if let Some(system) = system {
        wire.push(WireMessage::text("system", system));
    }
    for message in messages {
        match message.role {
            Role::System | Role::User => {
                wire.push(WireMessage::text(message.role.as_str(), &message.content));
            }
            Role::Assistant => {
                if message.content.is_empty() && message.tool_calls.is_empty() {
                    continue;
                }
                wire.push(WireMessage {
                    role: "assistant",
                    content: Some(message.content.clone()).filter(|c| !c.is_empty()),
                    tool_calls: Some(message.tool_calls.iter().map(WireToolCall::from).collect())
                        .filter(|calls: &Vec<_>| !calls.is_empty()),
                    tool_call_id: None,
                });
            }
            Role::Tool => {
                wire.extend(message.tool_results.iter().map(|result| WireMessage {
                    tool_call_id: Some(result.tool_call_id.clone()),
                    ..WireMessage::text("tool", &result.content)
                }));
            }
        }
    }
    wire
}
