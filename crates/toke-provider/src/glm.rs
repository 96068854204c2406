//! GLM models served by the local MLX server.
//!
//! The server speaks the OpenAI protocol but only understands plain
//! `role`/`content` messages, so tool results are folded into user text.
//! Streamed tool calls arrive beside the delta and are keyed by id.

use std::fmt::Write as _;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::accumulator::StreamAccumulator;
use crate::auth::StaticToken;
use crate::client::ProviderClient;
use crate::error::ProviderError;
use crate::options::ProviderOptions;
use crate::retry::RetryPolicy;
use crate::transport::Transport;
use crate::types::{FinishReason, Message, ProviderEvent, ProviderResponse, Role, ToolDefinition};
use crate::wire::ChatCompletion;

pub const GLM_BASE_URL: &str = "http://localhost:11434/v1";
pub const GLM_MODEL: &str = "glm-4.5-air-3bit";
pub const GLM_TEMPERATURE: f32 = 0.7;
const COMPLETIONS_PATH: &str = "/chat/completions";

#[derive(Debug, Serialize)]
struct GlmMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Serialize)]
struct GlmRequest {
    model: String,
    messages: Vec<GlmMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    temperature: f32,
    stream: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<serde_json::Value>,
}

#[derive(Clone)]
pub struct GlmClient {
    transport: Transport,
    options: ProviderOptions,
}

impl GlmClient {
    /// Client for the default local MLX endpoint.
    pub fn new(options: ProviderOptions) -> Result<Self, ProviderError> {
        Self::with_endpoint(GLM_BASE_URL, None, options)
    }

    pub fn with_endpoint(
        base_url: impl Into<String>,
        api_key: Option<String>,
        mut options: ProviderOptions,
    ) -> Result<Self, ProviderError> {
        if options.model.is_empty() {
            options.model = GLM_MODEL.to_string();
        }
        let transport = Transport::new(
            base_url,
            Arc::new(StaticToken::new(api_key)),
            options.extra_headers.clone(),
        )?;
        Ok(Self { transport, options })
    }

    #[must_use]
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.transport.set_retry_policy(policy);
        self
    }

    fn request(&self, messages: &[Message], tools: &[ToolDefinition], stream: bool) -> GlmRequest {
        GlmRequest {
            model: self.options.model.clone(),
            messages: fold_messages(self.options.system_message(), messages),
            max_tokens: self.options.max_tokens.filter(|&n| n > 0),
            temperature: self.options.temperature.unwrap_or(GLM_TEMPERATURE),
            stream,
            tools: tools.iter().map(ToolDefinition::to_wire).collect(),
        }
    }
}

#[async_trait]
impl ProviderClient for GlmClient {
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
        debug!(model = %request.model, "Sending GLM completion");
        let completion: ChatCompletion = self
            .transport
            .post_for_json(COMPLETIONS_PATH, &request, &cancel)
            .await?;
        completion.into_response(FinishReason::from_glm, FinishReason::EndTurn)
    }

    fn stream(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
        cancel: CancellationToken,
    ) -> mpsc::Receiver<ProviderEvent> {
        let request = self.request(messages, tools, true);
        debug!(model = %request.model, "Streaming GLM completion");
        self.transport
            .spawn_stream(COMPLETIONS_PATH, request, StreamAccumulator::glm(), cancel)
    }
}

/// Flatten the conversation to role/content pairs.
///
/// Any message carrying tool results is sent as a user message whose text
/// ends with a `Tool Results:` list.
fn fold_messages(system: Option<&str>, messages: &[Message]) -> Vec<GlmMessage> {
    let mut folded = Vec::with_capacity(messages.len() + 1);
    if let Some(system) = system {
        folded.push(GlmMessage {
            role: "system",
            content: system.to_string(),
        });
    }
    for message in messages {
        if message.tool_results.is_empty() {
            folded.push(GlmMessage {
                role: message.role.as_str(),
                content: message.content.clone(),
            });
            continue;
        }

        let mut content = message.content.clone();
        if !content.is_empty() {
            content.push_str("\n\n");
        }
        content.push_str("Tool Results:\n");
        for result in &message.tool_results {
            let _ = writeln!(content, "- {}: {}", result.name, result.content);
        }
        folded.push(GlmMessage {
            role: Role::User.as_str(),
            content,
        });
    }
    folded
}
