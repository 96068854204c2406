//! Chat-completion clients with a single streaming protocol.
//!
//! Every client implements [`ProviderClient`]: `send` returns a whole
//! [`ProviderResponse`], `stream` runs the request on a task and yields
//! [`ProviderEvent`]s over a channel. Server-sent events are decoded by
//! [`SseDecoder`] and folded into content and tool calls by
//! [`StreamAccumulator`]. Transient failures are retried under a
//! [`RetryPolicy`] and a rejected credential is refreshed once.
//!
//! - [`OpenAiClient`] - any OpenAI-compatible API
//! - [`CopilotClient`] - GitHub Copilot with OAuth refresh
//! - [`GlmClient`] - GLM models on the local MLX server
//! - [`LocalClient`] - a backend started by `toke-runtime`

mod accumulator;
mod auth;
mod client;
mod copilot;
mod error;
mod glm;
mod local;
mod openai;
mod options;
mod retry;
mod sse;
mod transport;
mod types;
mod wire;

pub use accumulator::{StreamAccumulator, ToolCallAccumulator, generate_tool_call_id};
pub use auth::{GITHUB_TOKEN_URL, OAuthCredential, OAuthTokenSource, StaticToken, TokenSource};
pub use client::ProviderClient;
pub use copilot::{COPILOT_API_URL, COPILOT_INTEGRATION_ID, CopilotClient};
pub use error::ProviderError;
pub use glm::{GLM_BASE_URL, GLM_MODEL, GLM_TEMPERATURE, GlmClient};
pub use local::{LOCAL_MAX_TOKENS, LocalClient};
pub use openai::{OPENAI_BASE_URL, OpenAiClient};
pub use options::ProviderOptions;
pub use retry::{
    DEFAULT_BASE_DELAY, DEFAULT_MAX_RETRIES, RetryDecision, RetryPolicy, RetryState,
    parse_retry_after,
};
pub use sse::{SseDecoder, SseLine};
pub use transport::USER_AGENT;
pub use types::{
    FinishReason, Message, ProviderEvent, ProviderResponse, Role, TokenUsage, ToolCall,
    ToolDefinition, ToolResult,
};
