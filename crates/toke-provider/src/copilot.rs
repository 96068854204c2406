//! GitHub Copilot over the OpenAI protocol with OAuth refresh.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::auth::{GITHUB_TOKEN_URL, OAuthCredential, OAuthTokenSource, TokenSource};
use crate::client::ProviderClient;
use crate::error::ProviderError;
use crate::openai::OpenAiClient;
use crate::options::ProviderOptions;
use crate::retry::RetryPolicy;
use crate::transport::USER_AGENT;
use crate::types::{Message, ProviderEvent, ProviderResponse, ToolDefinition};

pub const COPILOT_API_URL: &str = "https://api.githubcopilot.com";
pub const COPILOT_INTEGRATION_ID: &str = "vscode-chat";

pub struct CopilotClient {
    inner: OpenAiClient,
    tokens: Arc<OAuthTokenSource>,
}

impl CopilotClient {
    /// `credential_key` is `access|refresh|RFC3339-expiry` or a bare token.
    pub fn new(credential_key: &str, options: ProviderOptions) -> Result<Self, ProviderError> {
        Self::with_endpoints(COPILOT_API_URL, GITHUB_TOKEN_URL, credential_key, options)
    }

    pub fn with_endpoints(
        api_url: impl Into<String>,
        token_url: impl Into<String>,
        credential_key: &str,
        mut options: ProviderOptions,
    ) -> Result<Self, ProviderError> {
        options
            .extra_headers
            .entry("Editor-Version".to_string())
            .or_insert_with(|| USER_AGENT.to_string());
        options
            .extra_headers
            .entry("Copilot-Integration-Id".to_string())
            .or_insert_with(|| COPILOT_INTEGRATION_ID.to_string());

        let tokens = Arc::new(
            OAuthTokenSource::new(OAuthCredential::parse(credential_key)).with_token_url(token_url),
        );
        let shared: Arc<dyn TokenSource> = tokens.clone();
        let inner = OpenAiClient::with_token_source(api_url, shared, options)?;
        Ok(Self { inner, tokens })
    }

    #[must_use]
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.inner = self.inner.with_retry_policy(policy);
        self
    }

    /// The credential after any refreshes, for the caller to persist.
    pub async fn credential(&self) -> OAuthCredential {
        self.tokens.credential().await
    }
}

#[async_trait]
impl ProviderClient for CopilotClient {
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn copilot_headers_are_added_once() {
        let client = CopilotClient::new(
            "gho_x",
            ProviderOptions::new("gpt-4o").with_header("Editor-Version", "vim/9"),
        )
        .unwrap();
        let headers = &client.inner.options().extra_headers;
        assert_eq!(headers["Editor-Version"], "vim/9");
        assert_eq!(headers["Copilot-Integration-Id"], "vscode-chat");
        assert_eq!(client.inner.base_url(), COPILOT_API_URL);
    }
}
