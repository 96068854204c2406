//! `toke chat`: one prompt, streamed reply.

use std::io::Write;

use anyhow::Result;
use tokio::sync::mpsc;
use toke_core::BackendKind;
use toke_provider::{
    CopilotClient, GITHUB_TOKEN_URL, GLM_BASE_URL, GlmClient, LocalClient, Message,
    OPENAI_BASE_URL, OpenAiClient, ProviderClient, ProviderEvent, ProviderOptions,
    ProviderResponse,
};
use tracing::debug;

use super::cancel_on_ctrl_c;
use crate::commands::ProviderKind;
use crate::error::CliError;

/// Arguments of the `chat` command.
pub struct ChatArgs {
    pub provider: ProviderKind,
    pub endpoint: Option<String>,
    pub port: Option<u16>,
    pub model: String,
    pub api_key: Option<String>,
    pub system: Option<String>,
    pub max_tokens: Option<u32>,
    pub prompt: Vec<String>,
}

pub async fn execute(args: ChatArgs) -> Result<()> {
    let prompt = args.prompt.join(" ");
    let client = build_client(args)?;
    debug!(model = %client.model(), "Starting chat");

    let cancel = cancel_on_ctrl_c();
    let rx = client.stream(&[Message::user(prompt)], &[], cancel);
    let mut stdout = std::io::stdout();
    render_stream(rx, &mut stdout).await?;
    Ok(())
}

fn build_client(args: ChatArgs) -> Result<Box<dyn ProviderClient>, CliError> {
    let mut options = ProviderOptions::new(args.model.clone());
    if let Some(system) = args.system {
        options = options.with_system_message(system);
    }
    if let Some(max_tokens) = args.max_tokens {
        options = options.with_max_tokens(max_tokens);
    }

    let client: Box<dyn ProviderClient> = match args.provider {
        ProviderKind::Openai => {
            if args.model.is_empty() {
                return Err(CliError::Arguments("--model is required".to_string()));
            }
            let endpoint = args.endpoint.unwrap_or_else(|| OPENAI_BASE_URL.to_string());
            Box::new(OpenAiClient::new(endpoint, args.api_key, options)?)
        }
        ProviderKind::Copilot => {
            let key = args.api_key.ok_or_else(|| {
                CliError::Config("Copilot needs a credential in --api-key or TOKE_API_KEY".into())
            })?;
            let client = match args.endpoint {
                Some(endpoint) => {
                    CopilotClient::with_endpoints(endpoint, GITHUB_TOKEN_URL, &key, options)?
                }
                None => CopilotClient::new(&key, options)?,
            };
            Box::new(client)
        }
        ProviderKind::Glm => {
            let endpoint = args.endpoint.unwrap_or_else(|| GLM_BASE_URL.to_string());
            Box::new(GlmClient::with_endpoint(endpoint, args.api_key, options)?)
        }
        ProviderKind::Local => {
            if args.model.is_empty() {
                return Err(CliError::Arguments("--model is required".to_string()));
            }
            let client = match args.endpoint {
                Some(endpoint) => LocalClient::with_endpoint(args.model, endpoint)?,
                None => LocalClient::new(
                    args.model,
                    args.port.unwrap_or(BackendKind::LlamaCpp.default_port()),
                )?,
            };
            Box::new(client)
        }
    };
    Ok(client)
}

/// Print content as it arrives; returns the final response.
async fn render_stream(
    mut rx: mpsc::Receiver<ProviderEvent>,
    out: &mut impl Write,
) -> Result<ProviderResponse, CliError> {
    while let Some(event) = rx.recv().await {
        match event {
            ProviderEvent::ContentDelta { content } => {
                out.write_all(content.as_bytes())?;
                out.flush()?;
            }
            ProviderEvent::ToolUseStart { tool_call } => {
                writeln!(out, "\n[tool call: {}]", tool_call.name)?;
            }
            ProviderEvent::Complete { response } => {
                writeln!(out)?;
                debug!(
                    input_tokens = response.usage.input_tokens,
                    output_tokens = response.usage.output_tokens,
                    finish = ?response.finish_reason,
                    "Chat complete"
                );
                return Ok(response);
            }
            ProviderEvent::Error { error } => {
                writeln!(out)?;
                return Err(error.into());
            }
            ProviderEvent::ContentStart
            | ProviderEvent::ContentStop
            | ProviderEvent::ToolUseDelta { .. }
            | ProviderEvent::ToolUseStop { .. } => {}
        }
    }
    Err(CliError::General("stream ended without a response".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use toke_provider::{FinishReason, ProviderError, TokenUsage, ToolCall};

    fn args(provider: ProviderKind, model: &str) -> ChatArgs {
        ChatArgs {
            provider,
            endpoint: None,
            port: None,
            model: model.to_string(),
            api_key: None,
            system: None,
            max_tokens: None,
            prompt: vec!["hi".to_string()],
        }
    }

    async fn render(events: Vec<ProviderEvent>) -> (Result<ProviderResponse, CliError>, String) {
        let (tx, rx) = mpsc::channel(events.len().max(1));
        for event in events {
            tx.send(event).await.unwrap();
        }
        drop(tx);
        let mut out = Vec::new();
        let result = render_stream(rx, &mut out).await;
        (result, String::from_utf8(out).unwrap())
    }

    #[tokio::test]
    async fn deltas_are_printed_in_order() {
        let response = ProviderResponse::new(
            "Hello world".into(),
            Vec::new(),
            TokenUsage::default(),
            FinishReason::EndTurn,
        );
        let (result, out) = render(vec![
            ProviderEvent::ContentStart,
            ProviderEvent::ContentDelta {
                content: "Hello".into(),
            },
            ProviderEvent::ContentDelta {
                content: " world".into(),
            },
            ProviderEvent::ContentStop,
            ProviderEvent::Complete { response },
        ])
        .await;
        assert_eq!(out, "Hello world\n");
        assert_eq!(result.unwrap().content, "Hello world");
    }

    #[tokio::test]
    async fn tool_calls_are_announced() {
        let call = ToolCall::new("call_1", "read_file", "{}");
        let (_, out) = render(vec![ProviderEvent::ToolUseStart { tool_call: call }]).await;
        assert_eq!(out, "\n[tool call: read_file]\n");
    }

    #[tokio::test]
    async fn stream_errors_become_cli_errors() {
        let (result, _) = render(vec![ProviderEvent::Error {
            error: ProviderError::Cancelled,
        }])
        .await;
        assert_eq!(result.unwrap_err().exit_code(), 130);

        let (result, _) = render(Vec::new()).await;
        assert!(matches!(result, Err(CliError::General(_))));
    }

    #[test]
    fn local_client_defaults_to_llama_port() {
        let client = build_client(args(ProviderKind::Local, "qwen2.5-3b-q4_k_m")).unwrap();
        assert_eq!(client.model(), "qwen2.5-3b-q4_k_m");
    }

    #[test]
    fn missing_model_and_credentials_are_rejected() {
        let err = build_client(args(ProviderKind::Openai, "")).err().unwrap();
        assert_eq!(err.exit_code(), 2);

        let err = build_client(args(ProviderKind::Copilot, "gpt-4o")).err().unwrap();
        assert!(matches!(err, CliError::Config(_)));

        let glm = build_client(args(ProviderKind::Glm, "")).unwrap();
        assert_eq!(glm.model(), "glm-4.5-air-3bit");
    }
}
