//! HTTP plumbing shared by the clients: authenticated POSTs with the retry
//! policy applied, and the background task that turns an SSE body into
//! events.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use reqwest::header::ACCEPT;
use reqwest::{Client, Response};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::accumulator::StreamAccumulator;
use crate::auth::TokenSource;
use crate::error::ProviderError;
use crate::retry::{RetryDecision, RetryPolicy, RetryState, parse_retry_after};
use crate::sse::{SseDecoder, SseLine};
use crate::types::ProviderEvent;
use crate::wire::ChatChunk;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
const EVENT_CAPACITY: usize = 64;
pub const USER_AGENT: &str = concat!("toke/", env!("CARGO_PKG_VERSION"));

#[derive(Clone)]
pub struct Transport {
    http: Client,
    base_url: String,
    tokens: Arc<dyn TokenSource>,
    headers: BTreeMap<String, String>,
    retry: RetryPolicy,
}

impl Transport {
    pub fn new(
        base_url: impl Into<String>,
        tokens: Arc<dyn TokenSource>,
        headers: BTreeMap<String, String>,
    ) -> Result<Self, ProviderError> {
        let http = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| ProviderError::network(e.to_string()))?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            tokens,
            headers,
            retry: RetryPolicy::default(),
        })
    }

    pub const fn set_retry_policy(&mut self, policy: RetryPolicy) {
        self.retry = policy;
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// POST `body` to `path`, retrying per the policy.
    pub async fn post_json<B>(
        &self,
        path: &str,
        body: &B,
        accept_sse: bool,
        cancel: &CancellationToken,
    ) -> Result<Response, ProviderError>
    where
        B: Serialize + Sync + ?Sized,
    {
        let url = format!("{}{path}", self.base_url);
        let mut state = RetryState::new();
        loop {
            state.begin();
            let result = tokio::select! {
                () = cancel.cancelled() => return Err(ProviderError::Cancelled),
                result = self.attempt(&url, body, accept_sse) => result,
            };
            let (err, retry_after) = match result {
                Ok(response) => return Ok(response),
                Err(failure) => failure,
            };

            match state.decide(&self.retry, err, retry_after) {
                RetryDecision::Refresh => {
                    warn!(url = %url, "Credential rejected, refreshing");
                    tokio::select! {
                        () = cancel.cancelled() => return Err(ProviderError::Cancelled),
                        refreshed = self.tokens.refresh(&self.http) => refreshed?,
                    }
                }
                RetryDecision::Backoff(delay) => {
                    warn!(
                        attempt = state.attempt,
                        max_retries = self.retry.max_retries,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = ?state.last_error,
                        "Retrying request"
                    );
                    tokio::select! {
                        () = cancel.cancelled() => return Err(ProviderError::Cancelled),
                        () = tokio::time::sleep(delay) => {}
                    }
                }
                RetryDecision::Fail(err) => return Err(err),
            }
        }
    }

    async fn attempt<B>(
        &self,
        url: &str,
        body: &B,
        accept_sse: bool,
    ) -> Result<Response, (ProviderError, Option<Duration>)>
    where
        B: Serialize + Sync + ?Sized,
    {
        let token = self.tokens.token(&self.http).await.map_err(|e| (e, None))?;
        let mut request = self.http.post(url).json(body);
        if accept_sse {
            request = request.header(ACCEPT, "text/event-stream");
        }
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        for (name, value) in &self.headers {
            request = request.header(name.as_str(), value.as_str());
        }

        let response = request
            .send()
            .await
            .map_err(|e| (ProviderError::from(e), None))?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let retry_after = parse_retry_after(response.headers());
        let text = response.text().await.unwrap_or_default();
        let message = api_message(&text)
            .unwrap_or_else(|| status.canonical_reason().unwrap_or("request failed").to_string());
        debug!(status = status.as_u16(), %message, "Provider returned an error");
        Err((ProviderError::api(status.as_u16(), message), retry_after))
    }

    /// Non-streaming request decoded as JSON.
    pub async fn post_for_json<B, T>(
        &self,
        path: &str,
        body: &B,
        cancel: &CancellationToken,
    ) -> Result<T, ProviderError>
    where
        B: Serialize + Sync + ?Sized,
        T: DeserializeOwned,
    {
        let response = self.post_json(path, body, false, cancel).await?;
        tokio::select! {
            () = cancel.cancelled() => Err(ProviderError::Cancelled),
            decoded = response.json::<T>() => decoded.map_err(ProviderError::from),
        }
    }

    /// Run the request and SSE parse loop on a task and hand back its events.
    pub fn spawn_stream<B>(
        &self,
        path: &'static str,
        body: B,
        accumulator: StreamAccumulator,
        cancel: CancellationToken,
    ) -> mpsc::Receiver<ProviderEvent>
    where
        B: Serialize + Send + Sync + 'static,
    {
        let (tx, rx) = mpsc::channel(EVENT_CAPACITY);
        let transport = self.clone();
        tokio::spawn(async move {
            match transport.post_json(path, &body, true, &cancel).await {
                Ok(response) => pump(response, accumulator, &tx, &cancel).await,
                Err(error) => {
                    emit(&tx, [ProviderEvent::Error { error }]).await;
                }
            }
        });
        rx
    }
}

/// Best human-readable message from an error body.
fn api_message(body: &str) -> Option<String> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return None;
    }
    let from_json = serde_json::from_str::<serde_json::Value>(trimmed)
        .ok()
        .and_then(|v| {
            v["error"]["message"]
                .as_str()
                .or_else(|| v["error"].as_str())
                .or_else(|| v["message"].as_str())
                .map(str::to_string)
        });
    Some(from_json.unwrap_or_else(|| trimmed.to_string()))
}

/// Send events in order. Returns `false` once the receiver is gone.
async fn emit(
    tx: &mpsc::Sender<ProviderEvent>,
    events: impl IntoIterator<Item = ProviderEvent>,
) -> bool {
    for event in events {
        if tx.send(event).await.is_err() {
            debug!("Event receiver dropped, stopping stream");
            return false;
        }
    }
    true
}

async fn pump(
    response: Response,
    mut accumulator: StreamAccumulator,
    tx: &mpsc::Sender<ProviderEvent>,
    cancel: &CancellationToken,
) {
    let mut body = response.bytes_stream().boxed();
    let mut decoder = SseDecoder::new();

    loop {
        let next = tokio::select! {
            () = cancel.cancelled() => {
                debug!("Stream cancelled");
                emit(tx, [ProviderEvent::Error { error: ProviderError::Cancelled }]).await;
                return;
            }
            next = body.next() => next,
        };

        let lines = match next {
            Some(Ok(bytes)) => {
                decoder.push(&bytes);
                std::iter::from_fn(|| decoder.next_line()).collect::<Vec<_>>()
            }
            Some(Err(e)) => {
                warn!(error = %e, "Stream read failed");
                let error = ProviderError::network(format!("stream reading error: {e}"));
                emit(tx, [ProviderEvent::Error { error }]).await;
                return;
            }
            None => {
                // Body ended without the sentinel
                if let Some(SseLine::Data(data)) = decoder.finish() {
                    if let Err(error) = apply_data(&mut accumulator, &data, tx).await {
                        emit(tx, [ProviderEvent::Error { error }]).await;
                        return;
                    }
                }
                if accumulator.has_output() {
                    emit(tx, accumulator.finish()).await;
                } else {
                    emit(tx, [ProviderEvent::Error { error: ProviderError::EmptyResponse }]).await;
                }
                return;
            }
        };

        for line in lines {
            match line {
                SseLine::Done => {
                    emit(tx, accumulator.finish()).await;
                    return;
                }
                SseLine::Data(data) => {
                    if let Err(error) = apply_data(&mut accumulator, &data, tx).await {
                        emit(tx, [ProviderEvent::Error { error }]).await;
                        return;
                    }
                }
            }
        }
    }
}

/// Feed one `data:` payload. Unparseable payloads are skipped; an error
/// object ends the stream. A dropped receiver reports as cancellation.
async fn apply_data(
    accumulator: &mut StreamAccumulator,
    data: &str,
    tx: &mpsc::Sender<ProviderEvent>,
) -> Result<(), ProviderError> {
    let chunk: ChatChunk = match serde_json::from_str(data) {
        Ok(chunk) => chunk,
        Err(e) => {
            debug!(error = %e, "Skipping unparseable stream chunk");
            return Ok(());
        }
    };
    if let Some(error) = &chunk.error {
        return Err(ProviderError::Stream {
            message: error.message.clone(),
        });
    }
    if emit(tx, accumulator.apply_chunk(&chunk)).await {
        Ok(())
    } else {
        Err(ProviderError::Cancelled)
    }
}
