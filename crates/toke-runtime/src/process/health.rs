//! Readiness polling and liveness checks.

use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use tokio::process::Child;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::BackendError;

/// What counts as "ready" for a server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadinessProbe {
    /// `GET /health` answers 200.
    Health,
    /// `GET /v1/models` answers 200 with a non-empty `data` list.
    ModelsListed,
}

/// Polling schedule for one readiness wait.
#[derive(Debug, Clone)]
pub struct Readiness {
    /// Server origin, e.g. `http://localhost:11434`.
    pub base_url: String,
    pub probe: ReadinessProbe,
    pub interval: Duration,
    pub timeout: Duration,
}

impl Readiness {
    pub fn health(base_url: impl Into<String>, interval: Duration, timeout: Duration) -> Self {
        Self {
            base_url: base_url.into(),
            probe: ReadinessProbe::Health,
            interval,
            timeout,
        }
    }

    pub fn models_listed(
        base_url: impl Into<String>,
        interval: Duration,
        timeout: Duration,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            probe: ReadinessProbe::ModelsListed,
            interval,
            timeout,
        }
    }

    fn url(&self) -> String {
        let base = self.base_url.trim_end_matches('/');
        match self.probe {
            ReadinessProbe::Health => format!("{base}/health"),
            ReadinessProbe::ModelsListed => format!("{base}/v1/models"),
        }
    }
}

#[derive(Deserialize)]
struct ModelList {
    #[serde(default)]
    data: Vec<serde_json::Value>,
}

/// Poll until the server is ready, the child exits, the timeout passes, or
/// `cancel` fires.
pub async fn wait_until_ready(
    client: &Client,
    readiness: &Readiness,
    mut child: Option<&mut Child>,
    cancel: &CancellationToken,
) -> Result<(), BackendError> {
    let url = readiness.url();
    info!(url = %url, timeout = ?readiness.timeout, "Waiting for server to become ready");

    let poll = async {
        loop {
            if let Some(child) = child.as_deref_mut() {
                match child.try_wait() {
                    Ok(Some(status)) => {
                        return Err(BackendError::ExitedEarly {
                            status: status.to_string(),
                        });
                    }
                    Ok(None) => {}
                    Err(e) => return Err(BackendError::Io(e)),
                }
            }

            if probe_once(client, &url, readiness.probe, readiness.interval).await {
                info!(url = %url, "Server is ready");
                return Ok(());
            }
            tokio::time::sleep(readiness.interval).await;
        }
    };

    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(BackendError::Cancelled),
        result = tokio::time::timeout(readiness.timeout, poll) => {
            result.unwrap_or(Err(BackendError::ReadinessTimeout {
                timeout: readiness.timeout,
            }))
        }
    }
}

async fn probe_once(client: &Client, url: &str, probe: ReadinessProbe, limit: Duration) -> bool {
    let response = match client.get(url).timeout(limit.max(Duration::from_millis(500))).send().await {
        Ok(response) => response,
        Err(e) => {
            debug!(error = %e, "Readiness probe failed, retrying...");
            return false;
        }
    };

    if !response.status().is_success() {
        debug!(status = %response.status(), "Readiness probe returned non-success");
        return false;
    }

    match probe {
        ReadinessProbe::Health => true,
        ReadinessProbe::ModelsListed => match response.json::<ModelList>().await {
            Ok(list) => !list.data.is_empty(),
            Err(e) => {
                debug!(error = %e, "Unexpected models response");
                false
            }
        },
    }
}

/// Single `GET <base>/health` with a short timeout.
pub async fn check_health(client: &Client, base_url: &str, timeout: Duration) -> bool {
    let url = format!("{}/health", base_url.trim_end_matches('/'));
    client
        .get(url)
        .timeout(timeout)
        .send()
        .await
        .is_ok_and(|r| r.status() == reqwest::StatusCode::OK)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn probe_urls() {
        let health = Readiness::health(
            "http://localhost:11434/",
            Duration::from_millis(500),
            Duration::from_secs(30),
        );
        assert_eq!(health.url(), "http://localhost:11434/health");

        let models = Readiness::models_listed(
            "http://localhost:11435",
            Duration::from_secs(1),
            Duration::from_secs(60),
        );
        assert_eq!(models.url(), "http://localhost:11435/v1/models");
    }

    #[tokio::test]
    async fn nothing_listening_times_out() {
        // Reserve a port, then free it so nothing answers
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let readiness = Readiness::health(
            format!("http://127.0.0.1:{port}"),
            Duration::from_millis(50),
            Duration::from_millis(300),
        );
        let err = wait_until_ready(&Client::new(), &readiness, None, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::ReadinessTimeout { .. }));
    }

    #[tokio::test]
    async fn cancellation_wins() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let readiness = Readiness::health(
            "http://127.0.0.1:9",
            Duration::from_millis(50),
            Duration::from_secs(30),
        );
        let err = wait_until_ready(&Client::new(), &readiness, None, &cancel)
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
    }

    #[tokio::test]
    #[cfg(unix)]
    async fn exited_child_stops_the_wait() {
        let mut child = tokio::process::Command::new("true").spawn().unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        let readiness = Readiness::health(
            "http://127.0.0.1:9",
            Duration::from_millis(50),
            Duration::from_secs(30),
        );
        let err = wait_until_ready(
            &Client::new(),
            &readiness,
            Some(&mut child),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, BackendError::ExitedEarly { .. }));
    }
}
