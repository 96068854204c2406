//! Process ownership shared by both backends.

use std::path::PathBuf;
use std::time::Duration;

use reqwest::Client;
use tokio::process::Child;
use tokio_util::sync::CancellationToken;
use toke_core::BackendKind;
use tracing::{info, warn};

use super::BackendState;
use crate::error::BackendError;
use crate::process::{Readiness, SHUTDOWN_GRACE, ServerCommand, check_health, shutdown_child, wait_until_ready};

const LIVENESS_TIMEOUT: Duration = Duration::from_secs(5);

/// A running server and the files it was launched with.
#[derive(Debug)]
pub struct BackendProcess {
    pub binary_path: PathBuf,
    pub model_path: PathBuf,
    pub port: u16,
    pub model_id: String,
    child: Child,
}

impl BackendProcess {
    pub fn pid(&self) -> Option<u32> {
        self.child.id()
    }
}

/// Single owner of a backend's child process and state.
#[derive(Debug)]
pub(super) struct Supervisor {
    kind: BackendKind,
    port: u16,
    state: BackendState,
    process: Option<BackendProcess>,
    client: Client,
}

impl Supervisor {
    pub fn new(kind: BackendKind, port: u16) -> Self {
        Self {
            kind,
            port,
            state: BackendState::Unconfigured,
            process: None,
            client: Client::new(),
        }
    }

    pub const fn port(&self) -> u16 {
        self.port
    }

    pub const fn state(&self) -> BackendState {
        self.state
    }

    pub const fn client(&self) -> &Client {
        &self.client
    }

    pub fn base_url(&self) -> String {
        format!("http://localhost:{}", self.port)
    }

    /// Record that binary and model are on disk.
    pub fn mark_downloaded(&mut self) {
        if matches!(
            self.state,
            BackendState::Unconfigured | BackendState::Failed | BackendState::Stopped
        ) && self.process.is_none()
        {
            self.state = BackendState::Downloaded;
        }
    }

    /// Spawn `command` and wait for readiness.
    ///
    /// On any failure the child is shut down, the handle cleared and the
    /// state set to `Failed`.
    pub async fn launch(
        &mut self,
        command: &ServerCommand,
        model_path: PathBuf,
        model_id: &str,
        readiness: &Readiness,
        cancel: &CancellationToken,
    ) -> Result<(), BackendError> {
        if self.is_running().await {
            info!(kind = %self.kind, port = self.port, "Server already running");
            return Ok(());
        }
        // A dead handle from an earlier run
        self.clear().await;

        self.state = BackendState::Starting;
        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                self.state = BackendState::Failed;
                return Err(e);
            }
        };

        if let Err(e) = wait_until_ready(&self.client, readiness, Some(&mut child), cancel).await {
            warn!(kind = %self.kind, error = %e, "Server failed to start");
            if let Err(stop_err) = shutdown_child(&mut child, SHUTDOWN_GRACE).await {
                warn!(error = %stop_err, "Failed to stop server after failed start");
            }
            self.state = BackendState::Failed;
            return Err(e);
        }

        info!(kind = %self.kind, port = self.port, pid = ?child.id(), "Server healthy");
        self.process = Some(BackendProcess {
            binary_path: command.program().to_path_buf(),
            model_path,
            port: self.port,
            model_id: model_id.to_string(),
            child,
        });
        self.state = BackendState::Healthy;
        Ok(())
    }

    /// Stop the server if one is running; idempotent.
    pub async fn stop(&mut self) -> Result<(), BackendError> {
        let Some(mut process) = self.process.take() else {
            if self.state == BackendState::Healthy {
                self.state = BackendState::Stopped;
            }
            return Ok(());
        };

        self.state = BackendState::Stopping;
        info!(kind = %self.kind, pid = ?process.pid(), "Stopping server");
        let result = shutdown_child(&mut process.child, SHUTDOWN_GRACE).await;
        self.state = BackendState::Stopped;
        result?;
        Ok(())
    }

    pub async fn is_running(&mut self) -> bool {
        let Some(process) = self.process.as_mut() else {
            return false;
        };
        if !matches!(process.child.try_wait(), Ok(None)) {
            return false;
        }
        check_health(&self.client, &self.base_url(), LIVENESS_TIMEOUT).await
    }

    async fn clear(&mut self) {
        if let Some(mut process) = self.process.take() {
            if let Err(e) = shutdown_child(&mut process.child, SHUTDOWN_GRACE).await {
                warn!(error = %e, "Failed to reap previous server");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stop_without_process_is_a_no_op() {
        let mut supervisor = Supervisor::new(BackendKind::LlamaCpp, 11434);
        supervisor.stop().await.unwrap();
        assert_eq!(supervisor.state(), BackendState::Unconfigured);
        assert!(!supervisor.is_running().await);
    }

    #[test]
    fn downloaded_only_from_idle_states() {
        let mut supervisor = Supervisor::new(BackendKind::Mlx, 11435);
        supervisor.mark_downloaded();
        assert_eq!(supervisor.state(), BackendState::Downloaded);

        supervisor.state = BackendState::Healthy;
        supervisor.mark_downloaded();
        assert_eq!(supervisor.state(), BackendState::Healthy);
    }
}
