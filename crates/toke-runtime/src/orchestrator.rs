//! Coordinates acquisition and lifecycle for the single active local model.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::fs;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use toke_core::{BackendKind, ModelCatalog, ModelOption};
use tracing::{debug, info, warn};

use crate::backend::{BackendSettings, BackendState, ModelBackend, ProgressFn, create_backend};
use crate::error::BackendError;
use crate::single_flight::KindGuard;

const HEALTH_INTERVAL: Duration = Duration::from_secs(30);
const VERIFY_INTERVAL: Duration = Duration::from_millis(500);
const VERIFY_TIMEOUT: Duration = Duration::from_secs(30);

/// Status callback for [`BackendOrchestrator::quick_setup`].
pub type StatusFn<'a> = dyn FnMut(&str) + Send + 'a;

#[derive(Default)]
struct Active {
    model: Option<ModelOption>,
    backend: Option<Box<dyn ModelBackend>>,
    guard: Option<KindGuard>,
    monitor: Option<CancellationToken>,
}

impl Active {
    fn stop_monitor(&mut self) {
        if let Some(token) = self.monitor.take() {
            token.cancel();
        }
    }
}

/// Owns the active model and its backend.
pub struct BackendOrchestrator {
    settings: BackendSettings,
    catalog: ModelCatalog,
    active: Arc<Mutex<Active>>,
    health_interval: Duration,
    shutdown: CancellationToken,
}

impl BackendOrchestrator {
    pub fn new(settings: BackendSettings, catalog: ModelCatalog) -> Self {
        Self {
            settings,
            catalog,
            active: Arc::default(),
            health_interval: HEALTH_INTERVAL,
            shutdown: CancellationToken::new(),
        }
    }

    #[must_use]
    pub const fn with_health_interval(mut self, interval: Duration) -> Self {
        self.health_interval = interval;
        self
    }

    pub const fn catalog(&self) -> &ModelCatalog {
        &self.catalog
    }

    pub const fn settings(&self) -> &BackendSettings {
        &self.settings
    }

    /// Download the server binary and the model.
    ///
    /// Server progress is scaled to a tenth and offset past the model size so
    /// a single bar can show both phases. Already-complete files short-circuit.
    pub async fn setup_model(
        &self,
        model: &ModelOption,
        cancel: &CancellationToken,
        on_progress: &mut ProgressFn<'_>,
    ) -> Result<(), BackendError> {
        for dir in [
            self.settings.bin_dir(),
            self.settings.models_dir(),
            self.settings.cache_dir(),
        ] {
            fs::create_dir_all(&dir).await?;
        }

        let mut active = self.active.lock().await;
        let reuse = active
            .backend
            .as_ref()
            .is_some_and(|b| b.model_id() == model.id && b.kind() == model.provider);
        if !reuse {
            if active.backend.is_some() {
                info!(model = %model.id, "Switching active model");
                Self::stop_locked(&mut active).await?;
            }
            active.backend = Some(create_backend(model, self.settings.clone())?);
        }
        active.model = Some(model.clone());

        let Some(backend) = active.backend.as_mut() else {
            return Err(BackendError::NotInitialized);
        };

        info!(model = %model.id, kind = %model.provider, "Setting up model");
        let model_size = model.size;
        backend
            .download_server(cancel, &mut |d, t| on_progress(d / 10, model_size + t / 10))
            .await?;
        backend.download_model(model, cancel, on_progress).await?;
        info!(model = %model.id, "Model setup complete");
        Ok(())
    }

    /// Launch the configured backend and wait until it is healthy.
    ///
    /// Fails with [`BackendError::AlreadyRunning`] while another owner holds
    /// a server of the same kind.
    pub async fn start(&self, cancel: &CancellationToken) -> Result<(), BackendError> {
        let mut active = self.active.lock().await;
        let Some(kind) = active.backend.as_ref().map(|b| b.kind()) else {
            return Err(BackendError::NotInitialized);
        };

        if active.guard.is_some() {
            if let Some(backend) = active.backend.as_mut() {
                if backend.is_running().await {
                    debug!(kind = %kind, "Backend already running");
                    return Ok(());
                }
            }
            active.guard = None;
        }

        let guard = KindGuard::acquire(kind)?;
        let Some(backend) = active.backend.as_mut() else {
            return Err(BackendError::NotInitialized);
        };
        backend.start(cancel).await?;
        active.guard = Some(guard);

        active.stop_monitor();
        let token = self.shutdown.child_token();
        active.monitor = Some(token.clone());
        spawn_health_monitor(Arc::clone(&self.active), self.health_interval, token);
        Ok(())
    }

    /// Stop the backend; a no-op when nothing is running.
    pub async fn stop(&self) -> Result<(), BackendError> {
        let mut active = self.active.lock().await;
        Self::stop_locked(&mut active).await
    }

    async fn stop_locked(active: &mut Active) -> Result<(), BackendError> {
        active.stop_monitor();
        let result = match active.backend.as_mut() {
            Some(backend) => backend.stop().await,
            None => Ok(()),
        };
        active.guard = None;
        result
    }

    /// OpenAI-compatible base URL of the healthy backend.
    pub async fn endpoint(&self) -> Result<String, BackendError> {
        let active = self.active.lock().await;
        match active.backend.as_ref() {
            Some(backend) if backend.state() == BackendState::Healthy => Ok(backend.endpoint()),
            _ => Err(BackendError::NotRunning),
        }
    }

    pub async fn model(&self) -> Option<ModelOption> {
        self.active.lock().await.model.clone()
    }

    pub async fn state(&self) -> BackendState {
        self.active
            .lock()
            .await
            .backend
            .as_ref()
            .map_or(BackendState::Unconfigured, |b| b.state())
    }

    pub async fn is_running(&self) -> bool {
        let mut active = self.active.lock().await;
        match active.backend.as_mut() {
            Some(backend) => backend.is_running().await,
            None => false,
        }
    }

    /// Warnings about the host, also logged.
    pub fn check_system_requirements(&self) -> Vec<String> {
        let platform = self.settings.platform;
        let mut warnings = Vec::new();
        if platform.os == "darwin" && !platform.is_apple_silicon() {
            warnings.push(
                "Intel Mac detected: MLX models need Apple Silicon, llama.cpp models will be used"
                    .to_string(),
            );
        }
        for warning in &warnings {
            warn!("{warning}");
        }
        warnings
    }

    /// Model picked by [`quick_setup`](Self::quick_setup) on this host.
    pub fn quick_setup_model(&self) -> Option<&ModelOption> {
        if self.settings.platform.is_apple_silicon() {
            if let Some(model) = self.catalog.recommended_mlx_model() {
                return Some(model);
            }
        }
        self.catalog
            .recommended_model()
            .filter(|m| m.provider == BackendKind::LlamaCpp || m.available)
    }

    /// Set up, start and verify the recommended model for this host.
    pub async fn quick_setup(
        &self,
        cancel: &CancellationToken,
        on_status: &mut StatusFn<'_>,
        on_progress: &mut ProgressFn<'_>,
    ) -> Result<ModelOption, BackendError> {
        on_status("Preparing setup...");
        let model = self
            .quick_setup_model()
            .cloned()
            .ok_or_else(|| BackendError::UnknownModel("no recommended model".to_string()))?;
        info!(model = %model.id, "Quick setup");

        on_status("Downloading model...");
        self.setup_model(&model, cancel, on_progress).await?;
        on_status("Model ready!");

        on_status("Starting AI server...");
        self.start(cancel).await?;

        on_status("Verifying connection...");
        self.verify_running(cancel).await?;

        on_status("Ready!");
        Ok(model)
    }

    async fn verify_running(&self, cancel: &CancellationToken) -> Result<(), BackendError> {
        let deadline = Instant::now() + VERIFY_TIMEOUT;
        loop {
            if self.is_running().await {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(BackendError::ReadinessTimeout {
                    timeout: VERIFY_TIMEOUT,
                });
            }
            tokio::select! {
                () = cancel.cancelled() => return Err(BackendError::Cancelled),
                () = tokio::time::sleep(VERIFY_INTERVAL) => {}
            }
        }
    }
}

impl Drop for BackendOrchestrator {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// Periodically check the backend and log failures. Never restarts.
fn spawn_health_monitor(active: Arc<Mutex<Active>>, every: Duration, token: CancellationToken) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick fires immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                () = token.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let mut active = active.lock().await;
            if token.is_cancelled() {
                break;
            }
            let Some(backend) = active.backend.as_mut() else {
                break;
            };
            if backend.is_running().await {
                debug!(kind = %backend.kind(), "Backend healthy");
            } else {
                warn!(
                    kind = %backend.kind(),
                    model = %backend.model_id(),
                    "Backend health check failed"
                );
            }
        }
        debug!("Health monitor stopped");
    });
}
