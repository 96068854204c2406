//! Model backends: one trait, two server families.
//!
//! A backend owns one model's lifecycle: fetch the server binary, fetch the
//! weights, launch the server, wait for readiness and stop it again.
//! [`create_backend`] is the only place that picks a concrete type.

mod llama;
mod mlx;
mod supervisor;

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use toke_core::env::{LLAMA_SERVER_URL_VAR, MLX_SERVER_URL_VAR};
use toke_core::{BackendKind, Env, ModelOption, PathError, Platform, data_root_from};

use crate::error::BackendError;

pub use llama::{LlamaCppBackend, llama_asset_name};
pub use mlx::MlxBackend;
pub use mlx::files::{ModelFile, fallback_files, is_mlx_model_complete, wanted_model_file};
pub use supervisor::BackendProcess;

/// Progress callback: `(downloaded, total)` bytes.
pub type ProgressFn<'a> = dyn FnMut(u64, u64) + Send + 'a;

pub const DEFAULT_LLAMA_SERVER_BASE: &str =
    "https://github.com/chasedut/toke-llama-server/releases/latest/download";
pub const DEFAULT_MLX_SERVER_URL: &str =
    "https://github.com/chasedut/toke-mlx-server/releases/latest/download/mlx-server-darwin-arm64.tar.gz";

/// Lifecycle position of a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendState {
    Unconfigured,
    Downloaded,
    Starting,
    Healthy,
    Stopping,
    Stopped,
    Failed,
}

/// Filesystem and network settings shared by both backends.
#[derive(Debug, Clone)]
pub struct BackendSettings {
    pub data_root: PathBuf,
    pub platform: Platform,
    /// Directory URL holding the llama-server release assets.
    pub llama_server_url: String,
    /// Full URL of the MLX server bundle.
    pub mlx_server_url: String,
    /// Overrides the kind's default port.
    pub port: Option<u16>,
    /// Overrides the kind's readiness timeout.
    pub readiness_timeout: Option<Duration>,
}

impl BackendSettings {
    pub fn new(data_root: impl Into<PathBuf>) -> Self {
        Self {
            data_root: data_root.into(),
            platform: Platform::current(),
            llama_server_url: DEFAULT_LLAMA_SERVER_BASE.to_string(),
            mlx_server_url: DEFAULT_MLX_SERVER_URL.to_string(),
            port: None,
            readiness_timeout: None,
        }
    }

    pub fn from_env(env: &dyn Env) -> Result<Self, PathError> {
        let mut settings = Self::new(data_root_from(env)?);
        if let Some(url) = env.get(LLAMA_SERVER_URL_VAR) {
            settings.llama_server_url = url;
        }
        if let Some(url) = env.get(MLX_SERVER_URL_VAR) {
            settings.mlx_server_url = url;
        }
        Ok(settings)
    }

    #[must_use]
    pub const fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self
    }

    #[must_use]
    pub const fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    #[must_use]
    pub const fn with_readiness_timeout(mut self, timeout: Duration) -> Self {
        self.readiness_timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn with_llama_server_url(mut self, url: impl Into<String>) -> Self {
        self.llama_server_url = url.into();
        self
    }

    #[must_use]
    pub fn with_mlx_server_url(mut self, url: impl Into<String>) -> Self {
        self.mlx_server_url = url.into();
        self
    }

    pub fn bin_dir(&self) -> PathBuf {
        self.data_root.join("bin")
    }

    pub fn models_dir(&self) -> PathBuf {
        self.data_root.join("models")
    }

    pub fn mlx_models_dir(&self) -> PathBuf {
        self.models_dir().join("mlx")
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.data_root.join("cache")
    }

    pub fn port_for(&self, kind: BackendKind) -> u16 {
        self.port.unwrap_or_else(|| kind.default_port())
    }
}

/// One model's server lifecycle.
#[async_trait]
pub trait ModelBackend: Send {
    fn kind(&self) -> BackendKind;

    fn model_id(&self) -> &str;

    fn state(&self) -> BackendState;

    fn port(&self) -> u16;

    /// OpenAI-compatible base URL.
    fn endpoint(&self) -> String {
        format!("http://localhost:{}/v1", self.port())
    }

    /// Fetch the server binary unless it is already present.
    async fn download_server(
        &mut self,
        cancel: &CancellationToken,
        on_progress: &mut ProgressFn<'_>,
    ) -> Result<(), BackendError>;

    /// Fetch the model weights unless they are already complete.
    async fn download_model(
        &mut self,
        model: &ModelOption,
        cancel: &CancellationToken,
        on_progress: &mut ProgressFn<'_>,
    ) -> Result<(), BackendError>;

    /// Launch the server and block until it is ready.
    async fn start(&mut self, cancel: &CancellationToken) -> Result<(), BackendError>;

    /// Stop the server. The process handle is cleared whatever happens.
    async fn stop(&mut self) -> Result<(), BackendError>;

    /// Process alive and `/health` answering 200.
    async fn is_running(&mut self) -> bool;
}

/// Build the backend for `model.provider`.
pub fn create_backend(
    model: &ModelOption,
    settings: BackendSettings,
) -> Result<Box<dyn ModelBackend>, BackendError> {
    match model.provider {
        BackendKind::LlamaCpp => Ok(Box::new(LlamaCppBackend::new(&model.id, settings))),
        BackendKind::Mlx => Ok(Box::new(MlxBackend::new(&model.id, settings)?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use toke_core::{MapEnv, ModelCatalog};

    #[test]
    fn settings_layout() {
        let settings = BackendSettings::new("/data");
        assert_eq!(settings.bin_dir(), PathBuf::from("/data/bin"));
        assert_eq!(settings.mlx_models_dir(), PathBuf::from("/data/models/mlx"));
        assert_eq!(settings.cache_dir(), PathBuf::from("/data/cache"));
        assert_eq!(settings.port_for(BackendKind::Mlx), 11435);
        assert_eq!(settings.clone().with_port(9000).port_for(BackendKind::Mlx), 9000);
    }

    #[test]
    fn settings_from_env_overrides_urls() {
        let env = MapEnv::new()
            .with(toke_core::env::DATA_DIR_VAR, "/data")
            .with(LLAMA_SERVER_URL_VAR, "http://mirror/llama")
            .with(MLX_SERVER_URL_VAR, "http://mirror/mlx.tar.gz");
        let settings = BackendSettings::from_env(&env).unwrap();
        assert_eq!(settings.data_root, PathBuf::from("/data"));
        assert_eq!(settings.llama_server_url, "http://mirror/llama");
        assert_eq!(settings.mlx_server_url, "http://mirror/mlx.tar.gz");
    }

    #[test]
    fn factory_selects_by_provider() {
        let catalog = ModelCatalog::for_host(true);
        let settings = BackendSettings::new("/data").with_platform(Platform::new("darwin", "arm64"));

        let gguf = catalog.get_model_by_id("qwen2.5-3b-q4_k_m").unwrap();
        let backend = create_backend(gguf, settings.clone()).unwrap();
        assert_eq!(backend.kind(), BackendKind::LlamaCpp);
        assert_eq!(backend.endpoint(), "http://localhost:11434/v1");
        assert_eq!(backend.state(), BackendState::Unconfigured);

        let mlx = catalog.get_model_by_id("glm-4.5-air-3bit").unwrap();
        let backend = create_backend(mlx, settings).unwrap();
        assert_eq!(backend.kind(), BackendKind::Mlx);
        assert_eq!(backend.model_id(), "glm-4.5-air-3bit");
        assert_eq!(backend.endpoint(), "http://localhost:11435/v1");
    }

    #[test]
    fn mlx_fails_fast_off_apple_silicon() {
        let catalog = ModelCatalog::for_host(false);
        let mlx = catalog.get_model_by_id("glm-4.5-air-3bit").unwrap();
        let settings = BackendSettings::new("/data").with_platform(Platform::new("linux", "amd64"));
        let err = create_backend(mlx, settings).err().unwrap();
        assert!(matches!(err, BackendError::UnsupportedPlatform));
    }
}
