//! MLX server backend (Apple Silicon only).

pub mod files;

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tokio::fs;
use tokio_util::sync::CancellationToken;
use toke_core::{BackendKind, ModelOption};
use toke_download::{DownloadEngine, DownloadRequest};
use tracing::{info, warn};

use self::files::{
    ModelFile, fallback_files, file_url, is_mlx_model_complete, list_model_files,
    wanted_model_file,
};
use super::supervisor::Supervisor;
use super::{BackendSettings, BackendState, ModelBackend, ProgressFn};
use crate::assets::{ArchiveKind, extract};
use crate::error::BackendError;
use crate::process::{OutputStyle, Readiness, ServerCommand};

const MAX_TOKENS: u32 = 4096;
const READY_INTERVAL: Duration = Duration::from_secs(1);
const READY_TIMEOUT: Duration = Duration::from_secs(60);
const SERVER_NAME: &str = "mlx-server";
const ENV_DIR_NAME: &str = "mlx-env";

pub struct MlxBackend {
    settings: BackendSettings,
    model_id: String,
    engine: DownloadEngine,
    supervisor: Supervisor,
}

impl MlxBackend {
    /// Fails with [`BackendError::UnsupportedPlatform`] off Apple Silicon.
    pub fn new(model_id: impl Into<String>, settings: BackendSettings) -> Result<Self, BackendError> {
        if !settings.platform.is_apple_silicon() {
            return Err(BackendError::UnsupportedPlatform);
        }
        let port = settings.port_for(BackendKind::Mlx);
        Ok(Self {
            settings,
            model_id: model_id.into(),
            engine: DownloadEngine::new()?,
            supervisor: Supervisor::new(BackendKind::Mlx, port),
        })
    }

    pub fn binary_path(&self) -> PathBuf {
        self.settings.bin_dir().join(SERVER_NAME)
    }

    pub fn env_path(&self) -> PathBuf {
        self.settings.bin_dir().join(ENV_DIR_NAME)
    }

    pub fn model_dir(&self) -> PathBuf {
        self.settings.mlx_models_dir().join(&self.model_id)
    }

    pub fn launch_command(&self) -> ServerCommand {
        ServerCommand::new(self.binary_path(), OutputStyle::Mlx)
            .arg("--model")
            .arg(self.model_dir().display().to_string())
            .arg("--port")
            .arg(self.port().to_string())
            .arg("--host")
            .arg("127.0.0.1")
            .arg("--max-tokens")
            .arg(MAX_TOKENS.to_string())
            .arg("--trust-remote-code")
            .env("MLX_ENV_PATH", self.env_path().display().to_string())
            .env("PYTORCH_ENABLE_MPS_FALLBACK", "1")
    }

    fn refresh_downloaded(&mut self) {
        if self.binary_path().is_file() && is_mlx_model_complete(&self.model_dir()) {
            self.supervisor.mark_downloaded();
        }
    }

    /// Resolve the file list, falling back to the usual layout.
    async fn model_files(&self, model: &ModelOption) -> Result<Vec<ModelFile>, BackendError> {
        let files = match list_model_files(self.engine.client(), &model.url).await {
            Ok(files) => files,
            Err(e) => {
                warn!(error = %e, "Could not list model files, using default layout");
                fallback_files(&model.url)
            }
        };
        let files: Vec<_> = files
            .into_iter()
            .filter(|f| wanted_model_file(&f.path))
            .collect();
        if files.is_empty() {
            return Err(BackendError::NoModelFiles);
        }
        Ok(files)
    }
}

#[async_trait]
impl ModelBackend for MlxBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Mlx
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn state(&self) -> BackendState {
        self.supervisor.state()
    }

    fn port(&self) -> u16 {
        self.supervisor.port()
    }

    async fn download_server(
        &mut self,
        cancel: &CancellationToken,
        on_progress: &mut ProgressFn<'_>,
    ) -> Result<(), BackendError> {
        let binary = self.binary_path();
        if binary.is_file() {
            info!(path = %binary.display(), "MLX server already installed");
            return Ok(());
        }

        let cache = self.settings.cache_dir();
        let bundle = cache.join("mlx-server-bundle.tar.gz");
        info!(url = %self.settings.mlx_server_url, "Downloading MLX server bundle");
        self.engine
            .download(
                &DownloadRequest::new(&self.settings.mlx_server_url, &bundle),
                cancel,
                on_progress,
            )
            .await?;

        let staging = cache.join("mlx-server-bundle");
        if staging.exists() {
            fs::remove_dir_all(&staging).await?;
        }
        let (src, dest) = (bundle.clone(), staging.clone());
        tokio::task::spawn_blocking(move || extract(ArchiveKind::TarGz, &src, &dest))
            .await
            .map_err(|e| BackendError::Unpack(e.to_string()))??;

        let result = install_bundle(&staging, &self.settings.bin_dir()).await;
        if let Err(e) = fs::remove_dir_all(&staging).await {
            warn!(path = %staging.display(), error = %e, "Failed to clean up bundle");
        }
        if let Err(e) = fs::remove_file(&bundle).await {
            warn!(path = %bundle.display(), error = %e, "Failed to remove bundle archive");
        }
        result?;

        info!(path = %binary.display(), "MLX server installed");
        self.refresh_downloaded();
        Ok(())
    }

    async fn download_model(
        &mut self,
        model: &ModelOption,
        cancel: &CancellationToken,
        on_progress: &mut ProgressFn<'_>,
    ) -> Result<(), BackendError> {
        let dir = self.settings.mlx_models_dir().join(&model.id);
        if is_mlx_model_complete(&dir) {
            info!(path = %dir.display(), "Model already downloaded");
            on_progress(model.size, model.size);
            self.refresh_downloaded();
            return Ok(());
        }

        let files = self.model_files(model).await?;
        let total: u64 = files.iter().map(|f| f.size).sum();
        fs::create_dir_all(&dir).await?;
        info!(model = %model.id, files = files.len(), total, "Downloading MLX model");

        let mut completed = 0u64;
        for file in &files {
            let dest = dir.join(&file.path);
            if let Ok(meta) = fs::metadata(&dest).await {
                if meta.len() == file.size {
                    completed += file.size;
                    on_progress(completed, total);
                    continue;
                }
            }

            let request = DownloadRequest::resumable(file_url(&model.url, &file.path), &dest)
                .with_expected_size(file.size);
            let base = completed;
            let outcome = self
                .engine
                .download(&request, cancel, &mut |downloaded, _| {
                    on_progress(base + downloaded, total);
                })
                .await?;
            completed += outcome.bytes;
        }

        info!(path = %dir.display(), "MLX model downloaded");
        self.refresh_downloaded();
        Ok(())
    }

    async fn start(&mut self, cancel: &CancellationToken) -> Result<(), BackendError> {
        let binary = self.binary_path();
        if !binary.is_file() {
            return Err(BackendError::BinaryMissing(binary));
        }
        let model_dir = self.model_dir();
        if !is_mlx_model_complete(&model_dir) {
            return Err(BackendError::ModelMissing(model_dir));
        }

        let readiness = Readiness::models_listed(
            self.supervisor.base_url(),
            READY_INTERVAL,
            self.settings.readiness_timeout.unwrap_or(READY_TIMEOUT),
        );
        let command = self.launch_command();
        let model_id = self.model_id.clone();
        self.supervisor
            .launch(&command, model_dir, &model_id, &readiness, cancel)
            .await
    }

    async fn stop(&mut self) -> Result<(), BackendError> {
        self.supervisor.stop().await
    }

    async fn is_running(&mut self) -> bool {
        self.supervisor.is_running().await
    }
}

/// Move `mlx-server` and `mlx-env` out of an extracted bundle into `bin_dir`.
async fn install_bundle(staging: &Path, bin_dir: &Path) -> Result<(), BackendError> {
    let root = bundle_root(staging)
        .await
        .ok_or_else(|| BackendError::Unpack("mlx-server not found in bundle".to_string()))?;
    fs::create_dir_all(bin_dir).await?;

    let env_src = root.join(ENV_DIR_NAME);
    if env_src.is_dir() {
        let env_dest = bin_dir.join(ENV_DIR_NAME);
        if env_dest.exists() {
            fs::remove_dir_all(&env_dest).await?;
        }
        fs::rename(&env_src, &env_dest).await?;
    }

    let server = bin_dir.join(SERVER_NAME);
    fs::rename(root.join(SERVER_NAME), &server).await?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&server, std::fs::Permissions::from_mode(0o755)).await?;
    }
    Ok(())
}

/// The bundle may wrap its contents in a single top-level directory.
async fn bundle_root(staging: &Path) -> Option<PathBuf> {
    if staging.join(SERVER_NAME).is_file() {
        return Some(staging.to_path_buf());
    }
    let mut entries = fs::read_dir(staging).await.ok()?;
    while let Ok(Some(entry)) = entries.next_entry().await {
        let path = entry.path();
        if path.join(SERVER_NAME).is_file() {
            return Some(path);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use toke_core::Platform;

    fn apple_settings(root: &Path) -> BackendSettings {
        BackendSettings::new(root).with_platform(Platform::new("darwin", "arm64"))
    }

    #[test]
    fn launch_command_sets_env_and_args() {
        let backend = MlxBackend::new("glm-4.5-air-3bit", apple_settings(Path::new("/data"))).unwrap();
        let command = backend.launch_command();
        assert_eq!(command.program(), Path::new("/data/bin/mlx-server"));
        assert_eq!(
            command.args(),
            [
                "--model",
                "/data/models/mlx/glm-4.5-air-3bit",
                "--port",
                "11435",
                "--host",
                "127.0.0.1",
                "--max-tokens",
                "4096",
                "--trust-remote-code",
            ]
        );
        assert!(command
            .envs()
            .contains(&("MLX_ENV_PATH".to_string(), "/data/bin/mlx-env".to_string())));
        assert!(command
            .envs()
            .contains(&("PYTORCH_ENABLE_MPS_FALLBACK".to_string(), "1".to_string())));
    }

    #[tokio::test]
    async fn bundle_contents_move_into_bin() {
        let temp = tempfile::tempdir().unwrap();
        let staging = temp.path().join("staging");
        let nested = staging.join("mlx-server-darwin-arm64");
        std::fs::create_dir_all(nested.join("mlx-env/bin")).unwrap();
        std::fs::write(nested.join("mlx-server"), b"#!/bin/sh").unwrap();
        std::fs::write(nested.join("mlx-env/bin/python"), b"py").unwrap();

        let bin = temp.path().join("bin");
        install_bundle(&staging, &bin).await.unwrap();
        assert!(bin.join("mlx-server").is_file());
        assert!(bin.join("mlx-env/bin/python").is_file());
    }

    #[tokio::test]
    async fn start_requires_complete_model() {
        let temp = tempfile::tempdir().unwrap();
        let settings = apple_settings(temp.path());
        std::fs::create_dir_all(settings.bin_dir()).unwrap();
        std::fs::write(settings.bin_dir().join("mlx-server"), b"bin").unwrap();

        let mut backend = MlxBackend::new("glm-4.5-air-3bit", settings).unwrap();
        let err = backend.start(&CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, BackendError::ModelMissing(_)));
    }
}
