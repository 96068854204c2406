//! llama.cpp `llama-server` backend.

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use flate2::read::GzDecoder;
use tokio::fs;
use tokio_util::sync::CancellationToken;
use toke_core::{BackendKind, ModelOption, Platform};
use toke_download::{DownloadEngine, DownloadRequest};
use tracing::{info, warn};

use super::supervisor::Supervisor;
use super::{BackendSettings, BackendState, ModelBackend, ProgressFn};
use crate::error::BackendError;
use crate::process::{OutputStyle, Readiness, ServerCommand};

const CONTEXT_SIZE: u32 = 8192;
const READY_INTERVAL: Duration = Duration::from_millis(500);
const READY_TIMEOUT: Duration = Duration::from_secs(30);

/// Release asset holding the server binary for `platform`.
pub fn llama_asset_name(platform: Platform) -> &'static str {
    match (platform.os, platform.arch) {
        ("darwin", "arm64") => "llama-server-darwin-arm64.gz",
        ("darwin", _) => "llama-server-darwin-x64.gz",
        ("windows", _) => "llama-server-windows-x64.exe.zip",
        _ => "llama-server-linux-x64.gz",
    }
}

/// Where the byte count of a completed model download is kept.
///
/// Catalog sizes are approximate, so completeness is judged against the
/// length the server actually delivered.
fn size_record_path(model: &Path) -> PathBuf {
    let mut name = model.as_os_str().to_os_string();
    name.push(".size");
    PathBuf::from(name)
}

async fn read_size_record(path: &Path) -> Option<u64> {
    fs::read_to_string(path).await.ok()?.trim().parse().ok()
}

async fn remove_size_record(path: &Path) {
    if let Err(e) = fs::remove_file(path).await {
        if e.kind() != io::ErrorKind::NotFound {
            warn!(path = %path.display(), error = %e, "Failed to remove model size record");
        }
    }
}

pub struct LlamaCppBackend {
    settings: BackendSettings,
    model_id: String,
    engine: Option<DownloadEngine>,
    supervisor: Supervisor,
}

impl LlamaCppBackend {
    pub fn new(model_id: impl Into<String>, settings: BackendSettings) -> Self {
        let port = settings.port_for(BackendKind::LlamaCpp);
        Self {
            settings,
            model_id: model_id.into(),
            engine: None,
            supervisor: Supervisor::new(BackendKind::LlamaCpp, port),
        }
    }

    pub fn binary_path(&self) -> PathBuf {
        self.settings
            .bin_dir()
            .join(format!("llama-server{}", self.settings.platform.exe_suffix()))
    }

    pub fn model_path(&self) -> PathBuf {
        self.settings
            .models_dir()
            .join(format!("{}.gguf", self.model_id))
    }

    /// Arguments passed to `llama-server`.
    pub fn launch_args(&self) -> Vec<String> {
        let mut args = vec![
            "--model".to_string(),
            self.model_path().display().to_string(),
            "--port".to_string(),
            self.port().to_string(),
            "--host".to_string(),
            "127.0.0.1".to_string(),
            "--n-gpu-layers".to_string(),
            "-1".to_string(),
            "--ctx-size".to_string(),
            CONTEXT_SIZE.to_string(),
            "--threads".to_string(),
            num_cpus::get().to_string(),
            "--mlock".to_string(),
            "--no-mmap".to_string(),
            "--jinja".to_string(),
        ];
        if self.settings.platform.is_apple_silicon() {
            args.push("--use-metal".to_string());
        }
        args
    }

    fn engine(&mut self) -> Result<DownloadEngine, BackendError> {
        if let Some(engine) = &self.engine {
            return Ok(engine.clone());
        }
        let engine = DownloadEngine::new()?;
        self.engine = Some(engine.clone());
        Ok(engine)
    }

    fn refresh_downloaded(&mut self) {
        if self.binary_path().is_file() && self.model_path().is_file() {
            self.supervisor.mark_downloaded();
        }
    }
}

#[async_trait]
impl ModelBackend for LlamaCppBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::LlamaCpp
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
            info!(path = %binary.display(), "llama-server already installed");
            return Ok(());
        }

        let asset = llama_asset_name(self.settings.platform);
        let url = format!(
            "{}/{asset}",
            self.settings.llama_server_url.trim_end_matches('/')
        );
        let archive = self.settings.cache_dir().join(asset);
        info!(url = %url, "Downloading llama-server");

        let engine = self.engine()?;
        engine
            .download(&DownloadRequest::new(&url, &archive), cancel, on_progress)
            .await?;

        fs::create_dir_all(self.settings.bin_dir()).await?;
        let staging = binary.with_extension("tmp");
        let (src, dest) = (archive.clone(), staging.clone());
        tokio::task::spawn_blocking(move || unpack_server(&src, &dest))
            .await
            .map_err(|e| BackendError::Unpack(e.to_string()))??;

        set_executable(&staging).await?;
        fs::rename(&staging, &binary).await?;
        if let Err(e) = fs::remove_file(&archive).await {
            warn!(path = %archive.display(), error = %e, "Failed to remove server archive");
        }

        info!(path = %binary.display(), "llama-server installed");
        self.refresh_downloaded();
        Ok(())
    }

    async fn download_model(
        &mut self,
        model: &ModelOption,
        cancel: &CancellationToken,
        on_progress: &mut ProgressFn<'_>,
    ) -> Result<(), BackendError> {
        let path = self
            .settings
            .models_dir()
            .join(format!("{}.gguf", model.id));

        let sidecar = size_record_path(&path);
        if let Ok(meta) = fs::metadata(&path).await {
            let expected = read_size_record(&sidecar).await.unwrap_or(model.size);
            if meta.len() == expected {
                info!(path = %path.display(), "Model already downloaded");
                on_progress(expected, expected);
                self.refresh_downloaded();
                return Ok(());
            }
            warn!(
                path = %path.display(),
                expected,
                actual = meta.len(),
                "Removing corrupted model file"
            );
            fs::remove_file(&path).await?;
            remove_size_record(&sidecar).await;
        }

        let request = DownloadRequest::resumable(&model.url, &path)
            .with_expected_size(model.size)
            .with_checksum(&model.checksum);
        let engine = self.engine()?;
        let outcome = engine.download(&request, cancel, on_progress).await?;
        if let Err(e) = fs::write(&sidecar, outcome.bytes.to_string()).await {
            warn!(path = %sidecar.display(), error = %e, "Failed to record model size");
        }

        info!(path = %path.display(), "Model downloaded");
        self.refresh_downloaded();
        Ok(())
    }

    async fn start(&mut self, cancel: &CancellationToken) -> Result<(), BackendError> {
        let binary = self.binary_path();
        if !binary.is_file() {
            return Err(BackendError::BinaryMissing(binary));
        }
        let model_path = self.model_path();
        if !model_path.is_file() {
            return Err(BackendError::ModelMissing(model_path));
        }

        let mut command = ServerCommand::new(&binary, OutputStyle::Llama);
        for arg in self.launch_args() {
            command = command.arg(arg);
        }

        let readiness = Readiness::health(
            self.supervisor.base_url(),
            READY_INTERVAL,
            self.settings.readiness_timeout.unwrap_or(READY_TIMEOUT),
        );
        let model_id = self.model_id.clone();
        self.supervisor
            .launch(&command, model_path, &model_id, &readiness, cancel)
            .await
    }

    async fn stop(&mut self) -> Result<(), BackendError> {
        self.supervisor.stop().await
    }

    async fn is_running(&mut self) -> bool {
        self.supervisor.is_running().await
    }
}

/// Decompress a `.gz` or `.zip` server asset into `dest`.
fn unpack_server(archive: &Path, dest: &Path) -> Result<(), BackendError> {
    let name = archive
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default();
    let mut out = File::create(dest)?;

    if name.ends_with(".zip") {
        let file = File::open(archive)?;
        let mut zip =
            zip::ZipArchive::new(file).map_err(|e| BackendError::Unpack(e.to_string()))?;
        let index = (0..zip.len())
            .find(|&i| {
                zip.by_index(i)
                    .ok()
                    .and_then(|entry| entry.enclosed_name())
                    .and_then(|p| p.file_name().map(|f| f.to_string_lossy().into_owned()))
                    .is_some_and(|f| f.starts_with("llama-server"))
            })
            .ok_or_else(|| BackendError::Unpack("llama-server not found in archive".into()))?;
        let mut entry = zip
            .by_index(index)
            .map_err(|e| BackendError::Unpack(e.to_string()))?;
        io::copy(&mut entry, &mut out)?;
    } else {
        let mut decoder = GzDecoder::new(File::open(archive)?);
        io::copy(&mut decoder, &mut out)
            .map_err(|e| BackendError::Unpack(format!("invalid gzip stream: {e}")))?;
    }
    Ok(())
}

#[cfg(unix)]
async fn set_executable(path: &Path) -> Result<(), BackendError> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).await?;
    Ok(())
}

#[cfg(not(unix))]
async fn set_executable(_path: &Path) -> Result<(), BackendError> {
    Ok(())
}
