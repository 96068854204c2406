//! Backend executable acquisition.
//!
//! The [`AssetManager`] resolves a [`Manifest`] of server executables for the
//! host platform, prefers local builds, and installs whatever is missing
//! under `<data root>/backends/<name>/`. Progress is published on a bounded
//! channel of [`DownloadProgress`] snapshots.

mod error;
mod extract;
mod local;
mod manifest;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Utc;
use reqwest::{Client, header};
use tokio::fs;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use toke_core::env::RELEASE_REPO_VAR;
use toke_core::{DownloadProgress, Env, PathError, Platform, data_root_from};
use toke_download::{DownloadEngine, DownloadRequest, ProgressThrottle};
use tracing::{debug, info, warn};

pub use error::AssetError;
pub use extract::{ArchiveKind, extract};
pub use manifest::{Dependency, Manifest};

use local::{configured_local_path, local_build_candidates};
use manifest::{GitHubRelease, known_executable, manifest_from_release};

/// Release repository used when `TOKE_RELEASE_REPO` is unset.
pub const DEFAULT_RELEASE_REPO: &str = "chasedut/toke";

/// File name of the manifest shipped next to the binary and of the cache.
pub const EMBEDDED_MANIFEST_NAME: &str = "backends-manifest.json";
const CACHED_MANIFEST_NAME: &str = "manifest.json";
const VERSION_FILE: &str = "VERSION";

const PROGRESS_CAPACITY: usize = 100;
const DEFAULT_MANIFEST_MAX_AGE: Duration = Duration::from_secs(24 * 60 * 60);
const FEED_USER_AGENT: &str = "toke";

/// Where the asset manager reads and writes, and what it probes.
#[derive(Debug, Clone)]
pub struct AssetConfig {
    /// Install root, normally `<data root>/backends`.
    pub base_dir: PathBuf,
    /// Release feed returning the latest release as JSON.
    pub feed_url: String,
    /// Manifest shipped with the binary; wins over cache and network.
    pub embedded_manifest: Option<PathBuf>,
    /// Directory relative local-build paths resolve against.
    pub search_root: PathBuf,
    pub home_dir: Option<PathBuf>,
    /// Probe `/usr/local/bin`, `/opt/toke` and the Windows program dirs.
    pub include_system_paths: bool,
    pub platform: Platform,
    pub manifest_max_age: Duration,
}

impl AssetConfig {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        let embedded_manifest = std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(|dir| dir.join(EMBEDDED_MANIFEST_NAME)));
        Self {
            base_dir: base_dir.into(),
            feed_url: release_feed_url(DEFAULT_RELEASE_REPO),
            embedded_manifest,
            search_root: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            home_dir: dirs::home_dir(),
            include_system_paths: true,
            platform: Platform::current(),
            manifest_max_age: DEFAULT_MANIFEST_MAX_AGE,
        }
    }

    /// Defaults rooted at the configured data directory.
    pub fn from_env(env: &dyn Env) -> Result<Self, PathError> {
        let base_dir = data_root_from(env)?.join("backends");
        let repo = env
            .get(RELEASE_REPO_VAR)
            .unwrap_or_else(|| DEFAULT_RELEASE_REPO.to_string());
        Ok(Self::new(base_dir).with_feed_url(release_feed_url(&repo)))
    }

    #[must_use]
    pub fn with_feed_url(mut self, url: impl Into<String>) -> Self {
        self.feed_url = url.into();
        self
    }

    #[must_use]
    pub fn with_embedded_manifest(mut self, path: Option<PathBuf>) -> Self {
        self.embedded_manifest = path;
        self
    }

    #[must_use]
    pub fn with_search_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.search_root = root.into();
        self
    }

    #[must_use]
    pub fn with_home_dir(mut self, home: Option<PathBuf>) -> Self {
        self.home_dir = home;
        self
    }

    #[must_use]
    pub const fn with_system_paths(mut self, include: bool) -> Self {
        self.include_system_paths = include;
        self
    }

    #[must_use]
    pub const fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self
    }

    #[must_use]
    pub const fn with_manifest_max_age(mut self, age: Duration) -> Self {
        self.manifest_max_age = age;
        self
    }
}

pub fn release_feed_url(repo: &str) -> String {
    format!("https://api.github.com/repos/{repo}/releases/latest")
}

/// Installs and locates backend executables.
pub struct AssetManager {
    config: AssetConfig,
    client: Client,
    engine: DownloadEngine,
    progress: mpsc::Sender<DownloadProgress>,
}

impl AssetManager {
    /// Create a manager and the receiving end of its progress channel.
    pub fn new(
        config: AssetConfig,
    ) -> Result<(Self, mpsc::Receiver<DownloadProgress>), AssetError> {
        let engine = DownloadEngine::new()?;
        let client = engine.client().clone();
        let (tx, rx) = mpsc::channel(PROGRESS_CAPACITY);
        Ok((
            Self {
                config,
                client,
                engine,
                progress: tx,
            },
            rx,
        ))
    }

    pub const fn config(&self) -> &AssetConfig {
        &self.config
    }

    /// Create the install root.
    pub async fn initialize(&self) -> Result<(), AssetError> {
        fs::create_dir_all(&self.config.base_dir).await?;
        Ok(())
    }

    /// Resolve the manifest: embedded, then a fresh cache, then the feed.
    pub async fn get_manifest(&self, cancel: &CancellationToken) -> Result<Manifest, AssetError> {
        if let Some(path) = &self.config.embedded_manifest {
            if let Some(manifest) = read_manifest(path).await {
                debug!(path = %path.display(), "Using embedded manifest");
                return Ok(manifest);
            }
        }

        let cache = self.config.base_dir.join(CACHED_MANIFEST_NAME);
        if let Some(manifest) = read_manifest(&cache).await {
            let age = Utc::now().signed_duration_since(manifest.updated_at);
            if age.to_std().is_ok_and(|age| age < self.config.manifest_max_age) {
                debug!("Using cached manifest");
                return Ok(manifest);
            }
        }

        let manifest = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(AssetError::Cancelled),
            result = self.fetch_manifest() => result?,
        };

        if let Err(e) = self.save_manifest(&cache, &manifest).await {
            warn!(error = %e, "Failed to cache manifest");
        }
        Ok(manifest)
    }

    async fn fetch_manifest(&self) -> Result<Manifest, AssetError> {
        info!(url = %self.config.feed_url, "Fetching release manifest");
        let response = self
            .client
            .get(&self.config.feed_url)
            .header(header::USER_AGENT, FEED_USER_AGENT)
            .header(header::ACCEPT, "application/vnd.github.v3+json")
            .send()
            .await
            .map_err(|e| AssetError::ManifestFetch(e.to_string()))?;

        if !response.status().is_success() {
            return Err(AssetError::ManifestFetch(format!(
                "release feed returned {}",
                response.status()
            )));
        }

        let release: GitHubRelease = response
            .json()
            .await
            .map_err(|e| AssetError::ManifestFetch(e.to_string()))?;
        Ok(manifest_from_release(&release, self.config.platform, Utc::now()))
    }

    async fn save_manifest(&self, path: &Path, manifest: &Manifest) -> Result<(), AssetError> {
        fs::create_dir_all(&self.config.base_dir).await?;
        let json = serde_json::to_string_pretty(manifest)
            .map_err(|e| AssetError::ManifestFetch(e.to_string()))?;
        fs::write(path, json).await?;
        Ok(())
    }

    /// First existing local build for `dep`, announced on the progress channel.
    pub async fn check_local_build(&self, dep: &Dependency) -> Option<PathBuf> {
        let found = local_build_candidates(&self.config, dep)
            .into_iter()
            .find(|path| path.is_file())?;
        info!(name = %dep.name, path = %found.display(), "Using local build");
        self.report_final(DownloadProgress::new(
            &dep.name,
            format!("Using local build: {}", found.display()),
        ))
        .await;
        Some(found)
    }

    fn install_path(&self, dep: &Dependency) -> PathBuf {
        self.config.base_dir.join(&dep.name).join(&dep.executable)
    }

    /// Make sure every dependency is available, installing what is missing.
    ///
    /// Optional dependencies that fail are reported and skipped; a required
    /// failure aborts.
    pub async fn check_and_install(&self, cancel: &CancellationToken) -> Result<(), AssetError> {
        let manifest = self.get_manifest(cancel).await?;

        for dep in &manifest.dependencies {
            if self.check_local_build(dep).await.is_some() {
                continue;
            }

            if self.install_path(dep).exists() {
                self.report_final(DownloadProgress::new(&dep.name, "Already installed"))
                    .await;
                continue;
            }

            match self.install_dependency(dep, cancel).await {
                Ok(()) => {}
                Err(e) if e.is_cancelled() => return Err(e),
                Err(e) if dep.required => {
                    return Err(AssetError::RequiredInstallFailed {
                        name: dep.name.clone(),
                        source: Box::new(e),
                    });
                }
                Err(e) => {
                    warn!(name = %dep.name, error = %e, "Skipping optional dependency");
                    self.report_final(
                        DownloadProgress::new(&dep.name, "Skipped (optional)")
                            .with_error(e.to_string()),
                    )
                    .await;
                }
            }
        }
        Ok(())
    }

    async fn install_dependency(
        &self,
        dep: &Dependency,
        cancel: &CancellationToken,
    ) -> Result<(), AssetError> {
        self.report(DownloadProgress::new(&dep.name, "Starting download").with_bytes(0, dep.size));

        let dep_dir = self.config.base_dir.join(&dep.name);
        fs::create_dir_all(&dep_dir).await?;

        let file_name = dep
            .url
            .rsplit('/')
            .next()
            .filter(|s| !s.is_empty())
            .unwrap_or("download");
        let download_path = dep_dir.join(format!("download-{file_name}"));

        let mut request = DownloadRequest::new(&dep.url, &download_path);
        if dep.size > 0 {
            request = request.with_expected_size(dep.size);
        }

        let mut throttle = ProgressThrottle::default_interval();
        let progress = &self.progress;
        let name = dep.name.as_str();
        self.engine
            .download(&request, cancel, &mut |downloaded, total| {
                if throttle.should_emit(downloaded, total) {
                    let _ = progress.try_send(
                        DownloadProgress::new(name, "Downloading").with_bytes(downloaded, total),
                    );
                }
            })
            .await?;

        let exe_path = self.install_path(dep);
        if let Some(kind) = ArchiveKind::from_name(file_name) {
            self.report(DownloadProgress::new(&dep.name, "Extracting").with_bytes(dep.size, dep.size));
            let archive = download_path.clone();
            let dest = dep_dir.clone();
            tokio::task::spawn_blocking(move || extract(kind, &archive, &dest))
                .await
                .map_err(|e| AssetError::Extract {
                    path: download_path.clone(),
                    message: e.to_string(),
                })??;
            remove_quietly(&download_path).await;
            self.locate_extracted(dep, &dep_dir, &exe_path).await?;
        } else {
            fs::rename(&download_path, &exe_path).await?;
        }

        set_executable(&exe_path).await?;

        if let Err(e) = fs::write(dep_dir.join(VERSION_FILE), &dep.version).await {
            warn!(name = %dep.name, error = %e, "Failed to write version file");
            self.report(
                DownloadProgress::new(&dep.name, "Warning: Could not write version file")
                    .with_error(e.to_string()),
            );
        }

        info!(name = %dep.name, version = %dep.version, "Installed dependency");
        self.report_final(DownloadProgress::new(&dep.name, "Installed").with_bytes(dep.size, dep.size))
            .await;
        Ok(())
    }

    /// Archives name their executable in several ways; move the first match
    /// to the expected install path.
    async fn locate_extracted(
        &self,
        dep: &Dependency,
        dep_dir: &Path,
        exe_path: &Path,
    ) -> Result<(), AssetError> {
        let platform = self.config.platform;
        let candidates = [
            dep.executable.clone(),
            "llama-server".to_string(),
            "llama-server.exe".to_string(),
            "ngrok".to_string(),
            "ngrok.exe".to_string(),
            format!("llama-server-{platform}"),
            format!("llama-server-{platform}.exe"),
        ];

        for candidate in &candidates {
            let path = dep_dir.join(candidate);
            if path.is_file() {
                if path != exe_path {
                    fs::rename(&path, exe_path).await?;
                }
                return Ok(());
            }
        }
        Err(AssetError::ExecutableNotFound(dep.name.clone()))
    }

    /// Dependencies whose installed version differs from the manifest.
    ///
    /// Local builds are never reported.
    pub async fn check_for_updates(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Vec<Dependency>, AssetError> {
        let manifest = self.get_manifest(cancel).await?;
        let mut updates = Vec::new();

        for dep in &manifest.dependencies {
            if local_build_candidates(&self.config, dep)
                .iter()
                .any(|p| p.is_file())
            {
                self.report(DownloadProgress::new(
                    &dep.name,
                    "Using local build, skipping update check",
                ));
                continue;
            }

            let version_file = self.config.base_dir.join(&dep.name).join(VERSION_FILE);
            match fs::read_to_string(&version_file).await {
                Err(_) => {
                    if self.install_path(dep).exists() {
                        self.report(DownloadProgress::new(
                            &dep.name,
                            "No version file, update available",
                        ));
                        updates.push(dep.clone());
                    }
                }
                Ok(installed) => {
                    let installed = installed.trim();
                    if installed == dep.version {
                        self.report(DownloadProgress::new(
                            &dep.name,
                            format!("Up to date: {installed}"),
                        ));
                    } else {
                        self.report(DownloadProgress::new(
                            &dep.name,
                            format!("Update available: {installed} -> {}", dep.version),
                        ));
                        updates.push(dep.clone());
                    }
                }
            }
        }
        Ok(updates)
    }

    /// Path of the executable for `name`: local build first, then installed.
    pub async fn get_executable_path(
        &self,
        name: &str,
        cancel: &CancellationToken,
    ) -> Result<PathBuf, AssetError> {
        if let Some(path) = configured_local_path(&self.config, name) {
            if path.is_file() {
                return Ok(path);
            }
        }

        let executable = match known_executable(name, self.config.platform) {
            Some(exe) => exe,
            None => self
                .get_manifest(cancel)
                .await?
                .dependency(name)
                .map(|d| d.executable.clone())
                .ok_or_else(|| AssetError::NotInstalled(name.to_string()))?,
        };

        let installed = self.config.base_dir.join(name).join(executable);
        if installed.is_file() {
            Ok(installed)
        } else {
            Err(AssetError::NotInstalled(name.to_string()))
        }
    }

    /// Human-readable version of every manifest dependency.
    pub async fn installed_versions(
        &self,
        cancel: &CancellationToken,
    ) -> Result<BTreeMap<String, String>, AssetError> {
        let manifest = self.get_manifest(cancel).await?;
        let mut versions = BTreeMap::new();

        for dep in &manifest.dependencies {
            let is_local = local_build_candidates(&self.config, dep)
                .iter()
                .any(|p| p.is_file());

            let version = if is_local {
                let root = &self.config.search_root;
                let local_version = [
                    root.join("apps/backend").join(&dep.name).join(VERSION_FILE),
                    root.join("apps").join(&dep.name).join(VERSION_FILE),
                ];
                let mut found = None;
                for path in &local_version {
                    if let Ok(v) = fs::read_to_string(path).await {
                        found = Some(format!("{} (local)", v.trim()));
                        break;
                    }
                }
                found.unwrap_or_else(|| "local build".to_string())
            } else {
                let dep_dir = self.config.base_dir.join(&dep.name);
                match fs::read_to_string(dep_dir.join(VERSION_FILE)).await {
                    Ok(v) => v.trim().to_string(),
                    Err(_) if self.install_path(dep).exists() => "unknown".to_string(),
                    Err(_) => "not installed".to_string(),
                }
            };
            versions.insert(dep.name.clone(), version);
        }
        Ok(versions)
    }

    /// Intermediate update; dropped when the channel is full.
    fn report(&self, progress: DownloadProgress) {
        let _ = self.progress.try_send(progress);
    }

    /// Terminal update; waits for room while anyone is still listening.
    ///
    /// A receiver that is held but never drained stalls the install once the
    /// channel is full. Drop the receiver when progress is not wanted.
    async fn report_final(&self, progress: DownloadProgress) {
        if self.progress.send(progress).await.is_err() {
            debug!("Progress receiver dropped");
        }
    }
}

async fn read_manifest(path: &Path) -> Option<Manifest> {
    let data = fs::read(path).await.ok()?;
    match serde_json::from_slice(&data) {
        Ok(manifest) => Some(manifest),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Ignoring unreadable manifest");
            None
        }
    }
}

async fn remove_quietly(path: &Path) {
    if let Err(e) = fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(path = %path.display(), error = %e, "Failed to remove file");
        }
    }
}

#[cfg(unix)]
async fn set_executable(path: &Path) -> Result<(), AssetError> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).await?;
    Ok(())
}

#[cfg(not(unix))]
async fn set_executable(_path: &Path) -> Result<(), AssetError> {
    Ok(())
}
