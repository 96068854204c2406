//! CLI bootstrap: the composition root.
//!
//! Every handler receives a [`CliContext`] built here from the environment
//! and the global flags; nothing else reads configuration.

use std::path::PathBuf;

use tokio::sync::mpsc;
use toke_core::env::DATA_DIR_VAR;
use toke_core::{DownloadProgress, Env, ModelCatalog, data_root_from};
use toke_runtime::{AssetConfig, AssetManager, BackendOrchestrator, BackendSettings};

use crate::error::CliError;

/// Environment view where `--data-dir` wins over `TOKE_DATA_DIR`.
struct CliEnv<'a> {
    inner: &'a dyn Env,
    data_dir: Option<&'a str>,
}

impl Env for CliEnv<'_> {
    fn get(&self, key: &str) -> Option<String> {
        match self.data_dir {
            Some(dir) if key == DATA_DIR_VAR && !dir.is_empty() => Some(dir.to_string()),
            _ => self.inner.get(key),
        }
    }
}

/// Fully-resolved configuration shared by all handlers.
#[derive(Debug, Clone)]
pub struct CliContext {
    pub data_root: PathBuf,
    pub settings: BackendSettings,
    pub assets: AssetConfig,
    pub catalog: ModelCatalog,
}

impl CliContext {
    pub fn orchestrator(&self) -> BackendOrchestrator {
        BackendOrchestrator::new(self.settings.clone(), self.catalog.clone())
    }

    pub fn asset_manager(
        &self,
    ) -> Result<(AssetManager, mpsc::Receiver<DownloadProgress>), CliError> {
        Ok(AssetManager::new(self.assets.clone())?)
    }

    /// Catalog entry by id, as an argument error when unknown.
    pub fn model(&self, id: &str) -> Result<&toke_core::ModelOption, CliError> {
        self.catalog
            .get_model_by_id(id)
            .ok_or_else(|| CliError::Arguments(format!("unknown model '{id}', see `toke models list`")))
    }
}

/// Resolve paths and settings from `env` plus the global flags.
pub fn bootstrap(data_dir: Option<&str>, env: &dyn Env) -> Result<CliContext, CliError> {
    let env = CliEnv {
        inner: env,
        data_dir,
    };
    let data_root = data_root_from(&env)?;
    let settings = BackendSettings::from_env(&env)?;
    let assets = AssetConfig::from_env(&env)?;
    let catalog = ModelCatalog::for_host(settings.platform.is_apple_silicon());
    tracing::debug!(data_root = %data_root.display(), "Bootstrapped CLI context");
    Ok(CliContext {
        data_root,
        settings,
        assets,
        catalog,
    })
}
