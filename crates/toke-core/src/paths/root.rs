//! Data root resolution.

use std::path::PathBuf;

use super::error::PathError;
use crate::env::{DATA_DIR_VAR, Env, OsEnv};

/// Get the root directory for toke data (binaries, models, caches).
///
/// Resolution order:
/// 1. `TOKE_DATA_DIR` environment variable
/// 2. `%LOCALAPPDATA%\toke` on Windows
/// 3. `~/.toke` everywhere else
pub fn data_root() -> Result<PathBuf, PathError> {
    data_root_from(&OsEnv)
}

/// Same as [`data_root`] but reads overrides from `env`.
pub fn data_root_from(env: &dyn Env) -> Result<PathBuf, PathError> {
    if let Some(path) = env.get(DATA_DIR_VAR) {
        return Ok(PathBuf::from(path));
    }

    if cfg!(windows) {
        let local = dirs::data_local_dir().ok_or(PathError::NoDataDir)?;
        return Ok(local.join("toke"));
    }

    let home = dirs::home_dir().ok_or(PathError::NoHomeDir)?;
    Ok(home.join(".toke"))
}
