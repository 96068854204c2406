//! Path utilities for toke data directories.
//!
//! Layout under the data root:
//!
//! ```text
//! <data>/backends/<name>/{executable, VERSION}
//! <data>/bin/{llama-server, mlx-server, mlx-env}
//! <data>/models/<id>.gguf
//! <data>/models/mlx/<id>/...
//! <data>/cache/
//! ```
//!
//! Functions return `PathBuf` and never create anything except through
//! [`ensure_dir`].

mod ensure;
mod error;
mod root;

#[cfg(test)]
pub(crate) mod test_utils;

pub use ensure::ensure_dir;
pub use error::PathError;
pub use root::{data_root, data_root_from};

use std::path::PathBuf;

/// Directory holding installed manifest dependencies.
pub fn backends_dir() -> Result<PathBuf, PathError> {
    Ok(data_root()?.join("backends"))
}

/// Directory holding inference server binaries.
pub fn bin_dir() -> Result<PathBuf, PathError> {
    Ok(data_root()?.join("bin"))
}

/// Directory holding downloaded model weights.
pub fn models_dir() -> Result<PathBuf, PathError> {
    Ok(data_root()?.join("models"))
}

/// Directory holding multi-file MLX model snapshots.
pub fn mlx_models_dir() -> Result<PathBuf, PathError> {
    Ok(models_dir()?.join("mlx"))
}

/// Scratch space for temporary downloads and extraction.
pub fn cache_dir() -> Result<PathBuf, PathError> {
    Ok(data_root()?.join("cache"))
}
