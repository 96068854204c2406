//! Core domain types for toke.
//!
//! This crate holds everything that does not own a process or a socket:
//! the model catalog, hardware-based recommendations, data directory
//! resolution, platform detection and the shared error taxonomy. Runtime,
//! download and provider crates build on top of it.

pub mod catalog;
pub mod env;
pub mod errors;
pub mod paths;
pub mod platform;
pub mod progress;
pub mod system;

pub use catalog::{BackendKind, ModelCatalog, ModelOption, ModelTier, format_size};
pub use env::{Env, MapEnv, OsEnv};
pub use errors::ErrorCategory;
pub use paths::{
    PathError, backends_dir, bin_dir, cache_dir, data_root, data_root_from, ensure_dir,
    mlx_models_dir, models_dir,
};
pub use platform::{Platform, is_apple_silicon};
pub use progress::DownloadProgress;
pub use system::{SystemInfo, format_system_requirement, recommend_models_for_system};
