//! Local backend lifecycle for toke.
//!
//! - [`assets`]: release manifest, local-build detection and installation of
//!   server executables.
//! - [`backend`]: the [`ModelBackend`] trait with llama.cpp and MLX variants.
//! - [`process`]: spawning, readiness polling and graceful shutdown.
//! - [`BackendOrchestrator`]: one active model, setup and start/stop.

pub mod assets;
pub mod backend;
mod error;
mod orchestrator;
pub mod process;
mod single_flight;
mod system;

pub use assets::{AssetConfig, AssetError, AssetManager, Dependency, Manifest};
pub use backend::{
    BackendProcess, BackendSettings, BackendState, LlamaCppBackend, MlxBackend, ModelBackend,
    ProgressFn, create_backend,
};
pub use error::BackendError;
pub use orchestrator::{BackendOrchestrator, StatusFn};
pub use single_flight::KindGuard;
pub use system::probe_system;
