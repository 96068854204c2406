//! Error types for backend lifecycle operations.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use toke_core::{BackendKind, ErrorCategory, PathError};
use toke_download::DownloadError;

use crate::assets::AssetError;

/// Errors raised while acquiring, starting or stopping a model backend.
#[derive(Debug, Error)]
pub enum BackendError {
    // === Platform ===
    #[error("MLX is only supported on Apple Silicon Macs")]
    UnsupportedPlatform,

    // === Lifecycle ===
    /// `start` called before `setup_model`
    #[error("backend not initialized, call setup_model first")]
    NotInitialized,

    #[error("backend not running")]
    NotRunning,

    /// Another caller holds the start guard for this kind
    #[error("a {0} backend is already running")]
    AlreadyRunning(BackendKind),

    #[error("server binary not found at {0}")]
    BinaryMissing(PathBuf),

    #[error("model not found at {0}")]
    ModelMissing(PathBuf),

    #[error("unknown model: {0}")]
    UnknownModel(String),

    // === Process ===
    #[error("failed to start {what}: {source}")]
    Spawn {
        what: String,
        #[source]
        source: std::io::Error,
    },

    #[error("server failed to become ready within {timeout:?}")]
    ReadinessTimeout { timeout: Duration },

    #[error("server exited during startup ({status})")]
    ExitedEarly { status: String },

    #[error("operation cancelled")]
    Cancelled,

    // === Acquisition ===
    #[error("no model files found to download")]
    NoModelFiles,

    #[error("failed to unpack server binary: {0}")]
    Unpack(String),

    #[error(transparent)]
    Download(#[from] DownloadError),

    #[error(transparent)]
    Asset(#[from] AssetError),

    #[error(transparent)]
    Path(#[from] PathError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BackendError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::UnsupportedPlatform => ErrorCategory::UnsupportedPlatform,
            Self::Cancelled => ErrorCategory::Cancelled,
            Self::Spawn { .. }
            | Self::ReadinessTimeout { .. }
            | Self::ExitedEarly { .. }
            | Self::BinaryMissing(_)
            | Self::AlreadyRunning(_) => ErrorCategory::ProcessFailure,
            Self::Unpack(_) => ErrorCategory::CorruptArtifact,
            Self::Download(e) => e.category(),
            Self::Asset(e) => e.category(),
            Self::NotInitialized
            | Self::NotRunning
            | Self::ModelMissing(_)
            | Self::UnknownModel(_)
            | Self::NoModelFiles
            | Self::Path(_)
            | Self::Io(_) => ErrorCategory::Fatal,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.category().is_cancelled()
    }

    pub fn is_retryable(&self) -> bool {
        self.category().is_retryable()
    }
}
