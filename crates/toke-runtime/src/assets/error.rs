//! Asset manager errors.

use std::path::PathBuf;

use thiserror::Error;
use toke_core::ErrorCategory;
use toke_download::DownloadError;

#[derive(Debug, Error)]
pub enum AssetError {
    #[error("failed to fetch manifest: {0}")]
    ManifestFetch(String),

    #[error(transparent)]
    Download(#[from] DownloadError),

    #[error("operation cancelled")]
    Cancelled,

    #[error("failed to extract {path}: {message}")]
    Extract { path: PathBuf, message: String },

    #[error("invalid file path: {0}")]
    UnsafeArchivePath(String),

    #[error("could not find executable after extraction for {0}")]
    ExecutableNotFound(String),

    #[error("failed to install required dependency {name}: {source}")]
    RequiredInstallFailed {
        name: String,
        #[source]
        source: Box<AssetError>,
    },

    #[error("dependency {0} not installed")]
    NotInstalled(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl AssetError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::ManifestFetch(_) => ErrorCategory::Transient,
            Self::Download(e) => e.category(),
            Self::Cancelled => ErrorCategory::Cancelled,
            Self::RequiredInstallFailed { source, .. } => source.category(),
            Self::Extract { .. } | Self::UnsafeArchivePath(_) => ErrorCategory::CorruptArtifact,
            Self::ExecutableNotFound(_) | Self::NotInstalled(_) | Self::Io(_) => {
                ErrorCategory::Fatal
            }
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.category().is_cancelled()
    }
}
