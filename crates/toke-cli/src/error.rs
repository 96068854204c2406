//! CLI error type and exit codes.
//!
//! Library errors are folded into [`CliError`] by their shared
//! [`ErrorCategory`], so the exit code reflects what went wrong rather than
//! which crate reported it.

use thiserror::Error;
use toke_core::{ErrorCategory, PathError};
use toke_provider::ProviderError;
use toke_runtime::{AssetError, BackendError};

#[derive(Debug, Error)]
pub enum CliError {
    /// Failure with no more specific category.
    #[error("{0}")]
    General(String),

    #[error("Invalid arguments: {0}")]
    Arguments(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Configuration error: {0}")]
    Config(String),

    /// Network trouble that may succeed on a later attempt.
    #[error("Temporary failure: {0}")]
    Unavailable(String),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Unsupported platform: {0}")]
    Unsupported(String),

    #[error("Process error: {0}")]
    Process(String),

    #[error("Interrupted")]
    Interrupted,
}

impl CliError {
    /// Map error to exit code, following sysexits.h where one fits.
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::General(_) => 1,
            Self::Arguments(_) => 2,     // EX_USAGE
            Self::Unavailable(_) => 69,  // EX_UNAVAILABLE
            Self::Unsupported(_) => 70,  // EX_SOFTWARE
            Self::Process(_) => 71,      // EX_OSERR
            Self::Io(_) => 74,           // EX_IOERR
            Self::Auth(_) => 77,         // EX_NOPERM
            Self::Config(_) => 78,       // EX_CONFIG
            Self::Interrupted => 130,    // 128 + SIGINT
        }
    }

    fn from_category(category: ErrorCategory, message: String) -> Self {
        match category {
            ErrorCategory::Transient => Self::Unavailable(message),
            ErrorCategory::AuthExpired => Self::Auth(message),
            ErrorCategory::UnsupportedPlatform => Self::Unsupported(message),
            ErrorCategory::ProcessFailure => Self::Process(message),
            ErrorCategory::Cancelled => Self::Interrupted,
            ErrorCategory::CorruptArtifact | ErrorCategory::Fatal => Self::General(message),
        }
    }
}

impl From<BackendError> for CliError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::UnknownModel(id) => Self::Arguments(format!("unknown model: {id}")),
            BackendError::Io(e) => Self::Io(e.to_string()),
            BackendError::Path(e) => e.into(),
            other => Self::from_category(other.category(), other.to_string()),
        }
    }
}

impl From<AssetError> for CliError {
    fn from(err: AssetError) -> Self {
        match err {
            AssetError::Io(e) => Self::Io(e.to_string()),
            other => Self::from_category(other.category(), other.to_string()),
        }
    }
}

impl From<ProviderError> for CliError {
    fn from(err: ProviderError) -> Self {
        Self::from_category(err.category(), err.to_string())
    }
}

impl From<PathError> for CliError {
    fn from(err: PathError) -> Self {
        Self::Config(err.to_string())
    }
}

impl From<std::io::Error> for CliError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

/// Exit code for an error surfaced from `main`.
pub fn exit_code_for(err: &anyhow::Error) -> i32 {
    err.downcast_ref::<CliError>().map_or(1, CliError::exit_code)
}
