//! Catalog entry types.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Inference server family able to run a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Apple MLX server, multi-file safetensors snapshots.
    Mlx,
    /// llama.cpp `llama-server`, single-file GGUF weights.
    #[serde(rename = "llamacpp")]
    LlamaCpp,
}

impl BackendKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Mlx => "mlx",
            Self::LlamaCpp => "llamacpp",
        }
    }

    /// Port the backend listens on by default.
    pub const fn default_port(self) -> u16 {
        match self {
            Self::LlamaCpp => 11434,
            Self::Mlx => 11435,
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mlx" => Ok(Self::Mlx),
            "llamacpp" | "llama.cpp" | "llama" => Ok(Self::LlamaCpp),
            other => Err(format!("unknown backend kind: {other}")),
        }
    }
}

/// Coarse quality/resource class of a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelTier {
    Light,
    Balanced,
    PowerUser,
}

impl ModelTier {
    pub const ALL: [Self; 3] = [Self::Light, Self::Balanced, Self::PowerUser];

    pub const fn name(self) -> &'static str {
        match self {
            Self::Light => "Light & Fast",
            Self::Balanced => "Balanced",
            Self::PowerUser => "Power User",
        }
    }

    pub const fn description(self) -> &'static str {
        match self {
            Self::Light => "2-4GB models for quick responses. Runs on 8GB+ RAM.",
            Self::Balanced => "8-12GB models with better quality. Needs 16GB+ RAM.",
            Self::PowerUser => "40GB+ models for maximum capability. Requires 64GB+ RAM.",
        }
    }
}

impl FromStr for ModelTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace(['-', ' '], "_").as_str() {
            "light" => Ok(Self::Light),
            "balanced" => Ok(Self::Balanced),
            "power_user" | "power" => Ok(Self::PowerUser),
            other => Err(format!("unknown tier: {other}")),
        }
    }
}

/// A model that can be downloaded and run locally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelOption {
    pub id: String,
    pub name: String,
    pub description: String,
    /// Download size in bytes.
    pub size: u64,
    /// Required RAM in bytes.
    pub memory_required: u64,
    /// GGUF file URL for llama.cpp, repository URL for MLX.
    pub url: String,
    /// SHA-256 of the download, or `placeholder` when unknown.
    pub checksum: String,
    pub provider: BackendKind,
    pub tier: ModelTier,
    pub recommended: bool,
    pub available: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unavailable_reason: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_kind_parses_aliases() {
        assert_eq!("MLX".parse::<BackendKind>(), Ok(BackendKind::Mlx));
        assert_eq!("llama.cpp".parse::<BackendKind>(), Ok(BackendKind::LlamaCpp));
        assert!("onnx".parse::<BackendKind>().is_err());
    }

    #[test]
    fn backend_kind_serializes_like_provider_field() {
        assert_eq!(
            serde_json::to_string(&BackendKind::LlamaCpp).unwrap(),
            "\"llamacpp\""
        );
    }

    #[test]
    fn tier_parses_cli_spellings() {
        assert_eq!("power-user".parse::<ModelTier>(), Ok(ModelTier::PowerUser));
        assert_eq!("Balanced".parse::<ModelTier>(), Ok(ModelTier::Balanced));
    }
}
