//! Top-level commands and their subcommand groups.

use clap::{Subcommand, ValueEnum};
use toke_core::ModelTier;

/// Available commands.
#[derive(Subcommand)]
pub enum Commands {
    /// Manage backend server executables
    Deps {
        #[command(subcommand)]
        command: DepsCommand,
    },

    /// Browse the model catalog
    Models {
        #[command(subcommand)]
        command: ModelsCommand,
    },

    /// Show host capacity and recommended models
    System,

    /// Download a model and the server that runs it
    Setup {
        /// Catalog id, e.g. "qwen2.5-coder-7b-q4_k_m"
        model_id: String,
    },

    /// Set up, start and verify the recommended model for this machine
    QuickSetup,

    /// Set up and run a model until interrupted
    Serve {
        /// Catalog id of the model to run
        model_id: String,
        /// Port to listen on (defaults to the backend's port)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Send one prompt and stream the reply
    Chat {
        /// Which protocol client to use
        #[arg(long, value_enum, default_value_t = ProviderKind::Openai)]
        provider: ProviderKind,
        /// OpenAI-compatible base URL, e.g. "http://localhost:11434/v1"
        #[arg(long)]
        endpoint: Option<String>,
        /// Port of a local backend when no endpoint is given
        #[arg(long)]
        port: Option<u16>,
        /// Model name sent with the request
        #[arg(short, long, default_value = "")]
        model: String,
        /// API key, or `access|refresh|expiry` for Copilot
        #[arg(long, env = "TOKE_API_KEY", hide_env_values = true)]
        api_key: Option<String>,
        /// System prompt
        #[arg(long)]
        system: Option<String>,
        /// Upper bound on generated tokens
        #[arg(long)]
        max_tokens: Option<u32>,
        /// Prompt text
        #[arg(required = true, num_args = 1..)]
        prompt: Vec<String>,
    },
}

/// Backend executable subcommands.
#[derive(Subcommand)]
pub enum DepsCommand {
    /// Report which server executables are present
    Check,
    /// Install every missing executable
    Install,
    /// List executables with a newer release
    Updates,
    /// Show installed executable versions
    Versions,
}

/// Catalog subcommands.
#[derive(Subcommand)]
pub enum ModelsCommand {
    /// List catalog models with availability and sizes
    List {
        /// Only show one tier: light, balanced or power-user
        #[arg(long)]
        tier: Option<ModelTier>,
        /// Print the entries as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ProviderKind {
    /// Any OpenAI-compatible endpoint
    Openai,
    /// GitHub Copilot chat
    Copilot,
    /// GLM on the local MLX server
    Glm,
    /// A backend started by `toke serve`
    Local,
}
