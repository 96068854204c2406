//! Command-line surface for toke: backend executables, the model catalog,
//! local model setup and serving, and one-shot chat against any provider.
#![deny(unsafe_code)]
#![deny(unused_crate_dependencies)]

#[cfg(test)]
use tempfile as _;

// Used only by the binary.
use dotenvy as _;
use tracing_subscriber as _;

pub mod bootstrap;
pub mod commands;
pub mod error;
pub mod handlers;
pub mod parser;
pub mod presentation;

pub use bootstrap::{CliContext, bootstrap};
pub use commands::{Commands, DepsCommand, ModelsCommand, ProviderKind};
pub use error::{CliError, exit_code_for};
pub use parser::Cli;
