//! Root CLI structure and global options.

use clap::Parser;

use crate::commands::Commands;

/// Command-line interface for running models locally or against remote APIs.
#[derive(Parser)]
#[command(name = "toke")]
#[command(about = "Download, run and chat with local AI models")]
#[command(version)]
pub struct Cli {
    /// Override the data directory for this invocation
    #[arg(long = "data-dir", global = true, env = "TOKE_DATA_DIR")]
    pub data_dir: Option<String>,

    /// Enable verbose/debug output
    #[arg(short = 'v', long = "verbose", global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    use crate::commands::{DepsCommand, ModelsCommand};

    #[test]
    fn cli_parser_builds() {
        Cli::command().debug_assert();
    }

    #[test]
    fn global_args_after_subcommand() {
        let cli = Cli::parse_from(["toke", "models", "list", "--verbose", "--data-dir", "/tmp/t"]);
        assert!(cli.verbose);
        assert_eq!(cli.data_dir.as_deref(), Some("/tmp/t"));
        assert!(matches!(
            cli.command,
            Some(Commands::Models {
                command: ModelsCommand::List {
                    tier: None,
                    json: false
                }
            })
        ));
    }

    #[test]
    fn deps_subcommands_parse() {
        let cli = Cli::parse_from(["toke", "deps", "versions"]);
        assert!(matches!(
            cli.command,
            Some(Commands::Deps {
                command: DepsCommand::Versions
            })
        ));
    }

    #[test]
    fn tier_filter_is_parsed() {
        let cli = Cli::parse_from(["toke", "models", "list", "--tier", "power-user"]);
        let Some(Commands::Models {
            command: ModelsCommand::List { tier, .. },
        }) = cli.command
        else {
            panic!("expected models list");
        };
        assert_eq!(tier, Some(toke_core::ModelTier::PowerUser));
    }

    #[test]
    fn chat_requires_a_prompt() {
        assert!(Cli::try_parse_from(["toke", "chat", "--model", "m"]).is_err());
        let cli = Cli::try_parse_from(["toke", "chat", "--model", "m", "hello", "there"]).unwrap();
        let Some(Commands::Chat { prompt, port, .. }) = cli.command else {
            panic!("expected chat");
        };
        assert_eq!(prompt, ["hello", "there"]);
        assert_eq!(port, None);
    }
}
