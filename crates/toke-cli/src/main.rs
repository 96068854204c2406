//! CLI entry point: logging, environment, parsing and dispatch.

use std::process::ExitCode;

use clap::{CommandFactory, Parser};
use toke_cli::handlers::{self, chat::ChatArgs};
use toke_cli::{Cli, Commands, bootstrap, exit_code_for};
use toke_core::OsEnv;
use tracing_subscriber::EnvFilter;

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let Some(command) = cli.command else {
        Cli::command().print_help()?;
        return Ok(());
    };

    // Chat needs no local paths, so the context is built on demand.
    let ctx = || bootstrap(cli.data_dir.as_deref(), &OsEnv);
    match command {
        Commands::Chat {
            provider,
            endpoint,
            port,
            model,
            api_key,
            system,
            max_tokens,
            prompt,
        } => {
            let args = ChatArgs {
                provider,
                endpoint,
                port,
                model,
                api_key,
                system,
                max_tokens,
                prompt,
            };
            handlers::chat::execute(args).await
        }
        Commands::Deps { command } => handlers::deps::execute(&ctx()?, command).await,
        Commands::Models { command } => handlers::models::execute(&ctx()?, command),
        Commands::System => handlers::system::execute(&ctx()?),
        Commands::Setup { model_id } => handlers::setup::execute(&ctx()?, &model_id).await,
        Commands::QuickSetup => handlers::setup::quick_setup(&ctx()?).await,
        Commands::Serve { model_id, port } => {
            handlers::serve::execute(&ctx()?, &model_id, port).await
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err:#}");
            let code = exit_code_for(&err);
            ExitCode::from(u8::try_from(code).unwrap_or(1))
        }
    }
}
