//! `toke deps`: backend server executables.

use anyhow::Result;
use tokio::sync::mpsc;
use toke_core::DownloadProgress;

use super::{BOLD, GREEN, RED, RESET, YELLOW, cancel_on_ctrl_c};
use crate::bootstrap::CliContext;
use crate::commands::DepsCommand;
use crate::error::CliError;
use crate::presentation::{DependencyBars, print_separator};

pub async fn execute(ctx: &CliContext, command: DepsCommand) -> Result<()> {
    match command {
        DepsCommand::Check => check(ctx).await,
        DepsCommand::Install => install(ctx).await,
        DepsCommand::Updates => updates(ctx).await,
        DepsCommand::Versions => versions(ctx).await,
    }
}

async fn check(ctx: &CliContext) -> Result<()> {
    let cancel = cancel_on_ctrl_c();
    let (manager, _) = ctx.asset_manager()?;
    let manifest = manager.get_manifest(&cancel).await.map_err(CliError::from)?;

    println!("\n{BOLD}Backend executables{RESET} (manifest {})", manifest.version);
    print_separator(60);

    let mut missing_required = 0;
    for dep in &manifest.dependencies {
        let marker = if dep.required {
            format!("{RED}*{RESET}")
        } else {
            " ".to_string()
        };
        let status = if let Some(path) = manager.check_local_build(dep).await {
            format!("{GREEN}✓ local build{RESET} {}", path.display())
        } else {
            match manager.get_executable_path(&dep.name, &cancel).await {
                Ok(path) => format!("{GREEN}✓ installed{RESET} {}", path.display()),
                Err(e) if e.is_cancelled() => return Err(CliError::Interrupted.into()),
                Err(_) if dep.required => {
                    missing_required += 1;
                    format!("{RED}✗ missing{RESET}")
                }
                Err(_) => format!("{YELLOW}○ missing{RESET}"),
            }
        };
        println!("{marker}{:<19} {status}", dep.name);
    }

    println!("\n{RED}*{RESET} = required");
    if missing_required > 0 {
        println!("Run `toke deps install` to fetch missing executables.");
    }
    Ok(())
}

async fn install(ctx: &CliContext) -> Result<()> {
    let cancel = cancel_on_ctrl_c();
    let (manager, progress) = ctx.asset_manager()?;
    manager.initialize().await.map_err(CliError::from)?;

    let printer = tokio::spawn(render_progress(progress, DependencyBars::new()));
    let result = manager.check_and_install(&cancel).await;
    // Closing the sender ends the printer.
    drop(manager);
    let _ = printer.await;

    result.map_err(CliError::from)?;
    println!("{GREEN}✓{RESET} All required backend executables are available");
    Ok(())
}

/// Drain snapshots into bars until the sender is dropped.
async fn render_progress(
    mut progress: mpsc::Receiver<DownloadProgress>,
    mut bars: DependencyBars,
) -> DependencyBars {
    while let Some(update) = progress.recv().await {
        bars.apply(&update);
    }
    bars
}

async fn updates(ctx: &CliContext) -> Result<()> {
    let cancel = cancel_on_ctrl_c();
    let (manager, _) = ctx.asset_manager()?;
    let updates = manager
        .check_for_updates(&cancel)
        .await
        .map_err(CliError::from)?;

    if updates.is_empty() {
        println!("{GREEN}✓{RESET} Everything is up to date");
        return Ok(());
    }
    println!("{BOLD}Updates available:{RESET}");
    for dep in &updates {
        println!("  {:<19} {}", dep.name, dep.version);
    }
    Ok(())
}

async fn versions(ctx: &CliContext) -> Result<()> {
    let cancel = cancel_on_ctrl_c();
    let (manager, _) = ctx.asset_manager()?;
    let versions = manager
        .installed_versions(&cancel)
        .await
        .map_err(CliError::from)?;

    for (name, version) in &versions {
        println!("{name:<19} {version}");
    }
    Ok(())
}
