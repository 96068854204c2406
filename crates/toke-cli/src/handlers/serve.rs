//! `toke serve`: run one model until interrupted.

use std::time::Duration;

use anyhow::Result;
use tokio_util::sync::CancellationToken;
use toke_core::ModelOption;
use toke_runtime::BackendOrchestrator;
use tracing::{info, warn};

use super::{BOLD, GREEN, RESET, cancel_on_ctrl_c, setup};
use crate::bootstrap::CliContext;
use crate::error::CliError;

const LIVENESS_INTERVAL: Duration = Duration::from_secs(5);

pub async fn execute(ctx: &CliContext, model_id: &str, port: Option<u16>) -> Result<()> {
    let mut ctx = ctx.clone();
    if let Some(port) = port {
        ctx.settings = ctx.settings.with_port(port);
    }
    let model = ctx.model(model_id)?.clone();
    let orchestrator = ctx.orchestrator();
    let cancel = cancel_on_ctrl_c();

    setup::download(&orchestrator, &model, &cancel).await?;

    println!("Starting {} server...", model.provider);
    orchestrator.start(&cancel).await.map_err(CliError::from)?;
    let endpoint = orchestrator.endpoint().await.map_err(CliError::from)?;
    announce(&model, &endpoint);

    wait_then_stop(&orchestrator, &cancel).await
}

pub(crate) fn announce(model: &ModelOption, endpoint: &str) {
    println!();
    println!("  {GREEN}✓{RESET} {BOLD}{}{RESET} is running", model.name);
    println!("  OpenAI-compatible endpoint: {endpoint}");
    println!("  Try: toke chat --endpoint {endpoint} --model {} \"hello\"", model.id);
    println!();
    println!("  Press Ctrl+C to stop");
}

/// Block until Ctrl-C or until the server dies, then stop it.
pub(crate) async fn wait_then_stop(
    orchestrator: &BackendOrchestrator,
    cancel: &CancellationToken,
) -> Result<()> {
    let mut ticker = tokio::time::interval(LIVENESS_INTERVAL);
    ticker.tick().await;
    let exited = loop {
        tokio::select! {
            () = cancel.cancelled() => break false,
            _ = ticker.tick() => {
                if !orchestrator.is_running().await {
                    warn!("Backend stopped responding");
                    break true;
                }
            }
        }
    };

    println!("Stopping server...");
    orchestrator.stop().await.map_err(CliError::from)?;
    info!("Server stopped");

    if exited {
        return Err(CliError::Process("backend exited unexpectedly".to_string()).into());
    }
    Ok(())
}
