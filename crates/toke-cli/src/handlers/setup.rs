//! `toke setup` and `toke quick-setup`.

use anyhow::Result;
use tokio_util::sync::CancellationToken;
use toke_core::ModelOption;
use toke_runtime::BackendOrchestrator;
use tracing::info;

use super::{GREEN, RESET, cancel_on_ctrl_c, serve};
use crate::bootstrap::CliContext;
use crate::error::CliError;
use crate::presentation::ByteBar;

pub async fn execute(ctx: &CliContext, model_id: &str) -> Result<()> {
    let model = ctx.model(model_id)?.clone();
    let orchestrator = ctx.orchestrator();
    let cancel = cancel_on_ctrl_c();

    download(&orchestrator, &model, &cancel).await?;
    println!("{GREEN}✓{RESET} {} is ready. Run `toke serve {}` to start it.", model.name, model.id);
    Ok(())
}

/// Fetch server and weights behind a single progress bar.
pub(crate) async fn download(
    orchestrator: &BackendOrchestrator,
    model: &ModelOption,
    cancel: &CancellationToken,
) -> Result<(), CliError> {
    if !model.available {
        let reason = model
            .unavailable_reason
            .clone()
            .unwrap_or_else(|| "not available on this machine".to_string());
        return Err(CliError::Unsupported(format!("{}: {reason}", model.id)));
    }

    let bar = ByteBar::new(&format!("Downloading {}", model.name));
    let result = orchestrator
        .setup_model(model, cancel, &mut |done, total| bar.update(done, total))
        .await;
    match result {
        Ok(()) => {
            bar.finish("done");
            Ok(())
        }
        Err(e) => {
            bar.abandon("failed");
            Err(e.into())
        }
    }
}

pub async fn quick_setup(ctx: &CliContext) -> Result<()> {
    let orchestrator = ctx.orchestrator();
    for warning in orchestrator.check_system_requirements() {
        println!("! {warning}");
    }
    let cancel = cancel_on_ctrl_c();

    let bar = ByteBar::new("Preparing setup...");
    let result = orchestrator
        .quick_setup(
            &cancel,
            &mut |status| bar.set_message(status),
            &mut |done, total| bar.update(done, total),
        )
        .await;
    let model = match result {
        Ok(model) => {
            bar.finish("Ready!");
            model
        }
        Err(e) => {
            bar.abandon("Setup failed");
            return Err(CliError::from(e).into());
        }
    };
    info!(model = %model.id, "Quick setup finished");

    let endpoint = orchestrator.endpoint().await.map_err(CliError::from)?;
    serve::announce(&model, &endpoint);
    serve::wait_then_stop(&orchestrator, &cancel).await
}
