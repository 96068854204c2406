//! Command handlers, one module per command group.

pub mod chat;
pub mod deps;
pub mod models;
pub mod serve;
pub mod setup;
pub mod system;

use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Token cancelled on the first Ctrl-C.
pub fn cancel_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            debug!("Interrupt received");
            trigger.cancel();
        }
    });
    token
}

// ANSI color codes
pub(crate) const GREEN: &str = "\x1b[32m";
pub(crate) const RED: &str = "\x1b[31m";
pub(crate) const YELLOW: &str = "\x1b[33m";
pub(crate) const BOLD: &str = "\x1b[1m";
pub(crate) const RESET: &str = "\x1b[0m";
