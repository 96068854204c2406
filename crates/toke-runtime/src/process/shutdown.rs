//! Graceful shutdown for `tokio::process::Child` with SIGTERM → SIGKILL escalation.

use std::io;
use std::process::ExitStatus;
use std::time::Duration;

use tokio::process::Child;

#[cfg(unix)]
use nix::sys::signal::{self, Signal};
#[cfg(unix)]
use nix::unistd::Pid;

/// How long a server gets to exit after SIGTERM.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Stop `child`, waiting up to `grace` for a clean exit before killing it.
///
/// Always reaps the process. On Windows there is no graceful signal, so the
/// child is killed immediately.
pub async fn shutdown_child(child: &mut Child, grace: Duration) -> io::Result<ExitStatus> {
    #[cfg(unix)]
    {
        shutdown_unix(child, grace).await
    }

    #[cfg(not(unix))]
    {
        let _ = grace;
        child.kill().await?;
        child.wait().await
    }
}

#[cfg(unix)]
async fn shutdown_unix(child: &mut Child, grace: Duration) -> io::Result<ExitStatus> {
    // Already reaped
    let Some(pid) = child.id() else {
        return child.wait().await;
    };

    let pid = i32::try_from(pid)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "pid out of range"))?;
    if let Err(e) = signal::kill(Pid::from_raw(pid), Signal::SIGTERM) {
        if e == nix::errno::Errno::ESRCH {
            return child.wait().await;
        }
        return Err(io::Error::other(e));
    }

    if let Ok(result) = tokio::time::timeout(grace, child.wait()).await {
        return result;
    }

    tracing::warn!(pid, "Server ignored SIGTERM, killing");
    child.kill().await?;
    child.wait().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;
    use tokio::process::Command;

    #[tokio::test]
    #[cfg(unix)]
    async fn sigterm_stops_sleep() {
        let mut child = Command::new("sleep").arg("30").spawn().unwrap();
        let started = Instant::now();
        let status = shutdown_child(&mut child, SHUTDOWN_GRACE).await.unwrap();
        assert!(!status.success());
        assert!(started.elapsed() < SHUTDOWN_GRACE);
    }

    #[tokio::test]
    #[cfg(unix)]
    async fn escalates_when_sigterm_is_ignored() {
        let mut child = Command::new("sh")
            .arg("-c")
            .arg("trap '' TERM; sleep 30")
            .spawn()
            .unwrap();
        // Let the shell install its trap
        tokio::time::sleep(Duration::from_millis(200)).await;

        let started = Instant::now();
        shutdown_child(&mut child, Duration::from_millis(300))
            .await
            .unwrap();
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn handles_already_exited() {
        let mut child = Command::new("echo").arg("test").spawn().unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(shutdown_child(&mut child, SHUTDOWN_GRACE).await.is_ok());
    }
}
