//! Launching a server binary with its output routed into tracing.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tracing::{Level, debug, error, info};

use crate::error::BackendError;

/// How a server's stdout/stderr lines map to log levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStyle {
    Llama,
    Mlx,
}

impl OutputStyle {
    pub fn level_for(self, line: &str) -> Level {
        match self {
            Self::Llama if line.contains("error") || line.contains("ERROR") => Level::ERROR,
            Self::Mlx if line.contains("error") => Level::ERROR,
            Self::Mlx if line.contains("Model loaded") || line.contains("Server running") => {
                Level::INFO
            }
            _ => Level::DEBUG,
        }
    }

    const fn target(self) -> &'static str {
        match self {
            Self::Llama => "llama-server",
            Self::Mlx => "mlx-server",
        }
    }
}

/// A server invocation: program, arguments and extra environment.
#[derive(Debug, Clone)]
pub struct ServerCommand {
    program: PathBuf,
    args: Vec<String>,
    envs: Vec<(String, String)>,
    output: OutputStyle,
}

impl ServerCommand {
    pub fn new(program: impl Into<PathBuf>, output: OutputStyle) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            envs: Vec::new(),
            output,
        }
    }

    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn envs(&self) -> &[(String, String)] {
        &self.envs
    }

    /// Spawn with piped output; each line is forwarded to tracing until the
    /// pipe closes. The child is killed if its handle is dropped.
    pub fn spawn(&self) -> Result<Child, BackendError> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .envs(self.envs.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|source| BackendError::Spawn {
            what: self.program.display().to_string(),
            source,
        })?;

        info!(
            program = %self.program.display(),
            pid = ?child.id(),
            "Spawned server process"
        );

        if let Some(stdout) = child.stdout.take() {
            forward_lines(stdout, self.output);
        }
        if let Some(stderr) = child.stderr.take() {
            forward_lines(stderr, self.output);
        }
        Ok(child)
    }
}

fn forward_lines<R>(pipe: R, style: OutputStyle)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(pipe).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let source = style.target();
            let level = style.level_for(&line);
            if level == Level::ERROR {
                error!(source, "{line}");
            } else if level == Level::INFO {
                info!(source, "{line}");
            } else {
                debug!(source, "{line}");
            }
        }
        debug!(source = style.target(), "output reader exiting");
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn llama_levels() {
        assert_eq!(OutputStyle::Llama.level_for("ERROR: out of memory"), Level::ERROR);
        assert_eq!(OutputStyle::Llama.level_for("load error"), Level::ERROR);
        assert_eq!(OutputStyle::Llama.level_for("Model loaded"), Level::DEBUG);
    }

    #[test]
    fn mlx_levels() {
        assert_eq!(OutputStyle::Mlx.level_for("fatal error"), Level::ERROR);
        assert_eq!(OutputStyle::Mlx.level_for("Model loaded in 3s"), Level::INFO);
        assert_eq!(OutputStyle::Mlx.level_for("Server running on :11435"), Level::INFO);
        assert_eq!(OutputStyle::Mlx.level_for("ERROR upper"), Level::DEBUG);
    }

    #[test]
    fn builder_collects_args_and_env() {
        let cmd = ServerCommand::new("/bin/server", OutputStyle::Mlx)
            .arg("--port")
            .arg("11435")
            .env("PYTORCH_ENABLE_MPS_FALLBACK", "1");
        assert_eq!(cmd.args(), ["--port", "11435"]);
        assert_eq!(cmd.envs()[0].0, "PYTORCH_ENABLE_MPS_FALLBACK");
    }

    #[tokio::test]
    async fn missing_program_is_a_spawn_error() {
        let err = ServerCommand::new("/nonexistent/toke-server", OutputStyle::Llama)
            .spawn()
            .unwrap_err();
        assert!(matches!(err, BackendError::Spawn { .. }));
    }

    #[tokio::test]
    #[cfg(unix)]
    async fn output_is_drained() {
        let mut child = ServerCommand::new("sh", OutputStyle::Llama)
            .arg("-c")
            .arg("echo hello; echo oops error >&2")
            .spawn()
            .unwrap();
        assert!(child.wait().await.unwrap().success());
    }
}
