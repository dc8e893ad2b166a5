//! Executor backed by real OS processes

use async_trait::async_trait;
use futures::stream::{self, BoxStream, Stream, StreamExt};
use nodedeck_core::{Error, Result};
use std::pin::Pin;
use std::process::Stdio;
use std::task::{Context, Poll};
use tokio::process::{Child, Command};
use tokio_util::codec::{FramedRead, LinesCodec};
use tracing::debug;

use crate::exec::{CommandOutput, CommandSpec, Executor, LineStream};

/// Runs commands with `tokio::process`
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemExecutor;

impl SystemExecutor {
    fn command(spec: &CommandSpec) -> Command {
        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &spec.cwd {
            cmd.current_dir(dir);
        }
        for (key, value) in &spec.env {
            cmd.env(key, value);
        }
        cmd
    }
}

#[async_trait]
impl Executor for SystemExecutor {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput> {
        debug!("exec: {}", spec.display());

        let child = Self::command(spec)
            .spawn()
            .map_err(|e| Error::tool(spec.tool_name(), format!("failed to start: {}", e)))?;

        let output = match spec.timeout {
            Some(limit) => tokio::time::timeout(limit, child.wait_with_output())
                .await
                .map_err(|_| {
                    Error::Timeout(format!(
                        "{} did not finish within {}s",
                        spec.tool_name(),
                        limit.as_secs()
                    ))
                })??,
            None => child.wait_with_output().await?,
        };

        Ok(CommandOutput {
            status: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    async fn spawn_lines(&self, spec: &CommandSpec) -> Result<LineStream> {
        debug!("spawn: {}", spec.display());

        let mut child = Self::command(spec)
            .spawn()
            .map_err(|e| Error::tool(spec.tool_name(), format!("failed to start: {}", e)))?;

        let tool = spec.tool_name().to_string();
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::tool(&tool, "stdout not captured"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| Error::tool(&tool, "stderr not captured"))?;

        let merged = stream::select(
            FramedRead::new(stdout, LinesCodec::new()),
            FramedRead::new(stderr, LinesCodec::new()),
        )
        .map(move |line| line.map_err(|e| Error::tool(&tool, e.to_string())))
        .boxed();

        Ok(ChildLines {
            _child: child,
            lines: merged,
        }
        .boxed())
    }
}

/// Owns the child so dropping the stream kills it
struct ChildLines {
    _child: Child,
    lines: BoxStream<'static, Result<String>>,
}

impl Stream for ChildLines {
    type Item = Result<String>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.lines.poll_next_unpin(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_run_captures_output() {
        let spec = CommandSpec::new("sh").args(["-c", "echo out; echo err >&2; exit 3"]);
        let output = SystemExecutor.run(&spec).await.unwrap();
        assert_eq!(output.status, Some(3));
        assert_eq!(output.stdout.trim(), "out");
        assert_eq!(output.stderr.trim(), "err");
    }

    #[tokio::test]
    async fn test_run_checked_maps_failure() {
        let spec = CommandSpec::new("sh").args(["-c", "echo nope >&2; exit 1"]);
        let err = SystemExecutor.run_checked(&spec).await.unwrap_err();
        match err {
            Error::ToolFailed { tool, message } => {
                assert_eq!(tool, "sh");
                assert_eq!(message, "nope");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_run_honours_cwd_and_env() {
        let dir = tempfile::tempdir().unwrap();
        let spec = CommandSpec::new("sh")
            .args(["-c", "pwd; echo $NODEDECK_TEST"])
            .cwd(dir.path())
            .env("NODEDECK_TEST", "hello");
        let output = SystemExecutor.run(&spec).await.unwrap();
        assert!(output.stdout.contains("hello"));
    }

    #[tokio::test]
    async fn test_run_timeout() {
        let spec = CommandSpec::new("sleep")
            .arg("5")
            .timeout(Duration::from_millis(100));
        let err = SystemExecutor.run(&spec).await.unwrap_err();
        assert!(matches!(err, Error::Timeout(_)));
    }

    #[tokio::test]
    async fn test_missing_program() {
        let spec = CommandSpec::new("nodedeck-definitely-missing-binary");
        assert!(matches!(
            SystemExecutor.run(&spec).await,
            Err(Error::ToolFailed { .. })
        ));
    }

    #[tokio::test]
    async fn test_spawn_lines_streams_both_pipes() {
        let spec = CommandSpec::new("sh").args(["-c", "echo one; echo two >&2"]);
        let stream = SystemExecutor.spawn_lines(&spec).await.unwrap();
        let mut lines: Vec<String> = stream.map(|l| l.unwrap()).collect().await;
        lines.sort();
        assert_eq!(lines, vec!["one".to_string(), "two".to_string()]);
    }
}
