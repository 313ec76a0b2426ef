//! Rendering engine integration.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, info, warn};

use shorts_models::RenderDocument;

use crate::error::{MediaError, MediaResult};
use crate::fs_utils::write_atomic;

/// Receives render progress as a fraction in `0.0..=1.0`.
pub type ProgressCallback = Arc<dyn Fn(f64) + Send + Sync>;

#[async_trait]
pub trait Renderer: Send + Sync {
    /// Render `document` to `output`, returning the written file.
    async fn render(
        &self,
        document: &RenderDocument,
        output: &Path,
        on_progress: ProgressCallback,
    ) -> MediaResult<PathBuf>;
}

/// Runs an external render CLI.
///
/// The command is invoked as `<program> <args..> <document.json> <output>`
/// and reports progress by printing `progress=<fraction>` lines on stdout.
#[derive(Debug, Clone)]
pub struct CommandRenderer {
    program: String,
    args: Vec<String>,
    timeout: Option<Duration>,
}

impl CommandRenderer {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            timeout: None,
        }
    }

    /// Parse a shell-style command line (whitespace separated).
    pub fn from_command_line(line: &str) -> MediaResult<Self> {
        let mut parts = line.split_whitespace().map(str::to_string);
        let program = parts
            .next()
            .ok_or_else(|| MediaError::RendererNotFound("empty render command".to_string()))?;
        Ok(Self {
            program,
            args: parts.collect(),
            timeout: None,
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    async fn run(&self, document_path: &Path, output: &Path, on_progress: ProgressCallback) -> MediaResult<()> {
        which::which(&self.program).map_err(|_| MediaError::RendererNotFound(self.program.clone()))?;

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .arg(document_path)
            .arg(output)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| MediaError::render_failed("stdout not captured", None))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| MediaError::render_failed("stderr not captured", None))?;

        let progress_task = tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                match parse_progress_line(&line) {
                    Some(fraction) => on_progress(fraction),
                    None => debug!("renderer: {}", line),
                }
            }
        });
        let stderr_task = tokio::spawn(async move {
            let mut tail: Vec<String> = Vec::new();
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if tail.len() == 20 {
                    tail.remove(0);
                }
                tail.push(line);
            }
            tail.join("\n")
        });

        let status = match self.timeout {
            Some(timeout) => match tokio::time::timeout(timeout, child.wait()).await {
                Ok(status) => status?,
                Err(_) => {
                    warn!(timeout_secs = timeout.as_secs(), "Renderer timed out, killing process");
                    let _ = child.kill().await;
                    return Err(MediaError::Timeout(timeout.as_secs()));
                }
            },
            None => child.wait().await?,
        };

        let _ = progress_task.await;
        let stderr_tail = stderr_task.await.unwrap_or_default();

        if status.success() {
            Ok(())
        } else {
            let message = if stderr_tail.is_empty() {
                format!("renderer exited with {}", status)
            } else {
                stderr_tail
            };
            Err(MediaError::render_failed(message, status.code()))
        }
    }
}

#[async_trait]
impl Renderer for CommandRenderer {
    async fn render(
        &self,
        document: &RenderDocument,
        output: &Path,
        on_progress: ProgressCallback,
    ) -> MediaResult<PathBuf> {
        let document_path = output.with_extension("render.json");
        write_atomic(&document_path, &serde_json::to_vec_pretty(document)?).await?;

        info!(
            job_id = %document.job_id,
            parts = document.scenes.len(),
            total_ms = document.total_duration_ms,
            output = %output.display(),
            "Starting render"
        );
        let result = self.run(&document_path, output, on_progress).await;
        let _ = tokio::fs::remove_file(&document_path).await;
        result?;

        if !tokio::fs::try_exists(output).await.unwrap_or(false) {
            return Err(MediaError::render_failed("renderer produced no output file", None));
        }
        Ok(output.to_path_buf())
    }
}

/// Parse a `progress=<fraction>` line, clamped to `0.0..=1.0`.
pub fn parse_progress_line(line: &str) -> Option<f64> {
    let value = line.trim().strip_prefix("progress=")?;
    let fraction: f64 = value.trim().parse().ok()?;
    fraction.is_finite().then(|| fraction.clamp(0.0, 1.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_progress_line() {
        assert_eq!(parse_progress_line("progress=0.25"), Some(0.25));
        assert_eq!(parse_progress_line("  progress=1.7 "), Some(1.0));
        assert_eq!(parse_progress_line("progress=-1"), Some(0.0));
        assert_eq!(parse_progress_line("progress=nan"), None);
        assert_eq!(parse_progress_line("frame=12"), None);
    }

    #[test]
    fn test_from_command_line() {
        let renderer = CommandRenderer::from_command_line("node render.js --fast").unwrap();
        assert_eq!(renderer.program(), "node");
        assert_eq!(renderer.args, vec!["render.js", "--fast"]);
        assert!(CommandRenderer::from_command_line("   ").is_err());
    }
}
