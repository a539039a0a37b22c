use crate::error::{truncate_chars, AppError, Result, OUTPUT_PREFIX_CHARS};
use crate::forecaster::Forecaster;
use crate::models::ForecastInput;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, error, warn};

/// Runs the model as a child process: JSON in on stdin, JSON out on stdout
pub struct ProcessForecaster {
    command: String,
    args: Vec<String>,
    working_dir: Option<PathBuf>,
    timeout: Duration,
}

impl ProcessForecaster {
    pub fn new(command: impl Into<String>, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            command: command.into(),
            args,
            working_dir: None,
            timeout,
        }
    }

    pub fn with_working_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.working_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    fn command_line(&self) -> String {
        std::iter::once(self.command.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Write `payload` to a fresh child's stdin, then collect its streams
    /// and exit status, killing it if `timeout` elapses first
    async fn run(&self, payload: Vec<u8>) -> Result<Vec<u8>> {
        let command_line = self.command_line();

        let mut cmd = Command::new(&self.command);
        cmd.args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }

        let mut child = cmd.spawn().map_err(|e| {
            AppError::ForecasterUnavailable(format!("failed to start `{}`: {}", command_line, e))
        })?;

        // Feed stdin from its own task so a child that writes before it has
        // read everything cannot deadlock against us
        let stdin_task = child.stdin.take().map(|mut stdin| {
            tokio::spawn(async move {
                let written = stdin.write_all(&payload).await;
                drop(stdin);
                written
            })
        });

        let started = Instant::now();
        // On timeout the child is dropped with the future, and kill_on_drop
        // terminates it
        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(output) => output?,
            Err(_) => {
                error!(
                    "Forecaster `{}` timed out after {:.1}s",
                    command_line,
                    self.timeout.as_secs_f64()
                );
                return Err(AppError::InvocationTimeout {
                    command: command_line,
                    timeout: self.timeout,
                });
            }
        };

        if let Some(task) = stdin_task {
            match task.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!("Forecaster `{}` did not read all input: {}", command_line, e),
                Err(e) => warn!("Forecaster stdin writer failed: {}", e),
            }
        }

        debug!(
            "Forecaster `{}` exited with {} after {}ms ({} bytes stdout, {} bytes stderr)",
            command_line,
            output.status,
            started.elapsed().as_millis(),
            output.stdout.len(),
            output.stderr.len()
        );

        if !output.status.success() || output.stdout.is_empty() {
            let stdout = String::from_utf8_lossy(&output.stdout);
            let err = AppError::InvocationFailed {
                command: command_line,
                status: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
                stdout_prefix: if stdout.trim().is_empty() {
                    None
                } else {
                    Some(truncate_chars(stdout.trim(), OUTPUT_PREFIX_CHARS))
                },
            };
            error!("{}", err);
            return Err(err);
        }

        Ok(output.stdout)
    }
}

#[async_trait]
impl Forecaster for ProcessForecaster {
    async fn predict(&self, input: &ForecastInput) -> Result<Vec<u8>> {
        let payload = serde_json::to_vec(input)?;
        debug!(
            "Invoking `{}` for {} with {} readings",
            self.command_line(),
            input.estacion,
            input.readings.len()
        );
        self.run(payload).await
    }

    fn describe(&self) -> String {
        self.command_line()
    }
}
