//! Executes a single clusterloader2 run.

use super::error::RunError;
use crate::host::ProcessRunner;
use crate::runtime::telemetry::RunTelemetry;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;

/// Runs the fixed argument vector once per call. No retries.
#[derive(Clone)]
pub struct RunExecutor {
    runner: Arc<dyn ProcessRunner>,
    args: Arc<[String]>,
    attempt_timeout: Duration,
    logs_path: Option<PathBuf>,
    telemetry: Arc<RunTelemetry>,
}

impl RunExecutor {
    pub fn new(
        runner: Arc<dyn ProcessRunner>,
        args: Vec<String>,
        attempt_timeout: Duration,
        logs_path: Option<PathBuf>,
        telemetry: Arc<RunTelemetry>,
    ) -> Self {
        Self {
            runner,
            args: args.into(),
            attempt_timeout,
            logs_path,
            telemetry,
        }
    }

    /// Runs attempt `index`. The child inherits `run_token`, so the global deadline also
    /// kills it; the per-attempt timeout applies on top.
    pub async fn run(&self, index: usize, run_token: &CancellationToken) -> Result<(), RunError> {
        let command = self.args.join(" ");
        tracing::info!(index, command = %command, "running cluster loader");
        self.telemetry.record_attempt_started();

        let attempt_token = run_token.child_token();
        let result = self
            .runner
            .run(&self.args, self.attempt_timeout, &attempt_token)
            .await;

        let output = match &result {
            Ok(output) => output.combined.as_slice(),
            Err(err) => err.combined_output(),
        };
        if let Some(path) = &self.logs_path {
            append_run_log(path, index, &command, output).await;
        }

        match result {
            Ok(output) => {
                self.telemetry.record_attempt_succeeded();
                tracing::info!(
                    index,
                    output_bytes = output.combined.len(),
                    "cluster loader run completed"
                );
                Ok(())
            }
            Err(err) if err.is_cancelled() => {
                self.telemetry.record_attempt_cancelled();
                tracing::info!(index, "cluster loader run was cancelled");
                Err(RunError::new(index, err))
            }
            Err(err) => {
                self.telemetry.record_attempt_failed();
                tracing::warn!(index, error = %err, "failed to run cluster loader");
                Err(RunError::new(index, err))
            }
        }
    }
}

async fn append_run_log(path: &Path, index: usize, command: &str, output: &[u8]) {
    let written = async {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await?;
        file.write_all(format!("=== run {index}: {command} ===\n").as_bytes())
            .await?;
        file.write_all(output).await?;
        file.write_all(b"\n").await?;
        file.flush().await
    }
    .await;

    if let Err(err) = written {
        tracing::warn!(path = %path.display(), index, error = %err, "failed to append run log");
    }
}
