//! Child process execution bounded by a timeout and a cancellation token.

use futures::future::BoxFuture;
use std::fmt;
use std::io;
use std::process::Stdio;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout_at, Instant};
use tokio_util::sync::CancellationToken;

/// How long output readers may keep draining once the child is gone. Grandchildren that
/// inherited the pipes would otherwise hold them open.
const OUTPUT_DRAIN_GRACE: Duration = Duration::from_secs(2);
const READ_CHUNK_BYTES: usize = 8 * 1024;

/// Result of a child that exited successfully.
#[derive(Debug, Clone, Default)]
pub struct ProcessOutput {
    /// Interleaved stdout and stderr, in arrival order.
    pub combined: Vec<u8>,
}

impl ProcessOutput {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.combined).trim().to_owned()
    }
}

#[derive(Debug)]
pub enum ProcessError {
    EmptyCommand,
    Spawn {
        program: String,
        source: io::Error,
    },
    Wait(io::Error),
    Exit {
        code: Option<i32>,
        combined: Vec<u8>,
    },
    TimedOut {
        timeout: Duration,
        combined: Vec<u8>,
    },
    Cancelled {
        combined: Vec<u8>,
    },
}

impl ProcessError {
    /// Output captured before the failure, if the child got that far.
    pub fn combined_output(&self) -> &[u8] {
        match self {
            ProcessError::Exit { combined, .. }
            | ProcessError::TimedOut { combined, .. }
            | ProcessError::Cancelled { combined } => combined,
            ProcessError::EmptyCommand | ProcessError::Spawn { .. } | ProcessError::Wait(_) => &[],
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, ProcessError::TimedOut { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, ProcessError::Cancelled { .. })
    }
}

impl fmt::Display for ProcessError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessError::EmptyCommand => write!(f, "empty command line"),
            ProcessError::Spawn { program, source } => {
                write!(f, "failed to spawn {program}: {source}")
            }
            ProcessError::Wait(source) => write!(f, "failed to wait for child: {source}"),
            ProcessError::Exit {
                code: Some(code), ..
            } => write!(f, "exited with status {code}"),
            ProcessError::Exit { code: None, .. } => write!(f, "terminated by signal"),
            ProcessError::TimedOut { timeout, .. } => write!(f, "timed out after {timeout:?}"),
            ProcessError::Cancelled { .. } => write!(f, "cancelled before completion"),
        }
    }
}

impl std::error::Error for ProcessError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ProcessError::Spawn { source, .. } | ProcessError::Wait(source) => Some(source),
            _ => None,
        }
    }
}

pub type ProcessFuture<'a> = BoxFuture<'a, Result<ProcessOutput, ProcessError>>;

pub trait ProcessRunner: Send + Sync {
    /// Runs `argv[0]` with the remaining arguments. The child is killed once `timeout`
    /// elapses or `cancel` fires, and is always reaped before the future resolves.
    fn run<'a>(
        &'a self,
        argv: &'a [String],
        timeout: Duration,
        cancel: &'a CancellationToken,
    ) -> ProcessFuture<'a>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TokioProcessRunner;

impl ProcessRunner for TokioProcessRunner {
    fn run<'a>(
        &'a self,
        argv: &'a [String],
        timeout: Duration,
        cancel: &'a CancellationToken,
    ) -> ProcessFuture<'a> {
        Box::pin(run_child(argv, timeout, cancel))
    }
}

enum Outcome {
    Exited(io::Result<std::process::ExitStatus>),
    TimedOut,
    Cancelled,
}

async fn run_child(
    argv: &[String],
    timeout: Duration,
    cancel: &CancellationToken,
) -> Result<ProcessOutput, ProcessError> {
    let (program, args) = argv.split_first().ok_or(ProcessError::EmptyCommand)?;

    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| ProcessError::Spawn {
            program: program.clone(),
            source,
        })?;

    let sink = Arc::new(Mutex::new(Vec::new()));
    let mut readers = Vec::with_capacity(2);
    if let Some(stdout) = child.stdout.take() {
        readers.push(tokio::spawn(pump(stdout, sink.clone())));
    }
    if let Some(stderr) = child.stderr.take() {
        readers.push(tokio::spawn(pump(stderr, sink.clone())));
    }

    let outcome = tokio::select! {
        status = child.wait() => Outcome::Exited(status),
        _ = sleep(timeout) => Outcome::TimedOut,
        _ = cancel.cancelled() => Outcome::Cancelled,
    };

    if !matches!(outcome, Outcome::Exited(_)) {
        // kill() also reaps the child.
        if let Err(err) = child.kill().await {
            tracing::warn!(program = %program, error = %err, "failed to kill child process");
        }
    }

    let combined = drain(readers, &sink).await;

    match outcome {
        Outcome::Exited(Ok(status)) if status.success() => Ok(ProcessOutput { combined }),
        Outcome::Exited(Ok(status)) => Err(ProcessError::Exit {
            code: status.code(),
            combined,
        }),
        Outcome::Exited(Err(err)) => Err(ProcessError::Wait(err)),
        Outcome::TimedOut => Err(ProcessError::TimedOut { timeout, combined }),
        Outcome::Cancelled => Err(ProcessError::Cancelled { combined }),
    }
}

async fn pump<R: AsyncRead + Unpin>(mut reader: R, sink: Arc<Mutex<Vec<u8>>>) {
    let mut chunk = vec![0u8; READ_CHUNK_BYTES];
    loop {
        match reader.read(&mut chunk).await {
            Ok(0) => break,
            Err(err) => {
                tracing::warn!(error = %err, "failed to read child output; output is truncated");
                break;
            }
            Ok(read) => sink
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .extend_from_slice(&chunk[..read]),
        }
    }
}

async fn drain(readers: Vec<JoinHandle<()>>, sink: &Mutex<Vec<u8>>) -> Vec<u8> {
    let deadline = Instant::now() + OUTPUT_DRAIN_GRACE;
    for mut reader in readers {
        if timeout_at(deadline, &mut reader).await.is_err() {
            reader.abort();
        }
    }
    std::mem::take(&mut *sink.lock().unwrap_or_else(PoisonError::into_inner))
}
