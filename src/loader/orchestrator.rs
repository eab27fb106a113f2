//! Cluster loader lifecycle.
//!
//! `start` validates preconditions, provisions the binary, renders the overrides once,
//! then hands a fixed argument vector to a background task that performs the runs back to
//! back. The foreground races three signals:
//! - the stop handle, which lets the in-flight run finish and skips the rest;
//! - the global deadline, which kills the in-flight run;
//! - completion of the run loop.
//!
//! Whatever wins, the run-scoped token is cancelled and the loop task is joined before
//! `start` returns, so no child process or task outlives it.

use super::error::{LoaderError, PreconditionError, RunError};
use super::executor::RunExecutor;
use super::{overrides, provision};
use crate::host::Host;
use crate::runtime::config::LoaderConfig;
use crate::runtime::telemetry::RunTelemetry;
use anyhow::Result;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use tokio::task::JoinError;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoaderState {
    Idle,
    Starting,
    Running,
    /// Every scheduled run finished (or the loop stopped on a failed run).
    Completed,
    TimedOut,
    Stopped,
    /// Setup failed before any run was scheduled.
    Failed,
}

/// Why the run loop stopped scheduling runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoopExit {
    Finished,
    DeadlineReached,
    Stopped,
}

/// Cloneable, idempotent stop signal for a [`Loader`].
#[derive(Debug, Clone, Default)]
pub struct StopHandle {
    inner: Arc<StopInner>,
}

#[derive(Debug, Default)]
struct StopInner {
    requested: AtomicBool,
    token: CancellationToken,
}

impl StopHandle {
    /// Requests a graceful stop. Never blocks; repeated calls are no-ops.
    pub fn stop(&self) {
        if self.inner.requested.swap(true, Ordering::SeqCst) {
            tracing::debug!("cluster loader stop already requested");
            return;
        }
        tracing::info!("stopping cluster loader");
        self.inner.token.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.token.is_cancelled()
    }

    async fn stopped(&self) {
        self.inner.token.cancelled().await
    }

    fn token(&self) -> &CancellationToken {
        &self.inner.token
    }
}

pub struct Loader {
    config: LoaderConfig,
    host: Host,
    state: Mutex<LoaderState>,
    started: AtomicBool,
    stop: StopHandle,
    overrides_path: OnceLock<PathBuf>,
    telemetry: Arc<RunTelemetry>,
}

impl Loader {
    /// Creates a loader that works against the local machine.
    pub fn new(config: LoaderConfig) -> Result<Self> {
        Ok(Self::with_host(config, Host::local()?))
    }

    pub fn with_host(config: LoaderConfig, host: Host) -> Self {
        Self {
            config,
            host,
            state: Mutex::new(LoaderState::Idle),
            started: AtomicBool::new(false),
            stop: StopHandle::default(),
            overrides_path: OnceLock::new(),
            telemetry: Arc::new(RunTelemetry::default()),
        }
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    pub fn state(&self) -> LoaderState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Handle that can stop this loader from another task or a signal handler.
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    pub fn telemetry(&self) -> Arc<RunTelemetry> {
        self.telemetry.clone()
    }

    /// Path of the rendered overrides file, once `start` got that far.
    pub fn overrides_path(&self) -> Option<&Path> {
        self.overrides_path.get().map(PathBuf::as_path)
    }

    /// Requests a graceful stop. Safe to call before, during or after [`Self::start`].
    pub fn stop(&self) {
        self.stop.stop();
    }

    /// Reserved for collaborators that parse the report directory. The loader itself
    /// aggregates nothing.
    pub fn get_results(&self) {}

    /// Runs the configured number of clusterloader2 runs and returns once the loader
    /// reaches a terminal state.
    ///
    /// Only a failed run or a setup failure is an error; hitting the deadline or being
    /// stopped returns `Ok(())`.
    pub async fn start(&self) -> Result<(), LoaderError> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(LoaderError::AlreadyStarted);
        }

        tracing::info!("starting cluster loader");
        self.set_state(LoaderState::Starting);

        let executor = match self.prepare().await {
            Ok(Some(executor)) => executor,
            Ok(None) => {
                tracing::info!("cluster loader stopped before the first run");
                self.set_state(LoaderState::Stopped);
                return Ok(());
            }
            Err(err) => {
                self.set_state(LoaderState::Failed);
                return Err(err);
            }
        };

        let (state, result) = self.drive(executor).await;
        self.set_state(state);
        result
    }

    async fn prepare(&self) -> Result<Option<RunExecutor>, LoaderError> {
        self.check_preconditions()?;

        if self.stop.is_stopped() {
            return Ok(None);
        }

        let binary = provision::provision(
            &self.host,
            self.config.loader_path(),
            self.config.download_url(),
            self.stop.token(),
        )
        .await?;

        let overrides_path =
            overrides::write_overrides(self.host.fs.as_ref(), self.config.overrides())?;
        let overrides_path = self.overrides_path.get_or_init(|| overrides_path);

        let args = build_args(&self.config, &binary, overrides_path);
        Ok(Some(RunExecutor::new(
            self.host.runner.clone(),
            args,
            self.config.attempt_timeout(),
            self.config.logs_path().map(Path::to_path_buf),
            self.telemetry.clone(),
        )))
    }

    fn check_preconditions(&self) -> Result<(), PreconditionError> {
        let test_config = self.config.test_config_path();
        if !self.host.fs.exists(test_config) {
            tracing::warn!(
                path = %test_config.display(),
                "clusterloader test config file does not exist"
            );
            return Err(PreconditionError::ConfigNotFound {
                path: test_config.to_path_buf(),
            });
        }

        let report_dir = self.config.report_dir();
        self.host
            .fs
            .create_dir_all(report_dir)
            .and_then(|()| self.host.fs.ensure_writable_dir(report_dir))
            .map_err(|source| PreconditionError::Directory {
                path: report_dir.to_path_buf(),
                source,
            })
    }

    async fn drive(&self, executor: RunExecutor) -> (LoaderState, Result<(), LoaderError>) {
        let runs = self.config.runs();
        let run_token = CancellationToken::new();
        let deadline = Instant::now() + self.config.timeout();
        let deadline_sleep = sleep_until(deadline);
        tokio::pin!(deadline_sleep);

        self.set_state(LoaderState::Running);
        tracing::info!(runs, timeout = ?self.config.timeout(), "cluster loader running");
        let mut run_loop = tokio::spawn(run_loop(
            executor,
            runs,
            deadline,
            run_token.clone(),
            self.stop.clone(),
        ));

        let mut joined = None;
        let state = tokio::select! {
            biased;
            _ = self.stop.stopped() => {
                tracing::info!("stop requested; letting the in-flight cluster loader run finish");
                LoaderState::Stopped
            }
            _ = &mut deadline_sleep => {
                tracing::info!("timed out cluster loader");
                LoaderState::TimedOut
            }
            result = &mut run_loop => {
                let state = match &result {
                    Ok(Ok(LoopExit::DeadlineReached)) => LoaderState::TimedOut,
                    Ok(Ok(LoopExit::Stopped)) => LoaderState::Stopped,
                    _ => LoaderState::Completed,
                };
                tracing::info!(state = ?state, "cluster loader run loop finished");
                joined = Some(result);
                state
            }
        };

        // A stop lets the in-flight run finish, as long as the deadline allows it.
        if state == LoaderState::Stopped && joined.is_none() {
            tokio::select! {
                result = &mut run_loop => joined = Some(result),
                _ = &mut deadline_sleep => {
                    tracing::info!("timed out cluster loader while waiting for the in-flight run");
                }
            }
        }

        run_token.cancel();
        let joined = match joined {
            Some(joined) => joined,
            None => run_loop.await,
        };

        (state, loop_outcome(joined))
    }

    fn set_state(&self, next: LoaderState) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        tracing::debug!(from = ?*state, to = ?next, "cluster loader state transition");
        *state = next;
    }
}

async fn run_loop(
    executor: RunExecutor,
    runs: usize,
    deadline: Instant,
    run_token: CancellationToken,
    stop: StopHandle,
) -> Result<LoopExit, RunError> {
    for index in 0..runs {
        // The run token may lag behind the deadline; the clock is authoritative.
        let exit = if Instant::now() >= deadline {
            Some(LoopExit::DeadlineReached)
        } else if stop.is_stopped() {
            Some(LoopExit::Stopped)
        } else if run_token.is_cancelled() {
            Some(LoopExit::DeadlineReached)
        } else {
            None
        };
        if let Some(exit) = exit {
            tracing::info!(index, runs, reason = ?exit, "skipping remaining cluster loader runs");
            return Ok(exit);
        }
        // One failed run ends the sequence.
        executor.run(index, &run_token).await?;
    }
    Ok(LoopExit::Finished)
}

fn loop_outcome(joined: Result<Result<LoopExit, RunError>, JoinError>) -> Result<(), LoaderError> {
    match joined {
        Ok(Ok(_)) => Ok(()),
        // Killed by our own deadline or shutdown, not a run failure.
        Ok(Err(err)) if err.process_error().is_cancelled() => {
            tracing::info!(index = err.index(), "in-flight cluster loader run was cancelled");
            Ok(())
        }
        Ok(Err(err)) => Err(err.into()),
        Err(err) if err.is_panic() => std::panic::resume_unwind(err.into_panic()),
        Err(err) => {
            tracing::warn!(error = %err, "cluster loader run loop was aborted");
            Ok(())
        }
    }
}

/// Argument vector shared by every run.
fn build_args(config: &LoaderConfig, binary: &Path, overrides_path: &Path) -> Vec<String> {
    let mut args = vec![
        binary.display().to_string(),
        "--alsologtostderr".to_owned(),
        format!("--testconfig={}", config.test_config_path().display()),
        format!("--testoverrides={}", overrides_path.display()),
        format!("--report-dir={}", config.report_dir().display()),
        format!("--nodes={}", config.nodes()),
    ];
    if let Some(kubeconfig) = config.kubeconfig_path() {
        args.push(format!("--kubeconfig={}", kubeconfig.display()));
    }
    args
}
