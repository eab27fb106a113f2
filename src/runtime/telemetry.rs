use std::io::IsTerminal;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;
use tracing_subscriber::EnvFilter;

static TRACING_INIT: OnceLock<()> = OnceLock::new();

/// Our own events at `info`, everything else (reqwest, hyper) at `warn`.
const DEFAULT_FILTER: &str = "warn,clusterloader_runner=info";

/// Installs a compact stderr subscriber for the CLI, once.
///
/// `RUST_LOG` overrides [`DEFAULT_FILTER`]. Colours are only used when stderr is a
/// terminal, so redirected logs stay plain text. stdout is left to clusterloader2.
pub fn init_tracing() {
    if TRACING_INIT.get().is_some() {
        return;
    }

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let _ = tracing_subscriber::fmt()
        .compact()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(std::io::stderr().is_terminal())
        .with_writer(std::io::stderr)
        .try_init();

    let _ = TRACING_INIT.set(());
}

/// Counters describing the runs driven by a loader.
#[derive(Default, Debug)]
pub struct RunTelemetry {
    attempts_started: AtomicU64,
    attempts_succeeded: AtomicU64,
    attempts_failed: AtomicU64,
    attempts_cancelled: AtomicU64,
}

impl RunTelemetry {
    pub fn record_attempt_started(&self) {
        self.attempts_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_attempt_succeeded(&self) {
        self.attempts_succeeded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_attempt_failed(&self) {
        self.attempts_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// A run killed by the global deadline or shutdown. Not a failure.
    pub fn record_attempt_cancelled(&self) {
        self.attempts_cancelled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> RunTelemetrySnapshot {
        RunTelemetrySnapshot {
            attempts_started: self.attempts_started.load(Ordering::Relaxed),
            attempts_succeeded: self.attempts_succeeded.load(Ordering::Relaxed),
            attempts_failed: self.attempts_failed.load(Ordering::Relaxed),
            attempts_cancelled: self.attempts_cancelled.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct RunTelemetrySnapshot {
    pub attempts_started: u64,
    pub attempts_succeeded: u64,
    pub attempts_failed: u64,
    pub attempts_cancelled: u64,
}
