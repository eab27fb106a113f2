pub mod host;
pub mod loader;
pub mod runtime;

pub use host::{Downloader, FileSystem, Host, ProcessRunner};
pub use loader::{Loader, LoaderError, LoaderState, StopHandle};
pub use runtime::config::{LoaderConfig, LoaderConfigBuilder, LoaderConfigParams, TestOverrides};
pub use runtime::telemetry::{init_tracing, RunTelemetry, RunTelemetrySnapshot};
