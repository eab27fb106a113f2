//! Cluster loader orchestration: binary provisioning, overrides rendering, single-run
//! execution and the lifecycle state machine tying them together.

pub mod error;
pub mod executor;
pub mod orchestrator;
pub mod overrides;
pub mod provision;

pub use error::{LoaderError, PreconditionError, ProvisionError, RenderError, RunError};
pub use executor::RunExecutor;
pub use orchestrator::{Loader, LoaderState, StopHandle};
