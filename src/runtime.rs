//! Runtime glue: validated configuration and tracing/telemetry setup.

pub mod config;
pub mod telemetry;
