//! Narrow interfaces to the machine the loader runs on: filesystem probes, the
//! binary downloader, and child process execution.

pub mod download;
pub mod fs;
pub mod process;

pub use download::{Downloader, HttpDownloader};
pub use fs::{FileSystem, LocalFileSystem};
pub use process::{ProcessError, ProcessOutput, ProcessRunner, TokioProcessRunner};

use anyhow::Result;
use std::sync::Arc;

/// The collaborators a [`Loader`](crate::Loader) drives.
#[derive(Clone)]
pub struct Host {
    pub fs: Arc<dyn FileSystem>,
    pub downloader: Arc<dyn Downloader>,
    pub runner: Arc<dyn ProcessRunner>,
}

impl Host {
    /// Local disk, HTTP downloads and real child processes.
    pub fn local() -> Result<Self> {
        Ok(Self {
            fs: Arc::new(LocalFileSystem::new()),
            downloader: Arc::new(HttpDownloader::new()?.with_progress(true)),
            runner: Arc::new(TokioProcessRunner),
        })
    }
}
