use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{bail, Result};
use clusterloader_runner::{LoaderConfig, LoaderConfigBuilder};
use once_cell::sync::Lazy;
use tempfile::TempDir;
use tokio::time::sleep;
use tracing_subscriber::EnvFilter;

use super::fakes::RecordingRunner;

static TRACING_SUBSCRIBER: Lazy<()> = Lazy::new(|| {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
});

pub fn init_tracing() {
    Lazy::force(&TRACING_SUBSCRIBER);
}

/// Scratch layout for one loader: a test config on disk and paths for everything else.
pub struct Workspace {
    pub dir: TempDir,
}

impl Workspace {
    pub fn new() -> Result<Self> {
        let dir = TempDir::new()?;
        std::fs::write(dir.path().join("config.yaml"), "name: load\n")?;
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn test_config(&self) -> PathBuf {
        self.path().join("config.yaml")
    }

    pub fn report_dir(&self) -> PathBuf {
        self.path().join("report")
    }

    pub fn binary(&self) -> PathBuf {
        self.path().join("bin").join("clusterloader2")
    }

    pub fn temp_dir(&self) -> PathBuf {
        self.path().to_path_buf()
    }

    pub fn config_builder(&self) -> LoaderConfigBuilder {
        LoaderConfig::builder()
            .loader_path(self.binary())
            .download_url("https://downloads.example.com/clusterloader2")
            .test_config_path(self.test_config())
            .report_dir(self.report_dir())
            .timeout(Duration::from_secs(3600))
    }
}

pub async fn wait_for_runs(runner: &RecordingRunner, target: usize, timeout: Duration) -> Result<()> {
    let start = Instant::now();
    loop {
        let current = runner.runs().len();
        if current >= target {
            return Ok(());
        }

        if start.elapsed() > timeout {
            bail!("runner did not see {target} runs within {timeout:?} (saw {current})");
        }

        sleep(Duration::from_millis(10)).await;
    }
}

#[cfg(unix)]
pub fn write_script(path: &Path, body: &str) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, format!("#!/bin/sh\n{body}"))?;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))?;
    Ok(())
}
