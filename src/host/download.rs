//! Fetches the clusterloader2 executable over HTTP.

use anyhow::{bail, Context, Result};
use futures::future::BoxFuture;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tokio::io::AsyncWriteExt;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
const PARTIAL_SUFFIX: &str = ".download";

pub trait Downloader: Send + Sync {
    /// Downloads `url` into `dest`. On error nothing is left at `dest`.
    fn download<'a>(&'a self, url: &'a str, dest: &'a Path) -> BoxFuture<'a, Result<()>>;
}

#[derive(Debug, Clone)]
pub struct HttpDownloader {
    client: reqwest::Client,
    show_progress: bool,
}

impl Downloader for HttpDownloader {
    fn download<'a>(&'a self, url: &'a str, dest: &'a Path) -> BoxFuture<'a, Result<()>> {
        Box::pin(self.fetch(url, dest))
    }
}

impl HttpDownloader {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            client,
            show_progress: false,
        })
    }

    /// Draws a progress bar on stderr while downloading.
    pub fn with_progress(mut self, enabled: bool) -> Self {
        self.show_progress = enabled;
        self
    }

    async fn fetch(&self, url: &str, dest: &Path) -> Result<()> {
        tracing::info!(url, path = %dest.display(), "downloading");

        let mut response = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("failed to request {url}"))?;
        let status = response.status();
        if !status.is_success() {
            bail!("downloading {url} failed with HTTP status {status}");
        }

        let progress = self.progress_bar(response.content_length());
        let partial = partial_path(dest);
        let written = async {
            let mut file = fs::File::create(&partial)
                .await
                .with_context(|| format!("failed to create {}", partial.display()))?;
            let mut written = 0u64;
            while let Some(chunk) = response
                .chunk()
                .await
                .with_context(|| format!("failed to read body of {url}"))?
            {
                file.write_all(&chunk)
                    .await
                    .with_context(|| format!("failed to write {}", partial.display()))?;
                written += chunk.len() as u64;
                progress.set_position(written);
            }
            file.flush().await?;
            file.sync_all().await?;
            Ok::<_, anyhow::Error>(written)
        }
        .await;
        progress.finish_and_clear();

        let written = match written {
            Ok(written) => written,
            Err(err) => {
                let _ = fs::remove_file(&partial).await;
                return Err(err);
            }
        };

        fs::rename(&partial, dest).await.with_context(|| {
            format!("failed to move {} to {}", partial.display(), dest.display())
        })?;

        tracing::info!(url, path = %dest.display(), bytes = written, "downloaded");
        Ok(())
    }

    fn progress_bar(&self, total: Option<u64>) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }

        let bar = ProgressBar::with_draw_target(total, ProgressDrawTarget::stderr_with_hz(8));
        if let Ok(style) = ProgressStyle::with_template(
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec})",
        ) {
            bar.set_style(style.progress_chars("=>-"));
        }
        bar
    }
}

fn partial_path(dest: &Path) -> PathBuf {
    let mut name = dest
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_else(|| OsString::from("clusterloader2"));
    name.push(PARTIAL_SUFFIX);
    dest.with_file_name(name)
}
