//! Makes sure the clusterloader2 binary is present, executable and answers `--help`.

use super::error::ProvisionError;
use crate::host::Host;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Bound for the `--help` liveness probe.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(15);

/// Returns the path the binary should be invoked through. Freshly downloaded binaries are
/// addressed by their absolute path.
pub async fn provision(
    host: &Host,
    loader_path: &Path,
    download_url: &str,
    cancel: &CancellationToken,
) -> Result<PathBuf, ProvisionError> {
    if let Some(dir) = loader_path
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
    {
        tracing::info!(dir = %dir.display(), "mkdir clusterloader directory");
        host.fs
            .create_dir_all(dir)
            .map_err(|source| ProvisionError::CreateDir {
                path: dir.to_path_buf(),
                source,
            })?;
    }

    let path = if host.fs.exists(loader_path) {
        tracing::info!(
            path = %loader_path.display(),
            "skipping clusterloader download; already exists"
        );
        loader_path.to_path_buf()
    } else {
        let path =
            std::path::absolute(loader_path).unwrap_or_else(|_| loader_path.to_path_buf());
        tracing::info!(path = %path.display(), url = download_url, "downloading clusterloader");
        host.downloader
            .download(download_url, &path)
            .await
            .map_err(|source| ProvisionError::Download {
                url: download_url.to_owned(),
                source,
            })?;
        path
    };

    // The binary may already be runnable while owned by someone else.
    if let Err(err) = host.fs.ensure_executable(&path) {
        tracing::warn!(path = %path.display(), error = %err, "failed to ensure executable");
    }

    probe(host, &path, cancel).await;
    Ok(path)
}

async fn probe(host: &Host, path: &Path, cancel: &CancellationToken) {
    let argv = [path.display().to_string(), "--help".to_owned()];
    match host.runner.run(&argv, PROBE_TIMEOUT, cancel).await {
        Ok(output) => {
            tracing::info!(path = %path.display(), output = %output.text(), "clusterloader --help succeeded");
        }
        Err(err) => {
            tracing::warn!(
                path = %path.display(),
                error = %err,
                output = %String::from_utf8_lossy(err.combined_output()).trim(),
                "clusterloader --help failed"
            );
        }
    }
}
