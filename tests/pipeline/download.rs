use std::sync::Arc;

use crate::support::{
    fakes::RecordingRunner,
    helpers::{init_tracing, Workspace},
    http::StaticHttpServer,
};
use anyhow::Result;
use clusterloader_runner::host::{Downloader, Host, HttpDownloader, LocalFileSystem};
use clusterloader_runner::loader::ProvisionError;
use clusterloader_runner::{Loader, LoaderError};

const SCRIPT: &[u8] = b"#!/bin/sh\nexit 0\n";

#[tokio::test]
async fn successful_download_lands_at_the_destination() -> Result<()> {
    init_tracing();
    let server = StaticHttpServer::start("/clusterloader2", 200, SCRIPT).await?;
    let workspace = Workspace::new()?;
    let dest = workspace.path().join("clusterloader2");

    HttpDownloader::new()?
        .download(&server.url(), &dest)
        .await?;

    assert_eq!(std::fs::read(&dest)?, SCRIPT);
    assert!(!workspace.path().join("clusterloader2.download").exists());
    assert_eq!(server.hits(), 1);
    server.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn http_error_leaves_nothing_behind() -> Result<()> {
    init_tracing();
    let server = StaticHttpServer::start("/clusterloader2", 404, "missing").await?;
    let workspace = Workspace::new()?;
    let dest = workspace.path().join("clusterloader2");

    let err = HttpDownloader::new()?
        .download(&server.url(), &dest)
        .await
        .expect_err("404 must fail");

    assert!(format!("{err:#}").contains("404"));
    assert!(!dest.exists());
    assert!(!workspace.path().join("clusterloader2.download").exists());
    server.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn server_errors_report_their_status() -> Result<()> {
    init_tracing();
    let server = StaticHttpServer::start("/clusterloader2", 500, "boom").await?;
    let workspace = Workspace::new()?;
    let dest = workspace.path().join("clusterloader2");

    let err = HttpDownloader::new()?
        .download(&server.url(), &dest)
        .await
        .expect_err("500 must fail");

    assert!(format!("{err:#}").contains("500 Internal Server Error"));
    assert!(!dest.exists());
    assert_eq!(server.hits(), 1);
    server.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn loader_downloads_a_missing_binary_once() -> Result<()> {
    init_tracing();
    let server = StaticHttpServer::start("/clusterloader2", 200, SCRIPT).await?;
    let workspace = Workspace::new()?;
    let runner = Arc::new(RecordingRunner::default());
    let host = Host {
        fs: Arc::new(LocalFileSystem::with_temp_dir(workspace.temp_dir())),
        downloader: Arc::new(HttpDownloader::new()?),
        runner: runner.clone(),
    };
    let config = workspace
        .config_builder()
        .download_url(server.url())
        .runs(2)
        .build()?;
    let loader = Loader::with_host(config, host);

    loader.start().await?;

    assert_eq!(server.hits(), 1);
    assert!(workspace.binary().exists());
    assert_eq!(runner.runs().len(), 2);
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = std::fs::metadata(workspace.binary())?.permissions().mode();
        assert_ne!(mode & 0o111, 0, "binary should be executable");
    }
    server.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn loader_surfaces_download_failures() -> Result<()> {
    init_tracing();
    let server = StaticHttpServer::start("/clusterloader2", 404, "missing").await?;
    let workspace = Workspace::new()?;
    let runner = Arc::new(RecordingRunner::default());
    let host = Host {
        fs: Arc::new(LocalFileSystem::with_temp_dir(workspace.temp_dir())),
        downloader: Arc::new(HttpDownloader::new()?),
        runner: runner.clone(),
    };
    let config = workspace
        .config_builder()
        .download_url(server.url())
        .build()?;
    let loader = Loader::with_host(config, host);

    let err = loader.start().await.expect_err("download fails");

    assert!(matches!(
        err,
        LoaderError::Provision(ProvisionError::Download { .. })
    ));
    assert!(err.to_string().contains("404"));
    assert!(!workspace.binary().exists());
    assert!(runner.runs().is_empty());
    server.shutdown().await;
    Ok(())
}
