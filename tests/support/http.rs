use std::convert::Infallible;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use hyper::body::Bytes;
use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Method, Request, Response, Server, StatusCode};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// Serves one fixed download: `GET <path>` answers with the configured status and body,
/// any other path is a 404.
pub struct StaticHttpServer {
    base_url: String,
    path: String,
    hits: Arc<AtomicUsize>,
    shutdown: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

#[derive(Clone)]
struct Asset {
    path: Arc<str>,
    status: StatusCode,
    body: Bytes,
    hits: Arc<AtomicUsize>,
}

impl StaticHttpServer {
    pub async fn start(path: &str, status: u16, body: impl Into<Bytes>) -> Result<Self> {
        let status = StatusCode::from_u16(status).context("invalid status code")?;
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .context("failed to bind static HTTP listener")?;
        let addr = listener
            .local_addr()
            .context("failed to read static HTTP listener address")?;
        let std_listener = listener
            .into_std()
            .context("failed to convert static HTTP listener")?;
        std_listener
            .set_nonblocking(true)
            .context("failed to set static HTTP listener non-blocking")?;

        let hits = Arc::new(AtomicUsize::new(0));
        let asset = Asset {
            path: Arc::from(path),
            status,
            body: body.into(),
            hits: hits.clone(),
        };

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let make_service = make_service_fn(move |_| {
            let asset = asset.clone();
            async move {
                Ok::<_, Infallible>(service_fn(move |req| serve_asset(asset.clone(), req)))
            }
        });

        let server = Server::from_tcp(std_listener)
            .context("failed to build static HTTP server")?
            .serve(make_service);
        let graceful = server.with_graceful_shutdown(async {
            let _ = shutdown_rx.await;
        });

        let handle = tokio::spawn(async move {
            if let Err(err) = graceful.await {
                eprintln!("static HTTP server stopped: {err}");
            }
        });

        Ok(Self {
            base_url: format!("http://{addr}"),
            path: path.to_owned(),
            hits,
            shutdown: Some(shutdown_tx),
            handle: Some(handle),
        })
    }

    /// URL of the served asset.
    pub fn url(&self) -> String {
        format!("{}{}", self.base_url, self.path)
    }

    /// Requests that reached the asset path.
    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

async fn serve_asset(asset: Asset, req: Request<Body>) -> Result<Response<Body>, Infallible> {
    if req.method() != Method::GET {
        let mut response = Response::new(Body::from("Unsupported method"));
        *response.status_mut() = StatusCode::METHOD_NOT_ALLOWED;
        return Ok(response);
    }

    if req.uri().path() != &*asset.path {
        let mut response = Response::new(Body::from("Unknown asset"));
        *response.status_mut() = StatusCode::NOT_FOUND;
        return Ok(response);
    }

    asset.hits.fetch_add(1, Ordering::SeqCst);
    let mut response = Response::new(Body::from(asset.body));
    *response.status_mut() = asset.status;
    Ok(response)
}
