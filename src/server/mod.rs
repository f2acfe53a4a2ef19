//! HTTP server for the upload mock.
//!
//! Built directly on `hyper` and `tokio`: the listener is bound up front (so
//! port 0 works and the assigned address can be read back), then an accept
//! loop spawns one task per connection. Connection errors are logged and the
//! loop keeps accepting.

use crate::config::Config;
use crate::emitter::Emitter;
use crate::protocol::{TusHandlers, UploadEvent};
use crate::store::{MemoryKvStore, UploadStore};
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{body::Incoming, Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpListener;
use tracing::{error, info};

/// Server errors
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Failed to bind to address: {0}")]
    BindError(String),

    #[error("Server error: {0}")]
    RuntimeError(String),
}

/// The mock upload server.
///
/// Wires the protocol handlers to an in-memory record store and serves them
/// over HTTP/1.1.
pub struct Server {
    handlers: Arc<TusHandlers<MemoryKvStore>>,
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl Server {
    /// Bind to the configured address and assemble the handler stack.
    ///
    /// Binding happens here rather than in `run` so callers using port 0 can
    /// read the assigned port back via [`Server::local_addr`] before any
    /// request is served.
    pub async fn new(config: Config) -> Result<Self, ServerError> {
        let addr: SocketAddr = config
            .server
            .address
            .parse()
            .map_err(|e| ServerError::BindError(format!("Invalid address: {}", e)))?;

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::BindError(format!("Failed to bind to {}: {}", addr, e)))?;

        let local_addr = listener
            .local_addr()
            .map_err(|e| ServerError::BindError(format!("Failed to get local address: {}", e)))?;

        info!("Server bound to {}", local_addr);

        let store = UploadStore::new(Arc::new(MemoryKvStore::new()), config.tus.key_prefix.clone());
        let handlers = TusHandlers::new(store, config.tus.path_prefix.clone(), config.tus.patch_delay_ms);

        Ok(Self {
            handlers: Arc::new(handlers),
            listener,
            local_addr,
        })
    }

    /// The address the server is actually listening on.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Event stream fed by successful creates and appends, for harnesses
    /// that observe the mock while it serves.
    pub fn events(&self) -> &Emitter<UploadEvent> {
        self.handlers.events()
    }

    /// Run the accept loop. Returns only on a fatal error; in normal
    /// operation it serves until the task is dropped.
    pub async fn run(self) -> Result<(), ServerError> {
        info!("Starting tus mock server on {}", self.local_addr);

        loop {
            let (stream, peer_addr) = match self.listener.accept().await {
                Ok(conn) => conn,
                Err(e) => {
                    error!("Failed to accept connection: {}", e);
                    continue;
                }
            };

            let handlers = Arc::clone(&self.handlers);

            tokio::spawn(async move {
                let io = TokioIo::new(stream);

                let service = service_fn(move |req| {
                    let handlers = Arc::clone(&handlers);
                    async move { handle_request(req, handlers).await }
                });

                if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                    error!("Error serving connection from {}: {}", peer_addr, e);
                }
            });
        }
    }
}

/// Handle one HTTP request.
///
/// `GET /health` answers `ok`; everything else goes through the protocol
/// route table, with unrouted requests answered 404.
async fn handle_request(
    req: Request<Incoming>,
    handlers: Arc<TusHandlers<MemoryKvStore>>,
) -> Result<Response<Full<Bytes>>, hyper::Error> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    info!("Handling {} {}", method, path);

    if path == "/health" && method == Method::GET {
        return Ok(Response::builder()
            .status(StatusCode::OK)
            .header("Content-Type", "text/plain")
            .body(Full::new(Bytes::from("ok")))
            .expect("Failed to build health check response"));
    }

    let headers = req.headers().clone();
    let body = match req.into_body().collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            error!("Failed to read request body: {}", e);
            return Ok(Response::builder()
                .status(StatusCode::BAD_REQUEST)
                .header("Content-Type", "text/plain")
                .body(Full::new(Bytes::from(format!("Failed to read body: {}", e))))
                .expect("Failed to build error response"));
        }
    };

    match handlers.handle(&method, &path, &headers, body).await {
        Some(response) => Ok(response),
        None => Ok(Response::builder()
            .status(StatusCode::NOT_FOUND)
            .header("Content-Type", "text/plain")
            .body(Full::new(Bytes::from("Not Found")))
            .expect("Failed to build 404 response")),
    }
}
