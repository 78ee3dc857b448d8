//! HTTP server module
//!
//! Serves the presign service over HTTP/1.1 with `hyper`.
//!
//! # Endpoints
//!
//! * `POST /presign` - Presigned PUT URL (see [`crate::presign`])
//! * `GET /health` - Health check (returns "ok")
//! * `GET /metrics` - Prometheus text exposition
//!
//! # Example
//!
//! ```no_run
//! use presign_uploadr::config::PresignServerConfig;
//! use presign_uploadr::presign::{PresignPolicy, PresignService, S3Presigner};
//! use presign_uploadr::server::PresignServer;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = PresignServerConfig::default();
//! let presigner = S3Presigner::from_config(&config).await;
//! let service = PresignService::new(PresignPolicy::default(), Arc::new(presigner));
//! let server = PresignServer::bind(&config.address, service).await?;
//! server.run().await?;
//! # Ok(())
//! # }
//! ```

use crate::presign::PresignService;
use bytes::Bytes;
use http_body_util::{BodyExt, Full, Limited};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{body::Incoming, Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpListener;
use tracing::{error, info};

/// Largest accepted presign request body
const MAX_BODY_BYTES: usize = 64 * 1024;

/// Server errors
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Failed to bind to address: {0}")]
    BindError(String),

    #[error("Server error: {0}")]
    RuntimeError(String),
}

/// HTTP server for the presign service
pub struct PresignServer {
    service: Arc<PresignService>,
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl PresignServer {
    /// Bind to `address`; port 0 asks the OS for a free port
    pub async fn bind(address: &str, service: PresignService) -> Result<Self, ServerError> {
        let addr: SocketAddr = address
            .parse()
            .map_err(|e| ServerError::BindError(format!("Invalid address: {}", e)))?;

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::BindError(format!("Failed to bind to {}: {}", addr, e)))?;

        let local_addr = listener
            .local_addr()
            .map_err(|e| ServerError::BindError(format!("Failed to get local address: {}", e)))?;

        info!("Presign server bound to {}", local_addr);

        Ok(Self {
            service: Arc::new(service),
            listener,
            local_addr,
        })
    }

    /// The address the server is listening on
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Serve until Ctrl-C
    pub async fn run(self) -> Result<(), ServerError> {
        self.run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for shutdown signal: {}", e);
            }
        })
        .await
    }

    /// Serve until `shutdown` resolves
    ///
    /// Connection errors are logged and do not stop the accept loop.
    pub async fn run_until<F>(self, shutdown: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()>,
    {
        info!("Starting presign server on {}", self.local_addr);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutting down presign server");
                    return Ok(());
                }
                accepted = self.listener.accept() => {
                    let (stream, peer_addr) = match accepted {
                        Ok(conn) => conn,
                        Err(e) => {
                            error!("Failed to accept connection: {}", e);
                            continue;
                        }
                    };

                    let service = Arc::clone(&self.service);
                    tokio::spawn(async move {
                        let io = TokioIo::new(stream);
                        let handler = service_fn(move |req| {
                            let service = Arc::clone(&service);
                            async move { handle_request(req, service).await }
                        });

                        if let Err(e) = http1::Builder::new().serve_connection(io, handler).await {
                            error!("Error serving connection from {}: {}", peer_addr, e);
                        }
                    });
                }
            }
        }
    }
}

fn text_response(status: StatusCode, body: &'static str) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from_static(body.as_bytes())));
    *response.status_mut() = status;
    response.headers_mut().insert(
        hyper::header::CONTENT_TYPE,
        hyper::header::HeaderValue::from_static("text/plain"),
    );
    response
}

fn json_response(status: u16, body: &serde_json::Value) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(body.to_string())));
    *response.status_mut() =
        StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    response.headers_mut().insert(
        hyper::header::CONTENT_TYPE,
        hyper::header::HeaderValue::from_static("application/json"),
    );
    response
}

/// Route a request to the presign service, health check or metrics
async fn handle_request(
    req: Request<Incoming>,
    service: Arc<PresignService>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    info!("Handling {} {}", method, path);

    let response = match (&method, path.as_str()) {
        (&Method::GET, "/health") => text_response(StatusCode::OK, "ok"),
        (&Method::GET, "/metrics") => {
            let mut response = Response::new(Full::new(Bytes::from(crate::metrics::render())));
            response.headers_mut().insert(
                hyper::header::CONTENT_TYPE,
                hyper::header::HeaderValue::from_static("text/plain; version=0.0.4"),
            );
            response
        }
        (&Method::POST, "/presign") => {
            match Limited::new(req.into_body(), MAX_BODY_BYTES).collect().await {
                Ok(collected) => {
                    let reply = service.handle_body(&collected.to_bytes()).await;
                    json_response(reply.status, &reply.body)
                }
                Err(e) => {
                    error!("Failed to read presign body: {}", e);
                    json_response(
                        StatusCode::PAYLOAD_TOO_LARGE.as_u16(),
                        &serde_json::json!({ "error": "request body too large" }),
                    )
                }
            }
        }
        (_, "/presign") => text_response(StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed"),
        _ => text_response(StatusCode::NOT_FOUND, "Not Found"),
    };

    Ok(response)
}
