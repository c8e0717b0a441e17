//! HTTP server implementation.

use crate::error::ServerError;
use crate::handler::{Reply, RequestHandler};
use crate::metrics::Metrics;
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::{Bytes, Incoming};
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response};
use hyper_util::rt::TokioIo;
use lotkeeper_core::ParkingEngine;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::task::JoinSet;

/// Server configuration.
#[derive(Clone)]
pub struct ServerConfig {
    /// Address to bind to.
    pub bind_addr: SocketAddr,
    /// Largest accepted request body.
    pub max_body_bytes: usize,
    /// Metrics instance (if metrics are enabled).
    pub metrics: Option<Arc<Metrics>>,
}

impl std::fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerConfig")
            .field("bind_addr", &self.bind_addr)
            .field("max_body_bytes", &self.max_body_bytes)
            .field("metrics_enabled", &self.metrics.is_some())
            .finish()
    }
}

impl ServerConfig {
    pub fn new(bind_addr: SocketAddr) -> Self {
        Self {
            bind_addr,
            max_body_bytes: 64 * 1024,
            metrics: None,
        }
    }

    pub fn with_max_body_bytes(mut self, limit: usize) -> Self {
        self.max_body_bytes = limit;
        self
    }

    /// Sets the metrics instance.
    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }
}

/// Server statistics.
#[derive(Debug, Default)]
pub struct ServerStats {
    pub connections_total: AtomicU64,
    pub connections_active: AtomicU64,
}

/// HTTP server for lotkeeper.
pub struct Server {
    config: ServerConfig,
    handler: Arc<RequestHandler>,
    stats: Arc<ServerStats>,
    shutdown: broadcast::Sender<()>,
    running: AtomicBool,
}

impl Server {
    /// Creates a new server.
    pub fn new(config: ServerConfig, engine: Arc<ParkingEngine>) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        let mut handler = RequestHandler::new(engine);
        if let Some(ref metrics) = config.metrics {
            handler = handler.with_metrics(metrics.clone());
        }
        Self {
            config,
            handler: Arc::new(handler),
            stats: Arc::new(ServerStats::default()),
            shutdown: shutdown_tx,
            running: AtomicBool::new(false),
        }
    }

    /// Binds the configured address and serves until shutdown.
    pub async fn run(&self) -> Result<(), ServerError> {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        self.serve(listener).await
    }

    /// Serves connections from `listener` until shutdown.
    ///
    /// After shutdown is signalled no new connections are accepted; open
    /// connections finish their current request before this returns.
    pub async fn serve(&self, listener: TcpListener) -> Result<(), ServerError> {
        let local_addr = listener.local_addr()?;
        self.running.store(true, Ordering::SeqCst);
        tracing::info!("Server listening on http://{}", local_addr);

        let mut shutdown_rx = self.shutdown.subscribe();
        let mut connections = JoinSet::new();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((tcp_stream, addr)) => {
                            self.stats.connections_total.fetch_add(1, Ordering::Relaxed);
                            self.stats.connections_active.fetch_add(1, Ordering::Relaxed);

                            let handler = self.handler.clone();
                            let stats = self.stats.clone();
                            let max_body = self.config.max_body_bytes;
                            let conn_shutdown = self.shutdown.subscribe();

                            connections.spawn(async move {
                                tracing::debug!("[{}] Connection accepted", addr);
                                Self::handle_connection(tcp_stream, handler, max_body, conn_shutdown).await;
                                stats.connections_active.fetch_sub(1, Ordering::Relaxed);
                                tracing::debug!("[{}] Connection closed", addr);
                            });
                        }
                        Err(e) => {
                            tracing::error!("Accept error: {}", e);
                        }
                    }
                }
                Some(_) = connections.join_next(), if !connections.is_empty() => {}
                _ = shutdown_rx.recv() => {
                    tracing::info!("Server shutting down");
                    break;
                }
            }
        }

        while connections.join_next().await.is_some() {}
        self.running.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn handle_connection(
        stream: tokio::net::TcpStream,
        handler: Arc<RequestHandler>,
        max_body: usize,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        let io = TokioIo::new(stream);
        let service = service_fn(move |req| {
            let handler = handler.clone();
            async move { Ok::<_, Infallible>(Self::respond(req, &handler, max_body).await) }
        });

        let conn = http1::Builder::new().serve_connection(io, service);
        tokio::pin!(conn);

        tokio::select! {
            result = conn.as_mut() => {
                if let Err(e) = result {
                    tracing::debug!("Connection error: {}", e);
                }
            }
            _ = shutdown.recv() => {
                conn.as_mut().graceful_shutdown();
                if let Err(e) = conn.await {
                    tracing::debug!("Connection error during shutdown: {}", e);
                }
            }
        }
    }

    async fn respond(
        req: Request<Incoming>,
        handler: &RequestHandler,
        max_body: usize,
    ) -> Response<Full<Bytes>> {
        let (parts, body) = req.into_parts();

        let reply = match Limited::new(body, max_body).collect().await {
            Ok(collected) => handler.handle(
                &parts.method,
                parts.uri.path(),
                parts.uri.query(),
                &collected.to_bytes(),
            ),
            Err(e) => {
                let err = if e.downcast_ref::<LengthLimitError>().is_some() {
                    ServerError::BodyTooLarge { limit: max_body }
                } else {
                    ServerError::InvalidRequest(format!("failed to read body: {}", e))
                };
                tracing::warn!("{} {} rejected: {}", parts.method, parts.uri.path(), err);
                Reply::error(&err)
            }
        };

        let mut response = Response::new(Full::new(Bytes::from(reply.body)));
        *response.status_mut() = reply.status;
        response
            .headers_mut()
            .insert(CONTENT_TYPE, HeaderValue::from_static(reply.content_type));
        response
    }

    /// Signals the server to shut down.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(());
    }

    /// Returns a receiver notified on shutdown, for companion tasks.
    pub fn subscribe_shutdown(&self) -> broadcast::Receiver<()> {
        self.shutdown.subscribe()
    }

    /// Returns whether the server is running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Returns server statistics.
    pub fn stats(&self) -> &ServerStats {
        &self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lotkeeper_storage::{JournalStore, StorageConfig};
    use tempfile::TempDir;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    async fn start(engine: Arc<ParkingEngine>, max_body: usize) -> (Arc<Server>, SocketAddr) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let config = ServerConfig::new(addr).with_max_body_bytes(max_body);
        let server = Arc::new(Server::new(config, engine));

        let s = server.clone();
        tokio::spawn(async move { s.serve(listener).await });
        (server, addr)
    }

    /// Sends one request with `Connection: close`, returns status and body.
    async fn request(addr: SocketAddr, method: &str, target: &str, body: &str) -> (u16, String) {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        let raw = format!(
            "{} {} HTTP/1.1\r\nHost: localhost\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            method,
            target,
            body.len(),
            body
        );
        stream.write_all(raw.as_bytes()).await.unwrap();

        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();

        let status = response
            .split_whitespace()
            .nth(1)
            .and_then(|s| s.parse().ok())
            .unwrap();
        let body = response
            .split_once("\r\n\r\n")
            .map(|(_, b)| b.to_string())
            .unwrap_or_default();
        (status, body)
    }

    #[tokio::test]
    async fn test_http_round_trip() {
        let (server, addr) = start(Arc::new(ParkingEngine::in_memory()), 64 * 1024).await;

        let (status, body) = request(addr, "POST", "/createParkingLot", r#"{"totalSpaces": 3}"#).await;
        assert_eq!(status, 200);
        assert!(body.contains(r#""totalSpaces":3"#));

        let park = r#"{"parkingLotID": 1, "licensePlate": "MH-12"}"#;
        let (status, body) = request(addr, "POST", "/parkVehicle", park).await;
        assert_eq!(status, 200);
        assert_eq!(body, r#"{"slotNumber":1}"#);

        let (status, body) = request(addr, "GET", "/viewParkingLotStatus?parkingLotID=1", "").await;
        assert_eq!(status, 200);
        assert!(body.contains("MH-12"));

        let (status, body) = request(addr, "POST", "/unparkVehicle", park).await;
        assert_eq!(status, 200);
        assert_eq!(body, r#"{"fee":10}"#);

        let (status, _) = request(addr, "GET", "/parkVehicle", "").await;
        assert_eq!(status, 405);

        assert!(server.is_running());
        server.shutdown();
    }

    #[tokio::test]
    async fn test_oversized_body_rejected() {
        let (server, addr) = start(Arc::new(ParkingEngine::in_memory()), 32).await;

        let body = format!(r#"{{"totalSpaces": 1, "padding": "{}"}}"#, "x".repeat(64));
        let (status, body) = request(addr, "POST", "/createParkingLot", &body).await;
        assert_eq!(status, 413);
        assert!(body.contains("BODY_TOO_LARGE"));

        server.shutdown();
    }

    #[tokio::test]
    async fn test_journal_backed_server() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(JournalStore::open(StorageConfig::new(dir.path())).unwrap());
        let engine = Arc::new(ParkingEngine::with_store(store.clone()));
        let (server, addr) = start(engine, 64 * 1024).await;

        let (status, _) = request(addr, "POST", "/createParkingLot", r#"{"totalSpaces": 1}"#).await;
        assert_eq!(status, 200);
        let (status, _) = request(
            addr,
            "POST",
            "/parkVehicle",
            r#"{"parkingLotID": 1, "licensePlate": "A"}"#,
        )
        .await;
        assert_eq!(status, 200);
        assert_eq!(store.stats().writes, 2);

        server.shutdown();
    }

    #[tokio::test]
    async fn test_shutdown_stops_serving() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = Arc::new(Server::new(
            ServerConfig::new(addr),
            Arc::new(ParkingEngine::in_memory()),
        ));

        let s = server.clone();
        let handle = tokio::spawn(async move { s.serve(listener).await });

        let (status, _) = request(addr, "GET", "/health", "").await;
        assert_eq!(status, 200);

        server.shutdown();
        handle.await.unwrap().unwrap();
        assert!(!server.is_running());
        assert_eq!(server.stats().connections_active.load(Ordering::Relaxed), 0);
    }
}
