// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! HTTP listener that mounts the forwarding engine.
//!
//! The server is a *thin* wrapper around **hyper-util**.  It owns the
//! listening socket, turns every hyper request into an [`InboundRequest`],
//! applies the adapter's filter and authentication, and hands the exchange
//! to the [`ProxyEngine`] together with a [`HyperSink`].
//!
//! **Protocol support**
//! Uses `hyper_util::server::conn::auto::Builder`, so the same
//! connection transparently handles both HTTP/1.1 *and* HTTP/2.

mod sink;

use std::collections::HashMap;
use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use futures_util::TryStreamExt;
use http_body_util::BodyExt;
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as AutoBuilder;
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio::sync::{RwLock, oneshot};
use tokio::task::{Id, JoinSet};

use crate::adapter::Adapter;
use crate::core::{ForwardError, ForwardMode, Headers, InboundRequest};
use crate::proxy::ProxyEngine;
use crate::security::parse_basic_credentials;
use crate::{debug_fmt, error_fmt, info_fmt, trace_fmt, warn_fmt};

pub use sink::HyperSink;

/// Seconds connections get to drain after shutdown was requested.
const SHUTDOWN_TIMEOUT_SECS: u64 = 30;

/// Configuration for the HTTP listener.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Everything a connection needs to answer requests.
#[derive(Debug)]
struct Handler {
    engine: Arc<ProxyEngine>,
    adapter: Arc<Adapter>,
    mode: ForwardMode,
    /// Basic auth realm, `None` when authentication is not required
    realm: Option<String>,
}

/// HTTP server for the adapter.
#[derive(Debug, Clone)]
pub struct ProxyServer {
    config: ServerConfig,
    engine: Arc<ProxyEngine>,
    adapter: Arc<Adapter>,
    mode: ForwardMode,
    realm: Option<String>,
    /// Shutdown senders for each connection task
    shutdown_senders: Arc<RwLock<HashMap<Id, oneshot::Sender<()>>>>,
}

impl ProxyServer {
    pub fn new(config: ServerConfig, engine: Arc<ProxyEngine>, adapter: Arc<Adapter>) -> Self {
        Self {
            config,
            engine,
            adapter,
            mode: ForwardMode::default(),
            realm: None,
            shutdown_senders: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Forward mode used for every request.
    pub fn with_mode(mut self, mode: ForwardMode) -> Self {
        self.mode = mode;
        self
    }

    /// Require Basic credentials, checked through the adapter's authenticator.
    pub fn with_basic_auth(mut self, realm: impl Into<String>) -> Self {
        self.realm = Some(realm.into());
        self
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn mode(&self) -> ForwardMode {
        self.mode
    }

    pub fn requires_auth(&self) -> bool {
        self.realm.is_some()
    }

    /// Bind the configured address and serve until Ctrl-C or SIGTERM.
    pub async fn start(&self) -> Result<(), ForwardError> {
        let addr = format!("{}:{}", self.config.host, self.config.port)
            .parse::<SocketAddr>()
            .map_err(|e| ForwardError::Other(format!("Invalid server address: {e}")))?;

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ForwardError::Other(format!("Failed to bind {addr}: {e}")))?;

        self.serve(listener, shutdown_signal()?).await
    }

    /// Serve connections from `listener` until `shutdown` completes, then
    /// drain open connections gracefully.
    pub async fn serve<F>(&self, listener: TcpListener, shutdown: F) -> Result<(), ForwardError>
    where
        F: Future<Output = ()> + Send,
    {
        let addr = listener.local_addr()?;
        info_fmt!(
            "Server",
            "'{}' adapter listening on http://{} -> {}",
            self.adapter.registry_type(),
            addr,
            self.engine.target()
        );

        let handler = Arc::new(Handler {
            engine: self.engine.clone(),
            adapter: self.adapter.clone(),
            mode: self.mode,
            realm: self.realm.clone(),
        });

        tokio::pin!(shutdown);
        let shutdown_senders = self.shutdown_senders.clone();
        let mut join_set = JoinSet::new();

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info_fmt!("Server", "Shutdown requested; no longer accepting connections");
                    break;
                }
                accept = listener.accept() => {
                    match accept {
                        Ok((stream, remote_addr)) => {
                            let handler = handler.clone();
                            let client_ip = remote_addr.ip().to_string();
                            let (tx, rx) = oneshot::channel();
                            let senders = shutdown_senders.clone();

                            let handle = join_set.spawn(async move {
                                let task_id = tokio::task::id();
                                serve_connection(stream, handler, client_ip, rx).await;
                                senders.write().await.remove(&task_id);
                                trace_fmt!("Server", "Connection task {:?} completed", task_id);
                            });

                            shutdown_senders.write().await.insert(handle.id(), tx);
                        }
                        Err(e) => error_fmt!("Server", "Accept error: {}", e),
                    }
                }
            }
        }

        {
            let mut senders = shutdown_senders.write().await;
            info_fmt!("Server", "Signaling {} connection(s) to shut down", senders.len());
            for (_, sender) in senders.drain() {
                let _ = sender.send(());
            }
        }

        let drain = async {
            while let Some(res) = join_set.join_next().await {
                if let Err(e) = res {
                    if !e.is_cancelled() {
                        error_fmt!("Server", "Connection task failed: {}", e);
                    }
                }
            }
        };

        let timeout = tokio::time::Duration::from_secs(SHUTDOWN_TIMEOUT_SECS);
        if tokio::time::timeout(timeout, drain).await.is_err() {
            warn_fmt!(
                "Server",
                "Shutdown timed out after {} seconds, closing remaining connections",
                SHUTDOWN_TIMEOUT_SECS
            );
            join_set.shutdown().await;
        }

        info_fmt!("Server", "Shutdown complete");
        Ok(())
    }
}

/// Resolves on Ctrl-C, or SIGTERM on Unix.
fn shutdown_signal() -> Result<impl Future<Output = ()> + Send, ForwardError> {
    #[cfg(unix)]
    let mut term_stream = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        .map_err(|e| ForwardError::Other(format!("Cannot install SIGTERM handler: {e}")))?;

    Ok(async move {
        #[cfg(unix)]
        let sigterm = async move {
            term_stream.recv().await;
        };
        #[cfg(not(unix))]
        let sigterm = std::future::pending::<()>();

        tokio::select! {
            _ = tokio::signal::ctrl_c() => info_fmt!("Server", "Received Ctrl-C"),
            _ = sigterm => info_fmt!("Server", "Received SIGTERM"),
        }
    })
}

async fn serve_connection(
    stream: tokio::net::TcpStream,
    handler: Arc<Handler>,
    client_ip: String,
    shutdown: oneshot::Receiver<()>,
) {
    let service = service_fn(move |req: Request<Incoming>| {
        trace_fmt!("Server", "Incoming over {:?}", req.version());
        handle_request(req, handler.clone(), client_ip.clone())
    });

    let mut builder = AutoBuilder::new(TokioExecutor::new());
    builder.http1();
    builder.http2();

    let connection = builder.serve_connection(TokioIo::new(stream), service);
    let mut conn = std::pin::pin!(connection);

    tokio::select! {
        res = &mut conn => log_connection_result(res),
        _ = shutdown => {
            debug_fmt!("Server", "Connection received shutdown signal, waiting for graceful close");
            conn.as_mut().graceful_shutdown();
            log_connection_result(conn.await);
        }
    }
}

fn log_connection_result(res: Result<(), Box<dyn std::error::Error + Send + Sync>>) {
    match res {
        Ok(()) => trace_fmt!("Server", "Connection closed"),
        Err(e) => {
            let msg = e.to_string();
            if !msg.contains("connection closed") && !msg.contains("connection reset") {
                error_fmt!("Server", "Connection error: {}", e);
            }
        }
    }
}

/// Convert a hyper request into an engine request.  The body is streamed.
fn convert_hyper_request(req: Request<Incoming>, client_ip: String) -> InboundRequest {
    let (parts, body) = req.into_parts();
    let path = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| "/".to_string());
    let headers = Headers::from(&parts.headers);

    // Incoming → Stream → reqwest::Body
    let stream = body.into_data_stream().map_ok(Bytes::from);
    let body = reqwest::Body::wrap_stream(stream);

    InboundRequest::new(parts.method, path, headers, body).with_client_ip(client_ip)
}

fn plain_response(status: StatusCode, text: &'static str) -> Response<reqwest::Body> {
    let mut response = Response::new(reqwest::Body::from(text));
    *response.status_mut() = status;
    response
}

fn unauthorized(realm: &str) -> Response<reqwest::Body> {
    let mut response = plain_response(StatusCode::UNAUTHORIZED, "Unauthorized");
    let challenge = format!("Basic realm=\"{}\"", realm.replace('"', "'"));
    if let Ok(value) = hyper::header::HeaderValue::from_str(&challenge) {
        response
            .headers_mut()
            .insert(hyper::header::WWW_AUTHENTICATE, value);
    }
    response
}

/// Resolve the caller from Basic credentials.  `Err` carries the response to
/// answer with.
async fn authenticate(
    handler: &Handler,
    realm: &str,
    request: &mut InboundRequest,
) -> Result<(), Response<reqwest::Body>> {
    let Some(header) = request.headers.get_str("authorization") else {
        debug_fmt!("Server", "[{}] Missing credentials", request.id);
        return Err(unauthorized(realm));
    };

    let (username, password) = match parse_basic_credentials(header) {
        Ok(credentials) => credentials,
        Err(e) => {
            warn_fmt!("Server", "[{}] {}", request.id, e);
            return Err(unauthorized(realm));
        }
    };

    match handler.adapter.authenticate(&username, &password).await {
        Ok(Some(user)) => {
            trace_fmt!("Server", "[{}] Authenticated as {}", request.id, user.username);
            request.user = Some(user);
            Ok(())
        }
        Ok(None) => Err(unauthorized(realm)),
        Err(e) => {
            error_fmt!("Server", "[{}] Authentication callback failed: {}", request.id, e);
            Err(plain_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal Server Error",
            ))
        }
    }
}

/// Handle an incoming HTTP request.
async fn handle_request(
    req: Request<Incoming>,
    handler: Arc<Handler>,
    client_ip: String,
) -> Result<Response<reqwest::Body>, Infallible> {
    let mut request = convert_hyper_request(req, client_ip);
    debug_fmt!(
        "Server",
        "[{}] Received request: {} {}",
        request.id,
        request.method,
        request.path
    );

    if !handler.adapter.filter().matches_request(&request) {
        debug_fmt!(
            "Server",
            "[{}] {} {} does not match the '{}' filter",
            request.id,
            request.method,
            request.path,
            handler.adapter.registry_type()
        );
        return Ok(plain_response(StatusCode::NOT_FOUND, "Not Found"));
    }

    if let Some(realm) = &handler.realm {
        if let Err(response) = authenticate(&handler, realm, &mut request).await {
            return Ok(response);
        }
    }

    let (mut sink, head) = HyperSink::channel();
    let id = request.id;
    let engine = handler.engine.clone();
    let mode = handler.mode;

    // the engine outlives this future when the body is streamed
    tokio::spawn(async move {
        engine.forward(&mut request, &mut sink, mode).await;
    });

    match head.await {
        Ok(response) => Ok(response),
        Err(_) => {
            warn_fmt!("Server", "[{}] No response was produced", id);
            Ok(plain_response(StatusCode::BAD_GATEWAY, "Bad Gateway"))
        }
    }
}
