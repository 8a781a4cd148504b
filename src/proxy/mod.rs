// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The forwarding engine.
//!
//! A [`ProxyEngine`] owns one [`Target`] and forwards every request it is
//! given to that origin.  Four lifecycle points accept listeners:
//!
//! | point | fires | listeners may |
//! |-------|-------|---------------|
//! | request-ready  | before the outbound request is sent   | mutate the [`OutboundRequest`] |
//! | request-error  | when building or sending failed        | answer the caller via the sink |
//! | response-ready | before the response is relayed         | mutate the [`InboundResponse`] |
//! | response-error | when reading or relaying the response failed | answer the caller via the sink |
//!
//! Listeners of one point run synchronously in registration order.  Each
//! call gets its own descriptors, so concurrent calls never share state.
//!
//! ```rust,no_run
//! use bytes::Bytes;
//! use proxifact::{CollectingSink, ForwardMode, Headers, InboundRequest, ProxyEngine};
//! use reqwest::header::HeaderValue;
//! use reqwest::Method;
//!
//! # async fn run() -> Result<(), proxifact::ForwardError> {
//! let mut engine = ProxyEngine::from_url("https://registry.internal:5000", true)?;
//! engine.on_request(|outbound, _request, _sink| {
//!     outbound.headers.insert("x-forwarded-by", HeaderValue::from_static("proxifact"));
//! });
//!
//! let mut request = InboundRequest::new(Method::GET, "/v2/", Headers::new(), Bytes::new().into());
//! let mut sink = CollectingSink::new();
//! engine.forward(&mut request, &mut sink, ForwardMode::Streaming).await;
//! # Ok(())
//! # }
//! ```

mod strategy;

use std::fmt;
use std::time::Instant;

use uuid::Uuid;

use crate::core::{
    ForwardError, ForwardMode, ForwardState, InboundRequest, InboundResponse, OutboundRequest,
    ResponseSink, Target, TransportOptions, Transports,
};
use crate::{debug_fmt, trace_fmt, warn_fmt};

const HOST: &str = "host";

/// Listener for the request-ready point.
pub type RequestListener =
    Box<dyn Fn(&mut OutboundRequest, &InboundRequest, &mut dyn ResponseSink) + Send + Sync>;

/// Listener for the response-ready point.
pub type ResponseListener =
    Box<dyn Fn(&mut InboundResponse, &InboundRequest, &mut dyn ResponseSink) + Send + Sync>;

/// Listener for the request-error and response-error points.
pub type ErrorListener =
    Box<dyn Fn(&ForwardError, &InboundRequest, &mut dyn ResponseSink) + Send + Sync>;

#[derive(Default)]
struct Listeners {
    request: Vec<RequestListener>,
    request_error: Vec<ErrorListener>,
    response: Vec<ResponseListener>,
    response_error: Vec<ErrorListener>,
}

/// Forwards inbound requests to a fixed target origin.
pub struct ProxyEngine {
    target: Target,
    rewrite_host: bool,
    transports: Transports,
    listeners: Listeners,
}

impl fmt::Debug for ProxyEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyEngine")
            .field("target", &self.target)
            .field("rewrite_host", &self.rewrite_host)
            .field("transports", &self.transports)
            .field("request_listeners", &self.listeners.request.len())
            .field("request_error_listeners", &self.listeners.request_error.len())
            .field("response_listeners", &self.listeners.response.len())
            .field("response_error_listeners", &self.listeners.response_error.len())
            .finish()
    }
}

impl ProxyEngine {
    /// Create an engine for `target` with host rewriting enabled and the
    /// default transports.
    pub fn new(target: Target) -> Result<Self, ForwardError> {
        let transports = Transports::from_options(&TransportOptions::default())?;
        Ok(Self::with_parts(target, transports))
    }

    /// Create an engine for `target` that reaches it through `transports`,
    /// with host rewriting enabled.
    pub fn with_parts(target: Target, transports: Transports) -> Self {
        Self {
            target,
            rewrite_host: true,
            transports,
            listeners: Listeners::default(),
        }
    }

    /// Create an engine from a target URL.
    pub fn from_url(url: &str, rewrite_host: bool) -> Result<Self, ForwardError> {
        Ok(Self::new(Target::parse(url)?)?.with_rewrite_host(rewrite_host))
    }

    /// Whether the outbound `host` header is forced to the target host.
    pub fn with_rewrite_host(mut self, rewrite_host: bool) -> Self {
        self.rewrite_host = rewrite_host;
        self
    }

    /// Replace the transports used to reach the target.
    pub fn with_transports(mut self, transports: Transports) -> Self {
        self.transports = transports;
        self
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    pub fn rewrites_host(&self) -> bool {
        self.rewrite_host
    }

    /// Register a request-ready listener.
    pub fn on_request<F>(&mut self, listener: F) -> &mut Self
    where
        F: Fn(&mut OutboundRequest, &InboundRequest, &mut dyn ResponseSink) + Send + Sync + 'static,
    {
        self.listeners.request.push(Box::new(listener));
        self
    }

    /// Register a request-error listener.
    pub fn on_request_error<F>(&mut self, listener: F) -> &mut Self
    where
        F: Fn(&ForwardError, &InboundRequest, &mut dyn ResponseSink) + Send + Sync + 'static,
    {
        self.listeners.request_error.push(Box::new(listener));
        self
    }

    /// Register a response-ready listener.
    pub fn on_response<F>(&mut self, listener: F) -> &mut Self
    where
        F: Fn(&mut InboundResponse, &InboundRequest, &mut dyn ResponseSink) + Send + Sync + 'static,
    {
        self.listeners.response.push(Box::new(listener));
        self
    }

    /// Register a response-error listener.
    pub fn on_response_error<F>(&mut self, listener: F) -> &mut Self
    where
        F: Fn(&ForwardError, &InboundRequest, &mut dyn ResponseSink) + Send + Sync + 'static,
    {
        self.listeners.response_error.push(Box::new(listener));
        self
    }

    /// Build the outbound descriptor for `request`, without a body.
    pub fn build_outbound(&self, request: &InboundRequest) -> OutboundRequest {
        let mut headers = request.headers.clone();
        if self.rewrite_host {
            headers.insert(HOST, self.target.host_header().clone());
        }

        OutboundRequest {
            scheme: self.target.scheme(),
            hostname: self.target.host().to_string(),
            port: self.target.port(),
            method: request.method.clone(),
            path: request.path.clone(),
            headers,
            body: None,
        }
    }

    /// Forward `request` to the target and relay the answer into `sink`.
    ///
    /// Never returns an error: failures are reported to the request-error or
    /// response-error listeners, exactly once per call, and the call ends in
    /// [`ForwardState::Failed`].  The engine does not write to the sink after
    /// a failure; error listeners are expected to answer the caller.
    pub async fn forward(
        &self,
        request: &mut InboundRequest,
        sink: &mut dyn ResponseSink,
        mode: ForwardMode,
    ) -> ForwardState {
        let started = Instant::now();
        let strategy = strategy::for_mode(mode);
        let mut cycle = Cycle::new(request.id);

        debug_fmt!(
            "ProxyEngine",
            "[{}] Forwarding {} {} to {} ({:?})",
            request.id,
            request.method,
            request.path,
            self.target,
            mode
        );

        /* ---------- build outbound req ---------- */
        cycle.enter(ForwardState::BuildingRequest);
        let mut outbound = self.build_outbound(request);
        let pending = match strategy.read_request(&mut outbound, request.take_body()).await {
            Ok(pending) => pending,
            Err(e) => return self.fail_request(&mut cycle, e, request, sink),
        };

        for listener in &self.listeners.request {
            listener(&mut outbound, request, &mut *sink);
        }
        cycle.enter(ForwardState::NotifiedRequest);

        /* ---------- send ---------- */
        let body = strategy.request_body(&mut outbound, pending);
        cycle.enter(ForwardState::Sending);

        let transport = self.transports.select(outbound.scheme);
        trace_fmt!(
            "ProxyEngine",
            "[{}] Using {} transport for {}",
            request.id,
            transport.name(),
            outbound.url()
        );

        let upstream_start = Instant::now();
        let upstream = match transport.send(&outbound, body).await {
            Ok(upstream) => upstream,
            Err(e) => return self.fail_request(&mut cycle, e, request, sink),
        };
        let upstream_elapsed = upstream_start.elapsed();
        drop(outbound);

        /* ---------- response ---------- */
        cycle.enter(ForwardState::AwaitingResponse);
        let (mut response, pending) = match strategy.read_response(upstream).await {
            Ok(read) => read,
            Err(e) => return self.fail_response(&mut cycle, e, request, sink),
        };

        for listener in &self.listeners.response {
            listener(&mut response, request, &mut *sink);
        }
        cycle.enter(ForwardState::NotifiedResponse);

        /* ---------- relay ---------- */
        let status = response.status;
        cycle.enter(ForwardState::Relaying);
        if let Err(e) = strategy.relay(response, pending, sink).await {
            return self.fail_response(&mut cycle, e, request, sink);
        }
        cycle.enter(ForwardState::Done);

        debug_fmt!(
            "ProxyEngine",
            "[{}] {} {} -> {} | total={:?} upstream={:?}",
            request.id,
            request.method,
            request.path,
            status.as_u16(),
            started.elapsed(),
            upstream_elapsed
        );

        cycle.state
    }

    fn fail_request(
        &self,
        cycle: &mut Cycle,
        error: ForwardError,
        request: &InboundRequest,
        sink: &mut dyn ResponseSink,
    ) -> ForwardState {
        warn_fmt!(
            "ProxyEngine",
            "[{}] Request {} {} to {} failed while {}: {}",
            request.id,
            request.method,
            request.path,
            self.target,
            cycle.state,
            error
        );
        for listener in &self.listeners.request_error {
            listener(&error, request, &mut *sink);
        }
        cycle.enter(ForwardState::Failed);
        cycle.state
    }

    fn fail_response(
        &self,
        cycle: &mut Cycle,
        error: ForwardError,
        request: &InboundRequest,
        sink: &mut dyn ResponseSink,
    ) -> ForwardState {
        warn_fmt!(
            "ProxyEngine",
            "[{}] Response for {} {} failed while {}: {}",
            request.id,
            request.method,
            request.path,
            cycle.state,
            error
        );
        for listener in &self.listeners.response_error {
            listener(&error, request, &mut *sink);
        }
        cycle.enter(ForwardState::Failed);
        cycle.state
    }
}

/// State of one forward call.
struct Cycle {
    id: Uuid,
    state: ForwardState,
}

impl Cycle {
    fn new(id: Uuid) -> Self {
        Self {
            id,
            state: ForwardState::Idle,
        }
    }

    fn enter(&mut self, next: ForwardState) {
        trace_fmt!("ProxyEngine", "[{}] {} -> {}", self.id, self.state, next);
        self.state = next;
    }
}
