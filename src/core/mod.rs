// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Core primitives – target origin, descriptors, headers, sinks & transports.
//!
//! Everything that physically moves through a forward cycle is defined
//! in this module.  The forward cycle itself lives in `proxy`, the HTTP
//! listener that feeds it in `server`.

#[cfg(test)]
mod tests;
pub mod headers;
pub mod sink;
pub mod transport;

use std::fmt;
use std::str::FromStr;

use bytes::Bytes;
use reqwest::header::HeaderValue;
use reqwest::{Method, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::security::User;

pub use headers::Headers;
pub use sink::{CollectingSink, ResponseSink};
pub use transport::{HttpTransport, Transport, TransportOptions, Transports, UpstreamResponse};

/// Errors that can occur while forwarding a request.
#[derive(Error, Debug)]
pub enum ForwardError {
    /// The target origin cannot be used
    #[error("invalid target: {0}")]
    InvalidTarget(String),

    /// A header name or value cannot be put on the wire
    #[error("invalid header: {0}")]
    InvalidHeader(String),

    /// HTTP client error
    #[error("HTTP client error: {0}")]
    ClientError(#[from] reqwest::Error),

    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// The response could not be written to the caller
    #[error("relay error: {0}")]
    RelayError(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

/// Transport scheme of the target origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scheme {
    /// Plain HTTP
    Http,
    /// HTTP over TLS
    Https,
}

impl Scheme {
    /// Parse a URL scheme name, `None` for anything unsupported.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "http" => Some(Scheme::Http),
            "https" => Some(Scheme::Https),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Scheme::Http => "http",
            Scheme::Https => "https",
        }
    }

    pub fn default_port(&self) -> u16 {
        match self {
            Scheme::Http => 80,
            Scheme::Https => 443,
        }
    }

    pub fn is_encrypted(&self) -> bool {
        matches!(self, Scheme::Https)
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The fixed upstream origin every request is forwarded to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    scheme: Scheme,
    host: String,
    port: Option<u16>,
    host_header: HeaderValue,
}

impl Target {
    /// Create a target from its parts.
    pub fn new(scheme: Scheme, host: &str, port: Option<u16>) -> Result<Self, ForwardError> {
        if host.is_empty() {
            return Err(ForwardError::InvalidTarget("missing host".to_string()));
        }
        let host_header = HeaderValue::from_str(host)
            .map_err(|e| ForwardError::InvalidTarget(format!("invalid host '{host}': {e}")))?;

        Ok(Self {
            scheme,
            host: host.to_string(),
            port,
            host_header,
        })
    }

    /// Parse a target from an absolute URL such as `https://registry.local:8081`.
    ///
    /// Only the scheme, host and port are kept.
    pub fn parse(url: &str) -> Result<Self, ForwardError> {
        let parsed = reqwest::Url::parse(url)
            .map_err(|e| ForwardError::InvalidTarget(format!("'{url}': {e}")))?;

        let scheme = Scheme::from_name(parsed.scheme()).ok_or_else(|| {
            ForwardError::InvalidTarget(format!("unsupported scheme '{}'", parsed.scheme()))
        })?;

        let host = parsed
            .host_str()
            .ok_or_else(|| ForwardError::InvalidTarget(format!("'{url}' has no host")))?;

        let port = if names_port(url) {
            parsed.port_or_known_default()
        } else {
            parsed.port()
        };
        Self::new(scheme, host, port)
    }

    pub fn scheme(&self) -> Scheme {
        self.scheme
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// Port written in the target URL, `None` when it names none.
    ///
    /// An explicit default port is kept: `http://foo.bar:80` yields `Some(80)`.
    pub fn port(&self) -> Option<u16> {
        self.port
    }

    /// Port actually dialled.
    pub fn effective_port(&self) -> u16 {
        self.port.unwrap_or_else(|| self.scheme.default_port())
    }

    /// Value written to the `host` header when host rewriting is enabled.
    pub fn host_header(&self) -> &HeaderValue {
        &self.host_header
    }
}

/// Whether the authority of `url` carries a port.
fn names_port(url: &str) -> bool {
    let rest = url.split_once("://").map_or(url, |(_, rest)| rest);
    let authority = rest.split(['/', '?', '#']).next().unwrap_or_default();
    let host_port = authority.rsplit('@').next().unwrap_or_default();
    // skip past an IPv6 literal
    let after_host = host_port.rsplit(']').next().unwrap_or_default();
    after_host
        .rsplit_once(':')
        .is_some_and(|(_, port)| !port.is_empty())
}

impl FromStr for Target {
    type Err = ForwardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Target::parse(s)
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.port {
            Some(port) => write!(f, "{}://{}:{}", self.scheme, self.host, port),
            None => write!(f, "{}://{}", self.scheme, self.host),
        }
    }
}

/// How bodies travel through a forward cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ForwardMode {
    /// Relay bytes live in both directions, headers untouched.
    #[default]
    Streaming,
    /// Materialize request and response bodies before sending them on.
    ///
    /// Both bodies are held in memory for the duration of the call, so the
    /// cost grows with body size.  There is no cap.
    Buffered,
}

/// Stages of a single forward cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForwardState {
    Idle,
    BuildingRequest,
    NotifiedRequest,
    Sending,
    AwaitingResponse,
    NotifiedResponse,
    Relaying,
    Done,
    Failed,
}

impl ForwardState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ForwardState::Done | ForwardState::Failed)
    }
}

impl fmt::Display for ForwardState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ForwardState::Idle => "idle",
            ForwardState::BuildingRequest => "building-request",
            ForwardState::NotifiedRequest => "notified-request",
            ForwardState::Sending => "sending",
            ForwardState::AwaitingResponse => "awaiting-response",
            ForwardState::NotifiedResponse => "notified-response",
            ForwardState::Relaying => "relaying",
            ForwardState::Done => "done",
            ForwardState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// A request received from the caller, as handed to the engine.
#[derive(Debug)]
pub struct InboundRequest {
    /// Unique id, also used as trace id in logs
    pub id: Uuid,
    pub method: Method,
    /// Path including the query string
    pub path: String,
    pub headers: Headers,
    /// The original client's IP address
    pub client_ip: Option<String>,
    /// User resolved by the authentication callback, if any
    pub user: Option<User>,
    body: reqwest::Body,
}

impl InboundRequest {
    pub fn new(method: Method, path: impl Into<String>, headers: Headers, body: reqwest::Body) -> Self {
        Self {
            id: Uuid::new_v4(),
            method,
            path: path.into(),
            headers,
            client_ip: None,
            user: None,
            body,
        }
    }

    pub fn with_client_ip(mut self, ip: impl Into<String>) -> Self {
        self.client_ip = Some(ip.into());
        self
    }

    /// Take the body stream out of the request.  Later calls get an empty body.
    pub fn take_body(&mut self) -> reqwest::Body {
        std::mem::replace(&mut self.body, reqwest::Body::from(Bytes::new()))
    }
}

/// The request the engine is about to send to the target.
///
/// Request-ready listeners receive it mutably; whatever it holds when they
/// return is what goes on the wire.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundRequest {
    pub scheme: Scheme,
    pub hostname: String,
    /// `None` means the default port of `scheme`
    pub port: Option<u16>,
    pub method: Method,
    /// Path including the query string
    pub path: String,
    pub headers: Headers,
    /// Present in buffered mode only
    pub body: Option<Bytes>,
}

impl OutboundRequest {
    /// Absolute URL of the request.
    pub fn url(&self) -> String {
        let port = self.port.map(|p| format!(":{p}")).unwrap_or_default();
        let slash = if self.path.starts_with('/') { "" } else { "/" };
        format!("{}://{}{}{}{}", self.scheme, self.hostname, port, slash, self.path)
    }
}

/// The response received from the target, before it is relayed.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundResponse {
    pub status: StatusCode,
    pub headers: Headers,
    /// Present in buffered mode only
    pub body: Option<Bytes>,
}
