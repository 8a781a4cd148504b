// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Outbound transports.
//!
//! The engine never talks to `reqwest` directly: it picks the plain or the
//! encrypted [`Transport`] from [`Transports`] based on the target scheme.
//! Both default implementations are [`HttpTransport`]s; the encrypted one
//! refuses anything but `https`.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use super::{ForwardError, Headers, OutboundRequest, Scheme};
use crate::{debug_fmt, trace_fmt};

/// Client-side settings shared by both transports.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportOptions {
    /// Whole-exchange timeout in seconds
    #[serde(default)]
    pub timeout: Option<u64>,

    /// Connect timeout in seconds
    #[serde(default)]
    pub connect_timeout: Option<u64>,
}

/// Response head plus the still-unread body.
#[derive(Debug)]
pub struct UpstreamResponse {
    pub status: StatusCode,
    pub headers: Headers,
    pub body: reqwest::Body,
}

/// Sends an outbound request and yields the target's response head.
#[async_trait]
pub trait Transport: fmt::Debug + Send + Sync {
    /// Name shown in logs.
    fn name(&self) -> &str;

    /// Open a connection, write `request` with `body` and wait for the response head.
    async fn send(
        &self,
        request: &OutboundRequest,
        body: reqwest::Body,
    ) -> Result<UpstreamResponse, ForwardError>;
}

/// `reqwest` backed transport bound to one scheme.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    scheme: Scheme,
}

impl HttpTransport {
    /// Transport for `http` targets.
    pub fn plain(options: &TransportOptions) -> Result<Self, ForwardError> {
        Self::build(Scheme::Http, options)
    }

    /// Transport for `https` targets.
    pub fn encrypted(options: &TransportOptions) -> Result<Self, ForwardError> {
        Self::build(Scheme::Https, options)
    }

    fn build(scheme: Scheme, options: &TransportOptions) -> Result<Self, ForwardError> {
        // Redirects are relayed to the caller, never followed, and idle
        // connections are not kept around between calls.
        let mut builder = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .pool_max_idle_per_host(0)
            .https_only(scheme.is_encrypted());

        if let Some(secs) = options.timeout {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        if let Some(secs) = options.connect_timeout {
            builder = builder.connect_timeout(Duration::from_secs(secs));
        }

        let client = builder.build().map_err(ForwardError::ClientError)?;
        debug_fmt!("Transport", "Built {} transport with {:?}", scheme, options);

        Ok(Self { client, scheme })
    }

    pub fn scheme(&self) -> Scheme {
        self.scheme
    }
}

#[async_trait]
impl Transport for HttpTransport {
    fn name(&self) -> &str {
        match self.scheme {
            Scheme::Http => "plain",
            Scheme::Https => "encrypted",
        }
    }

    async fn send(
        &self,
        request: &OutboundRequest,
        body: reqwest::Body,
    ) -> Result<UpstreamResponse, ForwardError> {
        if request.scheme != self.scheme {
            return Err(ForwardError::Other(format!(
                "{} transport cannot send {} requests",
                self.name(),
                request.scheme
            )));
        }

        let url = request.url();
        let headers = request.headers.to_header_map()?;
        trace_fmt!("Transport", "{} {} with {} headers", request.method, url, headers.len());

        let response = self
            .client
            .request(request.method.clone(), &url)
            .headers(headers)
            .body(body)
            .send()
            .await?;

        let status = response.status();
        let headers = Headers::from(response.headers());
        let body = reqwest::Body::wrap_stream(response.bytes_stream());

        Ok(UpstreamResponse {
            status,
            headers,
            body,
        })
    }
}

/// One plain and one encrypted transport.
#[derive(Debug, Clone)]
pub struct Transports {
    plain: Arc<dyn Transport>,
    encrypted: Arc<dyn Transport>,
}

impl Transports {
    pub fn new(plain: Arc<dyn Transport>, encrypted: Arc<dyn Transport>) -> Self {
        Self { plain, encrypted }
    }

    /// Default `reqwest` transports.
    pub fn from_options(options: &TransportOptions) -> Result<Self, ForwardError> {
        Ok(Self::new(
            Arc::new(HttpTransport::plain(options)?),
            Arc::new(HttpTransport::encrypted(options)?),
        ))
    }

    /// Transport for `scheme`.
    pub fn select(&self, scheme: Scheme) -> &Arc<dyn Transport> {
        match scheme {
            Scheme::Http => &self.plain,
            Scheme::Https => &self.encrypted,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::Method;

    fn request(scheme: Scheme) -> OutboundRequest {
        OutboundRequest {
            scheme,
            hostname: "localhost".to_string(),
            port: Some(1),
            method: Method::GET,
            path: "/".to_string(),
            headers: Headers::new(),
            body: None,
        }
    }

    #[test]
    fn test_select_by_scheme() {
        let transports = Transports::from_options(&TransportOptions::default()).unwrap();
        assert_eq!(transports.select(Scheme::Http).name(), "plain");
        assert_eq!(transports.select(Scheme::Https).name(), "encrypted");
    }

    #[tokio::test]
    async fn test_scheme_mismatch_is_rejected() {
        let transport = HttpTransport::encrypted(&TransportOptions::default()).unwrap();
        let result = transport
            .send(&request(Scheme::Http), reqwest::Body::from(""))
            .await;

        match result {
            Err(ForwardError::Other(msg)) => assert!(msg.contains("encrypted transport")),
            other => panic!("Expected scheme mismatch error, got {other:?}"),
        }
    }

    #[test]
    fn test_options_deserialize() {
        let options: TransportOptions =
            serde_json::from_value(serde_json::json!({ "timeout": 30 })).unwrap();
        assert_eq!(options.timeout, Some(30));
        assert_eq!(options.connect_timeout, None);
    }
}
