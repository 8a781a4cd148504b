// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Body handling for the two forward modes.
//!
//! The engine runs one cycle for both modes and asks the strategy what to do
//! with bodies at four points: when the inbound body is ready, right before
//! sending, when the response head arrives and when relaying.

use async_trait::async_trait;
use bytes::Bytes;
use http_body_util::BodyExt;

use crate::core::{
    ForwardError, ForwardMode, Headers, InboundResponse, OutboundRequest, ResponseSink,
    UpstreamResponse,
};

const CONTENT_LENGTH: &str = "content-length";
const TRANSFER_ENCODING: &str = "transfer-encoding";

#[async_trait]
pub(crate) trait RelayStrategy: Send + Sync {
    /// Called once the outbound descriptor is built.  Returns the body still
    /// to be streamed, if any.
    async fn read_request(
        &self,
        outbound: &mut OutboundRequest,
        body: reqwest::Body,
    ) -> Result<Option<reqwest::Body>, ForwardError>;

    /// Called after request-ready listeners ran; yields the body to send.
    fn request_body(
        &self,
        outbound: &mut OutboundRequest,
        pending: Option<reqwest::Body>,
    ) -> reqwest::Body;

    /// Turns the response head into a descriptor, plus the body still to be streamed.
    async fn read_response(
        &self,
        upstream: UpstreamResponse,
    ) -> Result<(InboundResponse, Option<reqwest::Body>), ForwardError>;

    /// Writes the response to the sink after response-ready listeners ran.
    async fn relay(
        &self,
        response: InboundResponse,
        pending: Option<reqwest::Body>,
        sink: &mut dyn ResponseSink,
    ) -> Result<(), ForwardError>;
}

pub(crate) fn for_mode(mode: ForwardMode) -> &'static dyn RelayStrategy {
    match mode {
        ForwardMode::Streaming => &Streaming,
        ForwardMode::Buffered => &Buffered,
    }
}

/// Bytes pass through untouched, as they arrive.
pub(crate) struct Streaming;

#[async_trait]
impl RelayStrategy for Streaming {
    async fn read_request(
        &self,
        _outbound: &mut OutboundRequest,
        body: reqwest::Body,
    ) -> Result<Option<reqwest::Body>, ForwardError> {
        Ok(Some(body))
    }

    fn request_body(
        &self,
        _outbound: &mut OutboundRequest,
        pending: Option<reqwest::Body>,
    ) -> reqwest::Body {
        pending.unwrap_or_else(|| reqwest::Body::from(Bytes::new()))
    }

    async fn read_response(
        &self,
        upstream: UpstreamResponse,
    ) -> Result<(InboundResponse, Option<reqwest::Body>), ForwardError> {
        let UpstreamResponse {
            status,
            headers,
            body,
        } = upstream;

        Ok((
            InboundResponse {
                status,
                headers,
                body: None,
            },
            Some(body),
        ))
    }

    async fn relay(
        &self,
        response: InboundResponse,
        pending: Option<reqwest::Body>,
        sink: &mut dyn ResponseSink,
    ) -> Result<(), ForwardError> {
        sink.status(response.status);
        sink.set_headers(&response.headers);

        if let Some(mut body) = pending {
            while let Some(frame) = body.frame().await {
                // trailers are dropped
                if let Ok(data) = frame?.into_data() {
                    if !data.is_empty() {
                        sink.write(data).await?;
                    }
                }
            }
        }

        sink.end().await
    }
}

/// Bodies are materialized so content-length can be recomputed.
pub(crate) struct Buffered;

#[async_trait]
impl RelayStrategy for Buffered {
    async fn read_request(
        &self,
        outbound: &mut OutboundRequest,
        body: reqwest::Body,
    ) -> Result<Option<reqwest::Body>, ForwardError> {
        outbound.body = Some(body.collect().await?.to_bytes());
        Ok(None)
    }

    fn request_body(
        &self,
        outbound: &mut OutboundRequest,
        _pending: Option<reqwest::Body>,
    ) -> reqwest::Body {
        let body = outbound.body.clone().unwrap_or_default();
        set_content_length(&mut outbound.headers, &body);
        reqwest::Body::from(body)
    }

    async fn read_response(
        &self,
        upstream: UpstreamResponse,
    ) -> Result<(InboundResponse, Option<reqwest::Body>), ForwardError> {
        let UpstreamResponse {
            status,
            headers,
            body,
        } = upstream;
        let body = body.collect().await?.to_bytes();

        Ok((
            InboundResponse {
                status,
                headers,
                body: Some(body),
            },
            None,
        ))
    }

    async fn relay(
        &self,
        mut response: InboundResponse,
        _pending: Option<reqwest::Body>,
        sink: &mut dyn ResponseSink,
    ) -> Result<(), ForwardError> {
        let body = response.body.take().unwrap_or_default();
        set_content_length(&mut response.headers, &body);

        sink.status(response.status);
        sink.set_headers(&response.headers);
        sink.send(body)
    }
}

/// Rewrite content-length for a non-empty materialized body.
///
/// A materialized body is no longer chunked, so any transfer-encoding header
/// goes with it.
fn set_content_length(headers: &mut Headers, body: &Bytes) {
    if body.is_empty() {
        return;
    }
    headers.remove(TRANSFER_ENCODING);
    headers.insert(CONTENT_LENGTH, body.len());
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    #[test]
    fn test_content_length_replaces_case_variants() {
        let mut headers = Headers::new();
        headers.append("Content-Length", HeaderValue::from_static("3"));
        headers.append("Transfer-Encoding", HeaderValue::from_static("chunked"));

        set_content_length(&mut headers, &Bytes::from_static(b"Hello World!"));

        assert_eq!(headers.len(), 1);
        assert_eq!(headers.get_str("content-length"), Some("12"));
        assert_eq!(headers.original_name("Content-Length"), Some("content-length"));
    }

    #[test]
    fn test_empty_body_leaves_headers_alone() {
        let mut headers = Headers::new();
        headers.append("Content-Length", HeaderValue::from_static("0"));

        set_content_length(&mut headers, &Bytes::new());

        assert_eq!(headers.original_name("content-length"), Some("Content-Length"));
        assert_eq!(headers.get_str("content-length"), Some("0"));
    }
}
