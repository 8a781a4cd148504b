// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Engine against a real upstream over the network.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use bytes::Bytes;
use proxifact::{
    CollectingSink, ForwardMode, ForwardState, Headers, InboundRequest, ProxyEngine,
};
use reqwest::header::HeaderValue;
use reqwest::{Method, StatusCode};
use wiremock::matchers::{body_string, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn request(method: Method, path: &str, headers: &[(&str, &str)], body: &'static str) -> InboundRequest {
    let headers: Headers = headers.iter().copied().collect();
    InboundRequest::new(method, path, headers, reqwest::Body::from(body))
}

#[tokio::test]
async fn test_streaming_get_rewrites_host() {
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v2/library/alpine/tags/list"))
        .and(query_param("n", "10"))
        .and(header("host", "127.0.0.1"))
        .and(header("accept", "application/json"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("docker-distribution-api-version", "registry/2.0")
                .set_body_string(r#"{"tags":["3.19"]}"#),
        )
        .expect(1)
        .mount(&upstream)
        .await;

    let engine = ProxyEngine::from_url(&upstream.uri(), true).unwrap();
    let mut inbound = request(
        Method::GET,
        "/v2/library/alpine/tags/list?n=10",
        &[("Host", "adapter.example"), ("Accept", "application/json")],
        "",
    );
    let mut sink = CollectingSink::new();

    let state = engine.forward(&mut inbound, &mut sink, ForwardMode::Streaming).await;

    assert_eq!(state, ForwardState::Done);
    assert_eq!(sink.response_status(), StatusCode::OK);
    assert_eq!(
        sink.response_headers().get_str("Docker-Distribution-API-Version"),
        Some("registry/2.0")
    );
    assert_eq!(sink.body(), br#"{"tags":["3.19"]}"#);
    assert!(sink.is_finished());
}

#[tokio::test]
async fn test_host_kept_without_rewrite() {
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .and(header("host", "adapter.example"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&upstream)
        .await;

    let engine = ProxyEngine::from_url(&upstream.uri(), false).unwrap();
    let mut inbound = request(Method::GET, "/", &[("Host", "adapter.example")], "");
    let mut sink = CollectingSink::new();

    engine.forward(&mut inbound, &mut sink, ForwardMode::Streaming).await;

    assert_eq!(sink.response_status(), StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn test_streaming_post_body_and_status_passthrough() {
    let upstream = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/v2/app/blobs/uploads/1"))
        .and(body_string("layer-bytes"))
        .respond_with(ResponseTemplate::new(201).insert_header("location", "/v2/app/blobs/sha256:1"))
        .expect(1)
        .mount(&upstream)
        .await;

    let engine = ProxyEngine::from_url(&upstream.uri(), true).unwrap();
    let mut inbound = request(Method::PUT, "/v2/app/blobs/uploads/1", &[], "layer-bytes");
    let mut sink = CollectingSink::new();

    engine.forward(&mut inbound, &mut sink, ForwardMode::Streaming).await;

    assert_eq!(sink.response_status(), StatusCode::CREATED);
    assert_eq!(
        sink.response_headers().get_str("location"),
        Some("/v2/app/blobs/sha256:1")
    );
}

#[tokio::test]
async fn test_redirects_are_relayed() {
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(307).insert_header("location", "https://cdn.example/blob"))
        .mount(&upstream)
        .await;

    let engine = ProxyEngine::from_url(&upstream.uri(), true).unwrap();
    let mut inbound = request(Method::GET, "/v2/app/blobs/sha256:1", &[], "");
    let mut sink = CollectingSink::new();

    engine.forward(&mut inbound, &mut sink, ForwardMode::Streaming).await;

    assert_eq!(sink.response_status(), StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(
        sink.response_headers().get_str("location"),
        Some("https://cdn.example/blob")
    );
}

#[tokio::test]
async fn test_buffered_listeners_rewrite_both_bodies() {
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/publish"))
        .and(body_string("payload+signed"))
        .and(header("content-length", "14"))
        .respond_with(ResponseTemplate::new(200).set_body_string("hello"))
        .expect(1)
        .mount(&upstream)
        .await;

    let mut engine = ProxyEngine::from_url(&upstream.uri(), true).unwrap();
    engine
        .on_request(|outbound, _, _| {
            if let Some(body) = &outbound.body {
                let mut signed = body.to_vec();
                signed.extend_from_slice(b"+signed");
                outbound.body = Some(Bytes::from(signed));
            }
        })
        .on_response(|response, _, _| {
            response.body = Some(Bytes::from_static(b"hello world"));
            response
                .headers
                .insert("x-rewritten", HeaderValue::from_static("yes"));
        });

    let mut inbound = request(
        Method::POST,
        "/api/publish",
        &[("Content-Length", "7")],
        "payload",
    );
    let mut sink = CollectingSink::new();

    let state = engine.forward(&mut inbound, &mut sink, ForwardMode::Buffered).await;

    assert_eq!(state, ForwardState::Done);
    assert_eq!(sink.response_status(), StatusCode::OK);
    assert_eq!(sink.body(), b"hello world");
    assert_eq!(sink.response_headers().get_str("content-length"), Some("11"));
    assert_eq!(sink.response_headers().get_str("x-rewritten"), Some("yes"));
    assert_eq!(sink.commit_count(), 1);
}

#[tokio::test]
async fn test_connection_refused_notifies_once() {
    let failures = Arc::new(AtomicUsize::new(0));
    let response_failures = Arc::new(AtomicUsize::new(0));

    let mut engine = ProxyEngine::from_url("http://127.0.0.1:1", true).unwrap();
    let counter = failures.clone();
    let response_counter = response_failures.clone();
    engine
        .on_request_error(move |_, _, sink| {
            counter.fetch_add(1, Ordering::SeqCst);
            sink.status(StatusCode::BAD_GATEWAY);
            let _ = sink.send(Bytes::from_static(b"upstream down"));
        })
        .on_response_error(move |_, _, _| {
            response_counter.fetch_add(1, Ordering::SeqCst);
        });

    for mode in [ForwardMode::Streaming, ForwardMode::Buffered] {
        let mut inbound = request(Method::GET, "/v2/", &[], "");
        let mut sink = CollectingSink::new();

        let state = engine.forward(&mut inbound, &mut sink, mode).await;

        assert_eq!(state, ForwardState::Failed);
        assert_eq!(sink.response_status(), StatusCode::BAD_GATEWAY);
        assert_eq!(sink.body(), b"upstream down");
    }

    assert_eq!(failures.load(Ordering::SeqCst), 2);
    assert_eq!(response_failures.load(Ordering::SeqCst), 0);
}
