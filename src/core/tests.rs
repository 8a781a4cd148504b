// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

#[cfg(test)]
mod tests {
    use crate::core::{
        ForwardError, ForwardMode, ForwardState, Headers, InboundRequest, OutboundRequest, Scheme,
        Target,
    };
    use http_body_util::BodyExt;
    use reqwest::Method;

    #[test]
    fn test_parse_plain_target() {
        let target = Target::parse("http://foo.bar").unwrap();
        assert_eq!(target.scheme(), Scheme::Http);
        assert_eq!(target.host(), "foo.bar");
        assert_eq!(target.port(), None);
        assert_eq!(target.effective_port(), 80);
        assert_eq!(target.host_header(), "foo.bar");
    }

    #[test]
    fn test_parse_encrypted_target_with_port() {
        let target: Target = "https://foo.bar:8081".parse().unwrap();
        assert_eq!(target.scheme(), Scheme::Https);
        assert_eq!(target.port(), Some(8081));
        assert_eq!(target.effective_port(), 8081);
        assert_eq!(target.to_string(), "https://foo.bar:8081");
    }

    #[test]
    fn test_parse_keeps_explicit_default_port() {
        let target = Target::parse("http://foo.bar:80").unwrap();
        assert_eq!(target.port(), Some(80));
        assert_eq!(target.effective_port(), 80);
        assert_eq!(target.to_string(), "http://foo.bar:80");

        let target = Target::parse("https://foo.bar:443/v2/").unwrap();
        assert_eq!(target.port(), Some(443));
        assert_eq!(target.host_header(), "foo.bar");

        assert_eq!(Target::parse("http://[::1]:80").unwrap().port(), Some(80));
        assert_eq!(Target::parse("http://[::1]").unwrap().port(), None);
        assert_eq!(Target::parse("http://user:pw@foo.bar").unwrap().port(), None);
        assert_eq!(Target::parse("https://foo.bar/a:1").unwrap().port(), None);
    }

    #[test]
    fn test_parse_ignores_path() {
        let target = Target::parse("https://foo.bar/some/path?x=1").unwrap();
        assert_eq!(target.to_string(), "https://foo.bar");
    }

    #[test]
    fn test_unsupported_scheme_is_rejected() {
        match Target::parse("ftp://foo.bar") {
            Err(ForwardError::InvalidTarget(msg)) => assert!(msg.contains("ftp")),
            other => panic!("Expected InvalidTarget, got {other:?}"),
        }
    }

    #[test]
    fn test_missing_scheme_is_rejected() {
        assert!(matches!(
            Target::parse("foo.bar"),
            Err(ForwardError::InvalidTarget(_))
        ));
        assert!(matches!(
            Target::new(Scheme::Http, "", None),
            Err(ForwardError::InvalidTarget(_))
        ));
    }

    #[test]
    fn test_scheme_names() {
        assert_eq!(Scheme::from_name("HTTPS"), Some(Scheme::Https));
        assert_eq!(Scheme::from_name("ws"), None);
        assert_eq!(Scheme::Https.default_port(), 443);
        assert!(Scheme::Https.is_encrypted());
        assert!(!Scheme::Http.is_encrypted());
    }

    #[test]
    fn test_outbound_url() {
        let mut request = OutboundRequest {
            scheme: Scheme::Https,
            hostname: "foo.bar".to_string(),
            port: Some(8081),
            method: Method::GET,
            path: "/v2/_catalog?n=10".to_string(),
            headers: Headers::new(),
            body: None,
        };
        assert_eq!(request.url(), "https://foo.bar:8081/v2/_catalog?n=10");

        request.port = None;
        request.path = "test".to_string();
        assert_eq!(request.url(), "https://foo.bar/test");
    }

    #[tokio::test]
    async fn test_take_body_once() {
        let mut request = InboundRequest::new(
            Method::POST,
            "/upload",
            Headers::new(),
            reqwest::Body::from("payload"),
        )
        .with_client_ip("10.0.0.1");

        let first = request.take_body().collect().await.unwrap().to_bytes();
        let second = request.take_body().collect().await.unwrap().to_bytes();

        assert_eq!(&first[..], b"payload");
        assert!(second.is_empty());
        assert_eq!(request.client_ip.as_deref(), Some("10.0.0.1"));
    }

    #[test]
    fn test_forward_mode_serde() {
        let mode: ForwardMode = serde_json::from_value(serde_json::json!("buffered")).unwrap();
        assert_eq!(mode, ForwardMode::Buffered);
        assert_eq!(ForwardMode::default(), ForwardMode::Streaming);
    }

    #[test]
    fn test_terminal_states() {
        assert!(ForwardState::Done.is_terminal());
        assert!(ForwardState::Failed.is_terminal());
        assert!(!ForwardState::Relaying.is_terminal());
        assert_eq!(ForwardState::AwaitingResponse.to_string(), "awaiting-response");
    }
}
