// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

#[cfg(test)]
mod tests {
    use crate::security::{
        Authenticator, Resource, SecurityError, StaticCredentials, User, parse_basic_credentials,
    };
    use base64::{Engine as _, engine::general_purpose};

    fn basic(raw: &str) -> String {
        format!("Basic {}", general_purpose::STANDARD.encode(raw))
    }

    #[test]
    fn test_parse_basic_credentials() {
        let (user, password) = parse_basic_credentials(&basic("foo:bar")).unwrap();
        assert_eq!(user, "foo");
        assert_eq!(password, "bar");

        // password may contain colons, scheme is case-insensitive
        let header = basic("foo:b:a:r").replace("Basic", "bASIC");
        let (user, password) = parse_basic_credentials(&header).unwrap();
        assert_eq!(user, "foo");
        assert_eq!(password, "b:a:r");
    }

    #[test]
    fn test_parse_rejects_malformed_headers() {
        let no_colon = basic("no-colon");
        for header in [
            "Bearer abc",
            "Basic ",
            "Basic !!!not-base64",
            "Bas",
            no_colon.as_str(),
        ] {
            assert!(
                matches!(parse_basic_credentials(header), Err(SecurityError::InvalidHeader(_))),
                "header {header:?} should be rejected"
            );
        }
    }

    #[tokio::test]
    async fn test_static_credentials() {
        let auth = StaticCredentials::new(["alice:secret", "bob:hunter2"]).unwrap();
        assert_eq!(auth.len(), 2);

        let user = auth.authenticate("bob", "hunter2").await.unwrap();
        assert_eq!(user, Some(User::new("bob")));

        assert_eq!(auth.authenticate("bob", "secret").await.unwrap(), None);
        assert_eq!(auth.authenticate("carol", "secret").await.unwrap(), None);
    }

    #[test]
    fn test_static_credentials_reject_bad_entries() {
        match StaticCredentials::new(["alice:secret", "nopassword"]) {
            Err(SecurityError::InvalidCredential(msg)) => {
                assert!(msg.contains("entry 2"));
                assert!(!msg.contains("nopassword"));
            }
            other => panic!("Expected InvalidCredential, got {other:?}"),
        }
        assert!(StaticCredentials::new([":secret"]).is_err());
    }

    #[test]
    fn test_user_serializes_camel_case() {
        let user = User::new("alice").with_email("alice@example.com");
        let json = serde_json::to_value(&user).unwrap();
        assert_eq!(json["emailAddress"], "alice@example.com");

        let bare = serde_json::to_value(User::new("bob")).unwrap();
        assert!(bare.get("emailAddress").is_none());
    }

    #[test]
    fn test_resource_builder() {
        let resource = Resource::new().owner("alice").id("1234");
        assert_eq!(resource.owner.as_deref(), Some("alice"));
        assert_eq!(resource.group, None);
        assert_eq!(resource.id.as_deref(), Some("1234"));
    }
}
