// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Basic authentication.

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose};
use subtle::ConstantTimeEq;

use crate::security::{Authenticator, SecurityError, User};
use crate::{debug_fmt, error_fmt, trace_fmt, warn_fmt};

const BASIC: &str = "basic ";

/// Split a `Basic <base64(user:password)>` header value into its parts.
pub fn parse_basic_credentials(header: &str) -> Result<(String, String), SecurityError> {
    let scheme_ok = header
        .get(..BASIC.len())
        .is_some_and(|scheme| scheme.eq_ignore_ascii_case(BASIC));
    if !scheme_ok {
        let err = SecurityError::InvalidHeader(format!(
            "expected 'Basic', got '{}'",
            header.split_whitespace().next().unwrap_or("")
        ));
        trace_fmt!("BasicAuth", "{}", err);
        return Err(err);
    }

    let encoded = header[BASIC.len()..].trim();
    if encoded.is_empty() {
        return Err(SecurityError::InvalidHeader(
            "empty basic auth credentials".to_string(),
        ));
    }

    let decoded = general_purpose::STANDARD
        .decode(encoded)
        .map_err(|e| SecurityError::InvalidHeader(format!("failed to base64 decode: {e}")))?;
    let decoded = String::from_utf8(decoded)
        .map_err(|e| SecurityError::InvalidHeader(format!("invalid UTF-8 in credentials: {e}")))?;

    match decoded.split_once(':') {
        Some((username, password)) => Ok((username.to_string(), password.to_string())),
        None => Err(SecurityError::InvalidHeader(
            "invalid basic auth credential format".to_string(),
        )),
    }
}

/// Authenticator backed by a fixed `username:password` list.
#[derive(Debug, Clone)]
pub struct StaticCredentials {
    credentials: Vec<(String, String)>,
}

impl StaticCredentials {
    pub fn new<I, S>(entries: I) -> Result<Self, SecurityError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut credentials = Vec::new();
        for entry in entries {
            let entry = entry.as_ref();
            match entry.split_once(':') {
                Some((user, password)) if !user.is_empty() => {
                    credentials.push((user.to_string(), password.to_string()));
                }
                _ => {
                    // never log the entry itself, it may carry a password
                    let err = SecurityError::InvalidCredential(format!(
                        "entry {} is not in 'user:password' form",
                        credentials.len() + 1
                    ));
                    error_fmt!("BasicAuth", "{}", err);
                    return Err(err);
                }
            }
        }

        debug_fmt!("BasicAuth", "Loaded {} static credentials", credentials.len());
        Ok(Self { credentials })
    }

    pub fn len(&self) -> usize {
        self.credentials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.credentials.is_empty()
    }

    /// Checks every stored pair so the time taken does not depend on which
    /// one matched.
    fn matches(&self, username: &str, password: &str) -> bool {
        let mut valid = false;
        for (stored_user, stored_password) in &self.credentials {
            let user_match = stored_user.as_bytes().ct_eq(username.as_bytes());
            let password_match = stored_password.as_bytes().ct_eq(password.as_bytes());
            valid |= bool::from(user_match & password_match);
        }
        valid
    }
}

#[async_trait]
impl Authenticator for StaticCredentials {
    async fn authenticate(
        &self,
        username: &str,
        password: &str,
    ) -> Result<Option<User>, SecurityError> {
        if self.matches(username, password) {
            debug_fmt!("BasicAuth", "Authenticated user: {}", username);
            Ok(Some(User::new(username)))
        } else {
            warn_fmt!("BasicAuth", "Rejected credentials for user: {}", username);
            Ok(None)
        }
    }
}
