// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Security boundary – who is calling, and may they do this?
//!
//! The adapter owns no user database.  Embedders plug one in by implementing
//! [`Authenticator`] and [`Authorizer`]; [`basic::StaticCredentials`] covers
//! the simple case of a fixed credential list from configuration.

pub mod basic;

#[cfg(test)]
mod tests;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

pub use basic::{StaticCredentials, parse_basic_credentials};

/// Errors raised by authentication and authorization callbacks.
#[derive(Error, Debug)]
pub enum SecurityError {
    /// No callback of the required kind was registered
    #[error("no {0} callback configured")]
    NotConfigured(&'static str),

    /// The `authorization` header could not be understood
    #[error("invalid authorization header: {0}")]
    InvalidHeader(String),

    /// Credential list in configuration is malformed
    #[error("invalid credential entry: {0}")]
    InvalidCredential(String),

    /// The callback itself failed
    #[error("security callback failed: {0}")]
    CallbackFailed(String),
}

/// An authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email_address: Option<String>,
}

impl User {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            email_address: None,
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email_address = Some(email.into());
        self
    }
}

/// What an operation is performed on.  All parts are optional; registries
/// fill in whatever they know.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    pub owner: Option<String>,
    pub group: Option<String>,
    pub id: Option<String>,
}

impl Resource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = Some(owner.into());
        self
    }

    pub fn group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }
}

/// Resolves a username and password to a user.
///
/// `Ok(None)` means the credentials were understood but rejected.
#[async_trait]
pub trait Authenticator: fmt::Debug + Send + Sync {
    async fn authenticate(
        &self,
        username: &str,
        password: &str,
    ) -> Result<Option<User>, SecurityError>;
}

/// Decides whether `user` may perform `operation` on `resource`.
#[async_trait]
pub trait Authorizer: fmt::Debug + Send + Sync {
    async fn authorize(
        &self,
        registry_type: &str,
        user: &User,
        operation: &str,
        resource: &Resource,
    ) -> Result<bool, SecurityError>;
}
