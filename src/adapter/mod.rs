// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Adapter identity – which registry this is and which traffic it handles.
//!
//! An [`Adapter`] pairs a registry type (`docker`, `npm`, …) with the
//! [`RequestFilter`] the hub uses to route traffic to it, plus the optional
//! authentication and authorization callbacks the listener consults.


use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::{Headers, InboundRequest};
use crate::security::{Authenticator, Authorizer, Resource, SecurityError, User};
use crate::{debug_fmt, trace_fmt};

/// Errors raised while building an adapter.
#[derive(Error, Debug)]
pub enum AdapterError {
    /// One of the filter expressions does not compile
    #[error("invalid {field} expression '{pattern}': {source}")]
    InvalidFilter {
        field: String,
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// The registry type is empty
    #[error("registry type must not be empty")]
    MissingRegistryType,
}

fn match_all() -> String {
    ".*".to_string()
}

/// Serializable form of a [`RequestFilter`], as sent to the hub.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterDefinition {
    #[serde(default = "match_all")]
    pub method_filter: String,
    #[serde(default = "match_all")]
    pub path_filter: String,
    #[serde(default)]
    pub header_filters: BTreeMap<String, String>,
}

impl Default for FilterDefinition {
    fn default() -> Self {
        Self {
            method_filter: match_all(),
            path_filter: match_all(),
            header_filters: BTreeMap::new(),
        }
    }
}

/// Compiled request filter.
///
/// A request matches when the method, the path (without query string) and
/// every listed header match their expression.  Header names are looked up
/// case-insensitively; a missing header never matches.
#[derive(Debug, Clone)]
pub struct RequestFilter {
    definition: FilterDefinition,
    method: Regex,
    path: Regex,
    headers: Vec<(String, Regex)>,
}

impl RequestFilter {
    pub fn new(definition: FilterDefinition) -> Result<Self, AdapterError> {
        let method = compile("methodFilter", &definition.method_filter)?;
        let path = compile("pathFilter", &definition.path_filter)?;

        let mut headers = Vec::with_capacity(definition.header_filters.len());
        for (name, pattern) in &definition.header_filters {
            let regex = compile(&format!("headerFilters.{name}"), pattern)?;
            headers.push((name.to_ascii_lowercase(), regex));
        }

        Ok(Self {
            definition,
            method,
            path,
            headers,
        })
    }

    pub fn definition(&self) -> &FilterDefinition {
        &self.definition
    }

    pub fn matches(&self, method: &str, path: &str, headers: &Headers) -> bool {
        let path = path.split_once('?').map_or(path, |(path, _)| path);

        let method_match = self.method.is_match(method);
        let path_match = self.path.is_match(path);
        let headers_match = self.headers.iter().all(|(name, regex)| {
            headers
                .get_all(name)
                .iter()
                .filter_map(|v| v.to_str().ok())
                .any(|v| regex.is_match(v))
        });

        trace_fmt!(
            "RequestFilter",
            "method={} path={} -> method_match={} path_match={} headers_match={}",
            method,
            path,
            method_match,
            path_match,
            headers_match
        );

        method_match && path_match && headers_match
    }

    pub fn matches_request(&self, request: &InboundRequest) -> bool {
        self.matches(request.method.as_str(), &request.path, &request.headers)
    }
}

fn compile(field: &str, pattern: &str) -> Result<Regex, AdapterError> {
    Regex::new(pattern).map_err(|source| AdapterError::InvalidFilter {
        field: field.to_string(),
        pattern: pattern.to_string(),
        source,
    })
}

/// A registry adapter.
#[derive(Clone)]
pub struct Adapter {
    registry_type: String,
    filter: RequestFilter,
    authenticator: Option<Arc<dyn Authenticator>>,
    authorizer: Option<Arc<dyn Authorizer>>,
}

impl fmt::Debug for Adapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Adapter")
            .field("registry_type", &self.registry_type)
            .field("filter", self.filter.definition())
            .field("authenticator", &self.authenticator.is_some())
            .field("authorizer", &self.authorizer.is_some())
            .finish()
    }
}

impl Adapter {
    pub fn new(registry_type: impl Into<String>, filter: RequestFilter) -> Result<Self, AdapterError> {
        let registry_type = registry_type.into();
        if registry_type.trim().is_empty() {
            return Err(AdapterError::MissingRegistryType);
        }

        debug_fmt!(
            "Adapter",
            "Created '{}' adapter with filter {:?}",
            registry_type,
            filter.definition()
        );

        Ok(Self {
            registry_type,
            filter,
            authenticator: None,
            authorizer: None,
        })
    }

    pub fn with_authenticator(mut self, authenticator: Arc<dyn Authenticator>) -> Self {
        self.authenticator = Some(authenticator);
        self
    }

    pub fn with_authorizer(mut self, authorizer: Arc<dyn Authorizer>) -> Self {
        self.authorizer = Some(authorizer);
        self
    }

    pub fn registry_type(&self) -> &str {
        &self.registry_type
    }

    pub fn filter(&self) -> &RequestFilter {
        &self.filter
    }

    pub fn has_authenticator(&self) -> bool {
        self.authenticator.is_some()
    }

    /// Resolve credentials through the authentication callback.
    pub async fn authenticate(
        &self,
        username: &str,
        password: &str,
    ) -> Result<Option<User>, SecurityError> {
        let authenticator = self
            .authenticator
            .as_ref()
            .ok_or(SecurityError::NotConfigured("authentication"))?;
        authenticator.authenticate(username, password).await
    }

    /// Ask the authorization callback whether `user` may perform `operation`.
    ///
    /// The registry type of this adapter is passed along.
    pub async fn authorize(
        &self,
        user: &User,
        operation: &str,
        resource: &Resource,
    ) -> Result<bool, SecurityError> {
        let authorizer = self
            .authorizer
            .as_ref()
            .ok_or(SecurityError::NotConfigured("authorization"))?;
        authorizer
            .authorize(&self.registry_type, user, operation, resource)
            .await
    }
}
