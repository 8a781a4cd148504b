// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! One-shot registration with the hub.
//!
//! The hub routes registry traffic to adapters.  On startup an adapter posts
//! its registry type, its [`FilterDefinition`] and the address the hub should
//! forward matching requests to.


use std::time::Duration;

use reqwest::StatusCode;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::adapter::{Adapter, FilterDefinition};
use crate::core::Headers;
use crate::{debug_fmt, error_fmt, info_fmt};

/// Errors raised while registering with the hub.
#[derive(Error, Debug)]
pub enum RegistrationError {
    /// The hub could not be reached or its reply could not be read
    #[error("hub request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The hub answered with a non-success status
    #[error("hub rejected registration with {status}: {reply}")]
    Rejected { status: StatusCode, reply: HubReply },
}

pub(crate) fn default_timeout() -> u64 {
    10
}

/// Where the hub lives and how this adapter presents itself to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HubConfig {
    /// Registration endpoint
    pub url: String,

    /// Bearer token sent with the registration
    pub token: String,

    /// Externally reachable address of this adapter
    pub address: String,

    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout: u64,
}

/// Body of a registration request.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct RegistrationRequest<'a> {
    registry_type: &'a str,
    filter: &'a FilterDefinition,
    address: &'a str,
}

/// Reply body of the hub, decoded according to its content type.
#[derive(Debug, Clone, PartialEq)]
pub enum HubReply {
    Json(serde_json::Value),
    Text(String),
}

impl std::fmt::Display for HubReply {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HubReply::Json(value) => write!(f, "{value}"),
            HubReply::Text(text) => f.write_str(text),
        }
    }
}

/// Accepted registration.
#[derive(Debug, Clone, PartialEq)]
pub struct Registration {
    pub status: StatusCode,
    pub reply: HubReply,
}

/// Client for the hub registration endpoint.
#[derive(Debug, Clone)]
pub struct HubClient {
    client: reqwest::Client,
    config: HubConfig,
}

impl HubClient {
    pub fn new(config: HubConfig) -> Result<Self, RegistrationError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout))
            .build()?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    /// Announce `adapter` to the hub.
    pub async fn register(&self, adapter: &Adapter) -> Result<Registration, RegistrationError> {
        let body = RegistrationRequest {
            registry_type: adapter.registry_type(),
            filter: adapter.filter().definition(),
            address: &self.config.address,
        };

        debug_fmt!(
            "HubClient",
            "Registering '{}' adapter at {} with {}",
            adapter.registry_type(),
            self.config.address,
            self.config.url
        );

        let response = self
            .client
            .post(&self.config.url)
            .header(AUTHORIZATION, format!("Bearer {}", self.config.token))
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                error_fmt!("HubClient", "Failed to reach hub at {}: {}", self.config.url, e);
                RegistrationError::Transport(e)
            })?;

        let status = response.status();
        let headers = Headers::from(response.headers());
        let text = response.text().await?;
        let reply = decode_reply(&headers, text);

        if !status.is_success() {
            error_fmt!("HubClient", "Hub rejected registration with {}: {}", status, reply);
            return Err(RegistrationError::Rejected { status, reply });
        }

        info_fmt!(
            "HubClient",
            "Registered '{}' adapter with hub ({})",
            adapter.registry_type(),
            status
        );
        Ok(Registration { status, reply })
    }
}

/// JSON when the content type says so (any header casing), text otherwise.
/// A JSON content type with an unparsable body falls back to text.
fn decode_reply(headers: &Headers, text: String) -> HubReply {
    let is_json = headers
        .get_str(CONTENT_TYPE.as_str())
        .map(|ct| {
            let mime = ct.split(';').next().unwrap_or("").trim().to_ascii_lowercase();
            mime == "application/json" || mime.ends_with("+json")
        })
        .unwrap_or(false);

    if is_json {
        if let Ok(value) = serde_json::from_str(&text) {
            return HubReply::Json(value);
        }
    }
    HubReply::Text(text)
}
