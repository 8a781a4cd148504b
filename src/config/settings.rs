// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Typed view over the layered configuration.
//!
//! Every leaf is read through [`Config::get`] so a single environment
//! variable can override one value of a section loaded from a file.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{Config, ConfigError};
use crate::adapter::FilterDefinition;
use crate::core::{ForwardMode, TransportOptions};
use crate::logging::config::LoggingConfig;
use crate::registration::{self, HubConfig};
use crate::server::ServerConfig;

/// `proxy.*`: where traffic goes and how it is relayed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxySection {
    /// Target origin, e.g. `https://registry.internal:5000`
    pub target: String,
    pub rewrite_host: bool,
    pub mode: ForwardMode,
    pub transport: TransportOptions,
}

/// `adapter.*`: identity, filter and authentication.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdapterSection {
    pub registry_type: String,
    pub filter: FilterDefinition,
    pub require_auth: bool,
    pub realm: String,
    /// `user:password` entries for the built-in authenticator
    pub credentials: Vec<String>,
}

/// Complete adapter configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdapterConfig {
    pub server: ServerConfig,
    pub proxy: ProxySection,
    pub adapter: AdapterSection,
    pub hub: Option<HubConfig>,
    pub logging: LoggingConfig,
}

impl AdapterConfig {
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let server_defaults = ServerConfig::default();
        let server = ServerConfig {
            host: text(config, "server.host")?.unwrap_or(server_defaults.host),
            port: config.get_or_default("server.port", server_defaults.port)?,
        };

        let proxy = ProxySection {
            target: required_text(config, "proxy.target")?,
            rewrite_host: config.get_or_default("proxy.rewrite_host", true)?,
            mode: config.get_or_default("proxy.mode", ForwardMode::default())?,
            transport: TransportOptions {
                timeout: config.get("proxy.timeout")?,
                connect_timeout: config.get("proxy.connect_timeout")?,
            },
        };

        let adapter = AdapterSection {
            registry_type: required_text(config, "adapter.registry_type")?,
            filter: config.get_or_default("adapter.filter", FilterDefinition::default())?,
            require_auth: config.get_or_default("adapter.require_auth", false)?,
            realm: text(config, "adapter.realm")?.unwrap_or_else(|| "proxifact".to_string()),
            credentials: config.get_or_default("adapter.credentials", Vec::new())?,
        };

        let hub = if text(config, "hub.url")?.is_some() {
            Some(HubConfig {
                url: required_text(config, "hub.url")?,
                token: required_text(config, "hub.token")?,
                address: required_text(config, "hub.address")?,
                timeout: config.get_or_default("hub.timeout", registration::default_timeout())?,
            })
        } else {
            None
        };

        let mut logging: LoggingConfig = config.get_or_default("logging", LoggingConfig::default())?;
        if let Some(level) = text(config, "logging.level")? {
            logging.level = level;
        }
        if let Some(structured) = config.get("logging.structured")? {
            logging.structured = structured;
        }
        if let Some(format) = config.get("logging.format")? {
            logging.format = format;
        }

        Ok(Self {
            server,
            proxy,
            adapter,
            hub,
            logging,
        })
    }
}

/// Read a string-typed key.
///
/// The environment provider types `123456` as a number and `true` as a
/// bool, so scalar numbers and bools are taken back as their text.
fn text(config: &Config, key: &str) -> Result<Option<String>, ConfigError> {
    match config.get_raw(key)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(value)) => Ok(Some(value)),
        Some(value @ (Value::Number(_) | Value::Bool(_))) => Ok(Some(value.to_string())),
        Some(other) => Err(ConfigError::ParseError(format!(
            "failed to deserialize '{key}': expected a string, found {other}"
        ))),
    }
}

fn required_text(config: &Config, key: &str) -> Result<String, ConfigError> {
    text(config, key)?.ok_or_else(|| ConfigError::MissingKey(key.to_string()))
}
