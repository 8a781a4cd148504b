// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Layered configuration.
//!
//! A [`Config`] is an ordered list of [`ConfigProvider`]s; later providers
//! override earlier ones.  The loader stacks them like this:
//!
//! 1. `FileConfigProvider` – `config.{toml,json,yaml}`
//! 2. `EnvConfigProvider`  – `PROXIFACT_PROXY__TARGET=https://…`
//! 3. any provider added with `with_provider`
//!
//! [`AdapterConfig::from_config`] turns the layered keys into typed sections:
//!
//! | key | type | default | description |
//! |-----|------|---------|-------------|
//! | `server.host`            | string  | `127.0.0.1` | Address to bind              |
//! | `server.port`            | u16     | `8080`      | Port to bind                 |
//! | `proxy.target`           | string  | required    | Target origin                |
//! | `proxy.rewrite_host`     | bool    | `true`      | Send the target's Host       |
//! | `proxy.mode`             | string  | `streaming` | `streaming` or `buffered`    |
//! | `proxy.timeout`          | seconds | none        | Whole-exchange timeout       |
//! | `proxy.connect_timeout`  | seconds | none        | Connect timeout              |
//! | `adapter.registry_type`  | string  | required    | Registry type announced      |
//! | `adapter.filter`         | object  | match all   | Method, path and header regexes |
//! | `adapter.require_auth`   | bool    | `false`     | Demand Basic credentials     |
//! | `adapter.realm`          | string  | `proxifact` | Realm of the challenge       |
//! | `adapter.credentials`    | array   | `[]`        | `user:password` entries      |
//! | `hub.url`                | string  | none        | Enables registration         |
//! | `hub.token`              | string  | required with `hub.url` | Bearer token     |
//! | `hub.address`            | string  | required with `hub.url` | Address announced |
//! | `hub.timeout`            | seconds | `10`        | Registration timeout         |
//! | `logging.*`              | object  | see [`LoggingConfig`](crate::logging::config::LoggingConfig) | |

mod env;
pub mod error;
mod file;
mod settings;


pub use env::{DEFAULT_PREFIX, EnvConfigProvider};
pub use error::ConfigError;
pub use file::{FileConfigProvider, FileFormat};
pub use settings::{AdapterConfig, AdapterSection, ProxySection};

use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fmt::Debug;
use std::sync::Arc;

/// A source of configuration values, addressed by dot-separated keys.
pub trait ConfigProvider: Debug + Send + Sync {
    /// Check if the configuration provider has a value for the given key.
    fn has(&self, key: &str) -> bool;

    /// Get the name of the configuration provider for debugging purposes.
    fn provider_name(&self) -> &str;

    /// Get a raw configuration value by key.
    /// Returns a JSON Value that can be later deserialized into specific types.
    fn get_raw(&self, key: &str) -> Result<Option<Value>, ConfigError>;
}

/// Typed access on top of [`ConfigProvider`].
pub trait ConfigProviderExt: ConfigProvider {
    /// Get a configuration value by key and deserialize it to the specified type.
    fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, ConfigError> {
        match self.get_raw(key)? {
            Some(value) => serde_json::from_value(value).map(Some).map_err(|e| {
                ConfigError::ParseError(format!("failed to deserialize '{key}': {e}"))
            }),
            None => Ok(None),
        }
    }
}

impl<T: ConfigProvider> ConfigProviderExt for T {}

/// Builder for the configuration system.
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    providers: Vec<Arc<dyn ConfigProvider>>,
}

impl ConfigBuilder {
    /// Create a new configuration builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a configuration provider.
    pub fn with_provider<P: ConfigProvider + 'static>(mut self, provider: P) -> Self {
        self.providers.push(Arc::new(provider));
        self
    }

    /// Add a provider that is already shared elsewhere.
    pub fn with_shared_provider(mut self, provider: Arc<dyn ConfigProvider>) -> Self {
        self.providers.push(provider);
        self
    }

    /// Build the configuration.
    pub fn build(self) -> Config {
        Config {
            providers: self.providers,
        }
    }
}

/// Main configuration struct that holds all providers and handles retrieving values.
#[derive(Debug, Clone)]
pub struct Config {
    providers: Vec<Arc<dyn ConfigProvider>>,
}

impl Config {
    /// Create a new configuration builder.
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::new()
    }

    /// Builder holding this configuration's providers, to stack more on top.
    pub fn into_builder(self) -> ConfigBuilder {
        ConfigBuilder {
            providers: self.providers,
        }
    }

    /// Get a raw configuration value.
    fn get_raw(&self, key: &str) -> Result<Option<Value>, ConfigError> {
        // later providers win
        for provider in self.providers.iter().rev() {
            if provider.has(key) {
                return provider.get_raw(key);
            }
        }
        Ok(None)
    }

    /// Value of `key` from the highest-priority provider that has it.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, ConfigError> {
        match self.get_raw(key)? {
            Some(value) => serde_json::from_value(value).map(Some).map_err(|e| {
                ConfigError::ParseError(format!("failed to deserialize '{key}': {e}"))
            }),
            None => Ok(None),
        }
    }

    /// Get a configuration value by key with a default fallback value.
    pub fn get_or_default<T: DeserializeOwned>(
        &self,
        key: &str,
        default: T,
    ) -> Result<T, ConfigError> {
        match self.get(key)? {
            Some(value) => Ok(value),
            None => Ok(default),
        }
    }

    /// Configuration backed by a single file.
    pub fn default_file(file_path: &str) -> Result<Self, ConfigError> {
        let provider = FileConfigProvider::new(file_path)?;
        Ok(Self::builder().with_provider(provider).build())
    }
}
