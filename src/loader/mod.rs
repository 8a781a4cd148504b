// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! High-level entry-point: configuration in, running adapter out.
//!
//! [`ProxifactLoader`] layers the configuration, initializes logging and
//! wires the [`ProxyEngine`], the [`Adapter`], the [`ProxyServer`] and the
//! optional [`HubClient`] into a single [`Proxifact`].


use std::sync::Arc;

use bytes::Bytes;
use reqwest::StatusCode;
use thiserror::Error;

use crate::adapter::{Adapter, AdapterError, RequestFilter};
use crate::config::{
    AdapterConfig, Config, ConfigError, ConfigProvider, EnvConfigProvider, FileConfigProvider,
};
use crate::core::{ForwardError, InboundRequest, ResponseSink, Target, Transports};
use crate::logging;
use crate::proxy::ProxyEngine;
use crate::registration::{HubClient, RegistrationError};
use crate::security::{Authenticator, Authorizer, SecurityError, StaticCredentials};
use crate::server::ProxyServer;
use crate::{info_fmt, warn_fmt};

/// Errors that can occur while building or starting an adapter.
#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("proxy error: {0}")]
    Forward(#[from] ForwardError),

    #[error("adapter error: {0}")]
    Adapter(#[from] AdapterError),

    #[error("security error: {0}")]
    Security(#[from] SecurityError),

    #[error("registration error: {0}")]
    Registration(#[from] RegistrationError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

/// Builder for a [`Proxifact`] instance.
#[derive(Debug, Default)]
pub struct ProxifactLoader {
    config: Option<Config>,
    config_file_path: Option<String>,
    use_env_vars: bool,
    env_prefix: Option<String>,
    providers: Vec<Arc<dyn ConfigProvider>>,
    authenticator: Option<Arc<dyn Authenticator>>,
    authorizer: Option<Arc<dyn Authorizer>>,
}

impl ProxifactLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a ready-made configuration instead of layering providers.
    pub fn with_config(mut self, config: Config) -> Self {
        self.config = Some(config);
        self
    }

    /// Read a JSON, TOML or YAML configuration file.
    pub fn with_config_file(mut self, file_path: &str) -> Self {
        self.config_file_path = Some(file_path.to_string());
        self
    }

    /// Let `PROXIFACT_*` environment variables override the file.
    pub fn with_env_vars(mut self) -> Self {
        self.use_env_vars = true;
        self
    }

    /// Read environment variables with a custom prefix.
    pub fn with_env_prefix(mut self, prefix: &str) -> Self {
        self.env_prefix = Some(prefix.to_string());
        self.use_env_vars = true;
        self
    }

    /// Add a provider on top of the file and environment layers.
    pub fn with_provider<P: ConfigProvider + 'static>(mut self, provider: P) -> Self {
        self.providers.push(Arc::new(provider));
        self
    }

    /// Authenticate requests with `authenticator` instead of the configured
    /// static credentials.
    pub fn with_authenticator(mut self, authenticator: Arc<dyn Authenticator>) -> Self {
        self.authenticator = Some(authenticator);
        self
    }

    pub fn with_authorizer(mut self, authorizer: Arc<dyn Authorizer>) -> Self {
        self.authorizer = Some(authorizer);
        self
    }

    /// File first, then environment, then custom providers; later wins.
    fn layered_config(&self) -> Result<Config, LoaderError> {
        let mut builder = match &self.config {
            Some(config) => config.clone().into_builder(),
            None => {
                let mut builder = Config::builder();
                if let Some(path) = &self.config_file_path {
                    builder = builder.with_provider(FileConfigProvider::new(path)?);
                }
                if self.use_env_vars {
                    builder = builder.with_provider(match &self.env_prefix {
                        Some(prefix) => EnvConfigProvider::new(prefix),
                        None => EnvConfigProvider::default(),
                    });
                }
                builder
            }
        };

        for provider in &self.providers {
            builder = builder.with_shared_provider(provider.clone());
        }
        Ok(builder.build())
    }

    /// Build the adapter without binding any socket.
    pub async fn build(self) -> Result<Proxifact, LoaderError> {
        let config = self.layered_config()?;

        let settings = AdapterConfig::from_config(&config)?;
        logging::init_with_config(settings.logging.level_filter(), &settings.logging);

        info_fmt!(
            "Startup",
            "Proxifact '{}' adapter starting, forwarding to {}",
            settings.adapter.registry_type,
            settings.proxy.target
        );

        let target = Target::parse(&settings.proxy.target)?;
        let transports = Transports::from_options(&settings.proxy.transport)?;
        let mut engine = ProxyEngine::with_parts(target, transports)
            .with_rewrite_host(settings.proxy.rewrite_host);
        install_default_listeners(&mut engine);
        let engine = Arc::new(engine);

        let filter = RequestFilter::new(settings.adapter.filter.clone())?;
        let mut adapter = Adapter::new(settings.adapter.registry_type.clone(), filter)?;
        match self.authenticator {
            Some(authenticator) => adapter = adapter.with_authenticator(authenticator),
            None if !settings.adapter.credentials.is_empty() => {
                let credentials = StaticCredentials::new(&settings.adapter.credentials)?;
                adapter = adapter.with_authenticator(Arc::new(credentials));
            }
            None => {}
        }
        if let Some(authorizer) = self.authorizer {
            adapter = adapter.with_authorizer(authorizer);
        }
        if settings.adapter.require_auth && !adapter.has_authenticator() {
            warn_fmt!(
                "Startup",
                "Authentication required but no authenticator configured; every request will fail with 500"
            );
        }
        let adapter = Arc::new(adapter);

        let mut server = ProxyServer::new(settings.server.clone(), engine.clone(), adapter.clone())
            .with_mode(settings.proxy.mode);
        if settings.adapter.require_auth {
            server = server.with_basic_auth(settings.adapter.realm.clone());
        }

        let hub = settings.hub.clone().map(HubClient::new).transpose()?;

        Ok(Proxifact {
            config: Arc::new(config),
            settings,
            server,
            adapter,
            engine,
            hub,
        })
    }
}

/// Answer 502 when forwarding fails before anything reached the client.
fn install_default_listeners(engine: &mut ProxyEngine) {
    fn bad_gateway(_: &ForwardError, _: &InboundRequest, sink: &mut dyn ResponseSink) {
        if sink.headers_sent() {
            return;
        }
        sink.status(StatusCode::BAD_GATEWAY);
        if let Err(e) = sink.send(Bytes::from_static(b"Bad Gateway")) {
            warn_fmt!("Proxifact", "Failed to send 502 response: {}", e);
        }
    }

    engine
        .on_request_error(bad_gateway)
        .on_response_error(bad_gateway);
}

/// A configured adapter, ready to register and serve.
#[derive(Debug)]
pub struct Proxifact {
    config: Arc<Config>,
    settings: AdapterConfig,
    server: ProxyServer,
    adapter: Arc<Adapter>,
    engine: Arc<ProxyEngine>,
    hub: Option<HubClient>,
}

impl Proxifact {
    pub fn loader() -> ProxifactLoader {
        ProxifactLoader::new()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn settings(&self) -> &AdapterConfig {
        &self.settings
    }

    pub fn server(&self) -> &ProxyServer {
        &self.server
    }

    pub fn adapter(&self) -> &Arc<Adapter> {
        &self.adapter
    }

    pub fn engine(&self) -> &Arc<ProxyEngine> {
        &self.engine
    }

    pub fn hub(&self) -> Option<&HubClient> {
        self.hub.as_ref()
    }

    /// Register with the hub, when one is configured, then serve until
    /// shutdown.
    pub async fn start(&self) -> Result<(), LoaderError> {
        if let Some(hub) = &self.hub {
            hub.register(&self.adapter).await?;
        }
        self.server.start().await?;
        Ok(())
    }
}
