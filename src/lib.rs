// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Proxifact - a forwarding adapter between an artifact hub and a registry.
//!
//! An adapter accepts registry traffic routed to it by the hub, checks it
//! against its request filter, optionally authenticates it, and forwards it
//! to one fixed registry origin through a [`ProxyEngine`].
//!
//! # Building blocks
//!
//! - **Engine**: [`ProxyEngine`] forwards one [`InboundRequest`] into a
//!   [`ResponseSink`], streaming or buffered, with listeners at four
//!   lifecycle points.
//! - **Adapter**: [`Adapter`] carries the registry type, the
//!   [`RequestFilter`] and the authentication and authorization callbacks.
//! - **Hub**: [`HubClient`] announces the adapter once at startup.
//! - **Listener**: [`ProxyServer`] mounts the engine on a hyper HTTP server.
//! - **Configuration**: layered file and environment providers, read into an
//!   [`AdapterConfig`](config::AdapterConfig).
//!
//! The [`ProxifactLoader`] wires everything from configuration:
//!
//! ```rust,no_run
//! use proxifact::Proxifact;
//!
//! # async fn run() -> Result<(), proxifact::LoaderError> {
//! let proxifact = Proxifact::loader()
//!     .with_config_file("config.toml")
//!     .with_env_vars()
//!     .build()
//!     .await?;
//! proxifact.start().await
//! # }
//! ```

pub mod adapter;
pub mod config;
pub mod core;
pub mod loader;
pub mod logging;
pub mod proxy;
pub mod registration;
pub mod security;
pub mod server;

pub use adapter::{Adapter, AdapterError, FilterDefinition, RequestFilter};
pub use config::{Config, ConfigError, ConfigProvider, ConfigProviderExt};
pub use core::{
    CollectingSink, ForwardError, ForwardMode, ForwardState, Headers, InboundRequest,
    InboundResponse, OutboundRequest, ResponseSink, Scheme, Target, Transport, TransportOptions,
    Transports,
};
pub use loader::{LoaderError, Proxifact, ProxifactLoader};
pub use proxy::ProxyEngine;
pub use registration::{HubClient, HubConfig, HubReply, Registration, RegistrationError};
pub use security::{Authenticator, Authorizer, Resource, SecurityError, User};
pub use server::{HyperSink, ProxyServer, ServerConfig};
