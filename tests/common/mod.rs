// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Shared helpers for the integration tests.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use proxifact::config::{ConfigError, ConfigProvider};
use proxifact::{Proxifact, ProxifactLoader};
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// Provider backed by a JSON document.
///
/// Every node is addressable: `adapter.filter` yields the whole object,
/// `adapter.filter.pathFilter` a single leaf.
#[allow(dead_code)]
#[derive(Debug, Clone)]
pub struct TestConfigProvider {
    values: HashMap<String, Value>,
}

#[allow(dead_code)]
impl TestConfigProvider {
    pub fn from_json(config: Value) -> Self {
        let mut values = HashMap::new();
        Self::flatten_json(&config, "", &mut values);
        Self { values }
    }

    fn flatten_json(value: &Value, prefix: &str, values: &mut HashMap<String, Value>) {
        if !prefix.is_empty() {
            values.insert(prefix.to_string(), value.clone());
        }
        if let Value::Object(obj) = value {
            for (key, val) in obj {
                let key = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{prefix}.{key}")
                };
                Self::flatten_json(val, &key, values);
            }
        }
    }
}

impl ConfigProvider for TestConfigProvider {
    fn has(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    fn provider_name(&self) -> &str {
        "test"
    }

    fn get_raw(&self, key: &str) -> Result<Option<Value>, ConfigError> {
        Ok(self.values.get(key).cloned())
    }
}

/// A running adapter on an ephemeral port.
#[allow(dead_code)]
pub struct RunningAdapter {
    pub addr: SocketAddr,
    pub proxifact: Arc<Proxifact>,
    shutdown: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

#[allow(dead_code)]
impl RunningAdapter {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub async fn stop(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for RunningAdapter {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

/// Build an adapter from `config` and serve it on `127.0.0.1:0`.
#[allow(dead_code)]
pub async fn start_adapter(config: Value) -> RunningAdapter {
    let proxifact = ProxifactLoader::new()
        .with_provider(TestConfigProvider::from_json(config))
        .build()
        .await
        .expect("adapter should build");
    let proxifact = Arc::new(proxifact);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = oneshot::channel::<()>();

    let served = proxifact.clone();
    let handle = tokio::spawn(async move {
        served
            .server()
            .serve(listener, async {
                let _ = rx.await;
            })
            .await
            .expect("server failed");
    });

    RunningAdapter {
        addr,
        proxifact,
        shutdown: Some(tx),
        handle: Some(handle),
    }
}
