// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Environment variable-based configuration provider implementation.
//!
//! After the prefix is stripped, the variable name is lower-cased and `__`
//! separates nesting levels, so single underscores survive in key names:
//! `PROXIFACT_PROXY__REWRITE_HOST` is read as `proxy.rewrite_host`.

use serde_json::{Value, json};
use std::collections::HashMap;
use std::env;

use super::ConfigError;
use super::ConfigProvider;

/// Default variable prefix.
pub const DEFAULT_PREFIX: &str = "PROXIFACT_";

const LEVEL_SEPARATOR: &str = "__";

/// Configuration provider that retrieves values from environment variables.
#[derive(Debug)]
pub struct EnvConfigProvider {
    prefix: String,
    /// Variables matching the prefix, keyed by config key
    cache: HashMap<String, String>,
}

impl EnvConfigProvider {
    /// Create a provider reading variables that start with `prefix`.
    pub fn new(prefix: &str) -> Self {
        let mut provider = Self {
            prefix: prefix.to_string(),
            cache: HashMap::new(),
        };
        provider.refresh_cache();
        provider
    }

    /// Re-read the environment.
    pub fn refresh_cache(&mut self) {
        self.cache.clear();

        for (key, value) in env::vars() {
            if let Some(rest) = key.strip_prefix(&self.prefix) {
                if rest.is_empty() {
                    continue;
                }
                let config_key = rest.to_lowercase().replace(LEVEL_SEPARATOR, ".");
                self.cache.insert(config_key, value);
            }
        }
    }

    /// Interpret a variable value: JSON first, then booleans and numbers,
    /// plain string otherwise.
    ///
    /// A number is only taken when it prints back as the same text, so
    /// `007` or `1e3` stay strings.
    fn parse_value_to_json(&self, value: &str) -> Value {
        if let Ok(json_value) = serde_json::from_str::<Value>(value) {
            if !json_value.is_number() || json_value.to_string() == value {
                return json_value;
            }
            return json!(value);
        }

        if value.eq_ignore_ascii_case("true") {
            return json!(true);
        } else if value.eq_ignore_ascii_case("false") {
            return json!(false);
        }

        if let Ok(int_val) = value.parse::<i64>() {
            if int_val.to_string() == value {
                return json!(int_val);
            }
        }
        if let Ok(float_val) = value.parse::<f64>() {
            if json!(float_val).to_string() == value {
                return json!(float_val);
            }
        }

        json!(value)
    }
}

impl Default for EnvConfigProvider {
    fn default() -> Self {
        Self::new(DEFAULT_PREFIX)
    }
}

impl ConfigProvider for EnvConfigProvider {
    fn get_raw(&self, key: &str) -> Result<Option<Value>, ConfigError> {
        Ok(self.cache.get(key).map(|value| self.parse_value_to_json(value)))
    }

    fn has(&self, key: &str) -> bool {
        self.cache.contains_key(key)
    }

    fn provider_name(&self) -> &str {
        "env"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigProviderExt;
    use serial_test::serial;
    use std::env;

    #[test]
    #[serial]
    fn test_env_provider() {
        unsafe {
            env::set_var("PROXIFACT_SERVER__HOST", "localhost");
            env::set_var("PROXIFACT_SERVER__PORT", "9090");
            env::set_var("PROXIFACT_PROXY__REWRITE_HOST", "false");
        }

        let provider = EnvConfigProvider::default();

        assert!(provider.has("server.host"));
        assert!(!provider.has("nonexistent"));

        let host: String = provider.get("server.host").unwrap().unwrap();
        assert_eq!(host, "localhost");

        let port: u16 = provider.get("server.port").unwrap().unwrap();
        assert_eq!(port, 9090);

        let rewrite: bool = provider.get("proxy.rewrite_host").unwrap().unwrap();
        assert!(!rewrite);

        unsafe {
            env::remove_var("PROXIFACT_SERVER__HOST");
            env::remove_var("PROXIFACT_SERVER__PORT");
            env::remove_var("PROXIFACT_PROXY__REWRITE_HOST");
        }
    }

    #[test]
    #[serial]
    fn test_custom_prefix_and_refresh() {
        let mut provider = EnvConfigProvider::new("PFX_TEST_");
        assert!(!provider.has("hub.token"));

        unsafe {
            env::set_var("PFX_TEST_HUB__TOKEN", "abc");
        }
        assert!(!provider.has("hub.token"));

        provider.refresh_cache();
        let token: String = provider.get("hub.token").unwrap().unwrap();
        assert_eq!(token, "abc");

        unsafe {
            env::remove_var("PFX_TEST_HUB__TOKEN");
        }
    }

    #[test]
    #[serial]
    fn test_value_types() {
        unsafe {
            env::set_var("PROXIFACT_T__STRING", "hello world");
            env::set_var("PROXIFACT_T__FLOAT", "3.5");
            env::set_var("PROXIFACT_T__ARRAY", r#"["alice:secret","bob:pw"]"#);
            env::set_var("PROXIFACT_T__INVALID", "{not json}");
        }

        let provider = EnvConfigProvider::default();

        let string_val: String = provider.get("t.string").unwrap().unwrap();
        assert_eq!(string_val, "hello world");

        let float_val: f64 = provider.get("t.float").unwrap().unwrap();
        assert_eq!(float_val, 3.5);

        let array_val: Vec<String> = provider.get("t.array").unwrap().unwrap();
        assert_eq!(array_val, vec!["alice:secret", "bob:pw"]);

        let invalid: String = provider.get("t.invalid").unwrap().unwrap();
        assert_eq!(invalid, "{not json}");

        unsafe {
            env::remove_var("PROXIFACT_T__STRING");
            env::remove_var("PROXIFACT_T__FLOAT");
            env::remove_var("PROXIFACT_T__ARRAY");
            env::remove_var("PROXIFACT_T__INVALID");
        }
    }

    #[test]
    #[serial]
    fn test_numbers_that_do_not_print_back_stay_text() {
        unsafe {
            env::set_var("PROXIFACT_HUB__TOKEN", "000123");
            env::set_var("PROXIFACT_HUB__ADDRESS", "1e3");
            env::set_var("PROXIFACT_SERVER__PORT", "8080");
        }

        let provider = EnvConfigProvider::default();

        assert_eq!(provider.get_raw("hub.token").unwrap(), Some(json!("000123")));
        assert_eq!(provider.get_raw("hub.address").unwrap(), Some(json!("1e3")));
        assert_eq!(provider.get_raw("server.port").unwrap(), Some(json!(8080)));

        unsafe {
            env::remove_var("PROXIFACT_HUB__TOKEN");
            env::remove_var("PROXIFACT_HUB__ADDRESS");
            env::remove_var("PROXIFACT_SERVER__PORT");
        }
    }

    #[test]
    #[serial]
    fn test_lowercase_variables_do_not_match() {
        unsafe {
            env::set_var("proxifact_lower", "x");
        }

        let provider = EnvConfigProvider::default();
        assert!(!provider.has("lower"));
        assert_eq!(provider.provider_name(), "env");

        unsafe {
            env::remove_var("proxifact_lower");
        }
    }
}
