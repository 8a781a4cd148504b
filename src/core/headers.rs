// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Case-insensitive, order-preserving header collection.
//!
//! Lookups are keyed by the lower-cased header name while the casing of the
//! most recent write is kept for serialization.  Writing a header through
//! [`Headers::insert`] drops every case variant first, so `Host` and `host`
//! can never coexist.

use indexmap::IndexMap;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};

use super::ForwardError;

#[derive(Debug, Clone, PartialEq, Eq)]
struct Entry {
    name: String,
    values: Vec<HeaderValue>,
}

/// Ordered header map keyed by the case-normalized header name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    entries: IndexMap<String, Entry>,
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct header names.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(&name.to_ascii_lowercase())
    }

    /// First value stored for `name`, whatever its casing.
    pub fn get(&self, name: &str) -> Option<&HeaderValue> {
        self.entries
            .get(&name.to_ascii_lowercase())
            .and_then(|e| e.values.first())
    }

    /// First value for `name` as text, if it is visible ASCII.
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(|v| v.to_str().ok())
    }

    /// All values stored for `name`.
    pub fn get_all(&self, name: &str) -> &[HeaderValue] {
        self.entries
            .get(&name.to_ascii_lowercase())
            .map(|e| e.values.as_slice())
            .unwrap_or(&[])
    }

    /// Name of the entry as it will be serialized.
    pub fn original_name(&self, name: &str) -> Option<&str> {
        self.entries
            .get(&name.to_ascii_lowercase())
            .map(|e| e.name.as_str())
    }

    /// Remove every case variant of `name`, then write a single value.
    ///
    /// The entry moves to the end of the map, mirroring a delete followed by
    /// a fresh write.  Returns the first value previously stored, if any.
    pub fn insert<N, V>(&mut self, name: N, value: V) -> Option<HeaderValue>
    where
        N: Into<String>,
        V: Into<HeaderValue>,
    {
        let name = name.into();
        let previous = self.remove(&name);
        self.entries.insert(
            name.to_ascii_lowercase(),
            Entry {
                name,
                values: vec![value.into()],
            },
        );
        previous.and_then(|v| v.into_iter().next())
    }

    /// Add a value without dropping the existing ones.
    pub fn append<N, V>(&mut self, name: N, value: V)
    where
        N: Into<String>,
        V: Into<HeaderValue>,
    {
        let name = name.into();
        let entry = self
            .entries
            .entry(name.to_ascii_lowercase())
            .or_insert_with(|| Entry {
                name: String::new(),
                values: Vec::new(),
            });
        entry.name = name;
        entry.values.push(value.into());
    }

    /// Remove every case variant of `name`, returning the removed values.
    pub fn remove(&mut self, name: &str) -> Option<Vec<HeaderValue>> {
        self.entries
            .shift_remove(&name.to_ascii_lowercase())
            .map(|e| e.values)
    }

    /// Copy every entry of `other` over this map, replacing same-named entries.
    pub fn extend_from(&mut self, other: &Headers) {
        for entry in other.entries.values() {
            self.remove(&entry.name);
            self.entries
                .insert(entry.name.to_ascii_lowercase(), entry.clone());
        }
    }

    /// Iterate `(name, value)` pairs in insertion order, one pair per value.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &HeaderValue)> {
        self.entries
            .values()
            .flat_map(|e| e.values.iter().map(move |v| (e.name.as_str(), v)))
    }

    /// Header names in insertion order, with their serialized casing.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.values().map(|e| e.name.as_str())
    }

    /// Convert into a wire-level map for the HTTP client or server.
    pub fn to_header_map(&self) -> Result<HeaderMap, ForwardError> {
        let mut map = HeaderMap::with_capacity(self.entries.len());
        for (name, value) in self.iter() {
            let header_name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| ForwardError::InvalidHeader(format!("{name}: {e}")))?;
            map.append(header_name, value.clone());
        }
        Ok(map)
    }
}

impl From<&HeaderMap> for Headers {
    fn from(map: &HeaderMap) -> Self {
        let mut headers = Headers::new();
        for (name, value) in map.iter() {
            headers.append(name.as_str(), value.clone());
        }
        headers
    }
}

impl<'a> FromIterator<(&'a str, &'a str)> for Headers {
    /// Builds headers from text pairs; pairs with invalid values are skipped.
    fn from_iter<I: IntoIterator<Item = (&'a str, &'a str)>>(iter: I) -> Self {
        let mut headers = Headers::new();
        for (name, value) in iter {
            if let Ok(value) = HeaderValue::from_str(value) {
                headers.append(name, value);
            }
        }
        headers
    }
}
