//! # Indexing Module
//!
//! External-link index: maps the normalised form of a URL to the containers
//! whose content links to it. Lookups must normalise exactly like inserts, or
//! identity resolution silently stops finding existing records.

use crate::model::ContainerId;
use hashbrown::HashMap;
use std::collections::BTreeSet;
use url::{Host, Url};

/// Normalised index form of a URL.
///
/// The host is lower-cased and its labels reversed (`www.example.com` becomes
/// `com.example.www.`), so that prefix scans group sub-domains. User info and
/// non-default ports are kept; the fragment is dropped. Strings that do not
/// parse as absolute URLs with a host are indexed verbatim.
pub fn link_index_key(raw: &str) -> String {
    let Ok(url) = Url::parse(raw.trim()) else {
        return raw.to_string();
    };
    let Some(host) = url.host() else {
        return raw.to_string();
    };

    let mut key = String::with_capacity(raw.len() + 2);
    key.push_str(url.scheme());
    key.push_str("://");

    if !url.username().is_empty() || url.password().is_some() {
        key.push_str(url.username());
        if let Some(password) = url.password() {
            key.push(':');
            key.push_str(password);
        }
        key.push('@');
    }

    match host {
        Host::Domain(domain) => {
            let labels: Vec<&str> = domain.trim_end_matches('.').split('.').rev().collect();
            key.push_str(&labels.join("."));
            key.push('.');
        }
        Host::Ipv4(addr) => key.push_str(&addr.to_string()),
        Host::Ipv6(addr) => {
            key.push('[');
            key.push_str(&addr.to_string());
            key.push(']');
        }
    }

    if let Some(port) = url.port() {
        key.push(':');
        key.push_str(&port.to_string());
    }

    key.push_str(url.path());
    if let Some(query) = url.query() {
        key.push('?');
        key.push_str(query);
    }
    key
}

/// Index of outgoing links per container.
#[derive(Debug, Clone, Default)]
pub struct LinkIndex {
    by_key: HashMap<String, BTreeSet<ContainerId>>,
    by_container: HashMap<ContainerId, Vec<String>>,
}

impl LinkIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace every link recorded for `container` with `urls`.
    pub fn replace_links<'a, I>(&mut self, container: ContainerId, urls: I)
    where
        I: IntoIterator<Item = &'a str>,
    {
        self.remove_container(container);
        let mut keys: Vec<String> = urls.into_iter().map(link_index_key).collect();
        keys.sort();
        keys.dedup();
        for key in &keys {
            self.by_key.entry(key.clone()).or_default().insert(container);
        }
        if !keys.is_empty() {
            self.by_container.insert(container, keys);
        }
    }

    pub fn remove_container(&mut self, container: ContainerId) {
        let Some(keys) = self.by_container.remove(&container) else {
            return;
        };
        for key in keys {
            if let Some(containers) = self.by_key.get_mut(&key) {
                containers.remove(&container);
                if containers.is_empty() {
                    self.by_key.remove(&key);
                }
            }
        }
    }

    /// Containers linking to `url`, in ascending order.
    pub fn containers_for(&self, url: &str) -> Vec<ContainerId> {
        self.by_key
            .get(&link_index_key(url))
            .map(|containers| containers.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }
}
