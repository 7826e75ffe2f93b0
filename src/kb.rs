//! Knowledge base shared by the engine and the plugins
//!
//! A process-wide namespace/key store holding discovered URLs, credentials
//! found by bruteforce plugins and audit findings. It lives for one scan and
//! is emptied by `Scan::cleanup()`.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::RwLock;
use url::Url;

/// Namespace/key of the registry of every URL seen during the scan
pub const URLS: (&str, &str) = ("urls", "url_objects");

/// Namespace/key where bruteforce plugins store cracked basic-auth credentials
pub const BASIC_AUTH: (&str, &str) = ("basic_auth_brute", "auth");

/// Namespace holding findings, keyed by plugin name
pub const FINDINGS_NS: &str = "findings";

/// Credentials for HTTP basic authentication
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BasicAuthCredential {
    /// URL the credentials were found for
    pub url: Url,
    /// User name
    pub username: String,
    /// Password
    pub password: String,
}

/// Finding severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Informational
    Information,
    /// Low
    Low,
    /// Medium
    Medium,
    /// High
    High,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Information => write!(f, "Information"),
            Self::Low => write!(f, "Low"),
            Self::Medium => write!(f, "Medium"),
            Self::High => write!(f, "High"),
        }
    }
}

/// A vulnerability or information item reported by a plugin
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    /// Reporting plugin
    pub plugin: String,
    /// Short title
    pub title: String,
    /// Affected URL
    pub url: String,
    /// Severity
    pub severity: Severity,
    /// Free-form description
    pub description: String,
}

/// In-memory knowledge base
#[derive(Default)]
pub struct KnowledgeBase {
    store: RwLock<HashMap<String, HashMap<String, Value>>>,
}

impl fmt::Debug for KnowledgeBase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let store = self.store.read().unwrap_or_else(|e| e.into_inner());
        let mut namespaces: Vec<&String> = store.keys().collect();
        namespaces.sort();
        f.debug_struct("KnowledgeBase")
            .field("namespaces", &namespaces)
            .finish()
    }
}

impl KnowledgeBase {
    /// Create an empty knowledge base
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `value` under `namespace`/`key`, replacing any previous value
    pub fn save(&self, namespace: &str, key: &str, value: Value) {
        let mut store = self.store.write().unwrap_or_else(|e| e.into_inner());
        store
            .entry(namespace.to_string())
            .or_default()
            .insert(key.to_string(), value);
    }

    /// Read the value stored under `namespace`/`key`
    pub fn get(&self, namespace: &str, key: &str) -> Option<Value> {
        let store = self.store.read().unwrap_or_else(|e| e.into_inner());
        store.get(namespace)?.get(key).cloned()
    }

    /// Append `value` to the array stored under `namespace`/`key`
    ///
    /// A missing or non-array entry is replaced by a one-element array.
    pub fn append(&self, namespace: &str, key: &str, value: Value) {
        let mut store = self.store.write().unwrap_or_else(|e| e.into_inner());
        let slot = store
            .entry(namespace.to_string())
            .or_default()
            .entry(key.to_string())
            .or_insert_with(|| Value::Array(Vec::new()));
        match slot {
            Value::Array(items) => items.push(value),
            other => *other = Value::Array(vec![value]),
        }
    }

    /// Drop everything
    pub fn cleanup(&self) {
        self.store
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }

    /// Every URL registered so far, in discovery order
    pub fn urls(&self) -> Vec<Url> {
        self.get(URLS.0, URLS.1)
            .and_then(|value| serde_json::from_value(value).ok())
            .unwrap_or_default()
    }

    /// Register URLs (query and fragment dropped), returning the ones that were new
    pub fn add_urls<'a>(&self, urls: impl IntoIterator<Item = &'a Url>) -> Vec<Url> {
        let mut known = self.urls();
        let mut added = Vec::new();
        for url in urls {
            let mut url = url.clone();
            url.set_query(None);
            url.set_fragment(None);
            if !known.contains(&url) {
                known.push(url.clone());
                added.push(url);
            }
        }
        if !added.is_empty() {
            let value = serde_json::to_value(&known).unwrap_or(Value::Null);
            self.save(URLS.0, URLS.1, value);
        }
        added
    }

    /// Record cracked basic-auth credentials
    pub fn add_basic_auth(&self, credential: &BasicAuthCredential) {
        if let Ok(value) = serde_json::to_value(credential) {
            self.append(BASIC_AUTH.0, BASIC_AUTH.1, value);
        }
    }

    /// Basic-auth credentials recorded by bruteforce plugins
    pub fn basic_auth_credentials(&self) -> Vec<BasicAuthCredential> {
        self.get(BASIC_AUTH.0, BASIC_AUTH.1)
            .and_then(|value| serde_json::from_value(value).ok())
            .unwrap_or_default()
    }

    /// Record a finding under the reporting plugin's name
    pub fn add_finding(&self, finding: &Finding) {
        if let Ok(value) = serde_json::to_value(finding) {
            self.append(FINDINGS_NS, &finding.plugin, value);
        }
    }

    /// All findings, grouped by plugin name
    pub fn findings(&self) -> Vec<Finding> {
        let store = self.store.read().unwrap_or_else(|e| e.into_inner());
        let Some(by_plugin) = store.get(FINDINGS_NS) else {
            return Vec::new();
        };
        let mut plugins: Vec<&String> = by_plugin.keys().collect();
        plugins.sort();
        plugins
            .into_iter()
            .filter_map(|plugin| by_plugin.get(plugin)?.as_array())
            .flatten()
            .filter_map(|value| serde_json::from_value(value.clone()).ok())
            .collect()
    }
}
