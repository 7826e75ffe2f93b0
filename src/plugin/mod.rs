//! Plugin model
//!
//! Every unit of scan behavior implements [`Plugin`]. Plugins are looked up
//! by `(type, name)` in a [`PluginCatalog`], ordered by the
//! [`DependencyResolver`] and owned by the engine that runs them.

pub mod catalog;
pub mod resolver;

pub use catalog::{PluginCatalog, PluginFactory};
pub use resolver::DependencyResolver;

use crate::error::{Error, PluginError};
use crate::kb::KnowledgeBase;
use crate::request::FuzzableRequest;
use crate::tasks::TaskManager;
use crate::transport::SharedTransport;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Result of a plugin operation
pub type PluginResult<T> = std::result::Result<T, PluginError>;

/// Plugin families
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PluginType {
    /// Crawl and find new request points
    Discovery,
    /// Crack credentials and return authenticated request points
    Bruteforce,
    /// Test request points for vulnerabilities
    Audit,
    /// Passively inspect traffic
    Grep,
    /// Rewrite requests and responses
    Mangle,
    /// Evade intrusion detection
    Evasion,
    /// Keep the scan logged in
    Auth,
    /// Report results
    Output,
}

impl PluginType {
    /// Every plugin type
    pub const ALL: [PluginType; 8] = [
        Self::Discovery,
        Self::Bruteforce,
        Self::Audit,
        Self::Grep,
        Self::Mangle,
        Self::Evasion,
        Self::Auth,
        Self::Output,
    ];

    /// Lower-case type name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Discovery => "discovery",
            Self::Bruteforce => "bruteforce",
            Self::Audit => "audit",
            Self::Grep => "grep",
            Self::Mangle => "mangle",
            Self::Evasion => "evasion",
            Self::Auth => "auth",
            Self::Output => "output",
        }
    }
}

impl fmt::Display for PluginType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PluginType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| Error::InvalidPluginType(s.to_string()))
    }
}

/// A `type.name` plugin reference, as used in dependency declarations
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PluginRef {
    /// Plugin type
    pub plugin_type: PluginType,
    /// Plugin name
    pub name: String,
}

impl PluginRef {
    /// Parse `type.name`; `None` unless there are exactly two non-empty
    /// parts and the type is known
    pub fn parse(s: &str) -> Option<Self> {
        let (plugin_type, name) = s.split_once('.')?;
        if name.is_empty() || name.contains('.') {
            return None;
        }
        Some(Self {
            plugin_type: plugin_type.parse().ok()?,
            name: name.to_string(),
        })
    }
}

impl fmt::Display for PluginRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.plugin_type, self.name)
    }
}

/// Named option values of one plugin
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PluginOptions(BTreeMap<String, Value>);

impl PluginOptions {
    /// Empty option set
    pub fn new() -> Self {
        Self::default()
    }

    /// Set an option
    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        self.0.insert(name.into(), value);
    }

    /// Raw option value
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    /// String option
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name)?.as_str()
    }

    /// Boolean option
    pub fn get_bool(&self, name: &str) -> Option<bool> {
        self.get(name)?.as_bool()
    }

    /// Unsigned integer option
    pub fn get_u64(&self, name: &str) -> Option<u64> {
        self.get(name)?.as_u64()
    }

    /// Whether no option is set
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate options by name
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }
}

/// Shared scan resources handed to each plugin before it runs
#[derive(Debug, Clone)]
pub struct PluginContext {
    /// Request transport shared by the whole scan
    pub transport: SharedTransport,
    /// Knowledge base for the current scan
    pub kb: Arc<KnowledgeBase>,
    /// Bounded pool for sub-work spawned during one invocation
    pub tasks: TaskManager,
}

/// What a plugin invocation produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PluginOutput {
    /// Candidate requests (new points for discovery, authenticated
    /// variants for bruteforce, nothing for audit)
    Requests(Vec<FuzzableRequest>),
    /// The plugin has done its work and must not be invoked again
    RunOnce,
}

impl PluginOutput {
    /// No new requests
    pub fn none() -> Self {
        Self::Requests(Vec::new())
    }
}

/// Capability interface implemented by every plugin
#[async_trait]
pub trait Plugin: Send + Sync {
    /// Plugin name, unique within its type
    fn name(&self) -> &str;

    /// Plugin family
    fn plugin_type(&self) -> PluginType;

    /// One-line description
    fn description(&self) -> &str {
        ""
    }

    /// Plugins that must run before this one, as `type.name` strings
    fn dependencies(&self) -> Vec<String> {
        Vec::new()
    }

    /// Apply an option set
    fn set_options(&mut self, _options: &PluginOptions) -> PluginResult<()> {
        Ok(())
    }

    /// Current option values
    fn options(&self) -> PluginOptions {
        PluginOptions::new()
    }

    /// Attach the shared scan resources
    fn bind(&mut self, _context: PluginContext) {}

    /// Handle one request
    async fn run(&mut self, _request: &FuzzableRequest) -> PluginResult<PluginOutput> {
        Ok(PluginOutput::none())
    }

    /// Auth plugins: whether the session is still logged in
    async fn is_logged(&self) -> bool {
        true
    }

    /// Auth plugins: log in
    async fn login(&mut self) -> PluginResult<()> {
        Ok(())
    }

    /// Release resources once the plugin is retired
    fn end(&mut self) -> PluginResult<()> {
        Ok(())
    }
}

impl fmt::Debug for dyn Plugin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.plugin_type(), self.name())
    }
}

/// Plugin names enabled per type plus stored options per plugin
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PluginSelection {
    enabled: HashMap<PluginType, Vec<String>>,
    options: HashMap<PluginType, BTreeMap<String, PluginOptions>>,
}

impl PluginSelection {
    /// Enabled names for a type (may contain `all` and `!name`)
    pub fn enabled(&self, plugin_type: PluginType) -> &[String] {
        self.enabled
            .get(&plugin_type)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Replace the enabled names of a type
    pub fn set_enabled(&mut self, plugin_type: PluginType, names: Vec<String>) {
        self.enabled.insert(plugin_type, names);
    }

    /// Whether `name` is literally listed for the type
    pub fn is_enabled(&self, plugin_type: PluginType, name: &str) -> bool {
        self.enabled(plugin_type).iter().any(|n| n == name)
    }

    /// Move `name` to the front of the type's list, adding it if missing
    pub fn promote(&mut self, plugin_type: PluginType, name: &str) {
        let names = self.enabled.entry(plugin_type).or_default();
        names.retain(|n| n != name);
        names.insert(0, name.to_string());
    }

    /// Whether any plugin of the type is enabled
    pub fn any_enabled(&self, plugin_type: PluginType) -> bool {
        !self.enabled(plugin_type).is_empty()
    }

    /// Stored options of one plugin
    pub fn options(&self, plugin_type: PluginType, name: &str) -> Option<&PluginOptions> {
        self.options.get(&plugin_type)?.get(name)
    }

    /// Store options for one plugin
    pub fn set_options(&mut self, plugin_type: PluginType, name: &str, options: PluginOptions) {
        self.options
            .entry(plugin_type)
            .or_default()
            .insert(name.to_string(), options);
    }
}

/// Plugin instances held for the duration of a scan, per type
#[derive(Default)]
pub struct PluginTable {
    plugins: BTreeMap<PluginType, Vec<Box<dyn Plugin>>>,
}

impl fmt::Debug for PluginTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (plugin_type, plugins) in &self.plugins {
            let names: Vec<&str> = plugins.iter().map(|p| p.name()).collect();
            map.entry(plugin_type, &names);
        }
        map.finish()
    }
}

impl PluginTable {
    /// Instances of a type, in run order
    pub fn get(&self, plugin_type: PluginType) -> &[Box<dyn Plugin>] {
        self.plugins
            .get(&plugin_type)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Mutable instances of a type
    pub fn get_mut(&mut self, plugin_type: PluginType) -> &mut Vec<Box<dyn Plugin>> {
        self.plugins.entry(plugin_type).or_default()
    }

    /// Names of a type, in run order
    pub fn names(&self, plugin_type: PluginType) -> Vec<String> {
        self.get(plugin_type)
            .iter()
            .map(|p| p.name().to_string())
            .collect()
    }

    /// Whether an instance named `name` is held
    pub fn contains(&self, plugin_type: PluginType, name: &str) -> bool {
        self.get(plugin_type).iter().any(|p| p.name() == name)
    }

    /// Put a new instance in front of its type
    pub fn insert_front(&mut self, plugin: Box<dyn Plugin>) {
        self.get_mut(plugin.plugin_type()).insert(0, plugin);
    }

    /// Move an existing instance to the front of its type
    pub fn promote(&mut self, plugin_type: PluginType, name: &str) {
        let plugins = self.get_mut(plugin_type);
        if let Some(index) = plugins.iter().position(|p| p.name() == name) {
            let plugin = plugins.remove(index);
            plugins.insert(0, plugin);
        }
    }

    /// Replace the instances of a type
    pub fn set(&mut self, plugin_type: PluginType, plugins: Vec<Box<dyn Plugin>>) {
        self.plugins.insert(plugin_type, plugins);
    }

    /// Remove and return the instances of a type
    pub fn take(&mut self, plugin_type: PluginType) -> Vec<Box<dyn Plugin>> {
        self.plugins.remove(&plugin_type).unwrap_or_default()
    }

    /// Drop every instance
    pub fn clear(&mut self) {
        self.plugins.clear();
    }
}
