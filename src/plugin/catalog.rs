//! Registry of plugin factories keyed by `(type, name)`

use super::{Plugin, PluginType};
use crate::error::{Error, Result};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Builds a fresh plugin instance
pub type PluginFactory = Arc<dyn Fn() -> Box<dyn Plugin> + Send + Sync>;

/// Every plugin the scanner can load
#[derive(Clone, Default)]
pub struct PluginCatalog {
    factories: BTreeMap<PluginType, BTreeMap<String, PluginFactory>>,
}

impl fmt::Debug for PluginCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (plugin_type, factories) in &self.factories {
            map.entry(plugin_type, &factories.keys().collect::<Vec<_>>());
        }
        map.finish()
    }
}

impl PluginCatalog {
    /// Empty catalog
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog with the plugins shipped with the crate
    pub fn with_builtins() -> Self {
        let mut catalog = Self::new();
        crate::plugins::register_builtins(&mut catalog);
        catalog
    }

    /// Register a factory, replacing any previous one with the same key
    pub fn register<F>(&mut self, plugin_type: PluginType, name: &str, factory: F)
    where
        F: Fn() -> Box<dyn Plugin> + Send + Sync + 'static,
    {
        self.factories
            .entry(plugin_type)
            .or_default()
            .insert(name.to_string(), Arc::new(factory));
    }

    /// Plugin names of a type, sorted
    pub fn list(&self, plugin_type: PluginType) -> Vec<String> {
        self.factories
            .get(&plugin_type)
            .map(|factories| factories.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Whether `(type, name)` is registered
    pub fn contains(&self, plugin_type: PluginType, name: &str) -> bool {
        self.factories
            .get(&plugin_type)
            .is_some_and(|factories| factories.contains_key(name))
    }

    /// Build a new instance of `(type, name)`
    pub fn instantiate(&self, plugin_type: PluginType, name: &str) -> Result<Box<dyn Plugin>> {
        let factory = self
            .factories
            .get(&plugin_type)
            .and_then(|factories| factories.get(name))
            .ok_or_else(|| Error::UnknownPlugin {
                plugin_type,
                name: name.to_string(),
            })?;
        Ok(factory())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Dummy(&'static str, PluginType);

    impl Plugin for Dummy {
        fn name(&self) -> &str {
            self.0
        }

        fn plugin_type(&self) -> PluginType {
            self.1
        }
    }

    #[test]
    fn list_is_sorted_per_type() {
        let mut catalog = PluginCatalog::new();
        for name in ["xss", "sqli", "os_commanding"] {
            catalog.register(PluginType::Audit, name, move || {
                Box::new(Dummy(name, PluginType::Audit))
            });
        }
        assert_eq!(
            catalog.list(PluginType::Audit),
            vec!["os_commanding", "sqli", "xss"]
        );
        assert!(catalog.list(PluginType::Discovery).is_empty());
    }

    #[test]
    fn instantiate_unknown_plugin_fails() {
        let catalog = PluginCatalog::new();
        let err = catalog.instantiate(PluginType::Grep, "nope").unwrap_err();
        assert_eq!(err.to_string(), "unknown plugin: grep.nope");
    }

    #[test]
    fn instantiate_builds_fresh_instances() {
        let mut catalog = PluginCatalog::new();
        catalog.register(PluginType::Grep, "a", || Box::new(Dummy("a", PluginType::Grep)));
        let plugin = catalog.instantiate(PluginType::Grep, "a").unwrap();
        assert_eq!(plugin.name(), "a");
        assert!(catalog.contains(PluginType::Grep, "a"));
    }

    #[test]
    fn builtins_are_registered() {
        let catalog = PluginCatalog::with_builtins();
        assert!(catalog.contains(PluginType::Discovery, "web_spider"));
        assert!(catalog.contains(PluginType::Discovery, "robots_txt"));
        assert!(catalog.contains(PluginType::Audit, "directory_listing"));
    }
}
