//! Plugin dependency resolution and ordering
//!
//! Expands a requested plugin list of one type, pulls in the plugins it
//! depends on and orders it so that dependencies always run first.

use super::{Plugin, PluginCatalog, PluginContext, PluginRef, PluginSelection, PluginTable, PluginType};
use crate::error::{Error, Result};
use tracing::{error, info};

/// Selects every plugin of a type
const WILDCARD: &str = "all";

/// Prefix excluding a plugin from a wildcard selection
const NEGATION: char = '!';

/// Traversal state of one plugin while ordering
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    New,
    Active,
    Done,
}

/// Turns requested plugin names into ordered, configured instances
#[derive(Debug)]
pub struct DependencyResolver<'a> {
    catalog: &'a PluginCatalog,
    context: &'a PluginContext,
    auto_dependencies: bool,
}

impl<'a> DependencyResolver<'a> {
    /// Create a resolver over a catalog
    pub fn new(catalog: &'a PluginCatalog, context: &'a PluginContext, auto_dependencies: bool) -> Self {
        Self {
            catalog,
            context,
            auto_dependencies,
        }
    }

    /// Expand `all` and `!name` entries against the catalog
    ///
    /// Order of first appearance is kept and duplicates are dropped.
    pub fn expand(&self, plugin_type: PluginType, requested: &[String]) -> Vec<String> {
        let excluded: Vec<&str> = requested
            .iter()
            .filter_map(|name| name.strip_prefix(NEGATION))
            .collect();

        let mut expanded: Vec<String> = Vec::new();
        for name in requested {
            let names = if name == WILDCARD {
                self.catalog.list(plugin_type)
            } else if name.starts_with(NEGATION) {
                continue;
            } else {
                vec![name.clone()]
            };
            for name in names {
                if !excluded.contains(&name.as_str()) && !expanded.contains(&name) {
                    expanded.push(name);
                }
            }
        }
        expanded
    }

    /// Resolve the enabled plugins of `plugin_type`
    ///
    /// Same-type dependencies are added to the request (or rejected when
    /// auto-resolution is off). Cross-type dependencies are enabled in
    /// `selection` and `table` and moved ahead of the other plugins of
    /// their type. The returned instances are ordered, configured and
    /// bound to the scan context.
    pub fn resolve(
        &self,
        plugin_type: PluginType,
        selection: &mut PluginSelection,
        table: &mut PluginTable,
    ) -> Result<Vec<Box<dyn Plugin>>> {
        let literal = selection.enabled(plugin_type).to_vec();
        let mut requested = self.expand(plugin_type, &literal);
        let mut changed = literal.iter().any(|name| name == WILDCARD);

        // Worklist over `requested`: dependencies appended while walking are
        // visited by the same loop.
        let mut instances: Vec<Box<dyn Plugin>> = Vec::with_capacity(requested.len());
        let mut index = 0;
        while index < requested.len() {
            let plugin = self.catalog.instantiate(plugin_type, &requested[index])?;
            for declared in plugin.dependencies() {
                let dependency = parse_dependency(plugin.name(), &declared)?;
                if dependency.plugin_type != plugin_type {
                    self.require_cross_type(plugin.name(), &dependency, selection, table)?;
                } else if !requested.contains(&dependency.name) {
                    self.require_same_type(plugin.name(), &dependency)?;
                    requested.push(dependency.name);
                    changed = true;
                }
            }
            instances.push(plugin);
            index += 1;
        }

        if changed {
            selection.set_enabled(plugin_type, requested.clone());
        }

        let mut ordered = order(plugin_type, instances)?;
        check_ordering(plugin_type, &ordered, &requested)?;

        for plugin in &mut ordered {
            self.configure(plugin.as_mut(), selection)?;
        }
        Ok(ordered)
    }

    fn require_same_type(&self, dependent: &str, dependency: &PluginRef) -> Result<()> {
        if !self.auto_dependencies {
            return Err(missing_dependency(dependent, dependency));
        }
        if !self.catalog.contains(dependency.plugin_type, &dependency.name) {
            return Err(unknown_dependency(dependent, dependency));
        }
        info!("Auto-enabling plugin: {}", dependency);
        Ok(())
    }

    fn require_cross_type(
        &self,
        dependent: &str,
        dependency: &PluginRef,
        selection: &mut PluginSelection,
        table: &mut PluginTable,
    ) -> Result<()> {
        let enabled = self.expand(dependency.plugin_type, selection.enabled(dependency.plugin_type));
        if enabled.contains(&dependency.name) {
            // Plugins others depend on run first within their own type
            selection.promote(dependency.plugin_type, &dependency.name);
            table.promote(dependency.plugin_type, &dependency.name);
            return Ok(());
        }

        if !self.auto_dependencies {
            return Err(missing_dependency(dependent, dependency));
        }

        let mut plugin = self
            .catalog
            .instantiate(dependency.plugin_type, &dependency.name)
            .map_err(|_| unknown_dependency(dependent, dependency))?;
        self.configure(plugin.as_mut(), selection)?;
        if !table.contains(dependency.plugin_type, &dependency.name) {
            table.insert_front(plugin);
        }
        selection.promote(dependency.plugin_type, &dependency.name);
        info!("Auto-enabling plugin: {}", dependency);
        Ok(())
    }

    /// Apply stored options and bind the scan context
    fn configure(&self, plugin: &mut dyn Plugin, selection: &PluginSelection) -> Result<()> {
        if let Some(options) = selection.options(plugin.plugin_type(), plugin.name()) {
            plugin.set_options(options).map_err(|e| {
                Error::Configuration(format!(
                    "Invalid options for plugin \"{}.{}\": {}",
                    plugin.plugin_type(),
                    plugin.name(),
                    e
                ))
            })?;
        }
        plugin.bind(self.context.clone());
        Ok(())
    }
}

fn parse_dependency(dependent: &str, declared: &str) -> Result<PluginRef> {
    PluginRef::parse(declared).ok_or_else(|| {
        Error::Configuration(format!(
            "Plugin dependencies must be indicated using pluginType.pluginName notation. \
             This is an error in {}.dependencies().",
            dependent
        ))
    })
}

fn missing_dependency(dependent: &str, dependency: &PluginRef) -> Error {
    Error::Configuration(format!(
        "Plugin \"{}\" depends on plugin \"{}\" and \"{}\" is not enabled.",
        dependent, dependency, dependency
    ))
}

fn unknown_dependency(dependent: &str, dependency: &PluginRef) -> Error {
    Error::Configuration(format!(
        "Plugin \"{}\" depends on plugin \"{}\" which does not exist.",
        dependent, dependency
    ))
}

/// Order plugins so each one follows its same-type dependencies
///
/// Depth-first over the requested order with an explicit stack: a plugin
/// without dependencies keeps its position, a plugin with dependencies is
/// emitted right after them.
fn order(plugin_type: PluginType, plugins: Vec<Box<dyn Plugin>>) -> Result<Vec<Box<dyn Plugin>>> {
    let names: Vec<String> = plugins.iter().map(|p| p.name().to_string()).collect();
    let edges: Vec<Vec<usize>> = plugins
        .iter()
        .map(|plugin| {
            plugin
                .dependencies()
                .iter()
                .filter_map(|declared| PluginRef::parse(declared))
                .filter(|dependency| dependency.plugin_type == plugin_type)
                .filter_map(|dependency| names.iter().position(|n| *n == dependency.name))
                .collect()
        })
        .collect();

    let mut marks = vec![Mark::New; plugins.len()];
    let mut sequence = Vec::with_capacity(plugins.len());
    for root in 0..plugins.len() {
        if marks[root] != Mark::New {
            continue;
        }
        marks[root] = Mark::Active;
        let mut stack = vec![(root, 0usize)];
        while let Some(top) = stack.last_mut() {
            let node = top.0;
            let next = edges[node].get(top.1).copied();
            top.1 += 1;
            match next {
                Some(dep) => match marks[dep] {
                    Mark::New => {
                        marks[dep] = Mark::Active;
                        stack.push((dep, 0));
                    }
                    Mark::Active => {
                        let cycle: Vec<&str> = stack
                            .iter()
                            .skip_while(|(i, _)| *i != dep)
                            .map(|(i, _)| names[*i].as_str())
                            .chain(std::iter::once(names[dep].as_str()))
                            .collect();
                        return Err(Error::Configuration(format!(
                            "Circular dependency between {} plugins: {}",
                            plugin_type,
                            cycle.join(" -> ")
                        )));
                    }
                    Mark::Done => {}
                },
                None => {
                    marks[node] = Mark::Done;
                    sequence.push(node);
                    stack.pop();
                }
            }
        }
    }

    let mut slots: Vec<Option<Box<dyn Plugin>>> = plugins.into_iter().map(Some).collect();
    Ok(sequence
        .into_iter()
        .filter_map(|index| slots[index].take())
        .collect())
}

/// The ordered list must hold exactly the requested plugins
fn check_ordering(plugin_type: PluginType, ordered: &[Box<dyn Plugin>], requested: &[String]) -> Result<()> {
    if ordered.len() == requested.len() {
        return Ok(());
    }

    let ordered: Vec<String> = ordered.iter().map(|p| p.name().to_string()).collect();
    error!(
        "The ordered plugin list length is not equal to the requested plugin list. \
         The error was found sorting plugins of type: {}.",
        plugin_type
    );
    error!("Ordered plugins:");
    for name in &ordered {
        error!("- {}", name);
    }
    error!("Requested plugins:");
    for name in requested {
        error!("- {}", name);
    }

    Err(Error::InternalConsistency {
        plugin_type,
        ordered,
        requested: requested.to_vec(),
    })
}
