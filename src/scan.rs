//! Scan lifecycle
//!
//! [`Scan`] owns the configuration, the plugin selection and the plugin
//! instances of one scan. It resolves the plugins, bootstraps the targets,
//! drives the discovery/bruteforce loop and the audit phase, and always
//! tears the scan down. A [`ScanHandle`] lets another task pause, stop or
//! watch a running scan.

use crate::config::{Profile, ScanConfig};
use crate::engine::{Engine, end_all};
use crate::error::{Error, Result};
use crate::export::export_fuzzable_requests;
use crate::kb::KnowledgeBase;
use crate::not_found;
use crate::output::ScanReport;
use crate::plugin::{
    DependencyResolver, Plugin, PluginCatalog, PluginOptions, PluginSelection, PluginTable,
    PluginType,
};
use crate::progress::{ProgressCounter, ProgressObserver};
use crate::request::{FuzzableRequest, fuzzable_requests_from_response};
use crate::session::{Phase, Session};
use crate::tasks::TaskManager;
use crate::transport::{HttpTransport, TransportFactory};
use crate::worklist::{Scope, WorkList};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tracing::{debug, error, info, warn};
use url::Url;

/// Plugin types resolved and held for the whole scan
const HELD_TYPES: [PluginType; 6] = [
    PluginType::Output,
    PluginType::Discovery,
    PluginType::Bruteforce,
    PluginType::Grep,
    PluginType::Mangle,
    PluginType::Auth,
];

/// Builder for [`Scan`]
pub struct ScanBuilder {
    catalog: PluginCatalog,
    config: ScanConfig,
    transport_factory: Option<TransportFactory>,
    progress: Option<Arc<dyn ProgressObserver>>,
}

impl Default for ScanBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ScanBuilder {
    /// Builder with the built-in plugins, default settings and the reqwest transport
    pub fn new() -> Self {
        Self {
            catalog: PluginCatalog::with_builtins(),
            config: ScanConfig::default(),
            transport_factory: None,
            progress: None,
        }
    }

    /// Use another plugin catalog
    pub fn catalog(mut self, catalog: PluginCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    /// Set the scan settings
    pub fn config(mut self, config: ScanConfig) -> Self {
        self.config = config;
        self
    }

    /// Produce transports with this factory instead of [`HttpTransport`]
    pub fn transport_factory(mut self, factory: TransportFactory) -> Self {
        self.transport_factory = Some(factory);
        self
    }

    /// Report progress to this observer
    pub fn progress(mut self, progress: Arc<dyn ProgressObserver>) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Create the scan
    pub fn build(self) -> Result<Scan> {
        let custom_transport = self.transport_factory.is_some();
        let transport_factory = self
            .transport_factory
            .unwrap_or_else(|| HttpTransport::factory(self.config.http.clone()));
        let progress = self
            .progress
            .unwrap_or_else(|| Arc::new(ProgressCounter::new()));

        let session = Session::new(
            transport_factory()?,
            Arc::new(KnowledgeBase::new()),
            progress,
            TaskManager::new(self.config.max_workers),
        );

        Ok(Scan {
            session: Arc::new(session),
            catalog: self.catalog,
            config: self.config,
            selection: PluginSelection::default(),
            plugins: PluginTable::default(),
            fuzzable_requests: Vec::new(),
            scanned: Vec::new(),
            initialized: false,
            transport_factory,
            custom_transport,
            temp_dir: None,
        })
    }
}

/// Control surface of a scan, usable from other tasks
#[derive(Debug, Clone)]
pub struct ScanHandle {
    session: Arc<Session>,
}

impl ScanHandle {
    /// Pause or resume the scan
    pub fn pause(&self, paused: bool) {
        self.session.pause(paused);
    }

    /// Stop the scan; the running `start()` tears it down and returns
    pub fn stop(&self) {
        self.session.request_stop();
        self.session.transport().stop();
    }

    /// One-line status
    pub fn status(&self) -> String {
        self.session.core_status()
    }

    /// Whether the scan is running
    pub fn is_running(&self) -> bool {
        self.session.is_running()
    }

    /// Current phase
    pub fn phase(&self) -> Phase {
        self.session.phase()
    }

    /// Scan duration so far
    pub fn elapsed_string(&self) -> String {
        self.session.elapsed_string()
    }
}

/// One web application scan
pub struct Scan {
    session: Arc<Session>,
    catalog: PluginCatalog,
    config: ScanConfig,
    selection: PluginSelection,
    plugins: PluginTable,
    fuzzable_requests: Vec<FuzzableRequest>,
    scanned: Vec<Url>,
    initialized: bool,
    transport_factory: TransportFactory,
    custom_transport: bool,
    temp_dir: Option<TempDir>,
}

impl std::fmt::Debug for Scan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scan")
            .field("session", &self.session)
            .field("config", &self.config)
            .field("selection", &self.selection)
            .field("plugins", &self.plugins)
            .field("initialized", &self.initialized)
            .finish()
    }
}

impl Scan {
    /// Builder with the built-in plugins
    pub fn builder() -> ScanBuilder {
        ScanBuilder::new()
    }

    /// Handle for pausing, stopping and watching the scan from another task
    pub fn handle(&self) -> ScanHandle {
        ScanHandle {
            session: Arc::clone(&self.session),
        }
    }

    /// Shared scan state
    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    /// Knowledge base of the scan
    pub fn kb(&self) -> &Arc<KnowledgeBase> {
        self.session.kb()
    }

    /// Scan settings
    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    /// Mutable scan settings
    pub fn config_mut(&mut self) -> &mut ScanConfig {
        &mut self.config
    }

    /// Parse and set the target URLs
    pub fn set_targets<S: AsRef<str>>(&mut self, targets: &[S]) -> Result<()> {
        self.config.set_targets(targets)
    }

    // Plugin selection

    /// Names of the plugins of a type the catalog knows
    pub fn plugin_list(&self, plugin_type: PluginType) -> Vec<String> {
        self.catalog.list(plugin_type)
    }

    /// Every plugin type
    pub fn plugin_types(&self) -> Vec<PluginType> {
        PluginType::ALL.to_vec()
    }

    /// Enable plugins of a type, replacing the previous selection
    ///
    /// Duplicates are dropped. `all` and `!name` are accepted. Returns the
    /// names the catalog does not know; those are not enabled.
    pub fn set_plugins<S: AsRef<str>>(&mut self, plugin_type: PluginType, names: &[S]) -> Vec<String> {
        let known = self.catalog.list(plugin_type);
        let mut enabled: Vec<String> = Vec::new();
        let mut unknown: Vec<String> = Vec::new();
        for name in names {
            let name = name.as_ref().trim();
            let base = name.strip_prefix('!').unwrap_or(name);
            if name != "all" && !known.iter().any(|k| k == base) {
                if !unknown.iter().any(|u| u == name) {
                    unknown.push(name.to_string());
                }
            } else if !enabled.iter().any(|e| e == name) {
                enabled.push(name.to_string());
            }
        }
        self.selection.set_enabled(plugin_type, enabled);
        unknown
    }

    /// Names enabled for a type, as set (may contain `all` and `!name`)
    pub fn enabled_plugins(&self, plugin_type: PluginType) -> &[String] {
        self.selection.enabled(plugin_type)
    }

    /// Store options for a plugin after checking them on a fresh instance
    pub fn set_plugin_options(&mut self, plugin_type: PluginType, name: &str, options: PluginOptions) -> Result<()> {
        let mut plugin = self.catalog.instantiate(plugin_type, name)?;
        plugin.set_options(&options).map_err(|e| {
            Error::Configuration(format!(
                "Invalid options for plugin \"{}.{}\": {}",
                plugin_type, name, e
            ))
        })?;
        self.selection.set_options(plugin_type, name, options);
        Ok(())
    }

    /// Stored options of a plugin
    pub fn plugin_options(&self, plugin_type: PluginType, name: &str) -> Option<&PluginOptions> {
        self.selection.options(plugin_type, name)
    }

    /// A new instance of a plugin with its stored options applied
    pub fn plugin_instance(&self, plugin_type: PluginType, name: &str) -> Result<Box<dyn Plugin>> {
        let mut plugin = self.catalog.instantiate(plugin_type, name)?;
        if let Some(options) = self.selection.options(plugin_type, name) {
            plugin
                .set_options(options)
                .map_err(|e| Error::Configuration(e.to_string()))?;
        }
        Ok(plugin)
    }

    /// The current plugin selection
    pub fn selection(&self) -> &PluginSelection {
        &self.selection
    }

    // Profiles

    /// Apply a profile's targets, settings and plugin selection
    ///
    /// Unknown plugins and invalid options are logged and skipped.
    pub fn use_profile(&mut self, profile: &Profile) -> Result<()> {
        let http_changed = profile.settings.http != self.config.http;
        self.config = ScanConfig {
            targets: Vec::new(),
            ..profile.settings.clone()
        };
        self.config.set_targets(&profile.targets)?;

        for plugin_type in PluginType::ALL {
            let unknown = self.set_plugins(plugin_type, &profile.enabled_plugins(plugin_type));
            for name in unknown {
                warn!(
                    "The profile \"{}\" references the unknown plugin: {}.{}",
                    profile.name, plugin_type, name
                );
            }
            let Some(section) = profile.plugins.get(plugin_type.as_str()) else {
                continue;
            };
            for (name, options) in &section.options {
                if let Err(e) = self.set_plugin_options(plugin_type, name, options.clone()) {
                    warn!("Ignoring profile options of {}.{}: {}", plugin_type, name, e);
                }
            }
        }

        if http_changed && !self.custom_transport {
            self.transport_factory = HttpTransport::factory(self.config.http.clone());
            self.session.replace_transport((self.transport_factory)()?);
        }
        debug!("Using profile \"{}\"", profile.name);
        Ok(())
    }

    /// The current setup as a profile
    pub fn to_profile(&self, name: &str, description: &str) -> Profile {
        let mut profile = Profile::new(name, description);
        profile.targets = self.config.targets.iter().map(Url::to_string).collect();
        profile.settings = self.config.clone();
        profile.set_selection(&self.selection);
        profile
    }

    /// Write the current setup to a profile file
    pub fn save_current_to_profile(&self, path: &Path, name: &str, description: &str) -> Result<Profile> {
        let profile = self.to_profile(name, description);
        profile.save(path)?;
        Ok(profile)
    }

    // Lifecycle

    /// Resolve, order, configure and bind the enabled plugins
    ///
    /// Audit plugins are only checked here; they are resolved again when
    /// the audit phase starts.
    pub fn init_plugins(&mut self) -> Result<()> {
        self.plugins.clear();
        let context = self.session.plugin_context();
        let resolver = DependencyResolver::new(&self.catalog, &context, self.config.auto_dependencies);

        for plugin_type in HELD_TYPES {
            let mut plugins = resolver.resolve(plugin_type, &mut self.selection, &mut self.plugins)?;
            // Cross-type dependencies may already have put instances here
            for held in self.plugins.take(plugin_type) {
                if !plugins.iter().any(|p| p.name() == held.name()) {
                    plugins.insert(0, held);
                }
            }
            if plugin_type == PluginType::Output && !plugins.is_empty() {
                let names: Vec<&str> = plugins.iter().map(|p| p.name()).collect();
                debug!("Output plugins: {}", names.join(", "));
            }
            self.plugins.set(plugin_type, plugins);
        }
        resolver.resolve(PluginType::Audit, &mut self.selection, &mut self.plugins)?;

        self.initialized = true;
        Ok(())
    }

    /// Check the scan can start
    pub fn verify_environment(&self) -> Result<()> {
        if !self.initialized {
            return Err(Error::Lifecycle(
                "You must call the initPlugins method before calling start()".to_string(),
            ));
        }
        if self.config.targets.is_empty() {
            return Err(Error::Configuration("No target URI configured.".to_string()));
        }
        let runnable = [PluginType::Audit, PluginType::Grep, PluginType::Discovery]
            .into_iter()
            .any(|t| self.selection.any_enabled(t));
        if !runnable {
            return Err(Error::Configuration(
                "No audit, grep or discovery plugins configured to run.".to_string(),
            ));
        }
        Ok(())
    }

    /// Run the scan to completion
    ///
    /// The scan is always torn down, whatever the outcome. A scan stopped
    /// by the operator returns `Ok`.
    pub async fn start(&mut self) -> Result<()> {
        self.verify_environment()?;
        self.session.mark_started();
        self.scanned = self.config.targets.clone();
        self.fuzzable_requests.clear();
        if self.temp_dir.is_none() {
            self.temp_dir = Some(
                tempfile::Builder::new()
                    .prefix("scanflow-")
                    .tempdir()
                    .map_err(Error::TempDir)?,
            );
        }

        let result = match self.run().await {
            Err(Error::ScanStopped) => Ok(()),
            other => other,
        };
        if let Err(e) = &result {
            error!("{}", e);
        }

        let ended = self.end().await;
        info!("Scan finished in {}", self.session.elapsed_string());
        self.session.progress().stop();
        result.and(ended)
    }

    async fn run(&mut self) -> Result<()> {
        let scope = Scope::new(self.config.targets.iter());
        let seed = self.bootstrap(&scope).await?;

        let budget = Duration::from_secs(self.config.max_discovery_time.saturating_mul(60));
        let discovered = {
            let mut engine = Engine::new(&self.session, &mut self.plugins, &scope, budget);
            engine.discover_and_bruteforce(seed).await?
        };
        self.fuzzable_requests = discovered.into_vec();

        if let Some(path) = &self.config.export_fuzzable_requests {
            export_fuzzable_requests(path, &self.fuzzable_requests)?;
        }

        if self.fuzzable_requests.is_empty() {
            info!("No URLs found during discovery phase.");
            return Ok(());
        }

        // Not needed anymore
        self.plugins.take(PluginType::Discovery);
        self.plugins.take(PluginType::Bruteforce);
        self.log_discovery_results();

        if self.session.is_stopped() {
            return Ok(());
        }

        let context = self.session.plugin_context();
        let resolver = DependencyResolver::new(&self.catalog, &context, self.config.auto_dependencies);
        let audit = resolver.resolve(PluginType::Audit, &mut self.selection, &mut self.plugins)?;
        if audit.is_empty() {
            return Ok(());
        }
        let mut engine = Engine::new(&self.session, &mut self.plugins, &scope, budget);
        engine.audit(audit, &self.fuzzable_requests).await
    }

    /// Fetch every target and seed the work list with what it exposes
    async fn bootstrap(&self, scope: &Scope) -> Result<WorkList> {
        let transport = self.session.transport();
        let kb = self.session.kb();
        let mut seed = WorkList::new();

        for target in &self.config.targets {
            if let Some(credentials) = &self.config.http.basic_auth {
                transport.set_basic_auth(target, &credentials.username, &credentials.password);
            }
            match transport.get(target).await {
                Ok(response) => {
                    for request in fuzzable_requests_from_response(&response) {
                        seed.insert_in_scope(request, scope);
                    }
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    error!("The target URL: {} is unreachable.", target);
                    debug!("{}", e);
                    continue;
                }
            }

            match not_found::learn(transport.as_ref(), kb, target).await {
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => debug!("Could not learn the 404 page of {}: {}", target, e),
                Ok(()) => {}
            }
        }

        kb.add_urls(seed.iter().map(FuzzableRequest::url));
        Ok(seed)
    }

    fn log_discovery_results(&self) {
        let mut urls: Vec<String> = self.kb().urls().iter().map(Url::to_string).collect();
        urls.sort();
        let mut requests: Vec<String> = self.fuzzable_requests.iter().map(|r| r.to_string()).collect();
        requests.sort();

        info!(
            "Found {} URLs and {} different points of injection.",
            urls.len(),
            requests.len()
        );
        info!("The list of URLs is:");
        for url in &urls {
            info!("- {}", url);
        }
        info!("The list of fuzzable requests is:");
        for request in &requests {
            info!("- {}", request);
        }
    }

    /// Tear the scan down
    ///
    /// The transport is replaced by a fresh one so the scan can be run
    /// again. The running flags and the targets are reset whatever fails.
    async fn end(&mut self) -> Result<()> {
        self.session.transport().end();
        match (self.transport_factory)() {
            Ok(transport) => self.session.replace_transport(transport),
            Err(e) => error!("Could not create a new transport: {}", e),
        }
        self.session.progress().stop();
        self.session.tasks().shutdown().await;

        let grep = end_all(self.plugins.get_mut(PluginType::Grep));
        let output = end_all(self.plugins.get_mut(PluginType::Output));
        self.plugins.clear();
        self.initialized = false;

        self.session.mark_ended();
        self.session.set_phase(Phase::None);
        self.config.targets.clear();
        grep.and(output)
    }

    /// Pause or resume
    pub fn pause(&self, paused: bool) {
        self.session.pause(paused);
    }

    /// Stop the scan and tear it down, ignoring teardown errors
    pub async fn stop(&mut self) {
        self.session.request_stop();
        self.session.transport().stop();
        if let Err(e) = self.end().await {
            debug!("Ignoring error while stopping the scan: {}", e);
        }
    }

    /// Stop the transport and remove the scan's temporary files
    pub fn quit(&mut self) -> Result<()> {
        self.session.request_stop();
        self.session.transport().stop();
        if let Some(dir) = self.temp_dir.take() {
            dir.close().map_err(Error::TempDir)?;
        }
        Ok(())
    }

    /// Forget everything the last scan learned
    ///
    /// Settings, plugin selection and plugin options are kept.
    pub fn cleanup(&mut self) {
        self.kb().cleanup();
        self.session.reset();
        self.plugins.clear();
        self.fuzzable_requests.clear();
        self.scanned.clear();
        self.initialized = false;
    }

    // Status

    /// Whether the scan is running
    pub fn is_running(&self) -> bool {
        self.session.is_running()
    }

    /// One-line status
    pub fn status(&self) -> String {
        self.session.core_status()
    }

    /// Scan duration
    pub fn elapsed_string(&self) -> String {
        self.session.elapsed_string()
    }

    /// Scan-scoped temporary directory, once the scan started
    pub fn temp_dir(&self) -> Option<&Path> {
        self.temp_dir.as_ref().map(TempDir::path)
    }

    /// Request points found by the last scan
    pub fn fuzzable_requests(&self) -> &[FuzzableRequest] {
        &self.fuzzable_requests
    }

    /// What the last scan found
    pub fn report(&self) -> ScanReport {
        let mut urls: Vec<String> = self.kb().urls().iter().map(Url::to_string).collect();
        urls.sort();
        ScanReport {
            targets: self.scanned.iter().map(Url::to_string).collect(),
            elapsed: self.session.elapsed_string(),
            urls,
            fuzzable_requests: self.fuzzable_requests.clone(),
            findings: self.kb().findings(),
        }
    }
}
