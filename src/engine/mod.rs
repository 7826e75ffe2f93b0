//! Phase engines
//!
//! [`Engine`] runs the discovery, bruteforce and audit phases over the
//! plugins held for a scan. Plugins are invoked one request at a time and
//! the worker pool is joined after every invocation, so only one plugin's
//! sub-work is ever in flight.

mod audit;
mod bruteforce;
mod discovery;
mod fixed_point;

use crate::error::{Error, PluginError, Result};
use crate::plugin::{Plugin, PluginOutput, PluginResult, PluginTable, PluginType};
use crate::request::FuzzableRequest;
use crate::session::{Phase, Session};
use crate::worklist::Scope;
use std::time::Duration;
use tracing::error;

/// Runs the scan phases against one session
#[derive(Debug)]
pub struct Engine<'a> {
    session: &'a Session,
    plugins: &'a mut PluginTable,
    scope: &'a Scope,
    max_discovery_time: Duration,
}

impl<'a> Engine<'a> {
    /// Engine over the plugins held in `plugins`
    pub fn new(
        session: &'a Session,
        plugins: &'a mut PluginTable,
        scope: &'a Scope,
        max_discovery_time: Duration,
    ) -> Self {
        Self {
            session,
            plugins,
            scope,
            max_discovery_time,
        }
    }

    /// Run one plugin on one request, then wait for the sub-work it spawned
    async fn invoke(&self, plugin: &mut dyn Plugin, request: &FuzzableRequest) -> PluginResult<PluginOutput> {
        self.session.set_current_request(request);
        let result = plugin.run(request).await;
        self.session.tasks().join().await;
        result
    }

    /// Log a plugin failure; fatal ones abort the phase
    fn recover(&self, phase: Phase, plugin: &str, err: PluginError) -> Result<()> {
        match err {
            PluginError::Fatal(err) => Err(err),
            err => {
                error!(%phase, plugin, "{}", err);
                Ok(())
            }
        }
    }

    /// Whether a plugin failure comes from the scan being stopped
    fn stopped_by(&self, err: &PluginError) -> bool {
        self.session.is_stopped() || matches!(err, PluginError::Fatal(Error::ScanStopped))
    }

    /// Ask every auth plugin to log in again if its session was lost
    async fn auth_login(&mut self) -> Result<()> {
        for plugin in self.plugins.get_mut(PluginType::Auth).iter_mut() {
            if plugin.is_logged().await {
                continue;
            }
            if let Err(err) = plugin.login().await {
                match err {
                    PluginError::Fatal(err) => return Err(err),
                    err => error!(plugin = plugin.name(), "Login failed: {}", err),
                }
            }
        }
        Ok(())
    }
}

/// Retire a plugin, logging (not raising) what `end()` reports
pub(crate) fn end_plugin(plugin: &mut dyn Plugin, phase: Phase) {
    if let Err(err) = plugin.end() {
        error!(
            %phase,
            "The plugin \"{}\" raised an error in the end() method: {}",
            plugin.name(),
            err
        );
    }
}

/// End every plugin, returning the first failure
pub(crate) fn end_all(plugins: &mut [Box<dyn Plugin>]) -> Result<()> {
    let mut first = None;
    for plugin in plugins.iter_mut() {
        if let Err(err) = plugin.end() {
            error!(
                "The plugin \"{}\" raised an error in the end() method: {}",
                plugin.name(),
                err
            );
            first.get_or_insert(Error::PluginEnd {
                plugin: plugin.name().to_string(),
                source: Box::new(err),
            });
        }
    }
    first.map_or(Ok(()), Err)
}
