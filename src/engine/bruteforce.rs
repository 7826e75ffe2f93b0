use super::{Engine, end_plugin};
use crate::error::Result;
use crate::plugin::{Plugin, PluginOutput, PluginType};
use crate::request::FuzzableRequest;
use crate::session::Phase;
use tracing::{debug, info};

impl Engine<'_> {
    /// Run every bruteforce plugin over `requests`
    ///
    /// Returns the authenticated request points the plugins produced, in
    /// plugin order.
    pub async fn bruteforce(&mut self, requests: &[FuzzableRequest]) -> Result<Vec<FuzzableRequest>> {
        debug!("Called bruteforce()");
        self.session.set_phase(Phase::Bruteforce);

        let mut plugins = self.plugins.take(PluginType::Bruteforce);
        let result = self.bruteforce_worker(&mut plugins, requests).await;
        self.plugins.set(PluginType::Bruteforce, plugins);
        result
    }

    async fn bruteforce_worker(
        &mut self,
        plugins: &mut [Box<dyn Plugin>],
        requests: &[FuzzableRequest],
    ) -> Result<Vec<FuzzableRequest>> {
        self.session
            .progress()
            .set_total((plugins.len() * requests.len()) as u64);

        let mut cracked = Vec::new();
        for plugin in plugins.iter_mut() {
            info!("Starting {} plugin execution.", plugin.name());
            self.session.set_running_plugin(plugin.name());

            for request in requests {
                match self.invoke(plugin.as_mut(), request).await {
                    Ok(PluginOutput::Requests(found)) => cracked.extend(found),
                    Ok(PluginOutput::RunOnce) => {}
                    Err(err) if self.stopped_by(&err) => {
                        end_plugin(plugin.as_mut(), Phase::Bruteforce);
                        return Ok(cracked);
                    }
                    Err(err) => self.recover(Phase::Bruteforce, plugin.name(), err)?,
                }
                // One test done, whatever the outcome
                self.session.progress().increment();
            }

            end_plugin(plugin.as_mut(), Phase::Bruteforce);
        }
        Ok(cracked)
    }
}
