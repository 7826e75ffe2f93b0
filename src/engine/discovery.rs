use super::{Engine, end_plugin};
use crate::error::Result;
use crate::plugin::{Plugin, PluginOutput, PluginType};
use crate::request::FuzzableRequest;
use crate::session::Phase;
use crate::worklist::WorkList;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info};

impl Engine<'_> {
    /// Crawl from `seed` until no discovery plugin finds anything new
    ///
    /// Returns every request point visited, the seed included. When the
    /// stop flag is raised the points visited so far are returned at once.
    pub async fn discover(&mut self, seed: WorkList) -> Result<WorkList> {
        debug!("Called discover()");
        self.session.set_phase(Phase::Discovery);

        let mut plugins = self.plugins.take(PluginType::Discovery);
        let result = self.discover_worker(&mut plugins, seed).await;
        if result.is_ok() {
            // They won't be used anymore
            for plugin in plugins.iter_mut() {
                end_plugin(plugin.as_mut(), Phase::Discovery);
            }
        }
        self.plugins.set(PluginType::Discovery, plugins);
        result
    }

    async fn discover_worker(&mut self, plugins: &mut Vec<Box<dyn Plugin>>, seed: WorkList) -> Result<WorkList> {
        let mut visited = seed.clone();
        let mut to_walk = seed.into_vec();

        while !to_walk.is_empty() {
            self.session
                .progress()
                .set_total((plugins.len() * to_walk.len()) as u64);

            let mut retired: Vec<usize> = Vec::new();
            let mut found: BTreeMap<String, Vec<FuzzableRequest>> = BTreeMap::new();

            for (index, plugin) in plugins.iter_mut().enumerate() {
                if self.session.is_stopped() {
                    return Ok(visited);
                }
                self.auth_login().await?;

                if self.time_exceeded() {
                    break;
                }

                self.session.set_running_plugin(plugin.name());
                for request in &to_walk {
                    // Results gathered before the limit are kept
                    if self.time_exceeded() {
                        break;
                    }

                    match self.invoke(plugin.as_mut(), request).await {
                        Ok(PluginOutput::Requests(requests)) => found
                            .entry(plugin.name().to_string())
                            .or_default()
                            .extend(requests),
                        Ok(PluginOutput::RunOnce) => {
                            if !retired.contains(&index) {
                                retired.push(index);
                            }
                        }
                        // A request cut short by a stop ends the phase like the checkpoint below
                        Err(err) if self.stopped_by(&err) => return Ok(visited),
                        Err(err) => self.recover(Phase::Discovery, plugin.name(), err)?,
                    }
                    debug!("Ending plugin: {}", plugin.name());
                    self.session.progress().increment();

                    if self.session.is_stopped() {
                        return Ok(visited);
                    }
                }
            }

            to_walk = self.collect_new(found, &mut visited);

            for index in retired.into_iter().rev() {
                let mut plugin = plugins.remove(index);
                debug!("The discovery plugin: {} wont be run anymore.", plugin.name());
                end_plugin(plugin.as_mut(), Phase::Discovery);
            }
        }

        Ok(visited)
    }

    /// Report the time limit the first time it is exceeded
    fn time_exceeded(&self) -> bool {
        if !self.session.discovery_time_exceeded(self.max_discovery_time) {
            return false;
        }
        self.session.report_time_limit();
        true
    }

    /// Keep the in-scope candidates not visited yet and register their URLs
    fn collect_new(
        &self,
        found: BTreeMap<String, Vec<FuzzableRequest>>,
        visited: &mut WorkList,
    ) -> Vec<FuzzableRequest> {
        let mut new_requests = Vec::new();
        for (plugin, candidates) in found {
            let mut urls = BTreeSet::new();
            for mut candidate in candidates {
                candidate.strip_fragment();
                if visited.insert_in_scope(candidate.clone(), self.scope) {
                    urls.insert(candidate.url().to_string());
                    new_requests.push(candidate);
                }
            }
            for url in urls {
                info!("New URL found by {} plugin: {}", plugin, url);
            }
        }

        self.session
            .kb()
            .add_urls(new_requests.iter().map(FuzzableRequest::url));
        new_requests
    }
}
