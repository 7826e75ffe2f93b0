use super::{Engine, end_plugin};
use crate::error::Result;
use crate::plugin::Plugin;
use crate::request::FuzzableRequest;
use crate::session::Phase;
use std::collections::VecDeque;
use tracing::debug;

impl Engine<'_> {
    /// Run each audit plugin over every request point
    ///
    /// Audit plugins are not kept after the phase: each one is ended right
    /// after its request loop and then dropped. Findings go to the
    /// knowledge base.
    pub async fn audit(&mut self, plugins: Vec<Box<dyn Plugin>>, requests: &[FuzzableRequest]) -> Result<()> {
        debug!("Called audit()");
        self.session.set_phase(Phase::Audit);
        self.session
            .progress()
            .set_total((plugins.len() * requests.len()) as u64);

        let mut queue: VecDeque<Box<dyn Plugin>> = plugins.into();
        while let Some(mut plugin) = queue.pop_front() {
            self.session.set_running_plugin(plugin.name());
            self.auth_login().await?;

            for request in requests {
                match self.invoke(plugin.as_mut(), request).await {
                    Ok(_) => {}
                    Err(err) if self.stopped_by(&err) => {
                        end_plugin(plugin.as_mut(), Phase::Audit);
                        return Ok(());
                    }
                    Err(err) => self.recover(Phase::Audit, plugin.name(), err)?,
                }
                self.session.progress().increment();
            }

            end_plugin(plugin.as_mut(), Phase::Audit);
        }
        Ok(())
    }
}
