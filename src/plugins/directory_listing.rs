//! Directory indexing detection

use super::bound;
use crate::kb::{Finding, Severity};
use crate::not_found::is_404;
use crate::plugin::{Plugin, PluginContext, PluginOutput, PluginResult, PluginType};
use crate::request::FuzzableRequest;
use async_trait::async_trait;
use regex::Regex;
use std::collections::HashSet;
use tracing::debug;
use url::Url;

pub(super) const NAME: &str = "directory_listing";

/// Markers of auto-generated directory indexes (Apache, nginx, IIS, Python)
const INDEX_MARKERS: &str = r"(?i)<title>\s*Index of /|<h1>\s*Index of /|Directory listing for /|\[To Parent Directory\]";

/// Requests the directory of every request point and reports the ones
/// served as an auto-generated index
#[derive(Debug, Default)]
pub struct DirectoryListing {
    checked: HashSet<String>,
    context: Option<PluginContext>,
}

#[async_trait]
impl Plugin for DirectoryListing {
    fn name(&self) -> &str {
        NAME
    }

    fn plugin_type(&self) -> PluginType {
        PluginType::Audit
    }

    fn description(&self) -> &str {
        "Find directories with indexing enabled"
    }

    fn bind(&mut self, context: PluginContext) {
        self.context = Some(context);
    }

    async fn run(&mut self, request: &FuzzableRequest) -> PluginResult<PluginOutput> {
        let context = bound(&self.context, NAME)?.clone();
        let Some(directory) = directory_of(request.url()) else {
            return Ok(PluginOutput::none());
        };
        if !self.checked.insert(directory.to_string()) {
            return Ok(PluginOutput::none());
        }

        context.tasks.clone().spawn(async move {
            let response = match context.transport.get(&directory).await {
                Ok(response) => response,
                Err(e) => {
                    debug!("{}: request to {} failed: {}", NAME, directory, e);
                    return;
                }
            };
            if is_404(&context.kb, &response) || !is_index(&response.body) {
                return;
            }
            context.kb.add_finding(&Finding {
                plugin: NAME.to_string(),
                title: "Directory indexing".to_string(),
                url: directory.to_string(),
                severity: Severity::Low,
                description: format!(
                    "The URL \"{}\" has a directory indexing vulnerability.",
                    directory
                ),
            });
        });
        Ok(PluginOutput::none())
    }
}

/// The URL of the directory holding the requested resource
fn directory_of(url: &Url) -> Option<Url> {
    let mut directory = url.join("./").ok()?;
    directory.set_query(None);
    directory.set_fragment(None);
    Some(directory)
}

fn is_index(body: &str) -> bool {
    Regex::new(INDEX_MARKERS).is_ok_and(|markers| markers.is_match(body))
}
