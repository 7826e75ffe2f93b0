//! robots.txt reader

use super::bound;
use crate::kb::{Finding, Severity};
use crate::not_found::is_404;
use crate::plugin::{Plugin, PluginContext, PluginOutput, PluginResult, PluginType};
use crate::request::FuzzableRequest;
use async_trait::async_trait;
use regex::Regex;
use tracing::debug;
use url::Url;

pub(super) const NAME: &str = "robots_txt";

/// Reads `/robots.txt` once and returns the paths it lists
#[derive(Debug, Default)]
pub struct RobotsTxt {
    done: bool,
    context: Option<PluginContext>,
}

#[async_trait]
impl Plugin for RobotsTxt {
    fn name(&self) -> &str {
        NAME
    }

    fn plugin_type(&self) -> PluginType {
        PluginType::Discovery
    }

    fn description(&self) -> &str {
        "Request the paths listed in robots.txt"
    }

    fn bind(&mut self, context: PluginContext) {
        self.context = Some(context);
    }

    async fn run(&mut self, request: &FuzzableRequest) -> PluginResult<PluginOutput> {
        if self.done {
            return Ok(PluginOutput::RunOnce);
        }
        self.done = true;

        let context = bound(&self.context, NAME)?;
        let Ok(robots) = request.url().join("/robots.txt") else {
            return Ok(PluginOutput::none());
        };
        let response = context.transport.get(&robots).await?;
        if is_404(&context.kb, &response) {
            debug!("No robots.txt at {}", robots);
            return Ok(PluginOutput::none());
        }

        let paths = listed_paths(&robots, &response.body);
        if !paths.is_empty() {
            context.kb.add_finding(&Finding {
                plugin: NAME.to_string(),
                title: "robots.txt file".to_string(),
                url: robots.to_string(),
                severity: Severity::Information,
                description: format!("The robots.txt file lists {} paths.", paths.len()),
            });
        }

        let mut found = vec![FuzzableRequest::get(robots)];
        found.extend(paths.into_iter().map(FuzzableRequest::get));
        Ok(PluginOutput::Requests(found))
    }
}

/// URLs of the `Allow`/`Disallow` entries, wildcards cut off
fn listed_paths(robots: &Url, body: &str) -> Vec<Url> {
    let Ok(rule) = Regex::new(r"(?im)^[ \t]*(?:dis)?allow[ \t]*:[ \t]*(\S+)") else {
        return Vec::new();
    };
    let mut paths: Vec<Url> = Vec::new();
    for capture in rule.captures_iter(body) {
        let path = capture[1].split(['*', '$']).next().unwrap_or_default();
        if path.is_empty() {
            continue;
        }
        if let Ok(url) = robots.join(path)
            && !paths.contains(&url)
        {
            paths.push(url);
        }
    }
    paths
}
