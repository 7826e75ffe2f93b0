//! Crawler following links and forms of HTML pages

use super::bound;
use crate::error::PluginError;
use crate::not_found::is_404;
use crate::plugin::{Plugin, PluginContext, PluginOptions, PluginOutput, PluginResult, PluginType};
use crate::request::{FuzzableRequest, fuzzable_requests_from_response};
use async_trait::async_trait;
use scraper::{Html, Selector};
use serde_json::json;
use url::Url;

pub(super) const NAME: &str = "web_spider";

/// Elements and attributes holding followable URLs
const LINK_SOURCES: &[(&str, &str)] = &[
    ("a[href]", "href"),
    ("link[href]", "href"),
    ("frame[src]", "src"),
    ("iframe[src]", "src"),
    ("script[src]", "src"),
    ("img[src]", "src"),
];

/// Only follow links inside the crawled page's directory
const ONLY_FORWARD: &str = "only_forward";

/// Fetches each request point and returns the links and forms it exposes
#[derive(Debug, Default)]
pub struct WebSpider {
    only_forward: bool,
    context: Option<PluginContext>,
}

#[async_trait]
impl Plugin for WebSpider {
    fn name(&self) -> &str {
        NAME
    }

    fn plugin_type(&self) -> PluginType {
        PluginType::Discovery
    }

    fn description(&self) -> &str {
        "Follow the links and forms of every HTML page"
    }

    fn set_options(&mut self, options: &PluginOptions) -> PluginResult<()> {
        if let Some(value) = options.get(ONLY_FORWARD) {
            self.only_forward = value.as_bool().ok_or_else(|| PluginError::InvalidOption {
                name: ONLY_FORWARD.to_string(),
                reason: "expected a boolean".to_string(),
            })?;
        }
        Ok(())
    }

    fn options(&self) -> PluginOptions {
        let mut options = PluginOptions::new();
        options.insert(ONLY_FORWARD, json!(self.only_forward));
        options
    }

    fn bind(&mut self, context: PluginContext) {
        self.context = Some(context);
    }

    async fn run(&mut self, request: &FuzzableRequest) -> PluginResult<PluginOutput> {
        let context = bound(&self.context, NAME)?;
        let response = context.transport.send(request).await?;
        if is_404(&context.kb, &response) {
            return Ok(PluginOutput::none());
        }

        let mut found = fuzzable_requests_from_response(&response);
        if response.is_html() {
            found.extend(
                extract_links(&response.url, &response.body)
                    .into_iter()
                    .map(FuzzableRequest::get),
            );
        }
        if self.only_forward {
            found.retain(|candidate| is_forward(request.url(), candidate.url()));
        }
        Ok(PluginOutput::Requests(found))
    }
}

/// Absolute http(s) URLs referenced by an HTML document
fn extract_links(base: &Url, html: &str) -> Vec<Url> {
    let document = Html::parse_document(html);
    let mut links = Vec::new();
    for (selector, attribute) in LINK_SOURCES {
        let Ok(selector) = Selector::parse(selector) else {
            continue;
        };
        for element in document.select(&selector) {
            let Some(value) = element.value().attr(attribute) else {
                continue;
            };
            if let Ok(mut link) = base.join(value.trim())
                && matches!(link.scheme(), "http" | "https")
            {
                link.set_fragment(None);
                if !links.contains(&link) {
                    links.push(link);
                }
            }
        }
    }
    links
}

/// Whether `candidate` lives below the directory of `page`
fn is_forward(page: &Url, candidate: &Url) -> bool {
    if page.origin() != candidate.origin() {
        return false;
    }
    let directory = match page.path().rfind('/') {
        Some(index) => &page.path()[..=index],
        None => "/",
    };
    candidate.path().starts_with(directory)
}
