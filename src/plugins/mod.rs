//! Plugins shipped with the scanner

mod directory_listing;
mod robots_txt;
mod web_spider;

pub use directory_listing::DirectoryListing;
pub use robots_txt::RobotsTxt;
pub use web_spider::WebSpider;

use crate::error::{Error, PluginError};
use crate::plugin::{PluginCatalog, PluginContext, PluginType};

/// Add the built-in plugins to a catalog
pub fn register_builtins(catalog: &mut PluginCatalog) {
    catalog.register(PluginType::Discovery, web_spider::NAME, || {
        Box::new(WebSpider::default())
    });
    catalog.register(PluginType::Discovery, robots_txt::NAME, || {
        Box::new(RobotsTxt::default())
    });
    catalog.register(PluginType::Audit, directory_listing::NAME, || {
        Box::new(DirectoryListing::default())
    });
}

/// The bound context, or an error naming the plugin that was never bound
fn bound<'a>(context: &'a Option<PluginContext>, plugin: &str) -> Result<&'a PluginContext, PluginError> {
    context
        .as_ref()
        .ok_or_else(|| PluginError::Fatal(Error::Lifecycle(format!("plugin {} used before bind()", plugin))))
}
