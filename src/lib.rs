//! scanflow - Web application scan orchestrator
//!
//! Resolves plugin dependencies, crawls targets with discovery plugins,
//! alternates discovery with credential bruteforce until nothing new is
//! found, then audits every request point.
//!
//! # Example
//!
//! ```no_run
//! use scanflow::{PluginType, Scan};
//!
//! #[tokio::main]
//! async fn main() -> scanflow::Result<()> {
//!     let mut scan = Scan::builder().build()?;
//!     scan.set_targets(&["https://example.com"])?;
//!     scan.set_plugins(PluginType::Discovery, &["web_spider", "robots_txt"]);
//!     scan.set_plugins(PluginType::Audit, &["all"]);
//!     scan.init_plugins()?;
//!     scan.start().await?;
//!     println!("{} findings", scan.report().findings.len());
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod export;
pub mod kb;
pub mod not_found;
pub mod output;
pub mod plugin;
pub mod plugins;
pub mod progress;
pub mod request;
pub mod scan;
pub mod session;
pub mod tasks;
pub mod transport;
pub mod worklist;

#[cfg(test)]
mod testing;

pub use config::{Credentials, HttpSettings, Profile, ScanConfig};
pub use error::{Error, PluginError, Result};
pub use kb::{Finding, KnowledgeBase, Severity};
pub use output::{OutputConfig, OutputFormat, OutputSort, ScanReport, output_report};
pub use plugin::{
    Plugin, PluginCatalog, PluginContext, PluginOptions, PluginOutput, PluginSelection, PluginType,
};
pub use request::FuzzableRequest;
pub use scan::{Scan, ScanBuilder, ScanHandle};
pub use session::{Phase, Session};
pub use transport::{HttpResponse, HttpTransport, SharedTransport, Transport};
pub use worklist::WorkList;
