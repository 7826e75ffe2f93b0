//! Error types for scanflow

use crate::plugin::PluginType;
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while configuring or running a scan
#[derive(Debug, Error)]
pub enum Error {
    /// Bad dependency declaration, missing dependency or invalid environment
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Lifecycle methods called in the wrong order
    #[error("lifecycle error: {0}")]
    Lifecycle(String),

    /// The plugin ordering invariant was violated
    #[error(
        "internal consistency fault while ordering {plugin_type} plugins: ordered [{}] != requested [{}]",
        .ordered.join(", "),
        .requested.join(", ")
    )]
    InternalConsistency {
        /// Plugin type being ordered
        plugin_type: PluginType,
        /// Names produced by the ordering step
        ordered: Vec<String>,
        /// Names that were requested
        requested: Vec<String>,
    },

    /// Unrecoverable transport condition, aborts the scan
    #[error("transport fatal error: {0}")]
    TransportFatal(String),

    /// The operator stopped the scan
    #[error("the scan was stopped by the user")]
    ScanStopped,

    /// Plugin not present in the catalog
    #[error("unknown plugin: {plugin_type}.{name}")]
    UnknownPlugin {
        /// Requested plugin type
        plugin_type: PluginType,
        /// Requested plugin name
        name: String,
    },

    /// Plugin type string not recognized
    #[error("invalid plugin type: '{0}'")]
    InvalidPluginType(String),

    /// A plugin failed while being ended during teardown
    #[error("the plugin \"{plugin}\" raised an error in end(): {source}")]
    PluginEnd {
        /// Plugin name
        plugin: String,
        /// Underlying plugin error
        #[source]
        source: Box<PluginError>,
    },

    /// Invalid URL provided
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    /// Failed to create HTTP client
    #[error("failed to create HTTP client: {0}")]
    HttpClient(String),

    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    HttpRequest(String),

    /// HTTP response error status
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),

    /// Profile could not be read, parsed or written
    #[error("profile error: {0}")]
    Profile(String),

    /// Scan-scoped temporary directory could not be managed
    #[error("temporary directory error: {0}")]
    TempDir(#[source] std::io::Error),

    /// Invalid output format specified
    #[error("invalid output format: '{0}' (valid: human, json, none)")]
    InvalidOutputFormat(String),

    /// Invalid output sort order specified
    #[error("invalid output sort: '{0}' (valid: severity, plugin, url)")]
    InvalidOutputSort(String),

    /// Output operation failed
    #[error("output failed: {0}")]
    OutputFailed(#[source] std::io::Error),

    /// Fuzzable request export failed
    #[error("export failed: {0}")]
    ExportFailed(#[source] csv::Error),

    /// JSON serialization failed
    #[error("JSON serialization failed")]
    SerializationFailed(#[from] serde_json::Error),
}

impl Error {
    /// Whether this error must abort the running scan
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::TransportFatal(_) | Self::ScanStopped)
    }
}

/// Errors reported by a plugin while handling one request
#[derive(Debug, Error)]
pub enum PluginError {
    /// A single plugin/request failure; logged and the loop continues
    #[error("{0}")]
    Recoverable(String),

    /// A failure that must abort the scan
    #[error(transparent)]
    Fatal(Error),

    /// The plugin rejected one of its options
    #[error("invalid option '{name}': {reason}")]
    InvalidOption {
        /// Option name
        name: String,
        /// Why the value was rejected
        reason: String,
    },
}

impl From<Error> for PluginError {
    fn from(err: Error) -> Self {
        if err.is_fatal() {
            Self::Fatal(err)
        } else {
            Self::Recoverable(err.to_string())
        }
    }
}
