//! HTTP transport shared by the engine and every plugin
//!
//! The engine only relies on the [`Transport`] trait. [`HttpTransport`] is
//! the reqwest-backed default: it blocks new requests while the scan is
//! paused, aborts queued and in-flight requests once stopped and injects
//! basic-auth credentials found during the scan. Too many connection
//! failures in a row turn into [`Error::TransportFatal`].

use crate::config::HttpSettings;
use crate::error::{Error, Result};
use crate::request::FuzzableRequest;
use async_trait::async_trait;
use reqwest::Client;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::watch;
use tracing::debug;
use url::Url;

/// Shared handle to the scan transport
pub type SharedTransport = Arc<dyn Transport>;

/// Builds a fresh transport; used at scan end to replace the closed one
pub type TransportFactory = Arc<dyn Fn() -> Result<SharedTransport> + Send + Sync>;

/// A received HTTP response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// Final URL (after redirects)
    pub url: Url,
    /// Status code
    pub status: u16,
    /// Response headers, names lower-cased
    pub headers: Vec<(String, String)>,
    /// Decoded body
    pub body: String,
}

impl HttpResponse {
    /// First header value with the given (case-insensitive) name
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Whether the body is an HTML document
    pub fn is_html(&self) -> bool {
        match self.header("content-type") {
            Some(content_type) => content_type.contains("html"),
            None => self.body.trim_start().starts_with('<'),
        }
    }
}

/// Request execution contract consumed by the engine
#[async_trait]
pub trait Transport: Send + Sync + fmt::Debug {
    /// Send a fuzzable request
    async fn send(&self, request: &FuzzableRequest) -> Result<HttpResponse>;

    /// GET a URL
    async fn get(&self, url: &Url) -> Result<HttpResponse> {
        self.send(&FuzzableRequest::get(url.clone())).await
    }

    /// Use basic-auth credentials for every request to the URL's origin
    fn set_basic_auth(&self, url: &Url, username: &str, password: &str);

    /// Block (or release) new outbound requests
    fn pause(&self, paused: bool);

    /// Abort queued and in-flight requests; later requests fail
    fn stop(&self);

    /// Release resources held for the scan
    fn end(&self);
}

/// reqwest-backed transport
pub struct HttpTransport {
    client: Client,
    headers: Vec<(String, String)>,
    credentials: RwLock<HashMap<String, (String, String)>>,
    max_errors: u32,
    errors: AtomicU32,
    paused: watch::Sender<bool>,
    stopped: watch::Sender<bool>,
}

impl fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpTransport")
            .field("paused", &*self.paused.borrow())
            .field("stopped", &*self.stopped.borrow())
            .field("errors", &self.errors.load(Ordering::SeqCst))
            .finish()
    }
}

impl HttpTransport {
    /// Create a transport from the HTTP settings
    pub fn new(settings: &HttpSettings) -> Result<Self> {
        let client = Client::builder()
            .user_agent(settings.user_agent.as_str())
            .timeout(Duration::from_secs(settings.timeout_secs))
            .cookie_store(true)
            .danger_accept_invalid_certs(false)
            .build()
            .map_err(|e| Error::HttpClient(e.to_string()))?;

        Ok(Self {
            client,
            headers: settings
                .headers
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            credentials: RwLock::new(HashMap::new()),
            max_errors: settings.max_consecutive_errors,
            errors: AtomicU32::new(0),
            paused: watch::channel(false).0,
            stopped: watch::channel(false).0,
        })
    }

    /// Factory producing fresh transports with the same settings
    pub fn factory(settings: HttpSettings) -> TransportFactory {
        Arc::new(move || Ok(Arc::new(HttpTransport::new(&settings)?) as SharedTransport))
    }

    /// Whether new requests are currently held back
    pub fn is_paused(&self) -> bool {
        *self.paused.borrow()
    }

    /// Whether the transport was stopped
    pub fn is_stopped(&self) -> bool {
        *self.stopped.borrow()
    }

    fn credentials_for(&self, url: &Url) -> Option<(String, String)> {
        let credentials = self.credentials.read().unwrap_or_else(|e| e.into_inner());
        credentials.get(&url.origin().ascii_serialization()).cloned()
    }

    /// Count a failed request; a target that keeps refusing is gone
    fn failed(&self, err: reqwest::Error) -> Error {
        if !(err.is_connect() || err.is_timeout()) {
            return Error::HttpRequest(err.to_string());
        }
        let count = self.errors.fetch_add(1, Ordering::SeqCst) + 1;
        if self.max_errors > 0 && count >= self.max_errors {
            return Error::TransportFatal(format!(
                "{} requests in a row failed, last error: {}",
                count, err
            ));
        }
        Error::HttpRequest(err.to_string())
    }

    async fn wait_while_paused(&self) -> Result<()> {
        tokio::select! {
            _ = wait_until(self.paused.subscribe(), false) => Ok(()),
            _ = wait_until(self.stopped.subscribe(), true) => Err(Error::ScanStopped),
        }
    }

    async fn execute(&self, request: &FuzzableRequest) -> Result<HttpResponse> {
        let mut builder = match request.method() {
            "POST" => self.client.post(request.url().as_str()).form(request.params()),
            method => {
                let method = reqwest::Method::from_bytes(method.as_bytes())
                    .map_err(|e| Error::HttpRequest(e.to_string()))?;
                self.client.request(method, request.url().as_str())
            }
        };
        for (name, value) in self.headers.iter().chain(request.headers()) {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some((username, password)) = self.credentials_for(request.url()) {
            builder = builder.basic_auth(username, Some(password));
        }

        let response = builder.send().await.map_err(|e| self.failed(e))?;
        self.errors.store(0, Ordering::SeqCst);

        let url = response.url().clone();
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                Some((name.as_str().to_ascii_lowercase(), value.to_str().ok()?.to_string()))
            })
            .collect();
        let body = response
            .text()
            .await
            .map_err(|e| Error::HttpRequest(e.to_string()))?;

        Ok(HttpResponse {
            url,
            status,
            headers,
            body,
        })
    }
}

/// Resolve once the watched flag equals `expected`
async fn wait_until(mut flag: watch::Receiver<bool>, expected: bool) {
    let _ = flag.wait_for(|value| *value == expected).await;
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: &FuzzableRequest) -> Result<HttpResponse> {
        self.wait_while_paused().await?;
        if self.is_stopped() {
            return Err(Error::ScanStopped);
        }

        tokio::select! {
            response = self.execute(request) => response,
            _ = wait_until(self.stopped.subscribe(), true) => Err(Error::ScanStopped),
        }
    }

    fn set_basic_auth(&self, url: &Url, username: &str, password: &str) {
        debug!("Using basic authentication credentials for {}", url);
        self.credentials
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(
                url.origin().ascii_serialization(),
                (username.to_string(), password.to_string()),
            );
    }

    fn pause(&self, paused: bool) {
        self.paused.send_replace(paused);
    }

    fn stop(&self) {
        self.stopped.send_replace(true);
    }

    fn end(&self) {
        self.stop();
        self.credentials
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }
}
