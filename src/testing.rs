//! Test doubles shared by the unit tests

use crate::error::{Error, PluginError, Result};
use crate::kb::KnowledgeBase;
use crate::plugin::{Plugin, PluginContext, PluginOptions, PluginOutput, PluginResult, PluginType};
use crate::progress::ProgressCounter;
use crate::request::FuzzableRequest;
use crate::session::Session;
use crate::tasks::TaskManager;
use crate::transport::{HttpResponse, SharedTransport, Transport};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use url::Url;

pub fn url(s: &str) -> Url {
    Url::parse(s).unwrap()
}

pub fn get(s: &str) -> FuzzableRequest {
    FuzzableRequest::get(url(s))
}

/// Transport answering from a table of canned responses
#[derive(Debug, Default)]
pub struct MockTransport {
    responses: Mutex<HashMap<String, (u16, String)>>,
    pub requests: Mutex<Vec<String>>,
    pub basic_auth: Mutex<Vec<(String, String, String)>>,
    pub paused: AtomicBool,
    pub stopped: AtomicBool,
    pub ended: AtomicBool,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(self, url: &str, status: u16, body: &str) -> Self {
        self.responses
            .lock()
            .unwrap()
            .insert(url.to_string(), (status, body.to_string()));
        self
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, request: &FuzzableRequest) -> Result<HttpResponse> {
        if self.stopped.load(Ordering::SeqCst) {
            return Err(Error::ScanStopped);
        }
        let mut target = request.url().clone();
        target.set_fragment(None);
        self.requests.lock().unwrap().push(target.to_string());
        let (status, body) = self
            .responses
            .lock()
            .unwrap()
            .get(target.as_str())
            .cloned()
            .ok_or_else(|| Error::HttpRequest(format!("connection refused: {}", target)))?;
        Ok(HttpResponse {
            url: target,
            status,
            headers: vec![("content-type".into(), "text/html".into())],
            body,
        })
    }

    fn set_basic_auth(&self, url: &Url, username: &str, password: &str) {
        self.basic_auth
            .lock()
            .unwrap()
            .push((url.to_string(), username.to_string(), password.to_string()));
    }

    fn pause(&self, paused: bool) {
        self.paused.store(paused, Ordering::SeqCst);
    }

    fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    fn end(&self) {
        self.ended.store(true, Ordering::SeqCst);
    }
}

pub fn context() -> PluginContext {
    PluginContext {
        transport: Arc::new(MockTransport::new()),
        kb: Arc::new(KnowledgeBase::new()),
        tasks: TaskManager::new(4),
    }
}

pub fn session() -> Session {
    session_with(Arc::new(MockTransport::new()))
}

pub fn session_with(transport: SharedTransport) -> Session {
    Session::new(
        transport,
        Arc::new(KnowledgeBase::new()),
        Arc::new(ProgressCounter::new()),
        TaskManager::new(4),
    )
}

/// Shared record of plugin calls: `name:url` per run, `name:end` per end
pub type CallLog = Arc<Mutex<Vec<String>>>;

type Hook = Arc<dyn Fn(&FuzzableRequest, Option<&PluginContext>) + Send + Sync>;

/// Scriptable plugin
#[derive(Clone)]
pub struct StubPlugin {
    plugin_type: PluginType,
    name: String,
    deps: Vec<String>,
    options: PluginOptions,
    outputs: HashMap<String, Vec<FuzzableRequest>>,
    run_once: bool,
    fail_on: Vec<String>,
    fatal: bool,
    fail_end: bool,
    logged_in: bool,
    delay: Option<Duration>,
    hook: Option<Hook>,
    log: CallLog,
    context: Option<PluginContext>,
}

impl StubPlugin {
    pub fn new(plugin_type: PluginType, name: &str) -> Self {
        Self {
            plugin_type,
            name: name.to_string(),
            deps: Vec::new(),
            options: PluginOptions::new(),
            outputs: HashMap::new(),
            run_once: false,
            fail_on: Vec::new(),
            fatal: false,
            fail_end: false,
            logged_in: true,
            delay: None,
            hook: None,
            log: CallLog::default(),
            context: None,
        }
    }

    pub fn depends_on(mut self, deps: &[&str]) -> Self {
        self.deps = deps.iter().map(|d| d.to_string()).collect();
        self
    }

    /// Return `produced` when invoked on `on`
    pub fn returns(mut self, on: &str, produced: Vec<FuzzableRequest>) -> Self {
        self.outputs.insert(url(on).to_string(), produced);
        self
    }

    pub fn run_once(mut self) -> Self {
        self.run_once = true;
        self
    }

    pub fn fail_on(mut self, on: &str) -> Self {
        self.fail_on.push(url(on).to_string());
        self
    }

    pub fn fatal(mut self) -> Self {
        self.fatal = true;
        self
    }

    pub fn fail_end(mut self) -> Self {
        self.fail_end = true;
        self
    }

    pub fn logged_out(mut self) -> Self {
        self.logged_in = false;
        self
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn on_run(
        mut self,
        hook: impl Fn(&FuzzableRequest, Option<&PluginContext>) + Send + Sync + 'static,
    ) -> Self {
        self.hook = Some(Arc::new(hook));
        self
    }

    pub fn log_to(mut self, log: &CallLog) -> Self {
        self.log = Arc::clone(log);
        self
    }

    fn record(&self, entry: String) {
        self.log.lock().unwrap().push(entry);
    }
}

#[async_trait]
impl Plugin for StubPlugin {
    fn name(&self) -> &str {
        &self.name
    }

    fn plugin_type(&self) -> PluginType {
        self.plugin_type
    }

    fn dependencies(&self) -> Vec<String> {
        self.deps.clone()
    }

    fn set_options(&mut self, options: &PluginOptions) -> PluginResult<()> {
        if options.get("invalid").is_some() {
            return Err(PluginError::InvalidOption {
                name: "invalid".into(),
                reason: "not supported".into(),
            });
        }
        self.options = options.clone();
        Ok(())
    }

    fn options(&self) -> PluginOptions {
        self.options.clone()
    }

    fn bind(&mut self, context: PluginContext) {
        self.context = Some(context);
    }

    async fn run(&mut self, request: &FuzzableRequest) -> PluginResult<PluginOutput> {
        let key = request.url().to_string();
        self.record(format!("{}:{}", self.name, key));
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(hook) = &self.hook {
            hook(request, self.context.as_ref());
        }
        if self.fatal {
            return Err(PluginError::Fatal(Error::TransportFatal("target unreachable".into())));
        }
        if self.fail_on.contains(&key) {
            return Err(PluginError::Recoverable(format!("{} failed on {}", self.name, key)));
        }
        if self.run_once {
            return Ok(PluginOutput::RunOnce);
        }
        Ok(PluginOutput::Requests(
            self.outputs.get(&key).cloned().unwrap_or_default(),
        ))
    }

    async fn is_logged(&self) -> bool {
        self.logged_in
    }

    async fn login(&mut self) -> PluginResult<()> {
        self.record(format!("{}:login", self.name));
        self.logged_in = true;
        Ok(())
    }

    fn end(&mut self) -> PluginResult<()> {
        self.record(format!("{}:end", self.name));
        if self.fail_end {
            return Err(PluginError::Recoverable("end failed".into()));
        }
        Ok(())
    }
}
