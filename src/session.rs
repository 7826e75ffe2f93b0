//! Scan session: the state shared by the orchestrator and its engines
//!
//! The session owns the run/pause/stop flags, the phase and status fields,
//! and the collaborators every engine needs (transport, knowledge base,
//! progress observer, worker pool). It is passed by reference to the
//! engines and shared with [`ScanHandle`](crate::ScanHandle) for status
//! queries and operator control.

use crate::kb::KnowledgeBase;
use crate::plugin::PluginContext;
use crate::progress::ProgressObserver;
use crate::request::FuzzableRequest;
use crate::tasks::TaskManager;
use crate::transport::SharedTransport;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

/// Scan phase
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Phase {
    /// No phase running
    #[default]
    None,
    /// Crawling for request points
    Discovery,
    /// Cracking credentials
    Bruteforce,
    /// Testing request points
    Audit,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => Ok(()),
            Self::Discovery => write!(f, "discovery"),
            Self::Bruteforce => write!(f, "bruteforce"),
            Self::Audit => write!(f, "audit"),
        }
    }
}

/// Status fields updated while plugins run
#[derive(Debug, Clone, Default)]
struct ScanState {
    phase: Phase,
    running_plugin: Option<String>,
    current_request: Option<FuzzableRequest>,
    started: Option<Instant>,
    time_limit_hit: bool,
}

/// Shared state of one scan
pub struct Session {
    state: Mutex<ScanState>,
    running: AtomicBool,
    paused: AtomicBool,
    stopped: AtomicBool,
    transport: RwLock<SharedTransport>,
    kb: Arc<KnowledgeBase>,
    progress: Arc<dyn ProgressObserver>,
    tasks: TaskManager,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("state", &*self.state())
            .field("running", &self.is_running())
            .field("paused", &self.is_paused())
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

impl Session {
    /// Idle session: not running, not paused, stopped
    pub fn new(
        transport: SharedTransport,
        kb: Arc<KnowledgeBase>,
        progress: Arc<dyn ProgressObserver>,
        tasks: TaskManager,
    ) -> Self {
        Self {
            state: Mutex::new(ScanState::default()),
            running: AtomicBool::new(false),
            paused: AtomicBool::new(false),
            stopped: AtomicBool::new(true),
            transport: RwLock::new(transport),
            kb,
            progress,
            tasks,
        }
    }

    fn state(&self) -> MutexGuard<'_, ScanState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Knowledge base of the scan
    pub fn kb(&self) -> &Arc<KnowledgeBase> {
        &self.kb
    }

    /// Progress observer
    pub fn progress(&self) -> &dyn ProgressObserver {
        self.progress.as_ref()
    }

    /// Worker pool for plugin sub-work
    pub fn tasks(&self) -> &TaskManager {
        &self.tasks
    }

    /// Current transport
    pub fn transport(&self) -> SharedTransport {
        Arc::clone(&self.transport.read().unwrap_or_else(|e| e.into_inner()))
    }

    /// Swap in a fresh transport
    pub fn replace_transport(&self, transport: SharedTransport) {
        *self.transport.write().unwrap_or_else(|e| e.into_inner()) = transport;
    }

    /// Resources handed to plugins
    pub fn plugin_context(&self) -> PluginContext {
        PluginContext {
            transport: self.transport(),
            kb: Arc::clone(&self.kb),
            tasks: self.tasks.clone(),
        }
    }

    /// Enter the running state and start the scan clock
    pub fn mark_started(&self) {
        {
            let mut state = self.state();
            state.started = Some(Instant::now());
            state.time_limit_hit = false;
        }
        self.running.store(true, Ordering::SeqCst);
        self.paused.store(false, Ordering::SeqCst);
        self.stopped.store(false, Ordering::SeqCst);
    }

    /// Leave the running state
    pub fn mark_ended(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.stopped.store(true, Ordering::SeqCst);
    }

    /// Raise the stop flag polled by the discovery loop
    pub fn request_stop(&self) {
        debug!("The user stopped the core.");
        self.stopped.store(true, Ordering::SeqCst);
    }

    /// Pause or resume
    ///
    /// Only the transport holds requests back; plugins already running keep
    /// going until their next request.
    pub fn pause(&self, paused: bool) {
        self.paused.store(paused, Ordering::SeqCst);
        self.running.store(!paused, Ordering::SeqCst);
        self.stopped.store(false, Ordering::SeqCst);
        self.transport().pause(paused);
        debug!("The user paused/unpaused the scan.");
    }

    /// Whether the scan is running (and not paused)
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Whether the scan is paused
    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    /// Whether the scan is stopped (or never started)
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Enter a phase
    pub fn set_phase(&self, phase: Phase) {
        self.state().phase = phase;
    }

    /// Current phase
    pub fn phase(&self) -> Phase {
        self.state().phase
    }

    /// Record the plugin being run
    pub fn set_running_plugin(&self, name: &str) {
        debug!("Starting plugin: {}", name);
        self.state().running_plugin = Some(name.to_string());
    }

    /// Plugin being run
    pub fn running_plugin(&self) -> Option<String> {
        self.state().running_plugin.clone()
    }

    /// Record the request being worked on
    pub fn set_current_request(&self, request: &FuzzableRequest) {
        self.state().current_request = Some(request.clone());
    }

    /// Request being worked on
    pub fn current_request(&self) -> Option<FuzzableRequest> {
        self.state().current_request.clone()
    }

    /// Time since the scan started
    pub fn elapsed(&self) -> Duration {
        self.state()
            .started
            .map(|started| started.elapsed())
            .unwrap_or_default()
    }

    /// Time since the scan started, in minutes
    pub fn discovery_time(&self) -> f64 {
        self.elapsed().as_secs_f64() / 60.0
    }

    /// Whether the discovery budget is used up
    pub fn discovery_time_exceeded(&self, budget: Duration) -> bool {
        self.elapsed() > budget
    }

    /// Log the discovery time limit; `true` only the first time
    pub fn report_time_limit(&self) -> bool {
        let mut state = self.state();
        if state.time_limit_hit {
            return false;
        }
        state.time_limit_hit = true;
        info!("Maximum discovery time limit hit.");
        true
    }

    /// Whether the discovery time limit was reported
    pub fn time_limit_reported(&self) -> bool {
        self.state().time_limit_hit
    }

    /// Forget a previous time-limit report
    pub fn clear_time_limit(&self) {
        self.state().time_limit_hit = false;
    }

    /// One-line summary of what the scan is doing
    pub fn core_status(&self) -> String {
        if self.is_paused() {
            return "Paused.".to_string();
        }
        if self.is_stopped() {
            return "Not running.".to_string();
        }
        let state = self.state();
        match (&state.phase, &state.running_plugin) {
            (Phase::None, _) | (_, None) => "Starting scan.".to_string(),
            (phase, Some(plugin)) => {
                let request = state
                    .current_request
                    .as_ref()
                    .map(|r| r.to_string().replace('\0', ""))
                    .unwrap_or_default();
                format!("Running {}.{} on {}.", phase, plugin, request)
            }
        }
    }

    /// Scan duration as `1 hour 2 minutes 3 seconds.`
    pub fn elapsed_string(&self) -> String {
        format_elapsed(self.elapsed())
    }

    /// Back to the idle state; configuration lives elsewhere
    pub fn reset(&self) {
        *self.state() = ScanState::default();
        self.running.store(false, Ordering::SeqCst);
        self.paused.store(false, Ordering::SeqCst);
        self.stopped.store(true, Ordering::SeqCst);
    }
}

/// Format a duration in weeks, days, hours, minutes and seconds
pub fn format_elapsed(elapsed: Duration) -> String {
    let total = elapsed.as_secs();
    let (minutes, seconds) = (total / 60, total % 60);
    let (hours, minutes) = (minutes / 60, minutes % 60);
    let (days, hours) = (hours / 24, hours % 24);
    let (weeks, days) = (days / 7, days % 7);

    let parts: Vec<String> = [
        (weeks, "week"),
        (days, "day"),
        (hours, "hour"),
        (minutes, "minute"),
        (seconds, "second"),
    ]
    .into_iter()
    .filter(|(count, _)| *count > 0)
    .map(|(count, unit)| format!("{} {}{}", count, unit, if count > 1 { "s" } else { "" }))
    .collect();

    if parts.is_empty() {
        return "0 seconds.".to_string();
    }
    format!("{}.", parts.join(" "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::session;
    use url::Url;

    #[test]
    fn elapsed_formatting() {
        assert_eq!(format_elapsed(Duration::ZERO), "0 seconds.");
        assert_eq!(format_elapsed(Duration::from_millis(900)), "0 seconds.");
        assert_eq!(format_elapsed(Duration::from_secs(1)), "1 second.");
        assert_eq!(format_elapsed(Duration::from_secs(65)), "1 minute 5 seconds.");
        assert_eq!(format_elapsed(Duration::from_secs(7200)), "2 hours.");
        assert_eq!(
            format_elapsed(Duration::from_secs(8 * 86_400 + 3_601)),
            "1 week 1 day 1 hour 1 second."
        );
    }

    #[test]
    fn starts_idle() {
        let session = session();
        assert!(!session.is_running());
        assert!(session.is_stopped());
        assert!(!session.is_paused());
        assert_eq!(session.core_status(), "Not running.");
        assert_eq!(session.elapsed_string(), "0 seconds.");
    }

    #[tokio::test]
    async fn status_follows_the_running_plugin() {
        let session = session();
        session.mark_started();
        assert_eq!(session.core_status(), "Starting scan.");

        session.set_phase(Phase::Discovery);
        session.set_running_plugin("web_spider");
        session.set_current_request(&FuzzableRequest::get(Url::parse("http://a.com/").unwrap()));
        assert_eq!(
            session.core_status(),
            "Running discovery.web_spider on http://a.com/ | Method: GET."
        );
    }

    #[tokio::test]
    async fn pause_clears_running() {
        let session = session();
        session.mark_started();
        session.pause(true);
        assert!(session.is_paused());
        assert!(!session.is_running());
        assert_eq!(session.core_status(), "Paused.");
        session.pause(false);
        assert!(session.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn time_limit_reported_once() {
        let session = session();
        session.mark_started();
        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(session.discovery_time_exceeded(Duration::from_secs(60)));
        assert!(session.discovery_time() > 1.0);
        assert!(session.report_time_limit());
        assert!(!session.report_time_limit());
        session.clear_time_limit();
        assert!(!session.time_limit_reported());
    }

    #[tokio::test]
    async fn reset_returns_to_idle() {
        let session = session();
        session.mark_started();
        session.set_phase(Phase::Audit);
        session.reset();
        assert_eq!(session.phase(), Phase::None);
        assert!(session.is_stopped());
        assert!(session.running_plugin().is_none());
    }
}
