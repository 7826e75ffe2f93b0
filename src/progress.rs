//! Operator-visible progress of the running phase

use std::fmt;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::Instant;

/// Receives work-unit counts from the engines
pub trait ProgressObserver: Send + Sync + fmt::Debug {
    /// Announce the amount of work in the current step
    fn set_total(&self, total: u64);

    /// One unit of work finished
    fn increment(&self);

    /// The phase is over
    fn stop(&self);
}

/// Counter-based progress observer
#[derive(Debug, Default)]
pub struct ProgressCounter {
    total: AtomicU64,
    done: AtomicU64,
    running: AtomicBool,
    started: Mutex<Option<Instant>>,
}

impl ProgressCounter {
    /// Idle counter
    pub fn new() -> Self {
        Self::default()
    }

    /// Announced work units
    pub fn total(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }

    /// Finished work units
    pub fn done(&self) -> u64 {
        self.done.load(Ordering::Relaxed)
    }

    /// Whether a step is in progress
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Completion percentage of the current step, 0 to 100
    pub fn percent(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            return 0.0;
        }
        (self.done().min(total) as f64 / total as f64) * 100.0
    }

    /// Estimated time left, extrapolated from the work done so far
    pub fn eta(&self) -> Option<Duration> {
        let started = (*self.started.lock().unwrap_or_else(|e| e.into_inner()))?;
        let done = self.done();
        let total = self.total();
        if done == 0 || done >= total {
            return None;
        }
        let per_unit = started.elapsed().as_secs_f64() / done as f64;
        Some(Duration::from_secs_f64(per_unit * (total - done) as f64))
    }
}

impl ProgressObserver for ProgressCounter {
    fn set_total(&self, total: u64) {
        self.total.store(total, Ordering::Relaxed);
        self.done.store(0, Ordering::Relaxed);
        self.running.store(true, Ordering::Relaxed);
        *self.started.lock().unwrap_or_else(|e| e.into_inner()) = Some(Instant::now());
    }

    fn increment(&self) {
        self.done.fetch_add(1, Ordering::Relaxed);
    }

    fn stop(&self) {
        self.running.store(false, Ordering::Relaxed);
    }
}
