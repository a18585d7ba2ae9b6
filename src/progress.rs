// src/progress.rs

//! Progress reporting and cooperative cancellation
//!
//! Planning and execution poll a [`ProgressMonitor`] at fixed checkpoints
//! (per candidate while assembling the pool, per operand inside each phase).
//! Cancellation is polling only: a monitor reports `is_cancelled()` and the
//! core stops at the next checkpoint.
//!
//! Implementations:
//! - `NullMonitor`: no output, optional cancel token
//! - `LogMonitor`: reports through tracing
//! - `CallbackMonitor`: forwards [`ProgressEvent`]s to a closure
//! - `SubMonitor`: maps a child's work onto a fixed slice of its parent

use std::sync::Arc;
use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tracing::info;

/// Core trait for progress and cancellation
///
/// Implementations must be thread-safe; the caller may cancel from another
/// thread while the core works.
pub trait ProgressMonitor: Send + Sync {
    /// Start a task with a known amount of work
    fn begin_task(&self, name: &str, total_work: u64);

    /// Record completed work
    fn worked(&self, amount: u64);

    /// Describe the current step
    fn set_message(&self, message: &str);

    /// Whether the caller asked to stop
    fn is_cancelled(&self) -> bool;

    /// Mark the task finished
    fn done(&self);
}

/// Shared cancellation flag
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Monitor that reports nothing
#[derive(Debug, Default)]
pub struct NullMonitor {
    token: CancelToken,
}

impl NullMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Observe an external cancel token
    pub fn with_token(token: CancelToken) -> Self {
        Self { token }
    }
}

impl ProgressMonitor for NullMonitor {
    fn begin_task(&self, _name: &str, _total_work: u64) {}

    fn worked(&self, _amount: u64) {}

    fn set_message(&self, _message: &str) {}

    fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    fn done(&self) {}
}

/// Logging monitor
///
/// Logs roughly every tenth of the task at info level.
#[derive(Debug, Default)]
pub struct LogMonitor {
    name: RwLock<String>,
    position: AtomicU64,
    total: AtomicU64,
    token: CancelToken,
}

impl LogMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(token: CancelToken) -> Self {
        Self {
            token,
            ..Default::default()
        }
    }

    fn name(&self) -> String {
        self.name.read().map(|n| n.clone()).unwrap_or_default()
    }
}

impl ProgressMonitor for LogMonitor {
    fn begin_task(&self, name: &str, total_work: u64) {
        if let Ok(mut guard) = self.name.write() {
            *guard = name.to_string();
        }
        self.position.store(0, Ordering::Relaxed);
        self.total.store(total_work, Ordering::Relaxed);
        info!("{}: started ({} units of work)", name, total_work);
    }

    fn worked(&self, amount: u64) {
        let old = self.position.fetch_add(amount, Ordering::Relaxed);
        let new = old + amount;
        let total = self.total.load(Ordering::Relaxed);
        if total == 0 {
            return;
        }
        let interval = std::cmp::max(1, total / 10);
        if new / interval > old / interval {
            info!(
                "{}: {}% ({}/{})",
                self.name(),
                (new.min(total) * 100) / total,
                new.min(total),
                total
            );
        }
    }

    fn set_message(&self, message: &str) {
        info!("{}: {}", self.name(), message);
    }

    fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    fn done(&self) {
        info!("{}: done", self.name());
    }
}

/// Events emitted by [`CallbackMonitor`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    Begin { name: String, total: u64 },
    Worked { current: u64, total: u64 },
    Message(String),
    Done,
}

/// Forwards progress to a closure
pub struct CallbackMonitor<F>
where
    F: Fn(ProgressEvent) + Send + Sync,
{
    callback: F,
    position: AtomicU64,
    total: AtomicU64,
    token: CancelToken,
}

impl<F> CallbackMonitor<F>
where
    F: Fn(ProgressEvent) + Send + Sync,
{
    pub fn new(callback: F) -> Self {
        Self {
            callback,
            position: AtomicU64::new(0),
            total: AtomicU64::new(0),
            token: CancelToken::new(),
        }
    }

    pub fn with_token(mut self, token: CancelToken) -> Self {
        self.token = token;
        self
    }
}

impl<F> ProgressMonitor for CallbackMonitor<F>
where
    F: Fn(ProgressEvent) + Send + Sync,
{
    fn begin_task(&self, name: &str, total_work: u64) {
        self.position.store(0, Ordering::Relaxed);
        self.total.store(total_work, Ordering::Relaxed);
        (self.callback)(ProgressEvent::Begin {
            name: name.to_string(),
            total: total_work,
        });
    }

    fn worked(&self, amount: u64) {
        let current = self.position.fetch_add(amount, Ordering::Relaxed) + amount;
        (self.callback)(ProgressEvent::Worked {
            current,
            total: self.total.load(Ordering::Relaxed),
        });
    }

    fn set_message(&self, message: &str) {
        (self.callback)(ProgressEvent::Message(message.to_string()));
    }

    fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    fn done(&self) {
        (self.callback)(ProgressEvent::Done);
    }
}

/// A child monitor owning a fixed share of its parent's work
///
/// The child's own `begin_task` total is scaled onto `budget` parent units;
/// `done` reports whatever part of the budget is still unreported.
pub struct SubMonitor<'a> {
    parent: &'a dyn ProgressMonitor,
    budget: u64,
    total: AtomicU64,
    consumed: AtomicU64,
    reported: AtomicU64,
}

impl<'a> SubMonitor<'a> {
    pub fn new(parent: &'a dyn ProgressMonitor, budget: u64) -> Self {
        Self {
            parent,
            budget,
            total: AtomicU64::new(0),
            consumed: AtomicU64::new(0),
            reported: AtomicU64::new(0),
        }
    }

    fn report_up_to(&self, target: u64) {
        let target = target.min(self.budget);
        let previous = self.reported.fetch_max(target, Ordering::Relaxed);
        if target > previous {
            self.parent.worked(target - previous);
        }
    }
}

impl ProgressMonitor for SubMonitor<'_> {
    fn begin_task(&self, name: &str, total_work: u64) {
        self.total.store(total_work, Ordering::Relaxed);
        self.consumed.store(0, Ordering::Relaxed);
        self.parent.set_message(name);
    }

    fn worked(&self, amount: u64) {
        let consumed = self.consumed.fetch_add(amount, Ordering::Relaxed) + amount;
        let total = self.total.load(Ordering::Relaxed);
        if total == 0 {
            return;
        }
        let scaled = (u128::from(consumed) * u128::from(self.budget) / u128::from(total)) as u64;
        self.report_up_to(scaled);
    }

    fn set_message(&self, message: &str) {
        self.parent.set_message(message);
    }

    fn is_cancelled(&self) -> bool {
        self.parent.is_cancelled()
    }

    fn done(&self) {
        self.report_up_to(self.budget);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_cancel_token_shared() {
        let token = CancelToken::new();
        let monitor = NullMonitor::with_token(token.clone());
        assert!(!monitor.is_cancelled());
        token.cancel();
        assert!(monitor.is_cancelled());
    }

    #[test]
    fn test_callback_monitor_events() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        let monitor = CallbackMonitor::new(move |e| sink.lock().unwrap().push(e));
        monitor.begin_task("plan", 4);
        monitor.worked(1);
        monitor.worked(3);
        monitor.done();
        let events = events.lock().unwrap();
        assert_eq!(
            *events,
            vec![
                ProgressEvent::Begin {
                    name: "plan".to_string(),
                    total: 4
                },
                ProgressEvent::Worked { current: 1, total: 4 },
                ProgressEvent::Worked { current: 4, total: 4 },
                ProgressEvent::Done,
            ]
        );
    }

    #[test]
    fn test_sub_monitor_scales_to_budget() {
        let total = Arc::new(AtomicU64::new(0));
        let sink = total.clone();
        let parent = CallbackMonitor::new(move |e| {
            if let ProgressEvent::Worked { current, .. } = e {
                sink.store(current, Ordering::Relaxed);
            }
        });
        parent.begin_task("outer", 100);
        {
            let sub = SubMonitor::new(&parent, 50);
            sub.begin_task("inner", 10);
            sub.worked(5);
            assert_eq!(total.load(Ordering::Relaxed), 25);
            sub.done();
        }
        assert_eq!(total.load(Ordering::Relaxed), 50);
    }

    #[test]
    fn test_sub_monitor_delegates_cancellation() {
        let token = CancelToken::new();
        let parent = NullMonitor::with_token(token.clone());
        let sub = SubMonitor::new(&parent, 10);
        token.cancel();
        assert!(sub.is_cancelled());
    }
}
