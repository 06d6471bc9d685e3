//! Cancellable timers
//!
//! The agent owns two kinds of deferred work: the transport recovery retry
//! and the shutdown grace period. Timers never call back into the agent
//! directly; expiry is delivered as a [`TimerFired`] input.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    Recovery,
    ShutdownGrace,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerHandle(pub u64);

impl fmt::Display for TimerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "timer-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerFired {
    pub handle: TimerHandle,
    pub kind: TimerKind,
}

pub trait Scheduler: Send {
    fn schedule(&mut self, delay: Duration, kind: TimerKind) -> TimerHandle;

    /// Cancel a pending timer. Unknown or already fired handles are ignored.
    fn cancel(&mut self, handle: TimerHandle);
}

/// Timers backed by `tokio::time::sleep` tasks
pub struct TokioScheduler {
    next_id: u64,
    fired: mpsc::UnboundedSender<TimerFired>,
    tasks: HashMap<TimerHandle, JoinHandle<()>>,
}

impl TokioScheduler {
    pub fn new(fired: mpsc::UnboundedSender<TimerFired>) -> Self {
        Self {
            next_id: 0,
            fired,
            tasks: HashMap::new(),
        }
    }
}

impl Scheduler for TokioScheduler {
    fn schedule(&mut self, delay: Duration, kind: TimerKind) -> TimerHandle {
        self.tasks.retain(|_, task| !task.is_finished());

        self.next_id += 1;
        let handle = TimerHandle(self.next_id);
        let fired = self.fired.clone();

        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if fired.send(TimerFired { handle, kind }).is_err() {
                debug!("{} fired after the agent went away", handle);
            }
        });
        debug!("Scheduled {:?} {} in {:?}", kind, handle, delay);
        self.tasks.insert(handle, task);
        handle
    }

    fn cancel(&mut self, handle: TimerHandle) {
        if let Some(task) = self.tasks.remove(&handle) {
            debug!("Cancelled {}", handle);
            task.abort();
        }
    }
}

impl Drop for TokioScheduler {
    fn drop(&mut self) {
        for (_, task) in self.tasks.drain() {
            task.abort();
        }
    }
}

/// A timer waiting in a [`ManualScheduler`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingTimer {
    pub handle: TimerHandle,
    pub kind: TimerKind,
    pub delay: Duration,
}

impl PendingTimer {
    pub fn fired(&self) -> TimerFired {
        TimerFired {
            handle: self.handle,
            kind: self.kind,
        }
    }
}

/// Scheduler that never fires on its own. Clones share state, so a driver
/// can keep one clone and fire timers by hand.
#[derive(Debug, Clone, Default)]
pub struct ManualScheduler {
    inner: Arc<Mutex<ManualState>>,
}

#[derive(Debug, Default)]
struct ManualState {
    next_id: u64,
    pending: Vec<PendingTimer>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, ManualState> {
        // A poisoned lock only means a panicking test; the data is still usable
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn pending(&self) -> Vec<PendingTimer> {
        self.state().pending.clone()
    }

    pub fn pending_of(&self, kind: TimerKind) -> Option<PendingTimer> {
        self.state().pending.iter().find(|t| t.kind == kind).copied()
    }

    /// Remove the oldest pending timer of `kind`, as if it had expired.
    pub fn expire(&self, kind: TimerKind) -> Option<TimerFired> {
        let mut state = self.state();
        let index = state.pending.iter().position(|t| t.kind == kind)?;
        Some(state.pending.remove(index).fired())
    }
}

impl Scheduler for ManualScheduler {
    fn schedule(&mut self, delay: Duration, kind: TimerKind) -> TimerHandle {
        let mut state = self.state();
        state.next_id += 1;
        let handle = TimerHandle(state.next_id);
        state.pending.push(PendingTimer {
            handle,
            kind,
            delay,
        });
        handle
    }

    fn cancel(&mut self, handle: TimerHandle) {
        self.state().pending.retain(|t| t.handle != handle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_tokio_scheduler_fires() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut scheduler = TokioScheduler::new(tx);

        let handle = scheduler.schedule(Duration::from_millis(10), TimerKind::Recovery);
        let fired = rx.recv().await.unwrap();
        assert_eq!(fired.handle, handle);
        assert_eq!(fired.kind, TimerKind::Recovery);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tokio_scheduler_cancel() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut scheduler = TokioScheduler::new(tx);

        let cancelled = scheduler.schedule(Duration::from_secs(2), TimerKind::ShutdownGrace);
        let kept = scheduler.schedule(Duration::from_secs(5), TimerKind::Recovery);
        scheduler.cancel(cancelled);

        let fired = rx.recv().await.unwrap();
        assert_eq!(fired.handle, kept);
    }

    #[test]
    fn test_manual_scheduler() {
        let mut scheduler = ManualScheduler::new();
        let observer = scheduler.clone();

        let a = scheduler.schedule(Duration::from_secs(2), TimerKind::Recovery);
        scheduler.schedule(Duration::from_secs(2), TimerKind::ShutdownGrace);
        assert_eq!(observer.pending().len(), 2);

        scheduler.cancel(a);
        assert!(observer.pending_of(TimerKind::Recovery).is_none());
        assert_eq!(
            observer.expire(TimerKind::ShutdownGrace).map(|f| f.kind),
            Some(TimerKind::ShutdownGrace)
        );
        assert!(observer.pending().is_empty());
    }
}
