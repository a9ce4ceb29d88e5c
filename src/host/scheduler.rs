//! # Schedulers
//!
//! Single-shot delayed tasks. Whoever schedules a task owns its
//! [`TaskHandle`]; cancelling the handle stops the task if it has not run yet.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::clock::{Clock, ManualClock};

/// A unit of deferred work
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Host primitive for "run this after N milliseconds"
pub trait Scheduler: Send + Sync {
    /// Schedule `task` to run once after `delay`
    fn schedule(&self, delay: Duration, task: Task) -> TaskHandle;
}

/// Handle to a scheduled task
#[derive(Debug, Clone, Default)]
pub struct TaskHandle {
    cancelled: Arc<AtomicBool>,
}

impl TaskHandle {
    fn new() -> Self {
        Self::default()
    }

    /// Prevent the task from running
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Whether `cancel` has been called
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Scheduler that sleeps on the current tokio runtime.
///
/// Outside of a runtime the task sleeps on a dedicated OS thread instead.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioScheduler;

impl Scheduler for TokioScheduler {
    fn schedule(&self, delay: Duration, task: Task) -> TaskHandle {
        let handle = TaskHandle::new();
        let guard = handle.clone();
        let run = move || {
            if !guard.is_cancelled() {
                task();
            }
        };

        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move {
                    tokio::time::sleep(delay).await;
                    run();
                });
            }
            Err(_) => {
                std::thread::spawn(move || {
                    std::thread::sleep(delay);
                    run();
                });
            }
        }

        handle
    }
}

struct Pending {
    due: u64,
    seq: u64,
    task: Task,
    handle: TaskHandle,
}

/// Deterministic scheduler driven by a [`ManualClock`].
///
/// Tasks only run from [`ManualScheduler::advance`] or
/// [`ManualScheduler::run_pending`], on the calling thread, in due order.
#[derive(Clone, Default)]
pub struct ManualScheduler {
    clock: ManualClock,
    queue: Arc<Mutex<Vec<Pending>>>,
    seq: Arc<AtomicU64>,
}

impl std::fmt::Debug for ManualScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManualScheduler")
            .field("now", &self.clock.now_millis())
            .field("pending", &self.pending())
            .finish()
    }
}

impl ManualScheduler {
    /// Create a scheduler that reads and advances `clock`
    pub fn new(clock: ManualClock) -> Self {
        Self {
            clock,
            queue: Arc::new(Mutex::new(Vec::new())),
            seq: Arc::new(AtomicU64::new(0)),
        }
    }

    /// The clock this scheduler drives
    pub fn clock(&self) -> &ManualClock {
        &self.clock
    }

    /// Number of tasks waiting to run (cancelled ones included)
    pub fn pending(&self) -> usize {
        self.queue.lock().map(|q| q.len()).unwrap_or(0)
    }

    /// Run every task already due at the current time
    pub fn run_pending(&self) -> usize {
        self.advance(0)
    }

    /// Move time forward by `millis`, running each task as its due time is
    /// reached. Tasks scheduled by running tasks are picked up in the same pass
    /// when they fall inside the window. Returns how many tasks ran.
    pub fn advance(&self, millis: u64) -> usize {
        let target = self.clock.now_millis().saturating_add(millis);
        let mut ran = 0;

        while let Some(next) = self.pop_due(target) {
            if next.due > self.clock.now_millis() {
                self.clock.set(next.due);
            }
            if !next.handle.is_cancelled() {
                (next.task)();
                ran += 1;
            }
        }

        if target > self.clock.now_millis() {
            self.clock.set(target);
        }

        ran
    }

    fn pop_due(&self, target: u64) -> Option<Pending> {
        let mut queue = self.queue.lock().ok()?;
        let index = queue
            .iter()
            .enumerate()
            .filter(|(_, p)| p.due <= target)
            .min_by_key(|(_, p)| (p.due, p.seq))
            .map(|(i, _)| i)?;
        Some(queue.remove(index))
    }
}

impl Scheduler for ManualScheduler {
    fn schedule(&self, delay: Duration, task: Task) -> TaskHandle {
        let handle = TaskHandle::new();
        let pending = Pending {
            due: self.clock.now_millis().saturating_add(delay.as_millis() as u64),
            seq: self.seq.fetch_add(1, Ordering::SeqCst),
            task,
            handle: handle.clone(),
        };

        if let Ok(mut queue) = self.queue.lock() {
            queue.push(pending);
        }

        handle
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_manual_runs_in_due_order() {
        let scheduler = ManualScheduler::default();
        let order = Arc::new(Mutex::new(Vec::new()));

        for (delay, tag) in [(30u64, "c"), (10, "a"), (20, "b")] {
            let order = order.clone();
            scheduler.schedule(
                Duration::from_millis(delay),
                Box::new(move || order.lock().unwrap().push(tag)),
            );
        }

        assert_eq!(scheduler.advance(15), 1);
        assert_eq!(scheduler.advance(100), 2);
        assert_eq!(*order.lock().unwrap(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_manual_cancelled_task_does_not_run() {
        let scheduler = ManualScheduler::default();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();

        let handle = scheduler.schedule(
            Duration::from_millis(5),
            Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );
        handle.cancel();

        assert_eq!(scheduler.advance(10), 0);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        assert_eq!(scheduler.pending(), 0);
    }

    #[test]
    fn test_manual_zero_delay_runs_on_run_pending() {
        let scheduler = ManualScheduler::default();
        let start = scheduler.clock().now_millis();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();

        scheduler.schedule(
            Duration::ZERO,
            Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );

        assert_eq!(scheduler.run_pending(), 1);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(scheduler.clock().now_millis(), start);
    }

    #[tokio::test]
    async fn test_tokio_scheduler_runs_after_delay() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();

        TokioScheduler.schedule(
            Duration::from_millis(5),
            Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );

        assert_eq!(hits.load(Ordering::SeqCst), 0);
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
