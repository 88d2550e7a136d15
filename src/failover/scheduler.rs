//! Shared scheduler for periodic reconnection attempts.
//!
//! # Responsibilities
//! - Run every listener's reconnection loop on one shared, bounded pool
//! - Grow and shrink the pool as listeners come and go
//! - Fixed-delay scheduling: the next run starts `period` after the previous
//!   run finished
//!
//! # Design Decisions
//! - Each run holds one worker permit; capacity is the semaphore size
//! - Resize requests go through a single queue drained by one task, so
//!   concurrent grow/shrink requests never lose an update
//! - Cancellation is cooperative: a run in progress is never interrupted
//! - Waiting for a registration uses a notification, not a spin loop

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc, oneshot, watch, Notify, Semaphore};

use crate::lifecycle::Shutdown;
use crate::observability::metrics;

/// Smallest pool size, also the initial size.
pub const MIN_WORKERS: usize = 2;

/// Workers added per live listener.
pub const RESIZE_STEP: usize = 2;

/// A periodic unit of work.
#[async_trait]
pub trait ScheduledTask: Send + Sync {
    async fn run(&self);
}

/// Identifier of one registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskId(u64);

enum ResizeRequest {
    Grow,
    Shrink,
    Barrier(oneshot::Sender<()>),
}

struct Registration {
    id: TaskId,
    task: Arc<dyn ScheduledTask>,
    cancel: watch::Sender<bool>,
}

struct PoolInner {
    workers: Arc<Semaphore>,
    size: Arc<AtomicUsize>,
    resize_tx: mpsc::UnboundedSender<ResizeRequest>,
    registrations: Mutex<Vec<Registration>>,
    registered: Notify,
    next_id: AtomicU64,
    shutdown: Shutdown,
}

/// Shared, dynamically sized worker pool.
#[derive(Clone)]
pub struct SchedulerPool {
    inner: Arc<PoolInner>,
}

impl SchedulerPool {
    /// Create the pool and spawn its resize worker. Must be called within a
    /// Tokio runtime.
    pub fn new() -> Self {
        let workers = Arc::new(Semaphore::new(MIN_WORKERS));
        let size = Arc::new(AtomicUsize::new(MIN_WORKERS));
        let (resize_tx, resize_rx) = mpsc::unbounded_channel();
        let shutdown = Shutdown::new();

        tokio::spawn(run_resizer(
            workers.clone(),
            size.clone(),
            resize_rx,
            shutdown.subscribe(),
        ));
        metrics::record_scheduler_workers(MIN_WORKERS);

        Self {
            inner: Arc::new(PoolInner {
                workers,
                size,
                resize_tx,
                registrations: Mutex::new(Vec::new()),
                registered: Notify::new(),
                next_id: AtomicU64::new(1),
                shutdown,
            }),
        }
    }

    /// Request two more workers for a new listener.
    pub fn acquire(&self) {
        let _ = self.inner.resize_tx.send(ResizeRequest::Grow);
    }

    /// Request two fewer workers (never below the floor) for a disposed listener.
    pub fn release(&self) {
        let _ = self.inner.resize_tx.send(ResizeRequest::Shrink);
    }

    /// Wait until every resize request queued so far has been applied.
    pub async fn settle(&self) {
        let (tx, rx) = oneshot::channel();
        if self.inner.resize_tx.send(ResizeRequest::Barrier(tx)).is_ok() {
            let _ = rx.await;
        }
    }

    /// Current worker capacity.
    pub fn size(&self) -> usize {
        self.inner.size.load(Ordering::Acquire)
    }

    /// Number of live registrations.
    pub fn scheduled_count(&self) -> usize {
        self.lock_registrations().len()
    }

    /// Schedule `task` with fixed-delay semantics.
    pub fn schedule(
        &self,
        task: Arc<dyn ScheduledTask>,
        initial_delay: Duration,
        period: Duration,
    ) -> TaskId {
        let id = TaskId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        let (cancel, cancelled) = watch::channel(false);

        if !self.inner.shutdown.is_triggered() {
            tokio::spawn(run_fixed_delay(
                self.inner.workers.clone(),
                task.clone(),
                initial_delay,
                period,
                cancelled,
            ));
        }

        let count = {
            let mut registrations = self.lock_registrations();
            registrations.push(Registration { id, task, cancel });
            registrations.len()
        };
        metrics::record_active_loops(count);
        self.inner.registered.notify_waiters();
        id
    }

    /// Remove the first registration of `task`. Returns false when the task is
    /// not (yet) registered.
    pub fn cancel(&self, task: &Arc<dyn ScheduledTask>) -> bool {
        let (removed, count) = {
            let mut registrations = self.lock_registrations();
            let removed = registrations
                .iter()
                .position(|r| same_task(&r.task, task))
                .map(|index| registrations.remove(index));
            (removed, registrations.len())
        };

        match removed {
            Some(registration) => {
                let _ = registration.cancel.send(true);
                tracing::trace!(task_id = registration.id.0, "Scheduled task cancelled");
                metrics::record_active_loops(count);
                true
            }
            None => false,
        }
    }

    /// Cancel `task`, waiting for its registration to appear if it is still
    /// being scheduled. Returns immediately once the pool is shut down.
    pub async fn cancel_when_registered(&self, task: &Arc<dyn ScheduledTask>) {
        loop {
            let notified = self.inner.registered.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.cancel(task) || self.inner.shutdown.is_triggered() {
                return;
            }
            notified.await;
        }
    }

    /// Cancel every registration and stop the resize worker.
    pub fn shutdown(&self) {
        if !self.inner.shutdown.trigger() {
            return;
        }
        let drained: Vec<Registration> = self.lock_registrations().drain(..).collect();
        for registration in drained {
            let _ = registration.cancel.send(true);
        }
        self.inner.workers.close();
        self.inner.registered.notify_waiters();
        metrics::record_active_loops(0);
        tracing::debug!("Scheduler pool shut down");
    }

    fn lock_registrations(&self) -> std::sync::MutexGuard<'_, Vec<Registration>> {
        self.inner
            .registrations
            .lock()
            .expect("scheduler registrations mutex poisoned")
    }
}

impl std::fmt::Debug for SchedulerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchedulerPool")
            .field("size", &self.size())
            .field("scheduled", &self.scheduled_count())
            .finish()
    }
}

fn same_task(a: &Arc<dyn ScheduledTask>, b: &Arc<dyn ScheduledTask>) -> bool {
    Arc::as_ptr(a) as *const () == Arc::as_ptr(b) as *const ()
}

async fn run_resizer(
    workers: Arc<Semaphore>,
    size: Arc<AtomicUsize>,
    mut requests: mpsc::UnboundedReceiver<ResizeRequest>,
    mut shutdown: broadcast::Receiver<()>,
) {
    loop {
        let request = tokio::select! {
            request = requests.recv() => request,
            _ = shutdown.recv() => break,
        };

        match request {
            Some(ResizeRequest::Grow) => {
                workers.add_permits(RESIZE_STEP);
                let new_size = size.fetch_add(RESIZE_STEP, Ordering::AcqRel) + RESIZE_STEP;
                metrics::record_scheduler_workers(new_size);
                tracing::trace!(workers = new_size, "Scheduler pool grown");
            }
            Some(ResizeRequest::Shrink) => {
                let current = size.load(Ordering::Acquire);
                let target = current.saturating_sub(RESIZE_STEP).max(MIN_WORKERS);
                let delta = current - target;
                if delta > 0 {
                    // Waits for running attempts to hand their permits back.
                    match workers.acquire_many(delta as u32).await {
                        Ok(permits) => permits.forget(),
                        Err(_) => break,
                    }
                    size.store(target, Ordering::Release);
                    metrics::record_scheduler_workers(target);
                    tracing::trace!(workers = target, "Scheduler pool shrunk");
                }
            }
            Some(ResizeRequest::Barrier(done)) => {
                let _ = done.send(());
            }
            None => break,
        }
    }
}

async fn run_fixed_delay(
    workers: Arc<Semaphore>,
    task: Arc<dyn ScheduledTask>,
    initial_delay: Duration,
    period: Duration,
    mut cancelled: watch::Receiver<bool>,
) {
    if !wait_unless_cancelled(&mut cancelled, initial_delay).await {
        return;
    }
    loop {
        let permit = tokio::select! {
            permit = workers.clone().acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => return,
            },
            _ = cancelled.changed() => return,
        };
        if *cancelled.borrow() {
            return;
        }

        task.run().await;
        drop(permit);

        if !wait_unless_cancelled(&mut cancelled, period).await {
            return;
        }
    }
}

/// Sleep for `delay`. Returns false if cancellation was requested.
async fn wait_unless_cancelled(cancelled: &mut watch::Receiver<bool>, delay: Duration) -> bool {
    if *cancelled.borrow() {
        return false;
    }
    if delay.is_zero() {
        return true;
    }
    tokio::select! {
        _ = tokio::time::sleep(delay) => !*cancelled.borrow(),
        _ = cancelled.changed() => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;
    use tokio::time::Instant;

    struct Counter {
        runs: AtomicU32,
        run_time: Duration,
        started: Mutex<Vec<Instant>>,
    }

    impl Counter {
        fn new(run_time: Duration) -> Arc<Self> {
            Arc::new(Self {
                runs: AtomicU32::new(0),
                run_time,
                started: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl ScheduledTask for Counter {
        async fn run(&self) {
            self.started.lock().unwrap().push(Instant::now());
            self.runs.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.run_time).await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_fixed_delay_spacing() {
        let pool = SchedulerPool::new();
        let counter = Counter::new(Duration::from_millis(100));
        let task: Arc<dyn ScheduledTask> = counter.clone();

        let start = Instant::now();
        pool.schedule(task.clone(), Duration::ZERO, Duration::from_millis(250));
        tokio::time::sleep(Duration::from_millis(1_000)).await;
        assert!(pool.cancel(&task));

        let started = counter.started.lock().unwrap().clone();
        // Runs start at 0, 350, 700: each 100ms run followed by a 250ms delay.
        assert_eq!(started.len(), 3);
        assert_eq!(started[0] - start, Duration::ZERO);
        assert_eq!(started[1] - started[0], Duration::from_millis(350));
        assert_eq!(started[2] - started[1], Duration::from_millis(350));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_stops_runs() {
        let pool = SchedulerPool::new();
        let counter = Counter::new(Duration::ZERO);
        let task: Arc<dyn ScheduledTask> = counter.clone();

        pool.schedule(task.clone(), Duration::from_millis(250), Duration::from_millis(250));
        assert_eq!(pool.scheduled_count(), 1);
        assert!(pool.cancel(&task));
        assert!(!pool.cancel(&task));
        assert_eq!(pool.scheduled_count(), 0);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(counter.runs.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_when_registered_waits_for_schedule() {
        let pool = SchedulerPool::new();
        let task: Arc<dyn ScheduledTask> = Counter::new(Duration::ZERO);

        let waiter = {
            let pool = pool.clone();
            let task = task.clone();
            tokio::spawn(async move { pool.cancel_when_registered(&task).await })
        };
        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());

        pool.schedule(task.clone(), Duration::from_millis(250), Duration::from_millis(250));
        waiter.await.unwrap();
        assert_eq!(pool.scheduled_count(), 0);
    }

    #[tokio::test]
    async fn test_resize_tracks_listeners() {
        let pool = SchedulerPool::new();
        assert_eq!(pool.size(), MIN_WORKERS);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let pool = pool.clone();
                tokio::spawn(async move { pool.acquire() })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap();
        }
        pool.settle().await;
        assert_eq!(pool.size(), MIN_WORKERS + 8 * RESIZE_STEP);

        for _ in 0..10 {
            pool.release();
        }
        pool.settle().await;
        assert_eq!(pool.size(), MIN_WORKERS);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_cancels_everything() {
        let pool = SchedulerPool::new();
        let counter = Counter::new(Duration::ZERO);
        let task: Arc<dyn ScheduledTask> = counter.clone();
        pool.schedule(task.clone(), Duration::from_millis(250), Duration::from_millis(250));

        pool.shutdown();
        assert_eq!(pool.scheduled_count(), 0);
        // Nothing registered any more, but waiting must not hang.
        pool.cancel_when_registered(&task).await;

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(counter.runs.load(Ordering::SeqCst), 0);
    }
}
