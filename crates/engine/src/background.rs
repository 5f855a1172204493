//! Background job scheduler.
//!
//! A bounded FIFO queue drained by a fixed pool of worker threads. Used for
//! work that runs after a commit and outside its atomicity, such as relation
//! refresh.

use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use thiserror::Error;
use tracing::error;

/// Why a job was not accepted.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum SubmitError {
    /// Queue is at `max_queue_depth`
    #[error("background queue is full")]
    QueueFull,
    /// `shutdown` has been called
    #[error("background scheduler is shut down")]
    ShutDown,
}

/// Scheduler metrics snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerStats {
    /// Jobs waiting in the queue
    pub queue_depth: usize,
    /// Jobs currently running
    pub active_jobs: usize,
    /// Jobs finished since creation, panicked ones included
    pub jobs_completed: u64,
    /// Jobs refused because the queue was full
    pub jobs_rejected: u64,
    /// Worker thread count
    pub worker_count: usize,
}

type Job = Box<dyn FnOnce() + Send>;

struct SchedulerInner {
    queue: Mutex<VecDeque<Job>>,
    work_ready: Condvar,
    idle: Condvar,
    shutdown: AtomicBool,
    active_jobs: AtomicUsize,
    max_queue_depth: usize,
    jobs_completed: AtomicU64,
    jobs_rejected: AtomicU64,
}

/// Fixed-size worker pool over a bounded FIFO queue.
pub struct BackgroundScheduler {
    inner: Arc<SchedulerInner>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    worker_count: usize,
}

impl BackgroundScheduler {
    /// Start `workers` threads named `entkit-bg-N`.
    ///
    /// Fails if the OS refuses to spawn a thread; workers already started
    /// are shut down first.
    pub fn new(workers: usize, max_queue_depth: usize) -> std::io::Result<Self> {
        let inner = Arc::new(SchedulerInner {
            queue: Mutex::new(VecDeque::new()),
            work_ready: Condvar::new(),
            idle: Condvar::new(),
            shutdown: AtomicBool::new(false),
            active_jobs: AtomicUsize::new(0),
            max_queue_depth,
            jobs_completed: AtomicU64::new(0),
            jobs_rejected: AtomicU64::new(0),
        });

        let scheduler = Self {
            inner,
            workers: Mutex::new(Vec::with_capacity(workers)),
            worker_count: workers,
        };

        for i in 0..workers {
            let inner = Arc::clone(&scheduler.inner);
            let spawned = std::thread::Builder::new()
                .name(format!("entkit-bg-{}", i))
                .spawn(move || worker_loop(&inner));
            match spawned {
                Ok(handle) => scheduler.workers.lock().push(handle),
                Err(e) => {
                    scheduler.shutdown();
                    return Err(e);
                }
            }
        }

        Ok(scheduler)
    }

    /// Queue a job.
    pub fn submit(&self, job: impl FnOnce() + Send + 'static) -> Result<(), SubmitError> {
        let mut queue = self.inner.queue.lock();
        if self.inner.shutdown.load(Ordering::Acquire) {
            return Err(SubmitError::ShutDown);
        }
        if queue.len() >= self.inner.max_queue_depth {
            self.inner.jobs_rejected.fetch_add(1, Ordering::Relaxed);
            return Err(SubmitError::QueueFull);
        }
        queue.push_back(Box::new(job));
        drop(queue);

        self.inner.work_ready.notify_one();
        Ok(())
    }

    /// Block until the queue is empty and no job is running.
    ///
    /// Workers keep running afterwards.
    pub fn drain(&self) {
        let mut queue = self.inner.queue.lock();
        while !queue.is_empty() || self.inner.active_jobs.load(Ordering::Acquire) > 0 {
            self.inner.idle.wait(&mut queue);
        }
    }

    /// Stop accepting jobs, let workers finish the queue, and join them.
    ///
    /// Idempotent.
    pub fn shutdown(&self) {
        {
            let _queue = self.inner.queue.lock();
            self.inner.shutdown.store(true, Ordering::Release);
            self.inner.work_ready.notify_all();
        }

        // a job may hold the last handle to the owner, so shutdown can run on
        // a worker; that worker exits on its own once the job returns
        let current = std::thread::current().id();
        let mut workers = self.workers.lock();
        for handle in workers.drain(..) {
            if handle.thread().id() != current {
                let _ = handle.join();
            }
        }
    }

    /// True once `shutdown` has been called
    pub fn is_shut_down(&self) -> bool {
        self.inner.shutdown.load(Ordering::Acquire)
    }

    /// Current metrics
    pub fn stats(&self) -> SchedulerStats {
        SchedulerStats {
            queue_depth: self.inner.queue.lock().len(),
            active_jobs: self.inner.active_jobs.load(Ordering::Relaxed),
            jobs_completed: self.inner.jobs_completed.load(Ordering::Relaxed),
            jobs_rejected: self.inner.jobs_rejected.load(Ordering::Relaxed),
            worker_count: self.worker_count,
        }
    }
}

impl Drop for BackgroundScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for BackgroundScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackgroundScheduler")
            .field("stats", &self.stats())
            .finish()
    }
}

/// Decrements `active_jobs` on drop, so a panicking job cannot wedge `drain`.
struct ActiveJobGuard<'a> {
    inner: &'a SchedulerInner,
}

impl Drop for ActiveJobGuard<'_> {
    fn drop(&mut self) {
        // taken before the decrement so drain cannot miss the wakeup
        let queue = self.inner.queue.lock();
        let prev = self.inner.active_jobs.fetch_sub(1, Ordering::AcqRel);
        self.inner.jobs_completed.fetch_add(1, Ordering::Relaxed);
        if prev == 1 && queue.is_empty() {
            self.inner.idle.notify_all();
        }
    }
}

fn worker_loop(inner: &SchedulerInner) {
    loop {
        let job = {
            let mut queue = inner.queue.lock();
            loop {
                if let Some(job) = queue.pop_front() {
                    inner.active_jobs.fetch_add(1, Ordering::AcqRel);
                    break job;
                }
                if inner.shutdown.load(Ordering::Acquire) {
                    return;
                }
                inner.work_ready.wait(&mut queue);
            }
        };

        let _guard = ActiveJobGuard { inner };

        if let Err(panic) = std::panic::catch_unwind(std::panic::AssertUnwindSafe(job)) {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "(non-string panic)".to_string());
            error!(target: "entkit::background", panic = %message, "background job panicked");
        }
    }
}
