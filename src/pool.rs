//! The thread pool: owner of the workers and the submission queues, and
//! the whole client-facing control surface.
//!
//! The pool mutex guards worker-vector membership, the four queues and the
//! properties record. It is held briefly and never across task execution;
//! per-worker state is reached through atomics and each worker's own
//! latch, and the lock order is always pool mutex first, worker latch
//! second.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::dispatcher::Dispatcher;
use crate::error::PoolError;
use crate::platform::PlatformId;
use crate::props::{PoolProperties, ThreadProperties};
use crate::queue::TaskQueues;
use crate::task::{TaskHandle, ValueTask};
use crate::worker::{Worker, WorkerStatus};

/// Passing this as `timeout_ms` makes [`ThreadPool::wait`] block until the
/// task completes.
pub const WAIT_INFINITE: u32 = u32::MAX;

/// Granularity of the condvar polling inside [`ThreadPool::wait`].
const WAIT_SLICE: Duration = Duration::from_millis(100);

/// Outcome of [`ThreadPool::wait`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitResult {
    /// The task finished, or no worker owns the handle.
    Completed,
    /// The deadline elapsed while the task was still running.
    TimedOut,
    /// Internal failure (a poisoned pool lock).
    Error,
}

pub(crate) struct PoolState {
    pub(crate) workers: Vec<Worker>,
    pub(crate) queues: TaskQueues,
    pub(crate) props: PoolProperties,
}

impl PoolState {
    /// First idle worker in insertion order.
    pub(crate) fn available_worker_index(&self) -> Option<usize> {
        self.workers
            .iter()
            .position(|worker| worker.status() == WorkerStatus::NotExecuting)
    }

    fn owner_index(&self, handle: &TaskHandle) -> Option<usize> {
        self.workers.iter().position(|worker| worker.owns_task(handle))
    }
}

pub(crate) struct PoolShared {
    state: Mutex<PoolState>,
    cv: Condvar,
    shutdown: AtomicBool,
    #[cfg(feature = "metrics")]
    pub(crate) metrics: crate::metrics::Metrics,
    #[cfg(feature = "chrome-trace")]
    trace: Arc<crate::trace::TraceSink>,
}

impl PoolShared {
    pub(crate) fn lock_state(&self) -> MutexGuard<'_, PoolState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub(crate) fn is_shut_down(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    pub(crate) fn notify_all(&self) {
        self.cv.notify_all();
    }
}

/// A bounded pool of worker threads fed by a periodic dispatcher.
///
/// Built with [`create`](ThreadPool::create); torn down by
/// [`shutdown`](ThreadPool::shutdown) or by dropping the pool. A pool is
/// not reusable after shutdown.
pub struct ThreadPool {
    shared: Arc<PoolShared>,
    dispatcher: Dispatcher,
}

impl ThreadPool {
    /// Creates a pool with `max_threads` workers and default properties
    /// (task bound 25, 10 ms dispatch cadence). Succeeds as long as at
    /// least one worker thread could be spawned.
    pub fn create(platform: PlatformId, max_threads: usize) -> Result<ThreadPool, PoolError> {
        ThreadPool::create_with_properties(platform, PoolProperties::new(max_threads))
    }

    /// Creates a pool from an explicit properties record.
    pub fn create_with_properties(
        platform: PlatformId,
        props: PoolProperties,
    ) -> Result<ThreadPool, PoolError> {
        let thread_props = ThreadProperties::for_platform(platform);

        let mut workers = Vec::with_capacity(props.max_threads());
        for id in 0..props.max_threads() {
            match Worker::start(id, &thread_props) {
                Ok(worker) => workers.push(worker),
                Err(error) => {
                    tracing::warn!(worker = id, %error, "failed to spawn worker thread");
                }
            }
        }

        if workers.is_empty() {
            return Err(PoolError::NoWorkers);
        }

        #[cfg(feature = "chrome-trace")]
        let trace = {
            let sink = Arc::new(crate::trace::TraceSink::new());
            for worker in &workers {
                worker.attach_trace_sink(Arc::clone(&sink));
            }
            sink
        };

        let shared = Arc::new(PoolShared {
            state: Mutex::new(PoolState {
                workers,
                queues: TaskQueues::new(),
                props,
            }),
            cv: Condvar::new(),
            shutdown: AtomicBool::new(false),
            #[cfg(feature = "metrics")]
            metrics: crate::metrics::Metrics::new(),
            #[cfg(feature = "chrome-trace")]
            trace,
        });

        let dispatcher = Dispatcher::start(Arc::clone(&shared))?;

        Ok(ThreadPool { shared, dispatcher })
    }

    /// Queues a value task. Fails fast (no state change) when the pool is
    /// shut down, the submission lock is set, or the value queue is over
    /// its bound.
    pub fn submit_value(&self, task: ValueTask) -> bool {
        if self.shared.is_shut_down() {
            return false;
        }

        let mut state = self.shared.lock_state();
        if state.props.submission_locked()
            || state.queues.value_count() > state.props.max_tasks()
        {
            #[cfg(feature = "metrics")]
            self.shared
                .metrics
                .rejected_submissions
                .fetch_add(1, Ordering::Relaxed);
            return false;
        }

        state.queues.push_value(task);
        #[cfg(feature = "metrics")]
        self.shared
            .metrics
            .value_submissions
            .fetch_add(1, Ordering::Relaxed);
        self.shared.cv.notify_one();
        true
    }

    /// Queues an object task by handle. The pool holds a clone of the
    /// handle until the task has been dispatched and run; ownership stays
    /// with the caller throughout.
    pub fn submit_object(&self, task: &TaskHandle) -> bool {
        if self.shared.is_shut_down() {
            return false;
        }

        let mut state = self.shared.lock_state();
        if state.props.submission_locked()
            || state.queues.object_count() > state.props.max_tasks()
        {
            #[cfg(feature = "metrics")]
            self.shared
                .metrics
                .rejected_submissions
                .fetch_add(1, Ordering::Relaxed);
            return false;
        }

        state.queues.push_object(Arc::clone(task));
        #[cfg(feature = "metrics")]
        self.shared
            .metrics
            .object_submissions
            .fetch_add(1, Ordering::Relaxed);
        self.shared.cv.notify_one();
        true
    }

    /// Blocks or unblocks new submissions without touching in-flight work.
    pub fn set_submission_lock(&self, locked: bool) {
        self.shared.lock_state().props.set_submission_locked(locked);
    }

    pub fn submission_locked(&self) -> bool {
        self.shared.lock_state().props.submission_locked()
    }

    /// Adjusts the per-shape queue bound checked at submission.
    pub fn set_max_tasks(&self, max_tasks: usize) {
        self.shared.lock_state().props.set_max_tasks(max_tasks);
    }

    pub fn value_task_count(&self) -> usize {
        self.shared.lock_state().queues.value_count()
    }

    pub fn object_task_count(&self) -> usize {
        self.shared.lock_state().queues.object_count()
    }

    pub fn missed_value_task_count(&self) -> usize {
        self.shared.lock_state().queues.missed_value_count()
    }

    pub fn missed_object_task_count(&self) -> usize {
        self.shared.lock_state().queues.missed_object_count()
    }

    /// Workers currently usable for new work: idle now, or finished and one
    /// dispatcher cycle away from idle.
    pub fn available_count(&self) -> usize {
        self.shared
            .lock_state()
            .workers
            .iter()
            .filter(|worker| {
                matches!(
                    worker.status(),
                    WorkerStatus::NotExecuting | WorkerStatus::Purging
                )
            })
            .count()
    }

    /// Number of workers whose status equals `status`.
    pub fn specific_status_count(&self, status: WorkerStatus) -> usize {
        self.shared
            .lock_state()
            .workers
            .iter()
            .filter(|worker| worker.status() == status)
            .count()
    }

    /// Current number of workers owned by the pool.
    pub fn worker_count(&self) -> usize {
        self.shared.lock_state().workers.len()
    }

    /// The configured worker bound.
    pub fn max_thread_count(&self) -> usize {
        self.shared.lock_state().props.max_threads()
    }

    /// All four queues empty.
    pub fn is_empty(&self) -> bool {
        self.shared.lock_state().queues.is_empty()
    }

    /// Whether any worker is doing (or holding) work.
    pub fn any_working(&self) -> bool {
        self.shared
            .lock_state()
            .workers
            .iter()
            .any(|worker| worker.status() != WorkerStatus::NotExecuting)
    }

    /// Removes and returns the first idle worker, handing it to an external
    /// owner. The pool forgets the worker entirely.
    pub fn take_available_worker(&self) -> Option<Worker> {
        let mut state = self.shared.lock_state();
        let index = state.available_worker_index()?;
        Some(state.workers.remove(index))
    }

    /// Suspends every working worker and sets the submission lock. The
    /// lock stays set until cleared explicitly.
    pub fn suspend_all(&self) {
        let mut state = self.shared.lock_state();
        state.props.set_submission_locked(true);
        for worker in &state.workers {
            if worker.status() != WorkerStatus::NotExecuting {
                worker.suspend();
            }
        }
    }

    /// Resumes every suspended working worker. Does not clear the
    /// submission lock.
    pub fn resume_all(&self) {
        let state = self.shared.lock_state();
        for worker in &state.workers {
            if worker.status() != WorkerStatus::NotExecuting {
                worker.resume();
            }
        }
    }

    /// Sets the submission lock, then terminates (and removes) every
    /// working worker. Each termination waits for the in-flight task to
    /// finish; cancellation is cooperative.
    pub fn terminate_all(&self) {
        let mut state = self.shared.lock_state();
        state.props.set_submission_locked(true);

        let mut index = 0;
        while index < state.workers.len() {
            if state.workers[index].status() != WorkerStatus::NotExecuting {
                let worker = state.workers.remove(index);
                worker.terminate();
            } else {
                index += 1;
            }
        }
    }

    /// Suspends the worker currently running `handle`, if any.
    pub fn pause(&self, handle: &TaskHandle) {
        let state = self.shared.lock_state();
        if let Some(index) = state.owner_index(handle) {
            state.workers[index].suspend();
        }
    }

    /// Resumes the worker currently running `handle`, if any.
    pub fn resume(&self, handle: &TaskHandle) {
        let state = self.shared.lock_state();
        if let Some(index) = state.owner_index(handle) {
            state.workers[index].resume();
        }
    }

    /// Terminates (and removes) the worker currently running `handle`.
    /// The in-flight run completes first.
    pub fn terminate(&self, handle: &TaskHandle) {
        let mut state = self.shared.lock_state();
        if let Some(index) = state.owner_index(handle) {
            let worker = state.workers.remove(index);
            worker.terminate();
        }
    }

    /// Status of the worker currently running `handle`, or
    /// [`WorkerStatus::None`] when no worker owns it.
    pub fn status(&self, handle: &TaskHandle) -> WorkerStatus {
        let state = self.shared.lock_state();
        match state.owner_index(handle) {
            Some(index) => state.workers[index].status(),
            None => WorkerStatus::None,
        }
    }

    /// Waits for the task behind `handle` to complete, polling the pool
    /// condvar in short slices against a monotonic deadline.
    ///
    /// Returns `Completed` immediately when no worker owns the handle;
    /// "already finished" and "never submitted" are deliberately not
    /// distinguished. [`WAIT_INFINITE`] waits without a deadline.
    pub fn wait(&self, handle: &TaskHandle, timeout_ms: u32) -> WaitResult {
        let deadline = (timeout_ms != WAIT_INFINITE)
            .then(|| Instant::now() + Duration::from_millis(u64::from(timeout_ms)));

        let Ok(mut state) = self.shared.state.lock() else {
            return WaitResult::Error;
        };

        loop {
            match state.owner_index(handle) {
                None => return WaitResult::Completed,
                Some(index) if state.workers[index].status() == WorkerStatus::NotExecuting => {
                    return WaitResult::Completed;
                }
                Some(_) => {}
            }

            let slice = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return WaitResult::TimedOut;
                    }
                    WAIT_SLICE.min(deadline - now)
                }
                None => WAIT_SLICE,
            };

            state = match self.shared.cv.wait_timeout(state, slice) {
                Ok((guard, _)) => guard,
                Err(_) => return WaitResult::Error,
            };
        }
    }

    /// Stops the dispatcher, marks the pool shut down, terminates every
    /// worker and clears the queues. Idempotent; the pool cannot be
    /// reused afterwards.
    pub fn shutdown(&mut self) {
        self.dispatcher.stop();

        let mut state = self.shared.lock_state();
        self.shared.shutdown.store(true, Ordering::Release);
        self.shared.cv.notify_all();

        for worker in state.workers.drain(..) {
            worker.terminate();
        }
        state.queues.clear();
    }

    /// Snapshot of the pool's counters. Only with the `metrics` feature.
    #[cfg(feature = "metrics")]
    pub fn metrics_snapshot(&self) -> crate::metrics::MetricsSnapshot {
        self.shared.metrics.snapshot()
    }

    /// The span sink this pool's workers stamp into. Only with the
    /// `chrome-trace` feature.
    #[cfg(feature = "chrome-trace")]
    pub fn trace_sink(&self) -> Arc<crate::trace::TraceSink> {
        Arc::clone(&self.shared.trace)
    }

    /// Writes the recorded task spans to `path` as a Chrome Trace file.
    /// Only with the `chrome-trace` feature.
    #[cfg(feature = "chrome-trace")]
    pub fn export_trace(&self, path: &str) -> std::io::Result<()> {
        self.shared.trace.export_to_file(path)
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for ThreadPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.shared.lock_state();
        f.debug_struct("ThreadPool")
            .field("workers", &state.workers.len())
            .field("max_tasks", &state.props.max_tasks())
            .field("shut_down", &self.shared.is_shut_down())
            .finish()
    }
}
