//! Worker thread implementation.
//!
//! A worker wraps one OS thread around a small state machine. Between tasks
//! it parks on its suspend latch; the dispatcher wakes it by assigning a
//! task into one of the pending slots. A worker never pulls work on its
//! own, so everything it runs arrived through an explicit assignment.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};

#[cfg(feature = "chrome-trace")]
use std::sync::OnceLock;
#[cfg(feature = "chrome-trace")]
use std::time::Instant;

use crossbeam::atomic::AtomicCell;

#[cfg(feature = "chrome-trace")]
use crate::trace::{TaskKind, TraceSink};

use crate::platform;
use crate::props::ThreadProperties;
use crate::task::{same_handle, TaskHandle, ValueTask};

/// Observable worker state.
///
/// `Purging` marks "task just finished"; only the dispatcher promotes a
/// purging worker back to `NotExecuting`, so completion is always observed
/// before reuse. `None` is never held by a live worker; it is the answer
/// queries give when no worker matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkerStatus {
    NotExecuting,
    Executing,
    Purging,
    Pausing,
    None,
}

struct LatchState {
    suspended: bool,
    next_object: Option<TaskHandle>,
    next_value: Option<ValueTask>,
}

/// State shared between the worker's owner and its OS thread.
struct Shared {
    id: usize,
    status: AtomicCell<WorkerStatus>,
    stop: AtomicBool,
    latch: Mutex<LatchState>,
    latch_cv: Condvar,
    pending_object: AtomicU32,
    pending_value: AtomicU32,
    /// Object handle most recently assigned; what the pool's by-handle
    /// lookups match against. Set at assignment, cleared after the run.
    assigned: Mutex<Option<TaskHandle>>,
    /// The pool's span sink, attached once before the first dispatch.
    #[cfg(feature = "chrome-trace")]
    trace: OnceLock<Arc<TraceSink>>,
}

/// One pooled OS thread and its control handles.
pub struct Worker {
    shared: Arc<Shared>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl Worker {
    /// Spawns the worker thread. The worker comes up idle: `NotExecuting`
    /// and parked on its latch until the first assignment.
    pub(crate) fn start(id: usize, props: &ThreadProperties) -> std::io::Result<Worker> {
        let shared = Arc::new(Shared {
            id,
            status: AtomicCell::new(WorkerStatus::NotExecuting),
            stop: AtomicBool::new(false),
            latch: Mutex::new(LatchState {
                suspended: true,
                next_object: None,
                next_value: None,
            }),
            latch_cv: Condvar::new(),
            pending_object: AtomicU32::new(0),
            pending_value: AtomicU32::new(0),
            assigned: Mutex::new(None),
            #[cfg(feature = "chrome-trace")]
            trace: OnceLock::new(),
        });

        let thread_shared = Arc::clone(&shared);
        let handle = thread::Builder::new()
            .name(format!("taskpool-worker-{id}"))
            .stack_size(props.stack_size())
            .spawn(move || Worker::event_loop(thread_shared))?;

        Ok(Worker {
            shared,
            handle: Mutex::new(Some(handle)),
        })
    }

    pub fn id(&self) -> usize {
        self.shared.id
    }

    pub fn status(&self) -> WorkerStatus {
        self.shared.status.load()
    }

    /// Hands an object task to the worker: fill the next-object slot, bump
    /// its pending counter, mark the worker executing and release the
    /// latch.
    pub(crate) fn assign_object(&self, task: TaskHandle) {
        *lock(&self.shared.assigned) = Some(Arc::clone(&task));
        {
            let mut latch = lock(&self.shared.latch);
            latch.next_object = Some(task);
            self.shared.pending_object.fetch_add(1, Ordering::AcqRel);
            self.shared.status.store(WorkerStatus::Executing);
            latch.suspended = false;
        }
        self.shared.latch_cv.notify_one();
    }

    /// Hands a value task to the worker; same protocol as
    /// [`assign_object`](Worker::assign_object) without a trackable handle.
    pub(crate) fn assign_value(&self, task: ValueTask) {
        {
            let mut latch = lock(&self.shared.latch);
            latch.next_value = Some(task);
            self.shared.pending_value.fetch_add(1, Ordering::AcqRel);
            self.shared.status.store(WorkerStatus::Executing);
            latch.suspended = false;
        }
        self.shared.latch_cv.notify_one();
    }

    /// Requests suspension. The current task is not interrupted; the worker
    /// parks at the next loop top. An executing worker reads as `Pausing`
    /// from here on.
    pub fn suspend(&self) {
        lock(&self.shared.latch).suspended = true;
        let _ = self
            .shared
            .status
            .compare_exchange(WorkerStatus::Executing, WorkerStatus::Pausing);
    }

    /// Releases the suspend latch. A pausing worker reads as `Executing`
    /// again.
    pub fn resume(&self) {
        lock(&self.shared.latch).suspended = false;
        let _ = self
            .shared
            .status
            .compare_exchange(WorkerStatus::Pausing, WorkerStatus::Executing);
        self.shared.latch_cv.notify_one();
    }

    /// Sets the stop signal, wakes the latch and joins the thread. A task
    /// in flight runs to completion first; cancellation is cooperative.
    pub fn terminate(&self) {
        self.shared.stop.store(true, Ordering::Release);
        drop(lock(&self.shared.latch));
        self.shared.latch_cv.notify_all();

        if let Some(handle) = lock(&self.handle).take() {
            if handle.join().is_err() {
                tracing::warn!(worker = self.shared.id, "worker thread panicked");
            }
        }
    }

    /// Whether this worker's most recently assigned object task is
    /// `handle`.
    pub(crate) fn owns_task(&self, handle: &TaskHandle) -> bool {
        lock(&self.shared.assigned)
            .as_ref()
            .map(|assigned| same_handle(assigned, handle))
            .unwrap_or(false)
    }

    /// Points the worker at its pool's span sink. Later calls are ignored.
    #[cfg(feature = "chrome-trace")]
    pub(crate) fn attach_trace_sink(&self, sink: Arc<TraceSink>) {
        let _ = self.shared.trace.set(sink);
    }

    /// Dispatcher-side transition of a finished worker back to available.
    pub(crate) fn promote_if_purging(&self) -> bool {
        self.shared
            .status
            .compare_exchange(WorkerStatus::Purging, WorkerStatus::NotExecuting)
            .is_ok()
    }

    fn event_loop(shared: Arc<Shared>) {
        loop {
            if shared.stop.load(Ordering::Acquire) {
                break;
            }

            // Consume pending slot changes under a minimal critical section.
            let (object, value) = {
                let mut latch = lock(&shared.latch);
                let object = if shared.pending_object.load(Ordering::Acquire) != 0 {
                    shared.pending_object.fetch_sub(1, Ordering::AcqRel);
                    latch.next_object.take()
                } else {
                    None
                };
                let value = if shared.pending_value.load(Ordering::Acquire) != 0 {
                    shared.pending_value.fetch_sub(1, Ordering::AcqRel);
                    latch.next_value.take()
                } else {
                    None
                };
                (object, value)
            };

            // Object tasks first: they carry their own attributes and an
            // addressable identity.
            if let Some(task) = object {
                platform::apply_to_current_thread(task.execution_attrs());
                #[cfg(feature = "chrome-trace")]
                let started = Instant::now();
                Self::run_object(shared.id, &task);
                #[cfg(feature = "chrome-trace")]
                if let Some(sink) = shared.trace.get() {
                    let kind = TaskKind::Object {
                        object_id: task.object_id(),
                    };
                    sink.record(shared.id, kind, started, started.elapsed());
                }
                // Release the handle before going Purging: once Purging is
                // visible the dispatcher may promote and reassign, and a
                // late clear would wipe the next assignment's handle.
                *lock(&shared.assigned) = None;
                shared.status.store(WorkerStatus::Purging);
            }

            if let Some(task) = value {
                if let Some(attrs) = task.attrs() {
                    platform::apply_to_current_thread(attrs);
                }
                #[cfg(feature = "chrome-trace")]
                let started = Instant::now();
                Self::run_value(shared.id, task);
                #[cfg(feature = "chrome-trace")]
                if let Some(sink) = shared.trace.get() {
                    sink.record(shared.id, TaskKind::Value, started, started.elapsed());
                }
                shared.status.store(WorkerStatus::Purging);
            }

            // Park until resumed or stopped. An assignment that raced in
            // while we were running keeps us out of the park entirely.
            let mut latch = lock(&shared.latch);
            if shared.pending_object.load(Ordering::Acquire) == 0
                && shared.pending_value.load(Ordering::Acquire) == 0
            {
                latch.suspended = true;
                while latch.suspended && !shared.stop.load(Ordering::Acquire) {
                    latch = match shared.latch_cv.wait(latch) {
                        Ok(guard) => guard,
                        Err(poisoned) => poisoned.into_inner(),
                    };
                }
            }
        }
        tracing::debug!(worker = shared.id, "worker exiting");
    }

    fn run_object(worker_id: usize, task: &TaskHandle) {
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| task.run())) {
            tracing::warn!(
                worker = worker_id,
                object_id = task.object_id(),
                "object task panicked: {}",
                panic_message(&payload)
            );
        }
    }

    fn run_value(worker_id: usize, task: ValueTask) {
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(move || task.run())) {
            tracing::warn!(
                worker = worker_id,
                "value task panicked: {}",
                panic_message(&payload)
            );
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "unknown panic payload"
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        self.terminate();
    }
}

impl std::fmt::Debug for Worker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Worker")
            .field("id", &self.shared.id)
            .field("status", &self.status())
            .finish()
    }
}
