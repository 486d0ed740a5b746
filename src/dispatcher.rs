//! The dispatcher: a dedicated thread that periodically drains the
//! submission queues into idle workers and recycles finished ones.
//!
//! One cycle serves, in order: missed object tasks, primary object tasks,
//! missed value tasks, primary value tasks. A primary task that finds no
//! idle worker spills to the front of its missed queue and is retried
//! first next cycle. The cycle ends by promoting purging workers back to
//! available, then the thread sleeps for the configured interval.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::pool::PoolShared;

/// Upper bound on one uninterruptible sleep, so stop requests are honored
/// promptly even under a long dispatch interval.
const SLEEP_SLICE: Duration = Duration::from_millis(10);

pub(crate) struct Dispatcher {
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Dispatcher {
    pub(crate) fn start(shared: Arc<PoolShared>) -> std::io::Result<Dispatcher> {
        let running = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&running);
        let handle = thread::Builder::new()
            .name("taskpool-dispatcher".into())
            .spawn(move || Dispatcher::run(shared, flag))?;

        Ok(Dispatcher {
            running,
            handle: Some(handle),
        })
    }

    /// Clears the running flag and joins the dispatcher thread. Called
    /// before pool teardown, outside the pool mutex.
    pub(crate) fn stop(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::warn!("dispatcher thread panicked");
            }
        }
    }

    fn run(shared: Arc<PoolShared>, running: Arc<AtomicBool>) {
        while running.load(Ordering::Acquire) && !shared.is_shut_down() {
            let interval = Dispatcher::cycle(&shared);
            let deadline = Instant::now() + interval;
            while running.load(Ordering::Acquire) && !shared.is_shut_down() {
                let now = Instant::now();
                if now >= deadline {
                    break;
                }
                thread::sleep(SLEEP_SLICE.min(deadline - now));
            }
        }
        tracing::debug!("dispatcher exiting");
    }

    /// One drain-and-promote pass, entirely under the pool mutex. Returns
    /// the sleep interval for the caller.
    fn cycle(shared: &PoolShared) -> Duration {
        let mut state = shared.lock_state();
        let mut spilled = 0usize;
        let mut dispatched = 0usize;

        // Missed object tasks, oldest first; left in place when no worker
        // frees up.
        while let Some(index) = state.available_worker_index() {
            match state.queues.pop_missed_object() {
                Some(task) => {
                    state.workers[index].assign_object(task);
                    dispatched += 1;
                }
                None => break,
            }
        }

        // Primary object tasks: the queue is always drained, spilling the
        // unplaceable remainder.
        while let Some(task) = state.queues.pop_object() {
            match state.available_worker_index() {
                Some(index) => {
                    state.workers[index].assign_object(task);
                    dispatched += 1;
                }
                None => {
                    state.queues.miss_object(task);
                    spilled += 1;
                }
            }
        }

        // Value tasks, same policy.
        while let Some(index) = state.available_worker_index() {
            match state.queues.pop_missed_value() {
                Some(task) => {
                    state.workers[index].assign_value(task);
                    dispatched += 1;
                }
                None => break,
            }
        }

        while let Some(task) = state.queues.pop_value() {
            match state.available_worker_index() {
                Some(index) => {
                    state.workers[index].assign_value(task);
                    dispatched += 1;
                }
                None => {
                    state.queues.miss_value(task);
                    spilled += 1;
                }
            }
        }

        if spilled > 0 {
            tracing::trace!(spilled, "no idle worker; tasks moved to missed queues");
        }

        // Recycle finished workers. Waiters poll the pool condvar, so tell
        // them something changed.
        let mut promoted = 0usize;
        for worker in &state.workers {
            if worker.promote_if_purging() {
                promoted += 1;
            }
        }
        if promoted > 0 {
            shared.notify_all();
        }

        #[cfg(feature = "metrics")]
        {
            shared.metrics.cycles.fetch_add(1, Ordering::Relaxed);
            shared
                .metrics
                .dispatched
                .fetch_add(dispatched as u64, Ordering::Relaxed);
            shared
                .metrics
                .spilled
                .fetch_add(spilled as u64, Ordering::Relaxed);
            shared
                .metrics
                .promoted
                .fetch_add(promoted as u64, Ordering::Relaxed);
        }
        #[cfg(not(feature = "metrics"))]
        let _ = dispatched;

        state.props.dispatch_interval()
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        self.stop();
    }
}
