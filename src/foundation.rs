//! Opt-in convenience facade over [`ThreadPool`].
//!
//! `Foundation` owns at most one pool, creates it lazily for the current
//! platform and forwards the control surface, so callers that want a
//! single app-wide pool can hold one `Foundation` instead of threading a
//! pool value around. It is an ordinary value with an ordinary lifecycle,
//! not a process-wide singleton.

use crate::error::PoolError;
use crate::platform::PlatformId;
use crate::pool::{ThreadPool, WaitResult};
use crate::task::{TaskHandle, ValueTask};
use crate::worker::WorkerStatus;

/// Builds a pool for the given platform. Fails only when not a single
/// worker thread could be spawned.
pub fn create_pool(platform: PlatformId, max_threads: usize) -> Result<ThreadPool, PoolError> {
    ThreadPool::create(platform, max_threads)
}

/// Shuts the pool down and releases it. Equivalent to dropping it; named
/// for symmetry with [`create_pool`].
pub fn release_pool(pool: ThreadPool) {
    drop(pool);
}

/// Facade owning an optional pool for the current platform.
pub struct Foundation {
    platform: PlatformId,
    pool: Option<ThreadPool>,
}

impl Foundation {
    pub fn new() -> Self {
        Foundation {
            platform: PlatformId::current(),
            pool: None,
        }
    }

    /// Creates the owned pool if it does not exist yet. Returns whether a
    /// pool is up afterwards.
    pub fn create_thread_pool(&mut self, max_threads: usize) -> bool {
        if self.pool.is_none() {
            match ThreadPool::create(self.platform, max_threads) {
                Ok(pool) => self.pool = Some(pool),
                Err(error) => {
                    tracing::warn!(%error, "failed to create thread pool");
                    return false;
                }
            }
        }
        true
    }

    pub fn pool(&self) -> Option<&ThreadPool> {
        self.pool.as_ref()
    }

    /// Submits an object task; false when no pool exists or the pool
    /// refuses it.
    pub fn submit_task(&self, task: &TaskHandle) -> bool {
        self.pool
            .as_ref()
            .map(|pool| pool.submit_object(task))
            .unwrap_or(false)
    }

    /// Submits a value task; false when no pool exists or the pool
    /// refuses it.
    pub fn submit_value_task(&self, task: ValueTask) -> bool {
        match self.pool.as_ref() {
            Some(pool) => pool.submit_value(task),
            None => false,
        }
    }

    /// Queue emptiness; a missing pool counts as empty.
    pub fn is_empty(&self) -> bool {
        self.pool.as_ref().map(|pool| pool.is_empty()).unwrap_or(true)
    }

    /// Busy test by head count: workers neither available nor pausing are
    /// taken as working. Counts against the configured bound, so workers
    /// removed by targeted termination keep reading as busy.
    pub fn any_threads_working(&self) -> bool {
        let Some(pool) = self.pool.as_ref() else {
            return false;
        };

        let available = pool.available_count();
        let pausing = pool.specific_status_count(WorkerStatus::Pausing);
        available + pausing != pool.max_thread_count()
    }

    pub fn suspend_all(&self) {
        if let Some(pool) = self.pool.as_ref() {
            pool.suspend_all();
        }
    }

    pub fn resume_all(&self) {
        if let Some(pool) = self.pool.as_ref() {
            pool.resume_all();
        }
    }

    pub fn terminate_all(&self) {
        if let Some(pool) = self.pool.as_ref() {
            pool.terminate_all();
        }
    }

    pub fn pause(&self, handle: &TaskHandle) {
        if let Some(pool) = self.pool.as_ref() {
            pool.pause(handle);
        }
    }

    pub fn resume(&self, handle: &TaskHandle) {
        if let Some(pool) = self.pool.as_ref() {
            pool.resume(handle);
        }
    }

    pub fn terminate(&self, handle: &TaskHandle) {
        if let Some(pool) = self.pool.as_ref() {
            pool.terminate(handle);
        }
    }

    pub fn status(&self, handle: &TaskHandle) -> WorkerStatus {
        self.pool
            .as_ref()
            .map(|pool| pool.status(handle))
            .unwrap_or(WorkerStatus::None)
    }

    /// Waits for the task behind `handle`; a missing pool reports
    /// completion immediately.
    pub fn wait(&self, handle: &TaskHandle, timeout_ms: u32) -> WaitResult {
        self.pool
            .as_ref()
            .map(|pool| pool.wait(handle, timeout_ms))
            .unwrap_or(WaitResult::Completed)
    }

    /// Tears the owned pool down.
    pub fn shutdown(&mut self) {
        self.pool = None;
    }
}

impl Default for Foundation {
    fn default() -> Self {
        Foundation::new()
    }
}
