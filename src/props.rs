//! Pool-wide and per-worker configuration records.

use std::time::Duration;

use crate::platform::PlatformId;

/// Default bound on queued tasks of each shape.
pub const DEFAULT_MAX_TASKS: usize = 25;

/// Default worker count when none is given.
pub const DEFAULT_MAX_THREADS: usize = 10;

/// Default cadence of the dispatcher loop. Kept small relative to typical
/// task duration.
pub const DEFAULT_DISPATCH_INTERVAL: Duration = Duration::from_millis(10);

/// Pool-wide tunables: worker count, queue bound, submission lock and
/// dispatcher cadence.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PoolProperties {
    max_threads: usize,
    max_tasks: usize,
    submission_locked: bool,
    dispatch_interval: Duration,
}

impl PoolProperties {
    pub fn new(max_threads: usize) -> Self {
        PoolProperties {
            max_threads,
            ..Default::default()
        }
    }

    pub fn max_threads(&self) -> usize {
        self.max_threads
    }

    pub fn set_max_threads(&mut self, max_threads: usize) {
        self.max_threads = max_threads;
    }

    pub fn max_tasks(&self) -> usize {
        self.max_tasks
    }

    pub fn set_max_tasks(&mut self, max_tasks: usize) {
        self.max_tasks = max_tasks;
    }

    /// Whether new submissions are currently refused.
    pub fn submission_locked(&self) -> bool {
        self.submission_locked
    }

    pub fn set_submission_locked(&mut self, locked: bool) {
        self.submission_locked = locked;
    }

    pub fn dispatch_interval(&self) -> Duration {
        self.dispatch_interval
    }

    /// Sets the dispatcher cadence. The default is intended to stay small
    /// compared to task duration; raising it delays dispatch and retry of
    /// missed tasks accordingly.
    pub fn set_dispatch_interval(&mut self, interval: Duration) {
        self.dispatch_interval = interval;
    }
}

impl Default for PoolProperties {
    fn default() -> Self {
        PoolProperties {
            max_threads: DEFAULT_MAX_THREADS,
            max_tasks: DEFAULT_MAX_TASKS,
            submission_locked: false,
            dispatch_interval: DEFAULT_DISPATCH_INTERVAL,
        }
    }
}

/// Static per-worker thread properties, seeded from the platform id at pool
/// creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ThreadProperties {
    stack_size: usize,
}

impl ThreadProperties {
    /// Thread properties for the given platform. Every platform currently
    /// seeds the same 64 KiB stack; the platform id is kept in the
    /// signature for targets that will want a different size.
    pub fn for_platform(platform: PlatformId) -> Self {
        let stack_size = match platform {
            PlatformId::Windows
            | PlatformId::Linux
            | PlatformId::MacOs
            | PlatformId::Ios
            | PlatformId::Android
            | PlatformId::FreeBsd
            | PlatformId::None => 65_536,
        };
        ThreadProperties { stack_size }
    }

    pub fn stack_size(&self) -> usize {
        self.stack_size
    }

    pub fn set_stack_size(&mut self, stack_size: usize) {
        self.stack_size = stack_size;
    }
}
