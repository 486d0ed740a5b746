//! # taskpool - Worker-Thread Pool with Per-Task Scheduling Attributes
//!
//! A cross-platform pool that multiplexes a bounded set of OS threads
//! across queues of user-submitted tasks. Every task can carry execution
//! attributes (priority class, CPU affinity mode, ideal core) that are
//! applied to the worker thread at dispatch time, and object tasks are
//! individually addressable afterwards: pause, resume, terminate and wait
//! all work by task identity.
//!
//! ## Architecture
//!
//! - **Workers**: OS threads wrapping a small state machine
//!   (NotExecuting, Executing, Purging, Pausing) with a suspend latch and
//!   a cooperative stop signal
//! - **Queues**: a primary and a "missed" retry FIFO per task shape,
//!   bounded at submission
//! - **Dispatcher**: one dedicated thread that periodically drains the
//!   queues into idle workers and recycles finished ones
//! - **Execution attributes**: per-task priority/affinity bundle pushed
//!   through the platform's scheduling knobs, best-effort
//!
//! ## Example
//!
//! ```no_run
//! use taskpool::{PlatformId, ThreadPool, ValueTask};
//!
//! let pool = ThreadPool::create(PlatformId::current(), 4).expect("pool");
//!
//! let submitted = pool.submit_value(ValueTask::new(|_, _| {
//!     println!("hello from a pooled worker");
//! }));
//! assert!(submitted);
//! ```

pub mod attrs;
pub mod error;
pub mod foundation;
pub mod metrics;
pub mod platform;
pub mod pool;
pub mod props;
pub mod sysdesc;
pub mod task;
pub mod worker;

mod dispatcher;
mod queue;

#[cfg(feature = "chrome-trace")]
pub mod trace;

pub use attrs::{AffinityMode, ExecutionAttrs, Priority};
pub use error::PoolError;
pub use foundation::{create_pool, release_pool, Foundation};
pub use platform::PlatformId;
pub use pool::{ThreadPool, WaitResult, WAIT_INFINITE};
pub use props::{PoolProperties, ThreadProperties};
pub use sysdesc::SystemDescription;
pub use task::{same_handle, TaskArg, TaskHandle, Threadable, ValueTask};
pub use worker::{Worker, WorkerStatus};

#[cfg(feature = "chrome-trace")]
pub use trace::{TaskKind, TaskSpan, TraceSink};

#[cfg(test)]
mod tests;
