//! Internal error taxonomy.
//!
//! The public pool surface stays total: booleans for submissions, status
//! enums for queries. These errors exist for the fallible interior (worker
//! spawning, pool construction) and are mapped or swallowed at the
//! boundary.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PoolError {
    /// `create` could not bring up a single worker.
    #[error("no worker threads could be spawned")]
    NoWorkers,

    /// A required thread failed to spawn.
    #[error("failed to spawn thread: {0}")]
    Spawn(#[from] std::io::Error),
}
