//! # Snapshot-and-Fork Execution
//!
//! Runs a unit of work across a bounded, work-stealing pool of worker threads
//! such that every worker starts with a context equivalent to the caller's
//! context at the moment of dispatch, and no worker's writes become visible
//! to the caller or to sibling workers.
//!
//! ## Architecture
//!
//! - [`ForkCoordinator`] - snapshots the caller's thread-confined context
//!   (forcing registered lazy initializers), creates a pool scoped to the
//!   single `execute` call, and blocks until all dispatched work completes
//! - [`TaskScope`] - handle passed to running tasks for spawning further
//!   tasks onto the same pool
//! - worker threads are seeded with the snapshot exactly once before running
//!   any task; uncaught task failures are delivered to the caller-supplied
//!   [`UncaughtExceptionHandler`] and surface as a failed outcome from the
//!   blocking join

pub mod coordinator;
pub mod pool;

use thiserror::Error;

pub use coordinator::ForkCoordinator;
pub use pool::{TaskFailure, TaskScope, UncaughtExceptionHandler};

/// Execution failures surfaced by the blocking join of
/// [`ForkCoordinator::execute`]
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("Failed to start worker thread: {0}")]
    WorkerSpawn(#[from] std::io::Error),

    #[error("{count} task(s) failed during story execution; first failure: {first}")]
    TaskFailed { count: usize, first: String },

    #[error("Worker pool interrupted before completion: {message}")]
    Interrupted { message: String },
}
