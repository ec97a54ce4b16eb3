#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Story Runner Core
//!
//! Execution core for a BDD story runner that executes large suites of textual
//! test stories grouped into named batches, each batch independently
//! configurable for concurrency, timeouts, filtering, and failure tolerance.
//!
//! ## Overview
//!
//! The crate owns the three pieces of machinery the rest of a story runner is
//! built around:
//!
//! - **Batch configuration**: immutable-after-load records describing which
//!   story resources belong to a batch and how the batch runs, resolved from
//!   flat `bdd.*` properties with process-wide defaults filled in exactly once.
//! - **Thread-confined context**: a key/value store where every calling thread
//!   transparently owns an independent, mutation-safe instance, plus a shared
//!   registry of lazy initializers that any thread may be the first to
//!   materialize.
//! - **Snapshot-and-fork execution**: a coordinator that captures the calling
//!   thread's context once, spins up a bounded work-stealing worker pool whose
//!   workers are seeded with that snapshot before running any task, and blocks
//!   until all dispatched work completes.
//!
//! ## Module Organization
//!
//! - [`batch`] - Batch configuration model and registry
//! - [`context`] - Context store abstraction and thread-confined implementation
//! - [`execution`] - Snapshot-and-fork coordinator and worker pool
//! - [`error`] - Structured error handling
//! - [`logging`] - Environment-aware structured logging
//!
//! ## Quick Start
//!
//! ```rust
//! use std::collections::HashMap;
//! use std::sync::Arc;
//! use std::time::Duration;
//! use storyrunner_core::batch::{BatchDefaults, BatchKey, BatchRegistry};
//! use storyrunner_core::context::{ContextStoreExt, ThreadConfinedContext};
//! use storyrunner_core::execution::ForkCoordinator;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut properties = HashMap::new();
//! properties.insert(
//!     "bdd.story-loader.batch-1.resource-location".to_string(),
//!     "story/regression".to_string(),
//! );
//!
//! let defaults = BatchDefaults::new(
//!     Duration::from_secs(300),
//!     vec!["groovy: !skip".to_string()],
//!     false,
//! );
//! let registry = BatchRegistry::from_properties(&properties, defaults)?;
//! let batch: BatchKey = "batch-1".parse()?;
//! let execution = registry.execution_configuration(&batch);
//!
//! let context = Arc::new(ThreadConfinedContext::new());
//! context.put("story-count", 42usize);
//!
//! let coordinator = match execution.threads {
//!     Some(threads) => ForkCoordinator::new(context).with_parallelism_limit(threads),
//!     None => ForkCoordinator::new(context),
//! };
//! coordinator.execute(
//!     |scope| {
//!         scope.spawn(|_| { /* run a story */ });
//!     },
//!     Arc::new(|failure| eprintln!("story failed: {failure}")),
//! )?;
//! # Ok(())
//! # }
//! ```

pub mod batch;
pub mod context;
pub mod error;
pub mod execution;
pub mod logging;

pub use batch::{
    BatchDefaults, BatchExecutionConfiguration, BatchKey, BatchRegistry,
    BatchResourceConfiguration, ConfigurationError,
};
pub use context::{
    ContextError, ContextStore, ContextStoreExt, ContextValue, ThreadConfinedContext,
};
pub use error::{Result, StoryRunnerError};
pub use execution::{
    ExecutionError, ForkCoordinator, TaskFailure, TaskScope, UncaughtExceptionHandler,
};
