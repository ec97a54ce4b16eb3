//! Snapshot-and-fork coordinator: captures the calling thread's context once,
//! runs a unit of work on a freshly created worker pool whose workers are
//! seeded with that snapshot, and blocks until completion.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::thread;

use tracing::debug;

use super::pool::{TaskScope, UncaughtExceptionHandler, WorkerPool};
use super::ExecutionError;
use crate::context::{ContextStore, ThreadConfinedContext};

/// Coordinates concurrent story execution with context snapshot seeding
///
/// The pool is scoped to a single [`execute`](Self::execute) call; the
/// snapshot is taken exactly once per call and is immutable thereafter. A
/// worker thread's later mutations never propagate back to the caller's
/// store or to other workers.
pub struct ForkCoordinator {
    context: Arc<ThreadConfinedContext>,
    parallelism_limit: Option<usize>,
}

impl ForkCoordinator {
    pub fn new(context: Arc<ThreadConfinedContext>) -> Self {
        Self {
            context,
            parallelism_limit: None,
        }
    }

    /// Cap the worker pool size, typically to a batch's configured `threads`
    ///
    /// The effective pool size is the smaller of this limit and the number of
    /// available processing units.
    pub fn with_parallelism_limit(mut self, limit: usize) -> Self {
        self.parallelism_limit = Some(limit.max(1));
        self
    }

    /// The context store workers are seeded from
    pub fn context(&self) -> &Arc<ThreadConfinedContext> {
        &self.context
    }

    /// Run `work` across the worker pool and block until all spawned tasks
    /// complete
    ///
    /// The calling thread's context is snapshotted before pool creation,
    /// forcing all registered lazy initializers as a side effect; every
    /// worker imports the snapshot into its own thread-confined store before
    /// executing any task. Failures escaping tasks on worker threads are
    /// delivered to `handler` and also surface as
    /// [`ExecutionError::TaskFailed`] from this call.
    pub fn execute<F>(&self, work: F, handler: UncaughtExceptionHandler) -> Result<(), ExecutionError>
    where
        F: FnOnce(&TaskScope) + Send + 'static,
    {
        let mut snapshot = HashMap::new();
        self.context.copy_all_to(&mut snapshot);
        let snapshot = Arc::new(snapshot);

        let parallelism = self.effective_parallelism();
        debug!(
            parallelism,
            snapshot_entries = snapshot.len(),
            "Starting snapshot-and-fork execution"
        );

        let pool = WorkerPool::start(parallelism, Arc::clone(&self.context), snapshot, handler)?;
        pool.run_to_completion(Box::new(work))
    }

    fn effective_parallelism(&self) -> usize {
        let available = thread::available_parallelism()
            .map(NonZeroUsize::get)
            .unwrap_or(1);
        match self.parallelism_limit {
            Some(limit) => available.min(limit),
            None => available,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ContextStoreExt;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    fn noop_handler() -> UncaughtExceptionHandler {
        Arc::new(|_| {})
    }

    #[test]
    fn workers_are_seeded_with_the_callers_context() {
        let context = Arc::new(ThreadConfinedContext::new());
        context.put("seeded", "value".to_string());
        let coordinator = ForkCoordinator::new(Arc::clone(&context));

        let observations = Arc::new(AtomicUsize::new(0));
        let observed = Arc::clone(&observations);
        let inner_context = Arc::clone(&context);
        coordinator
            .execute(
                move |scope| {
                    for _ in 0..8 {
                        let context = Arc::clone(&inner_context);
                        let observed = Arc::clone(&observed);
                        scope.spawn(move |_| {
                            if context.get::<String>("seeded").as_deref()
                                == Some(&"value".to_string())
                            {
                                observed.fetch_add(1, Ordering::SeqCst);
                            }
                        });
                    }
                },
                noop_handler(),
            )
            .unwrap();

        assert_eq!(observations.load(Ordering::SeqCst), 8);
    }

    #[test]
    fn worker_writes_do_not_leak_back_to_the_caller() {
        let context = Arc::new(ThreadConfinedContext::new());
        context.put("key", "original".to_string());
        let coordinator = ForkCoordinator::new(Arc::clone(&context));

        let inner_context = Arc::clone(&context);
        coordinator
            .execute(
                move |_| {
                    inner_context.put("key", "mutated".to_string());
                    inner_context.put("extra", 1u8);
                },
                noop_handler(),
            )
            .unwrap();

        assert_eq!(
            context.get::<String>("key").as_deref(),
            Some(&"original".to_string())
        );
        assert!(context.get::<u8>("extra").is_none());
    }

    #[test]
    fn snapshot_reflects_overrides_of_initialized_values() {
        let context = Arc::new(ThreadConfinedContext::new());
        context.put_init_value_supplier(
            "counter",
            Arc::new(|| Arc::new(0u32) as crate::context::ContextValue),
        );
        let initial = context.get_or_compute("counter", || 0u32).unwrap();
        assert_eq!(*initial, 0);
        context.put("counter", 5u32);

        let coordinator = ForkCoordinator::new(Arc::clone(&context));
        let inner_context = Arc::clone(&context);
        let seen = Arc::new(Mutex::new(None));
        let seen_in_worker = Arc::clone(&seen);
        coordinator
            .execute(
                move |_| {
                    *seen_in_worker.lock().unwrap() =
                        inner_context.get::<u32>("counter").map(|v| *v);
                },
                noop_handler(),
            )
            .unwrap();

        assert_eq!(*seen.lock().unwrap(), Some(5));
    }

    #[test]
    fn task_panics_reach_the_handler_and_the_join_result() {
        let context = Arc::new(ThreadConfinedContext::new());
        let coordinator = ForkCoordinator::new(context);

        let handled = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&handled);
        let handler: UncaughtExceptionHandler = Arc::new(move |failure| {
            sink.lock().unwrap().push(failure.message.clone());
        });

        let result = coordinator.execute(
            |scope| {
                scope.spawn(|_| panic!("story assertion failed"));
                scope.spawn(|_| {});
            },
            handler,
        );

        match result {
            Err(ExecutionError::TaskFailed { count, first }) => {
                assert_eq!(count, 1);
                assert_eq!(first, "story assertion failed");
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(
            handled.lock().unwrap().as_slice(),
            &["story assertion failed".to_string()]
        );
    }

    #[test]
    fn a_failed_task_does_not_prevent_siblings_from_completing() {
        let context = Arc::new(ThreadConfinedContext::new());
        let coordinator = ForkCoordinator::new(context);

        let completed = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&completed);
        let result = coordinator.execute(
            move |scope| {
                scope.spawn(|_| panic!("boom"));
                for _ in 0..4 {
                    let counter = Arc::clone(&counter);
                    scope.spawn(move |_| {
                        counter.fetch_add(1, Ordering::SeqCst);
                    });
                }
            },
            noop_handler(),
        );

        assert!(matches!(result, Err(ExecutionError::TaskFailed { .. })));
        assert_eq!(completed.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn nested_spawns_are_awaited_before_returning() {
        let context = Arc::new(ThreadConfinedContext::new());
        let coordinator = ForkCoordinator::new(context).with_parallelism_limit(2);

        let completed = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&completed);
        coordinator
            .execute(
                move |scope| {
                    let counter_outer = Arc::clone(&counter);
                    scope.spawn(move |scope| {
                        let counter_inner = Arc::clone(&counter_outer);
                        scope.spawn(move |_| {
                            counter_inner.fetch_add(1, Ordering::SeqCst);
                        });
                        counter_outer.fetch_add(1, Ordering::SeqCst);
                    });
                },
                noop_handler(),
            )
            .unwrap();

        assert_eq!(completed.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn parallelism_limit_is_never_zero() {
        let context = Arc::new(ThreadConfinedContext::new());
        let coordinator = ForkCoordinator::new(context).with_parallelism_limit(0);
        assert_eq!(coordinator.effective_parallelism(), 1);
    }
}
