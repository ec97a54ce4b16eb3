//! Work-stealing worker pool scoped to a single coordinator invocation.
//!
//! Tasks are distributed through a global injector plus per-worker deques
//! with stealing between siblings. Each worker seeds its thread-confined
//! context store from the fork-time snapshot before picking up any task.

use std::collections::HashMap;
use std::fmt;
use std::iter;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::deque::{Injector, Stealer, Worker};
use crossbeam::utils::Backoff;
use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use super::ExecutionError;
use crate::context::{ContextStore, ContextValue, ThreadConfinedContext};

/// A unit of work runnable on the pool
pub type Task = Box<dyn FnOnce(&TaskScope) + Send + 'static>;

/// An uncaught failure escaping a task on a worker thread
#[derive(Debug, Clone)]
pub struct TaskFailure {
    /// Name of the worker thread the task was running on
    pub worker: String,
    /// Panic payload message, preserved from the original failure
    pub message: String,
}

impl fmt::Display for TaskFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task on '{}' failed: {}", self.worker, self.message)
    }
}

/// Caller-supplied handler receiving every uncaught task failure
pub type UncaughtExceptionHandler = Arc<dyn Fn(&TaskFailure) + Send + Sync>;

struct PoolShared {
    injector: Injector<Task>,
    /// Tasks spawned but not yet finished; workers exit when this hits zero
    pending: AtomicUsize,
    failures: Mutex<Vec<TaskFailure>>,
}

/// Handle through which running tasks spawn further tasks onto the pool
#[derive(Clone)]
pub struct TaskScope {
    shared: Arc<PoolShared>,
}

impl TaskScope {
    /// Schedule `task` for execution on the pool
    ///
    /// Ordering between sibling tasks is not guaranteed.
    pub fn spawn(&self, task: impl FnOnce(&TaskScope) + Send + 'static) {
        self.shared.pending.fetch_add(1, Ordering::AcqRel);
        self.shared.injector.push(Box::new(task));
    }
}

/// Pool of named worker threads, torn down when the root work completes
pub(crate) struct WorkerPool {
    shared: Arc<PoolShared>,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Start `parallelism` workers, each seeding its thread-confined store
    /// with `snapshot` before running any task
    pub(crate) fn start(
        parallelism: usize,
        context: Arc<ThreadConfinedContext>,
        snapshot: Arc<HashMap<String, ContextValue>>,
        handler: UncaughtExceptionHandler,
    ) -> Result<Self, ExecutionError> {
        let shared = Arc::new(PoolShared {
            injector: Injector::new(),
            // Reserved for the root task pushed by run_to_completion; without
            // it the workers would observe zero pending work and exit.
            pending: AtomicUsize::new(1),
            failures: Mutex::new(Vec::new()),
        });

        let locals: Vec<Worker<Task>> = (0..parallelism).map(|_| Worker::new_fifo()).collect();
        let stealers: Arc<Vec<Stealer<Task>>> =
            Arc::new(locals.iter().map(Worker::stealer).collect());

        let mut handles = Vec::with_capacity(parallelism);
        for (index, local) in locals.into_iter().enumerate() {
            let worker_shared = Arc::clone(&shared);
            let stealers = Arc::clone(&stealers);
            let context = Arc::clone(&context);
            let snapshot = Arc::clone(&snapshot);
            let handler = Arc::clone(&handler);
            let spawned = thread::Builder::new()
                .name(format!("story-worker-{index}"))
                .spawn(move || {
                    worker_loop(&local, &worker_shared, &stealers, &context, &snapshot, &handler);
                });
            match spawned {
                Ok(handle) => handles.push(handle),
                Err(error) => {
                    // Release the root reservation so the workers already
                    // running observe zero pending work and exit; wait for
                    // them before surfacing the error.
                    shared.pending.fetch_sub(1, Ordering::AcqRel);
                    for handle in handles {
                        let _ = handle.join();
                    }
                    return Err(ExecutionError::WorkerSpawn(error));
                }
            }
        }

        debug!(workers = parallelism, "Worker pool started");
        Ok(Self { shared, handles })
    }

    /// Push the root task and block until every spawned task has finished
    pub(crate) fn run_to_completion(self, root: Task) -> Result<(), ExecutionError> {
        self.shared.injector.push(root);

        let mut interrupted = None;
        for handle in self.handles {
            if let Err(payload) = handle.join() {
                interrupted = Some(panic_message(payload));
            }
        }
        debug!("Worker pool torn down");

        if let Some(message) = interrupted {
            return Err(ExecutionError::Interrupted { message });
        }
        let failures = self.shared.failures.lock();
        if let Some(first) = failures.first() {
            return Err(ExecutionError::TaskFailed {
                count: failures.len(),
                first: first.message.clone(),
            });
        }
        Ok(())
    }
}

fn worker_loop(
    local: &Worker<Task>,
    shared: &Arc<PoolShared>,
    stealers: &[Stealer<Task>],
    context: &Arc<ThreadConfinedContext>,
    snapshot: &HashMap<String, ContextValue>,
    handler: &UncaughtExceptionHandler,
) {
    // Seed the thread-confined store exactly once before any task runs.
    context.put_all(snapshot);
    trace!(entries = snapshot.len(), "Worker seeded with context snapshot");

    let scope = TaskScope {
        shared: Arc::clone(shared),
    };
    let backoff = Backoff::new();
    loop {
        match find_task(local, &shared.injector, stealers) {
            Some(task) => {
                backoff.reset();
                run_task(task, &scope, shared, handler);
            }
            None => {
                if shared.pending.load(Ordering::Acquire) == 0 {
                    break;
                }
                if backoff.is_completed() {
                    thread::sleep(Duration::from_millis(1));
                } else {
                    backoff.snooze();
                }
            }
        }
    }
}

/// Decrements the pending-task counter when dropped, so the count stays
/// accurate even if failure handling itself unwinds
struct PendingTaskGuard<'a> {
    shared: &'a PoolShared,
}

impl Drop for PendingTaskGuard<'_> {
    fn drop(&mut self) {
        self.shared.pending.fetch_sub(1, Ordering::AcqRel);
    }
}

fn run_task(task: Task, scope: &TaskScope, shared: &PoolShared, handler: &UncaughtExceptionHandler) {
    let _guard = PendingTaskGuard { shared };
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| task(scope)));
    if let Err(payload) = outcome {
        let failure = TaskFailure {
            worker: thread::current()
                .name()
                .unwrap_or("story-worker")
                .to_owned(),
            message: panic_message(payload),
        };
        // A panicking handler must not take the worker down with it; the
        // failure is still recorded and surfaces from the blocking join.
        if panic::catch_unwind(AssertUnwindSafe(|| handler(&failure))).is_err() {
            warn!(worker = %failure.worker, "Uncaught-exception handler panicked");
        }
        shared.failures.lock().push(failure);
    }
}

/// Pop locally, then steal a batch from the injector, then steal from
/// sibling workers
fn find_task(
    local: &Worker<Task>,
    injector: &Injector<Task>,
    stealers: &[Stealer<Task>],
) -> Option<Task> {
    local.pop().or_else(|| {
        iter::repeat_with(|| {
            injector
                .steal_batch_and_pop(local)
                .or_else(|| stealers.iter().map(Stealer::steal).collect())
        })
        .find(|steal| !steal.is_retry())
        .and_then(|steal| steal.success())
    })
}

pub(crate) fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unidentified panic payload".to_owned()
    }
}
