//! The single-flight task runner.

use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard};

use futures::FutureExt;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::executor::{Executor, TokioExecutor};
use super::queue::{QueuePolicy, TaskQueue};
use super::task::{BoxedTask, Task};

/// Runs submitted tasks one at a time, in admission order.
///
/// A runner has one background consumer at most. The consumer drains the queue
/// sequentially and goes dormant when there is nothing left to do; the next
/// admission relaunches it. Cancelling never retires a runner: a new
/// [`enqueue`](TaskRunner::enqueue) is always possible afterwards.
///
/// Handles are cheap to clone and share one queue.
#[derive(Clone)]
pub struct TaskRunner {
    inner: Arc<Inner>,
}

struct Inner {
    executor: Arc<dyn Executor>,
    ignore_errors: bool,
    state: Mutex<State>,
    /// Signalled whenever the running task stops or the consumer goes dormant.
    quiesced: Notify,
    /// Serializes `replace` calls against each other.
    replace_lock: tokio::sync::Mutex<()>,
}

struct State {
    queue: TaskQueue,
    running: bool,
    consumer_active: bool,
    current: Option<CancellationToken>,
}

impl TaskRunner {
    /// A runner with the default policy: `QueuePolicy::Bounded(1)`, the tokio
    /// executor, and error reporting enabled.
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn builder() -> TaskRunnerBuilder {
        TaskRunnerBuilder::new()
    }

    /// Admit a task behind whatever is already queued.
    ///
    /// Returns `true` if the queue policy accepted the task. Never blocks and
    /// never waits for the task to run; the consumer is relaunched if it had
    /// gone dormant.
    pub fn enqueue(&self, task: impl Task) -> bool {
        self.enqueue_boxed(Box::new(task))
    }

    fn enqueue_boxed(&self, task: BoxedTask) -> bool {
        let mut state = self.inner.lock_state();
        let running = state.running;
        let accepted = state.queue.try_add(task, running);
        if accepted {
            self.ensure_consumer(&mut state);
        }
        accepted
    }

    /// Admit a task only if nothing is running and nothing is queued.
    ///
    /// Returns `false` (and drops the task) otherwise. This debounces to the
    /// first submission rather than the last.
    pub fn skip_if_running(&self, task: impl Task) -> bool {
        let mut state = self.inner.lock_state();
        if state.running || !state.queue.is_empty() {
            return false;
        }
        state.queue.force_add(Box::new(task));
        self.ensure_consumer(&mut state);
        true
    }

    /// Cancel the running task, drop all queued tasks, and install `task` as
    /// the only pending work.
    ///
    /// Waits for the previous task to actually stop before installing the new
    /// one; a task admitted while the installation is in flight is cancelled
    /// as well. Concurrent `replace` calls serialize; the last one to commit
    /// wins.
    pub async fn replace(&self, task: impl Task) {
        let task: BoxedTask = Box::new(task);
        let _serial = self.inner.replace_lock.lock().await;
        loop {
            self.cancel();
            self.join().await;
            let mut state = self.inner.lock_state();
            // an enqueue can slip in between join observing quiescence and
            // this lock; cancel that one too before installing
            if state.running || state.consumer_active {
                drop(state);
                continue;
            }
            state.queue.clear();
            state.queue.force_add(task);
            self.ensure_consumer(&mut state);
            return;
        }
    }

    /// Request cancellation of the running task and drop all queued tasks.
    ///
    /// Fire-and-forget: returns without waiting for the running task to honor
    /// the request. The runner stays usable; a later `enqueue` relaunches the
    /// consumer.
    pub fn cancel(&self) {
        let current = {
            let mut state = self.inner.lock_state();
            state.queue.clear();
            state.current.clone()
        };
        if let Some(token) = current {
            debug!("cancelling running task");
            token.cancel();
        }
    }

    /// [`cancel`](Self::cancel), then wait until the running task has stopped
    /// and the consumer has gone dormant.
    ///
    /// Returns immediately when nothing is running.
    pub async fn cancel_and_join(&self) {
        self.cancel();
        self.join().await;
    }

    /// Whether a task is executing right now.
    pub fn is_running(&self) -> bool {
        self.inner.lock_state().running
    }

    /// Wait until no task is running and the consumer is dormant.
    async fn join(&self) {
        loop {
            let notified = self.inner.quiesced.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            {
                let state = self.inner.lock_state();
                if !state.running && !state.consumer_active {
                    return;
                }
            }
            notified.await;
        }
    }

    /// Relaunch the consumer if it has gone dormant. Called with the state
    /// mutex held so two producers cannot both spawn one.
    fn ensure_consumer(&self, state: &mut State) {
        if state.consumer_active {
            return;
        }
        state.consumer_active = true;
        debug!("launching consumer");
        let inner = Arc::clone(&self.inner);
        self.inner.executor.spawn(Box::pin(Inner::drain(inner)));
    }
}

impl Default for TaskRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl Inner {
    fn lock_state(&self) -> MutexGuard<'_, State> {
        // No code path panics while holding the lock, so poisoning cannot occur.
        self.state.lock().expect("runner state lock poisoned")
    }

    /// The consumer loop: pop and execute tasks until the queue is drained,
    /// then go dormant. Ownership transitions (`idle <-> running`) happen
    /// under the state mutex; the mutex is never held across a task await.
    async fn drain(self: Arc<Self>) {
        loop {
            let (task, token) = {
                let mut state = self.lock_state();
                match state.queue.pop_front() {
                    Some(task) => {
                        let token = CancellationToken::new();
                        state.running = true;
                        state.current = Some(token.clone());
                        (task, token)
                    }
                    None => {
                        state.consumer_active = false;
                        drop(state);
                        self.quiesced.notify_waiters();
                        debug!("consumer dormant");
                        return;
                    }
                }
            };

            let outcome = AssertUnwindSafe(task.run(token.clone())).catch_unwind().await;

            // Guaranteed idle transition: runs on success, error, cancellation,
            // and panic alike, so a failing task can never wedge the runner.
            {
                let mut state = self.lock_state();
                state.running = false;
                state.current = None;
            }
            self.quiesced.notify_waiters();

            match outcome {
                Ok(Ok(())) => {}
                Ok(Err(error)) => self.handle_failure(error, token.is_cancelled()),
                Err(panic) => {
                    let error = anyhow::anyhow!("task panicked: {}", panic_message(&*panic));
                    self.handle_failure(error, token.is_cancelled());
                }
            }
        }
    }

    fn handle_failure(&self, error: anyhow::Error, cancelled: bool) {
        if cancelled {
            // A cancelled task's non-completion is normal, not a failure.
            debug!(error = %error, "cancelled task exited early");
        } else if self.ignore_errors {
            debug!(error = %error, "task failed (ignored)");
        } else {
            self.executor.report_fault(error);
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message
    } else {
        "non-string panic payload"
    }
}

/// Builder for constructing a [`TaskRunner`].
pub struct TaskRunnerBuilder {
    policy: QueuePolicy,
    executor: Arc<dyn Executor>,
    ignore_errors: bool,
}

impl TaskRunnerBuilder {
    fn new() -> Self {
        Self {
            policy: QueuePolicy::default(),
            executor: Arc::new(TokioExecutor),
            ignore_errors: false,
        }
    }

    /// Set the queue admission policy.
    ///
    /// # Panics
    ///
    /// Panics on `QueuePolicy::Bounded(0)`; use `QueuePolicy::Immediate` for
    /// the accept-only-when-idle regime.
    pub fn queue_policy(mut self, policy: QueuePolicy) -> Self {
        if let QueuePolicy::Bounded(capacity) = policy {
            assert!(capacity > 0, "bounded queue capacity must be at least 1");
        }
        self.policy = policy;
        self
    }

    /// Set the execution context tasks run on.
    pub fn executor(mut self, executor: impl Executor) -> Self {
        self.executor = Arc::new(executor);
        self
    }

    /// Discard task errors instead of reporting them to the executor's fault
    /// channel.
    pub fn ignore_errors(mut self, ignore: bool) -> Self {
        self.ignore_errors = ignore;
        self
    }

    /// Build the runner.
    pub fn build(self) -> TaskRunner {
        TaskRunner {
            inner: Arc::new(Inner {
                executor: self.executor,
                ignore_errors: self.ignore_errors,
                state: Mutex::new(State {
                    queue: TaskQueue::new(self.policy),
                    running: false,
                    consumer_active: false,
                    current: None,
                }),
                quiesced: Notify::new(),
                replace_lock: tokio::sync::Mutex::new(()),
            }),
        }
    }
}
