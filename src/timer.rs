//! One-shot and periodic timers driven by the single-flight runner.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::select;
use tokio_util::sync::CancellationToken;

use crate::runner::{Executor, Task, TaskRunner, TokioExecutor};

/// What a periodic timer does when its action is still running at the next
/// tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerBehavior {
    /// Wait for the action to finish before continuing the schedule.
    Wait,
    /// Skip this tick's action.
    Skip,
    /// Cancel the in-flight action and start a fresh one.
    Replace,
}

type Action = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

/// Runs an action once after a delay or repeatedly on an interval.
///
/// Scheduling goes through an internal [`TaskRunner`], so calling
/// [`interval`](Timer::interval) or [`once`](Timer::once) again replaces the
/// previous schedule, and [`stop`](Timer::stop) cooperatively cancels both the
/// pending tick and any in-flight action.
pub struct Timer {
    inner: Arc<TimerInner>,
}

struct TimerInner {
    executor: Arc<dyn Executor>,
    behavior: TimerBehavior,
    action: Action,
    /// Owns the schedule (delays between fires).
    tick_runner: TaskRunner,
    /// Owns overlapping action runs for `Skip` and `Replace`.
    action_runner: TaskRunner,
    running: AtomicBool,
}

impl Timer {
    /// A timer on the ambient tokio runtime.
    pub fn new<F, Fut>(behavior: TimerBehavior, action: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self::with_executor(TokioExecutor, behavior, action)
    }

    /// A timer on a specific execution context.
    pub fn with_executor<E, F, Fut>(executor: E, behavior: TimerBehavior, action: F) -> Self
    where
        E: Executor,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let executor: Arc<dyn Executor> = Arc::new(executor);
        let tick_runner = TaskRunner::builder()
            .executor(Arc::clone(&executor))
            .build();
        let action_runner = TaskRunner::builder()
            .executor(Arc::clone(&executor))
            .build();
        Self {
            inner: Arc::new(TimerInner {
                executor,
                behavior,
                action: Arc::new(move || Box::pin(action()) as BoxFuture<'static, ()>),
                tick_runner,
                action_runner,
                running: AtomicBool::new(false),
            }),
        }
    }

    /// Fire the action repeatedly, every `period`, after `initial_delay`.
    ///
    /// Replaces any previously scheduled work on this timer.
    pub fn interval(&self, period: Duration, initial_delay: Duration) {
        self.inner.running.store(true, Ordering::SeqCst);
        let inner = Arc::clone(&self.inner);
        self.inner.executor.spawn(Box::pin(async move {
            let schedule = Arc::clone(&inner);
            inner
                .tick_runner
                .replace(move |cancel: CancellationToken| async move {
                    if !initial_delay.is_zero() {
                        select! {
                            _ = tokio::time::sleep(initial_delay) => {}
                            _ = cancel.cancelled() => return anyhow::Ok(()),
                        }
                    }
                    while schedule.running.load(Ordering::SeqCst) && !cancel.is_cancelled() {
                        schedule.fire(&cancel).await;
                        if !period.is_zero() {
                            select! {
                                _ = tokio::time::sleep(period) => {}
                                _ = cancel.cancelled() => break,
                            }
                        }
                    }
                    anyhow::Ok(())
                })
                .await;
        }));
    }

    /// Fire the action once after `delay`.
    ///
    /// Replaces any previously scheduled work on this timer. The timer reports
    /// not running again once the action has completed.
    pub fn once(&self, delay: Duration) {
        self.inner.running.store(true, Ordering::SeqCst);
        let inner = Arc::clone(&self.inner);
        self.inner.executor.spawn(Box::pin(async move {
            let task_inner = Arc::clone(&inner);
            inner
                .tick_runner
                .replace(move |cancel: CancellationToken| async move {
                    if !delay.is_zero() {
                        select! {
                            _ = tokio::time::sleep(delay) => {}
                            _ = cancel.cancelled() => return anyhow::Ok(()),
                        }
                    }
                    select! {
                        _ = (task_inner.action)() => {}
                        _ = cancel.cancelled() => {}
                    }
                    task_inner.running.store(false, Ordering::SeqCst);
                    anyhow::Ok(())
                })
                .await;
        }));
    }

    /// Cancel the schedule and any in-flight action.
    pub fn stop(&self) {
        self.inner.running.store(false, Ordering::SeqCst);
        self.inner.tick_runner.cancel();
        self.inner.action_runner.cancel();
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }
}

impl TimerInner {
    async fn fire(&self, cancel: &CancellationToken) {
        match self.behavior {
            TimerBehavior::Wait => {
                select! {
                    _ = (self.action)() => {}
                    _ = cancel.cancelled() => {}
                }
            }
            TimerBehavior::Skip => {
                self.action_runner
                    .skip_if_running(action_task(Arc::clone(&self.action)));
            }
            TimerBehavior::Replace => {
                let runner = self.action_runner.clone();
                let action = Arc::clone(&self.action);
                self.executor.spawn(Box::pin(async move {
                    runner.replace(action_task(action)).await;
                }));
            }
        }
    }
}

fn action_task(action: Action) -> impl Task {
    move |cancel: CancellationToken| async move {
        select! {
            _ = action() => {}
            _ = cancel.cancelled() => {}
        }
        anyhow::Ok(())
    }
}
