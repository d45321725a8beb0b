//! The unit of work accepted by a runner.

use std::future::Future;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

/// A zero-argument unit of asynchronous work.
///
/// The runner owns a task from admission until it completes or is cancelled.
/// The [`CancellationToken`] passed to [`run`](Task::run) is the task's
/// cooperative cancellation signal: check it at natural suspension points
/// (e.g. `tokio::select!` against `cancel.cancelled()`) to get prompt
/// cancellation. A body that never checks the token may run to completion
/// even after cancellation was requested.
///
/// Any closure of the shape `FnOnce(CancellationToken) -> impl Future` with an
/// `anyhow::Result<()>` output is a task:
///
/// ```rust,ignore
/// runner.enqueue(|cancel| async move {
///     tokio::select! {
///         _ = do_work() => {}
///         _ = cancel.cancelled() => {}
///     }
///     Ok(())
/// });
/// ```
#[async_trait]
pub trait Task: Send + 'static {
    /// Execute the task. An `Err` is routed per the runner's error policy.
    async fn run(self: Box<Self>, cancel: CancellationToken) -> anyhow::Result<()>;
}

#[async_trait]
impl<F, Fut> Task for F
where
    F: FnOnce(CancellationToken) -> Fut + Send + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    async fn run(self: Box<Self>, cancel: CancellationToken) -> anyhow::Result<()> {
        (*self)(cancel).await
    }
}

pub(crate) type BoxedTask = Box<dyn Task>;
