//! Single-flight asynchronous task running.
//!
//! A [`TaskRunner`] accepts units of async work and executes them one at a
//! time on an injectable [`Executor`]. Producers choose between three
//! admission policies: [`enqueue`](TaskRunner::enqueue) (wait your turn),
//! [`replace`](TaskRunner::replace) (cancel everything, run this instead), and
//! [`skip_if_running`](TaskRunner::skip_if_running) (only if nothing is
//! running or queued). Cancellation is cooperative via the
//! [`CancellationToken`](tokio_util::sync::CancellationToken) handed to every
//! task.

mod executor;
mod queue;
mod task;
mod task_runner;

pub use executor::{Executor, TokioExecutor};
pub use queue::QueuePolicy;
pub use task::Task;
pub use task_runner::{TaskRunner, TaskRunnerBuilder};
