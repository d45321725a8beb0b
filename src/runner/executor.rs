//! The injectable execution context consumed by runners and timers.

use std::sync::Arc;

use futures::future::BoxFuture;

/// Runs units of work in the background and surfaces unhandled task failures.
///
/// A runner spawns its consumer loop through this trait, so the same runner
/// logic works on any scheduling substrate. `report_fault` is the process-wide
/// fault channel: failures from tasks that were not marked as ignorable end up
/// here instead of being silently dropped.
pub trait Executor: Send + Sync + 'static {
    /// Run a future to completion in the background.
    fn spawn(&self, fut: BoxFuture<'static, ()>);

    /// Surface an unhandled task failure.
    fn report_fault(&self, error: anyhow::Error);
}

impl<E: Executor + ?Sized> Executor for Arc<E> {
    fn spawn(&self, fut: BoxFuture<'static, ()>) {
        (**self).spawn(fut);
    }

    fn report_fault(&self, error: anyhow::Error) {
        (**self).report_fault(error);
    }
}

/// Executor backed by the ambient tokio runtime.
///
/// Faults are logged at error level, which is where unhandled background
/// failures surface by convention.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioExecutor;

impl Executor for TokioExecutor {
    fn spawn(&self, fut: BoxFuture<'static, ()>) {
        tokio::spawn(fut);
    }

    fn report_fault(&self, error: anyhow::Error) {
        tracing::error!(error = %error, "background task failed");
    }
}
