//! Bounded concurrent execution of homogeneous async work.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;

/// Runs batches of async work with a cap on simultaneous executions.
///
/// Unlike [`TaskRunner`](crate::TaskRunner), which is strictly sequential,
/// this helper fans work out up to `max_parallel` at a time and waits for the
/// whole batch.
#[derive(Debug, Clone, Copy)]
pub struct ParallelRunner {
    max_parallel: usize,
}

impl Default for ParallelRunner {
    fn default() -> Self {
        Self::new(8)
    }
}

impl ParallelRunner {
    /// # Panics
    ///
    /// Panics if `max_parallel` is 0.
    pub fn new(max_parallel: usize) -> Self {
        assert!(max_parallel > 0, "max_parallel must be at least 1");
        Self { max_parallel }
    }

    /// Await every future, running at most `max_parallel` at a time.
    pub async fn run<Fut>(&self, futures: Vec<Fut>)
    where
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.map(futures, |fut| fut).await;
    }

    /// Apply `f` to every item, running at most `max_parallel` at a time.
    pub async fn for_each<I, F, Fut>(&self, items: I, f: F)
    where
        I: IntoIterator,
        I::Item: Send + 'static,
        F: Fn(I::Item) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.map(items, f).await;
    }

    /// Transform every item, preserving input order in the returned vector.
    pub async fn map<I, T, F, Fut>(&self, items: I, f: F) -> Vec<T>
    where
        I: IntoIterator,
        I::Item: Send + 'static,
        T: Send + 'static,
        F: Fn(I::Item) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = T> + Send + 'static,
    {
        let semaphore = Arc::new(Semaphore::new(self.max_parallel));
        let f = Arc::new(f);
        let mut handles = Vec::new();
        for item in items {
            let permit = semaphore
                .clone()
                .acquire_owned()
                .await
                .expect("semaphore closed");
            let f = Arc::clone(&f);
            handles.push(tokio::spawn(async move {
                let out = f(item).await;
                drop(permit);
                out
            }));
        }

        let mut results = Vec::with_capacity(handles.len());
        for handle in handles {
            match handle.await {
                Ok(value) => results.push(value),
                Err(err) if err.is_panic() => std::panic::resume_unwind(err.into_panic()),
                Err(_) => unreachable!("parallel workers are never aborted"),
            }
        }
        results
    }
}
