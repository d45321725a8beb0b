//! # Monoflow
//!
//! Small composable utilities for an application runtime, built around a
//! **single-flight asynchronous task runner**: a queue that accepts units of
//! async work, guarantees at most one unit executes at a time, and offers
//! three admission policies plus cooperative cancellation.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use monoflow::{QueuePolicy, TaskRunner};
//!
//! let runner = TaskRunner::builder()
//!     .queue_policy(QueuePolicy::Bounded(1))
//!     .build();
//!
//! // Wait your turn behind whatever is already queued.
//! runner.enqueue(|_cancel| async move {
//!     refresh_cache().await;
//!     Ok(())
//! });
//!
//! // Drop everything pending and make this the only task.
//! runner.replace(|cancel| async move {
//!     recompute(cancel).await;
//!     Ok(())
//! }).await;
//!
//! // Only run if nothing is running or queued right now.
//! runner.skip_if_running(|_cancel| async move {
//!     poll_sensor().await;
//!     Ok(())
//! });
//! ```
//!
//! ## Modules
//!
//! - [`runner`] - the single-flight task runner, its queue policies, and the
//!   injectable [`Executor`](runner::Executor) execution context
//! - [`parallel`] - bounded concurrent execution of homogeneous async work
//! - [`timer`] - a one-shot/periodic timer driven by the runner
//! - [`hooks`] - memoized values, change-detection effects, and throttled state
//! - [`change`] - hash and equality change detectors
//! - [`topic`] - a reactive publish/subscribe primitive with operators
//! - [`structs`] - byte-level struct packing

pub mod change;
pub mod hooks;
pub mod parallel;
pub mod runner;
pub mod structs;
pub mod timer;
pub mod topic;

pub use change::{ChangeDetector, EqualityChangeDetector, HashChangeDetector};
pub use hooks::{Effect, Hooks, MemoizedValue, State, StateManager};
pub use parallel::ParallelRunner;
pub use runner::{Executor, QueuePolicy, Task, TaskRunner, TaskRunnerBuilder, TokioExecutor};
pub use structs::{ByteStruct, StructError};
pub use timer::{Timer, TimerBehavior};
pub use topic::{SubscriptionId, Topic};
