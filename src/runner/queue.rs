//! FIFO holding area for accepted-but-not-yet-started tasks.

use std::collections::VecDeque;

use super::task::BoxedTask;

/// Admission policy for the task queue.
///
/// The two capacity regimes are explicit variants rather than a `0`-as-sentinel
/// integer, so callers always know which rule governs admission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueuePolicy {
    /// Hard capacity on waiting tasks: admissions are rejected once
    /// `capacity` tasks wait behind the one executing (or, on an idle
    /// runner, behind the head task about to be picked up). Capacity must be
    /// at least 1.
    Bounded(usize),

    /// Accept a task only when nothing is running and the queue is empty.
    Immediate,
}

impl Default for QueuePolicy {
    fn default() -> Self {
        Self::Bounded(1)
    }
}

/// Pending tasks in FIFO order.
///
/// Every operation happens under the runner-wide state mutex; the queue itself
/// carries no locking.
pub(crate) struct TaskQueue {
    items: VecDeque<BoxedTask>,
    policy: QueuePolicy,
}

impl TaskQueue {
    pub(crate) fn new(policy: QueuePolicy) -> Self {
        Self {
            items: VecDeque::new(),
            policy,
        }
    }

    /// Attempt to admit a task under the configured policy. Never blocks.
    pub(crate) fn try_add(&mut self, task: BoxedTask, running: bool) -> bool {
        let accepted = match self.policy {
            QueuePolicy::Bounded(capacity) => {
                // on an idle runner the head item goes straight to the
                // consumer, so it does not occupy a waiting slot
                let reserved = usize::from(!running);
                self.items.len() < capacity + reserved
            }
            QueuePolicy::Immediate => !running && self.items.is_empty(),
        };
        if accepted {
            self.items.push_back(task);
        }
        accepted
    }

    /// Admit a task unconditionally. Used by `replace`, which has already
    /// cleared the queue and holds the replace mutex.
    pub(crate) fn force_add(&mut self, task: BoxedTask) {
        self.items.push_back(task);
    }

    pub(crate) fn pop_front(&mut self) -> Option<BoxedTask> {
        self.items.pop_front()
    }

    /// Drop all pending tasks without executing them.
    pub(crate) fn clear(&mut self) {
        self.items.clear();
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_util::sync::CancellationToken;

    fn noop() -> BoxedTask {
        Box::new(|_: CancellationToken| async { anyhow::Ok(()) })
    }

    #[test]
    fn bounded_counts_waiting_tasks_only() {
        let mut queue = TaskQueue::new(QueuePolicy::Bounded(1));
        // idle: the head slot is free, so one task can wait behind it
        assert!(queue.try_add(noop(), false));
        assert!(queue.try_add(noop(), false));
        assert!(!queue.try_add(noop(), false));
    }

    #[test]
    fn bounded_rejects_when_full_while_running() {
        let mut queue = TaskQueue::new(QueuePolicy::Bounded(2));
        assert!(queue.try_add(noop(), true));
        assert!(queue.try_add(noop(), true));
        assert!(!queue.try_add(noop(), true));
        queue.pop_front();
        assert!(queue.try_add(noop(), true));
    }

    #[test]
    fn immediate_requires_idle_and_empty() {
        let mut queue = TaskQueue::new(QueuePolicy::Immediate);
        assert!(!queue.try_add(noop(), true));
        assert!(queue.try_add(noop(), false));
        // one pending task already
        assert!(!queue.try_add(noop(), false));
    }

    #[test]
    fn clear_drops_pending_work() {
        let mut queue = TaskQueue::new(QueuePolicy::Bounded(4));
        assert!(queue.try_add(noop(), false));
        assert!(queue.try_add(noop(), false));
        queue.clear();
        assert!(queue.is_empty());
        assert!(queue.pop_front().is_none());
    }

    #[test]
    fn force_add_ignores_capacity() {
        let mut queue = TaskQueue::new(QueuePolicy::Bounded(1));
        assert!(queue.try_add(noop(), false));
        queue.force_add(noop());
        queue.pop_front();
        assert!(!queue.is_empty());
    }
}
