use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::BoxFuture;
use monoflow::{Executor, QueuePolicy, Task, TaskRunner};
use tokio::select;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;

/// Runs on the ambient tokio runtime and records reported faults for
/// assertions.
#[derive(Clone, Default)]
struct RecordingExecutor {
    faults: Arc<Mutex<Vec<String>>>,
}

impl Executor for RecordingExecutor {
    fn spawn(&self, fut: BoxFuture<'static, ()>) {
        tokio::spawn(fut);
    }

    fn report_fault(&self, error: anyhow::Error) {
        self.faults.lock().unwrap().push(error.to_string());
    }
}

fn runner_with_faults(policy: QueuePolicy) -> (TaskRunner, Arc<Mutex<Vec<String>>>) {
    let executor = RecordingExecutor::default();
    let faults = executor.faults.clone();
    let runner = TaskRunner::builder()
        .queue_policy(policy)
        .executor(executor)
        .build();
    (runner, faults)
}

/// A task that sleeps cooperatively and sets `done` only if it ran to
/// completion.
fn sleepy(duration: Duration, done: Arc<AtomicBool>) -> impl Task {
    move |cancel: CancellationToken| async move {
        select! {
            _ = sleep(duration) => done.store(true, Ordering::SeqCst),
            _ = cancel.cancelled() => {}
        }
        anyhow::Ok(())
    }
}

#[tokio::test]
async fn tasks_run_in_order_one_at_a_time() {
    let runner = TaskRunner::builder()
        .queue_policy(QueuePolicy::Bounded(3))
        .build();
    let order = Arc::new(Mutex::new(Vec::new()));
    let active = Arc::new(AtomicUsize::new(0));
    let max_active = Arc::new(AtomicUsize::new(0));

    for id in 1..=3 {
        let order = order.clone();
        let active = active.clone();
        let max_active = max_active.clone();
        let accepted = runner.enqueue(move |_cancel: CancellationToken| async move {
            let now = active.fetch_add(1, Ordering::SeqCst) + 1;
            max_active.fetch_max(now, Ordering::SeqCst);
            sleep(Duration::from_millis(20)).await;
            order.lock().unwrap().push(id);
            active.fetch_sub(1, Ordering::SeqCst);
            anyhow::Ok(())
        });
        assert!(accepted);
    }

    sleep(Duration::from_millis(150)).await;
    assert_eq!(*order.lock().unwrap(), vec![1, 2, 3]);
    assert_eq!(max_active.load(Ordering::SeqCst), 1);
    assert!(!runner.is_running());
}

#[tokio::test]
async fn bounded_queue_admits_back_to_back_up_to_capacity() {
    let runner = TaskRunner::builder()
        .queue_policy(QueuePolicy::Bounded(1))
        .build();
    let first = Arc::new(AtomicBool::new(false));
    let second = Arc::new(AtomicBool::new(false));
    let third = Arc::new(AtomicBool::new(false));

    // no awaits in between: the first task may not have been picked up yet,
    // but it is destined for the running slot and must not count against the
    // single waiting slot
    assert!(runner.enqueue(sleepy(Duration::from_millis(50), first.clone())));
    assert!(runner.enqueue(sleepy(Duration::ZERO, second.clone())));
    assert!(!runner.enqueue(sleepy(Duration::ZERO, third.clone())));

    sleep(Duration::from_millis(120)).await;
    assert!(first.load(Ordering::SeqCst));
    assert!(second.load(Ordering::SeqCst));
    assert!(!third.load(Ordering::SeqCst));

    // while one task runs, capacity 1 means exactly one waiter
    let running = Arc::new(AtomicBool::new(false));
    runner.enqueue(sleepy(Duration::from_millis(60), running.clone()));
    sleep(Duration::from_millis(20)).await;
    assert!(runner.enqueue(sleepy(Duration::ZERO, Arc::new(AtomicBool::new(false)))));
    assert!(!runner.enqueue(sleepy(Duration::ZERO, Arc::new(AtomicBool::new(false)))));
}

#[tokio::test]
async fn immediate_policy_accepts_only_when_idle() {
    let runner = TaskRunner::builder()
        .queue_policy(QueuePolicy::Immediate)
        .build();
    let first = Arc::new(AtomicBool::new(false));

    assert!(runner.enqueue(sleepy(Duration::from_millis(40), first.clone())));
    // still queued or running, either way not idle
    assert!(!runner.enqueue(sleepy(Duration::ZERO, Arc::new(AtomicBool::new(false)))));

    sleep(Duration::from_millis(80)).await;
    assert!(first.load(Ordering::SeqCst));
    assert!(runner.enqueue(sleepy(Duration::ZERO, Arc::new(AtomicBool::new(false)))));
}

#[tokio::test]
async fn skip_if_running_debounces_to_first_submission() {
    let runner = TaskRunner::new();
    let first = Arc::new(AtomicBool::new(false));
    let second = Arc::new(AtomicBool::new(false));

    assert!(runner.skip_if_running(sleepy(Duration::from_millis(40), first.clone())));
    assert!(!runner.skip_if_running(sleepy(Duration::ZERO, second.clone())));

    sleep(Duration::from_millis(80)).await;
    assert!(first.load(Ordering::SeqCst));
    assert!(!second.load(Ordering::SeqCst));
    assert!(runner.skip_if_running(sleepy(Duration::ZERO, Arc::new(AtomicBool::new(false)))));
}

#[tokio::test]
async fn replace_cancels_running_and_queued_work() {
    let runner = TaskRunner::builder()
        .queue_policy(QueuePolicy::Bounded(2))
        .build();
    let old_running = Arc::new(AtomicBool::new(false));
    let old_queued = Arc::new(AtomicBool::new(false));
    let replacement = Arc::new(AtomicBool::new(false));

    runner.enqueue(sleepy(Duration::from_millis(200), old_running.clone()));
    runner.enqueue(sleepy(Duration::ZERO, old_queued.clone()));
    sleep(Duration::from_millis(20)).await;

    runner
        .replace(sleepy(Duration::ZERO, replacement.clone()))
        .await;
    sleep(Duration::from_millis(40)).await;

    assert!(!old_running.load(Ordering::SeqCst));
    assert!(!old_queued.load(Ordering::SeqCst));
    assert!(replacement.load(Ordering::SeqCst));
}

#[tokio::test]
async fn back_to_back_replace_keeps_only_the_last() {
    let runner = TaskRunner::new();
    let first = Arc::new(AtomicBool::new(false));
    let last = Arc::new(AtomicBool::new(false));

    runner
        .replace(sleepy(Duration::from_millis(200), first.clone()))
        .await;
    runner.replace(sleepy(Duration::ZERO, last.clone())).await;

    sleep(Duration::from_millis(60)).await;
    assert!(!first.load(Ordering::SeqCst));
    assert!(last.load(Ordering::SeqCst));
}

#[tokio::test]
async fn concurrent_replaces_serialize_and_leave_runner_usable() {
    let runner = TaskRunner::new();
    let completions = Arc::new(AtomicUsize::new(0));

    let mut handles = Vec::new();
    for _ in 0..8 {
        let runner = runner.clone();
        let completions = completions.clone();
        handles.push(tokio::spawn(async move {
            runner
                .replace(move |cancel: CancellationToken| async move {
                    select! {
                        _ = sleep(Duration::from_millis(10)) => {
                            completions.fetch_add(1, Ordering::SeqCst);
                        }
                        _ = cancel.cancelled() => {}
                    }
                    anyhow::Ok(())
                })
                .await;
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }
    sleep(Duration::from_millis(60)).await;

    let completed = completions.load(Ordering::SeqCst);
    assert!(completed >= 1, "the winning replacement must run");
    assert!(completed <= 8);

    let after = Arc::new(AtomicBool::new(false));
    assert!(runner.enqueue(sleepy(Duration::ZERO, after.clone())));
    sleep(Duration::from_millis(40)).await;
    assert!(after.load(Ordering::SeqCst));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn replace_installs_ahead_of_racing_enqueues() {
    let runner = TaskRunner::builder()
        .queue_policy(QueuePolicy::Bounded(2))
        .build();

    for _ in 0..10 {
        let stop = Arc::new(AtomicBool::new(false));
        let hammer = {
            let runner = runner.clone();
            let stop = stop.clone();
            // hammer long cooperative tasks at the runner from another worker
            // while replace is waiting for quiescence
            tokio::spawn(async move {
                while !stop.load(Ordering::SeqCst) {
                    runner.enqueue(sleepy(
                        Duration::from_millis(300),
                        Arc::new(AtomicBool::new(false)),
                    ));
                    tokio::task::yield_now().await;
                }
            })
        };

        let replaced = Arc::new(AtomicBool::new(false));
        runner
            .replace(sleepy(Duration::ZERO, replaced.clone()))
            .await;
        stop.store(true, Ordering::SeqCst);
        hammer.await.unwrap();

        // the replacement was installed at the head, so it must finish well
        // before any 300ms straggler could
        let deadline = tokio::time::Instant::now() + Duration::from_millis(150);
        while !replaced.load(Ordering::SeqCst) && tokio::time::Instant::now() < deadline {
            sleep(Duration::from_millis(5)).await;
        }
        assert!(
            replaced.load(Ordering::SeqCst),
            "replacement stuck behind a task admitted mid-replace"
        );
        runner.cancel_and_join().await;
    }
}

#[tokio::test]
async fn cancel_stops_a_cooperative_task() {
    let runner = TaskRunner::new();
    let done = Arc::new(AtomicBool::new(false));

    runner.enqueue(sleepy(Duration::from_millis(200), done.clone()));
    sleep(Duration::from_millis(20)).await;
    assert!(runner.is_running());

    runner.cancel();
    sleep(Duration::from_millis(40)).await;
    assert!(!runner.is_running());
    assert!(!done.load(Ordering::SeqCst));
}

#[tokio::test]
async fn cancel_and_join_drops_queued_tasks() {
    let runner = TaskRunner::builder()
        .queue_policy(QueuePolicy::Bounded(2))
        .build();
    let running = Arc::new(AtomicBool::new(false));
    let queued = Arc::new(AtomicBool::new(false));

    runner.enqueue(sleepy(Duration::from_millis(200), running.clone()));
    runner.enqueue(sleepy(Duration::ZERO, queued.clone()));
    sleep(Duration::from_millis(20)).await;

    runner.cancel_and_join().await;
    assert!(!runner.is_running());
    assert!(!running.load(Ordering::SeqCst));

    sleep(Duration::from_millis(40)).await;
    assert!(!queued.load(Ordering::SeqCst));
}

#[tokio::test]
async fn cancel_and_join_returns_immediately_when_idle() {
    let runner = TaskRunner::new();
    timeout(Duration::from_millis(100), runner.cancel_and_join())
        .await
        .expect("cancel_and_join on an idle runner must not hang");
}

#[tokio::test]
async fn runner_is_reusable_after_cancel() {
    let runner = TaskRunner::new();
    runner.enqueue(sleepy(Duration::from_millis(200), Arc::new(AtomicBool::new(false))));
    sleep(Duration::from_millis(20)).await;
    runner.cancel_and_join().await;

    let done = Arc::new(AtomicBool::new(false));
    assert!(runner.enqueue(sleepy(Duration::ZERO, done.clone())));
    sleep(Duration::from_millis(40)).await;
    assert!(done.load(Ordering::SeqCst));
}

#[tokio::test]
async fn failing_task_is_reported_and_does_not_stop_the_queue() {
    let (runner, faults) = runner_with_faults(QueuePolicy::Bounded(2));
    let after = Arc::new(AtomicBool::new(false));

    runner.enqueue(|_cancel: CancellationToken| async {
        Err(anyhow::anyhow!("disk on fire"))
    });
    runner.enqueue(sleepy(Duration::ZERO, after.clone()));

    sleep(Duration::from_millis(60)).await;
    let faults = faults.lock().unwrap();
    assert_eq!(faults.len(), 1);
    assert!(faults[0].contains("disk on fire"));
    assert!(after.load(Ordering::SeqCst));
}

#[tokio::test]
async fn ignored_errors_are_not_reported() {
    let executor = RecordingExecutor::default();
    let faults = executor.faults.clone();
    let runner = TaskRunner::builder()
        .executor(executor)
        .ignore_errors(true)
        .build();

    runner.enqueue(|_cancel: CancellationToken| async {
        Err(anyhow::anyhow!("nobody cares"))
    });
    sleep(Duration::from_millis(40)).await;
    assert!(faults.lock().unwrap().is_empty());
}

#[tokio::test]
async fn panicking_task_does_not_wedge_the_runner() {
    let (runner, faults) = runner_with_faults(QueuePolicy::Bounded(2));
    let after = Arc::new(AtomicBool::new(false));

    runner.enqueue(|_cancel: CancellationToken| async {
        panic!("boom");
        #[allow(unreachable_code)]
        anyhow::Ok(())
    });
    runner.enqueue(sleepy(Duration::ZERO, after.clone()));

    sleep(Duration::from_millis(60)).await;
    let faults = faults.lock().unwrap();
    assert_eq!(faults.len(), 1);
    assert!(faults[0].contains("boom"));
    assert!(after.load(Ordering::SeqCst));
}

#[tokio::test]
async fn errors_from_cancelled_tasks_are_not_faults() {
    let (runner, faults) = runner_with_faults(QueuePolicy::Bounded(1));

    runner.enqueue(|cancel: CancellationToken| async move {
        cancel.cancelled().await;
        Err(anyhow::anyhow!("interrupted mid-write"))
    });
    sleep(Duration::from_millis(20)).await;

    runner.cancel_and_join().await;
    sleep(Duration::from_millis(20)).await;
    assert!(faults.lock().unwrap().is_empty());
}
