//! End-to-end scheduling behavior: ordering, cancellation, conditions,
//! dynamic production, capacity.

mod common;

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use pretty_assertions::assert_eq;

use common::{wait_finished, wait_until, Event, EventRecorder};
use gantry::{
    ConditionOutcome, ErrorKind, MutuallyExclusive, QueueConfig, QueueError, Task, TaskCondition,
    TaskQueue,
};

#[tokio::test]
async fn dependencies_finish_before_dependents_execute() {
    let queue = TaskQueue::new();
    let order: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));
    let dep_finished_first = Arc::new(AtomicBool::new(false));

    let a = {
        let order = order.clone();
        Task::from_fn("a", move |ctx| async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            order.lock().unwrap().push("a");
            ctx.finish(Vec::new());
        })
    };
    let a_handle = a.clone();
    let b = {
        let order = order.clone();
        let flag = dep_finished_first.clone();
        Task::from_fn("b", move |ctx| async move {
            flag.store(a_handle.is_finished(), Ordering::SeqCst);
            order.lock().unwrap().push("b");
            ctx.finish(Vec::new());
        })
    };
    b.add_dependency(&a).unwrap();

    queue.submit(&a).unwrap();
    queue.submit(&b).unwrap();
    wait_finished(&b).await;

    assert_eq!(*order.lock().unwrap(), vec!["a", "b"]);
    assert!(dep_finished_first.load(Ordering::SeqCst));
}

#[tokio::test]
async fn failed_dependencies_still_unblock_dependents() {
    let queue = TaskQueue::new();
    let ran = Arc::new(AtomicBool::new(false));

    let failing = Task::from_fn("failing", |ctx| async move {
        ctx.finish(vec![ErrorKind::ExecutionFailed {
            cause: "upstream".to_string(),
        }]);
    });
    let flag = ran.clone();
    let dependent = Task::from_fn("dependent", move |ctx| async move {
        flag.store(true, Ordering::SeqCst);
        ctx.finish(Vec::new());
    });
    dependent.add_dependency(&failing).unwrap();

    queue.submit(&failing).unwrap();
    queue.submit(&dependent).unwrap();
    wait_finished(&dependent).await;

    // Errors are local to the failing task; its dependent runs clean.
    assert!(ran.load(Ordering::SeqCst));
    assert!(dependent.errors().is_empty());
}

#[tokio::test]
async fn cancel_before_ready_skips_the_work_body() {
    let queue = TaskQueue::new();
    let invoked = Arc::new(AtomicBool::new(false));

    let gate = Task::delay(Duration::from_secs(60));
    let flag = invoked.clone();
    let task = Task::from_fn("blocked", move |ctx| async move {
        flag.store(true, Ordering::SeqCst);
        ctx.finish(Vec::new());
    });
    task.add_dependency(&gate).unwrap();

    queue.submit(&gate).unwrap();
    queue.submit(&task).unwrap();
    task.cancel();
    wait_finished(&task).await;

    assert!(task.is_cancelled());
    assert!(!invoked.load(Ordering::SeqCst));
    assert_eq!(task.errors(), vec![ErrorKind::Cancelled]);
    gate.cancel();
}

#[tokio::test]
async fn cancel_during_execution_is_cooperative() {
    let queue = TaskQueue::new();
    let invoked = Arc::new(AtomicBool::new(false));

    let flag = invoked.clone();
    let task = Task::from_fn("looping", move |ctx| async move {
        flag.store(true, Ordering::SeqCst);
        loop {
            if ctx.is_cancelled() {
                ctx.finish(Vec::new());
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    });

    queue.submit(&task).unwrap();
    wait_until(|| task.is_executing()).await;
    task.cancel();
    wait_finished(&task).await;

    // The body ran, observed the flag, and finished on its own terms.
    assert!(invoked.load(Ordering::SeqCst));
    assert!(task.is_cancelled());
    assert!(task.errors().is_empty());
}

#[tokio::test]
async fn second_finish_is_discarded() {
    let queue = TaskQueue::new();
    let recorder = EventRecorder::new();

    let task = Task::from_fn("double", |ctx| async move {
        ctx.finish(vec![ErrorKind::ExecutionFailed {
            cause: "kept".to_string(),
        }]);
        ctx.finish(vec![ErrorKind::ExecutionFailed {
            cause: "dropped".to_string(),
        }]);
    });
    task.add_observer(recorder.clone()).unwrap();

    queue.submit(&task).unwrap();
    wait_finished(&task).await;

    assert_eq!(recorder.finish_count(), 1);
    assert_eq!(
        task.errors(),
        vec![ErrorKind::ExecutionFailed {
            cause: "kept".to_string()
        }]
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn bounded_queue_never_exceeds_its_concurrency() {
    let queue = TaskQueue::with_config(QueueConfig::new().with_max_concurrency(1));
    let in_flight = Arc::new(AtomicUsize::new(0));
    let overlapped = Arc::new(AtomicBool::new(false));

    let mut tasks = Vec::new();
    for i in 0..4 {
        let in_flight = in_flight.clone();
        let overlapped = overlapped.clone();
        let task = Task::from_fn(format!("worker-{i}"), move |ctx| async move {
            if in_flight.fetch_add(1, Ordering::SeqCst) > 0 {
                overlapped.store(true, Ordering::SeqCst);
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
            in_flight.fetch_sub(1, Ordering::SeqCst);
            ctx.finish(Vec::new());
        });
        queue.submit(&task).unwrap();
        tasks.push(task);
    }

    for task in &tasks {
        wait_finished(task).await;
    }
    assert!(!overlapped.load(Ordering::SeqCst));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn exclusive_category_tasks_never_overlap() {
    let queue = TaskQueue::new();
    let in_flight = Arc::new(AtomicUsize::new(0));
    let overlapped = Arc::new(AtomicBool::new(false));

    let mut tasks = Vec::new();
    for i in 0..3 {
        let in_flight = in_flight.clone();
        let overlapped = overlapped.clone();
        let task = Task::from_fn(format!("writer-{i}"), move |ctx| async move {
            if in_flight.fetch_add(1, Ordering::SeqCst) > 0 {
                overlapped.store(true, Ordering::SeqCst);
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
            in_flight.fetch_sub(1, Ordering::SeqCst);
            ctx.finish(Vec::new());
        });
        task.add_condition(MutuallyExclusive::new("database")).unwrap();
        queue.submit(&task).unwrap();
        tasks.push(task);
    }

    for task in &tasks {
        wait_finished(task).await;
    }
    assert!(!overlapped.load(Ordering::SeqCst));
}

struct AlwaysOffline;

#[async_trait]
impl TaskCondition for AlwaysOffline {
    fn name(&self) -> &str {
        "network"
    }

    async fn evaluate(&self, _task: &Task) -> ConditionOutcome {
        ConditionOutcome::failed("network", "offline")
    }
}

#[tokio::test]
async fn condition_failure_cancels_without_execution() {
    let queue = TaskQueue::new();
    let invoked = Arc::new(AtomicBool::new(false));

    let flag = invoked.clone();
    let task = Task::from_fn("gated", move |ctx| async move {
        flag.store(true, Ordering::SeqCst);
        ctx.finish(Vec::new());
    });
    task.add_condition(AlwaysOffline).unwrap();

    queue.submit(&task).unwrap();
    wait_finished(&task).await;

    assert!(!invoked.load(Ordering::SeqCst));
    assert!(task.is_cancelled());
    assert_eq!(
        task.errors(),
        vec![ErrorKind::ConditionFailed {
            category: "network".to_string(),
            reason: "offline".to_string(),
        }]
    );
}

struct RequiresLogin {
    login: Task,
    login_finished_first: Arc<AtomicBool>,
}

#[async_trait]
impl TaskCondition for RequiresLogin {
    fn name(&self) -> &str {
        "authenticated"
    }

    fn dependency_for(&self, _task: &Task) -> Option<Task> {
        Some(self.login.clone())
    }

    async fn evaluate(&self, _task: &Task) -> ConditionOutcome {
        self.login_finished_first
            .store(self.login.is_finished(), Ordering::SeqCst);
        ConditionOutcome::Satisfied
    }
}

#[tokio::test]
async fn condition_auxiliary_dependency_runs_first() {
    let queue = TaskQueue::new();
    let login_ran = Arc::new(AtomicBool::new(false));
    let login_finished_first = Arc::new(AtomicBool::new(false));

    let flag = login_ran.clone();
    let login = Task::from_fn("login", move |ctx| async move {
        flag.store(true, Ordering::SeqCst);
        ctx.finish(Vec::new());
    });

    let task = Task::from_fn("profile-fetch", |ctx| async move { ctx.finish(Vec::new()) });
    task.add_condition(RequiresLogin {
        login: login.clone(),
        login_finished_first: login_finished_first.clone(),
    })
    .unwrap();

    // Only the owner is submitted; the auxiliary login task rides along.
    queue.submit(&task).unwrap();
    wait_finished(&task).await;

    assert!(login_ran.load(Ordering::SeqCst));
    assert!(login_finished_first.load(Ordering::SeqCst));
    assert!(task.errors().is_empty());
}

#[tokio::test]
async fn produced_tasks_are_scheduled_independently() {
    let queue = TaskQueue::new();
    let child_ran = Arc::new(AtomicBool::new(false));
    let recorder = EventRecorder::new();

    let flag = child_ran.clone();
    let child = Task::from_fn("page-2", move |ctx| async move {
        flag.store(true, Ordering::SeqCst);
        ctx.finish(Vec::new());
    });
    let child_handle = child.clone();
    let parent = Task::from_fn("page-1", move |ctx| async move {
        ctx.produce(child_handle);
        ctx.finish(Vec::new());
    });
    parent.add_observer(recorder.clone()).unwrap();

    queue.submit(&parent).unwrap();
    wait_finished(&parent).await;
    wait_finished(&child).await;

    assert!(child_ran.load(Ordering::SeqCst));
    assert!(recorder.events().contains(&Event::Produced {
        parent: "page-1".to_string(),
        child: "page-2".to_string(),
    }));
}

#[tokio::test]
async fn suspended_queue_holds_dispatch() {
    let queue = TaskQueue::with_config(QueueConfig::new().suspended());
    let invoked = Arc::new(AtomicBool::new(false));

    let flag = invoked.clone();
    let task = Task::from_fn("held", move |ctx| async move {
        flag.store(true, Ordering::SeqCst);
        ctx.finish(Vec::new());
    });
    queue.submit(&task).unwrap();

    // The task becomes ready but nothing executes while suspended.
    wait_until(|| task.is_ready()).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!invoked.load(Ordering::SeqCst));

    queue.resume();
    wait_finished(&task).await;
    assert!(invoked.load(Ordering::SeqCst));
}

#[tokio::test]
async fn dependency_cycles_are_rejected_at_submission() {
    let queue = TaskQueue::new();
    let a = Task::from_fn("a", |ctx| async move { ctx.finish(Vec::new()) });
    let b = Task::from_fn("b", |ctx| async move { ctx.finish(Vec::new()) });
    a.add_dependency(&b).unwrap();
    b.add_dependency(&a).unwrap();

    assert!(matches!(
        queue.submit(&a),
        Err(QueueError::CircularDependency { .. })
    ));
}

#[tokio::test]
async fn cancel_all_drains_the_queue() {
    let queue = TaskQueue::new();

    let runner = Task::from_fn("runner", move |ctx| async move {
        loop {
            if ctx.is_cancelled() {
                ctx.finish(Vec::new());
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    });
    let blocked = Task::from_fn("blocked", |ctx| async move { ctx.finish(Vec::new()) });
    blocked.add_dependency(&runner).unwrap();

    queue.submit(&runner).unwrap();
    queue.submit(&blocked).unwrap();
    wait_until(|| runner.is_executing()).await;

    queue.cancel_all();
    tokio::time::timeout(Duration::from_secs(10), queue.wait_until_idle())
        .await
        .expect("queue did not drain in time");

    assert!(runner.is_cancelled() && runner.is_finished());
    assert!(blocked.is_cancelled() && blocked.is_finished());
    assert_eq!(queue.statistics().cancelled, 2);
}

#[tokio::test]
async fn delay_runs_out_its_full_interval() {
    let queue = TaskQueue::new();
    let started = Arc::new(Mutex::new(None::<Instant>));
    let executed_for = Arc::new(Mutex::new(None::<Duration>));

    let task = Task::delay(Duration::from_millis(500));
    let start_slot = started.clone();
    let elapsed_slot = executed_for.clone();
    task.add_observer(
        gantry::BlockObserver::new()
            .on_start(move |_task| {
                *start_slot.lock().unwrap() = Some(Instant::now());
            })
            .on_finish({
                let started = started.clone();
                move |_task, _errors| {
                    if let Some(begun) = *started.lock().unwrap() {
                        *elapsed_slot.lock().unwrap() = Some(begun.elapsed());
                    }
                }
            }),
    )
    .unwrap();

    queue.submit(&task).unwrap();
    wait_finished(&task).await;

    let elapsed = executed_for.lock().unwrap().expect("observer saw no start");
    assert!(elapsed >= Duration::from_millis(500));
    assert!(!task.is_cancelled());
}

#[tokio::test]
async fn observer_finishes_reconcile_with_statistics() {
    let queue = TaskQueue::new();
    let recorder = EventRecorder::new();

    let mut tasks = Vec::new();
    for i in 0..5 {
        let task = Task::from_fn(format!("batch-{i}"), |ctx| async move {
            ctx.finish(Vec::new());
        });
        task.add_observer(recorder.clone()).unwrap();
        queue.submit(&task).unwrap();
        tasks.push(task);
    }
    tokio::time::timeout(Duration::from_secs(10), queue.wait_until_idle())
        .await
        .expect("queue did not drain in time");

    assert_eq!(recorder.finish_count(), 5);
    let stats = queue.statistics();
    assert_eq!(stats.finished, 5);
    assert_eq!(stats.failed, 0);
}
