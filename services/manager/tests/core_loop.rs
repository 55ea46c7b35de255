//! End-to-end tests for the manager's reconciliation loops.
//!
//! Each test runs the real worker agent app on an ephemeral port with
//! the mock container runtime, then drives the manager's loops one pass
//! at a time and asserts on the stores.

use std::sync::Arc;
use std::time::Duration;

use axum::routing::get;
use axum::{Json, Router};

use drover_manager::scheduler::SchedulerKind;
use drover_manager::{
    DispatchLoop, DispatchOutcome, HealthCheckLoop, Manager, ManagerOptions, StatusSyncLoop,
    WorkerClient,
};
use drover_task::{RestartPolicy, State, Task, TaskSpec};
use drover_worker::runtime::{ContainerStatus, MockRuntime};
use drover_worker::{api as worker_api, Executor};

const SYNC_INTERVAL: Duration = Duration::from_millis(100);
const DISPATCH_INTERVAL: Duration = Duration::from_millis(100);

async fn spawn_worker() -> (String, Arc<Executor>, Arc<MockRuntime>) {
    let runtime = Arc::new(MockRuntime::new());
    let executor = Arc::new(Executor::new(runtime.clone()));

    let app = worker_api::router(Arc::clone(&executor));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (addr.to_string(), executor, runtime)
}

/// A worker that answers status queries with an empty task list, as a
/// node that lost its state would.
async fn spawn_amnesiac_worker() -> String {
    let app = Router::new().route(
        "/v1/tasks",
        get(|| async { Json(Vec::<Task>::new()) }),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    addr.to_string()
}

fn manager_with(kind: SchedulerKind, options: ManagerOptions) -> Manager {
    Manager::in_memory(
        kind.build(),
        WorkerClient::new(Duration::from_secs(1)),
        options,
    )
}

fn web_spec() -> TaskSpec {
    TaskSpec {
        name: "web".to_string(),
        image: "nginx:latest".to_string(),
        cpu: 0.5,
        memory: 256 * 1024 * 1024,
        disk: 0,
        exposed_ports: vec![80],
        env: vec![],
        restart_policy: RestartPolicy::Always,
        health_check: Some("/health".to_string()),
    }
}

#[tokio::test]
async fn dispatch_waits_for_a_worker_then_schedules() {
    let manager = manager_with(SchedulerKind::Epvm, ManagerOptions::default());
    let dispatch = DispatchLoop::new(manager.clone(), DISPATCH_INTERVAL);

    let task = manager.submit(web_spec()).await.unwrap();

    // Empty worker list: the event stays pending, nothing is scheduled.
    let outcome = dispatch.dispatch_once().await;
    assert_eq!(outcome, DispatchOutcome::NoWorker(task.id));
    assert_eq!(manager.pending_count().await, 1);
    assert_eq!(manager.task(task.id).unwrap().state, State::Pending);

    // A worker with sufficient capacity joins; the next pass assigns
    // the task to it.
    let (addr, executor, _) = spawn_worker().await;
    manager.add_worker(addr.clone()).await;

    let outcome = dispatch.dispatch_once().await;
    assert_eq!(outcome, DispatchOutcome::Dispatched(task.id));
    assert_eq!(manager.pending_count().await, 0);

    let stored = manager.task(task.id).unwrap();
    assert_eq!(stored.state, State::Scheduled);
    assert_eq!(stored.assigned_worker.as_deref(), Some(addr.as_str()));

    // The worker starts the task; a status-sync pass folds the observed
    // Running state into the store.
    executor.start_queued().await;

    let mut sync = StatusSyncLoop::new(manager.clone(), SYNC_INTERVAL, 2);
    sync.sync_once().await;

    let stored = manager.task(task.id).unwrap();
    assert_eq!(stored.state, State::Running);
    assert!(stored.container_id.is_some());

    // The observed transition was appended to the event log.
    let observed: Vec<_> = manager
        .events()
        .unwrap()
        .into_iter()
        .filter(|e| e.task.id == task.id && e.state == State::Running)
        .collect();
    assert_eq!(observed.len(), 1);
}

#[tokio::test]
async fn round_robin_alternates_workers() {
    let manager = manager_with(SchedulerKind::RoundRobin, ManagerOptions::default());
    let dispatch = DispatchLoop::new(manager.clone(), DISPATCH_INTERVAL);

    let (w1, _e1, _) = spawn_worker().await;
    let (w2, _e2, _) = spawn_worker().await;
    manager.add_worker(w1.clone()).await;
    manager.add_worker(w2.clone()).await;

    let mut submitted = Vec::new();
    for i in 0..3 {
        let mut spec = web_spec();
        spec.name = format!("web-{i}");
        spec.health_check = None;
        submitted.push(manager.submit(spec).await.unwrap());
    }

    for _ in 0..3 {
        assert!(matches!(
            dispatch.dispatch_once().await,
            DispatchOutcome::Dispatched(_)
        ));
    }

    let assigned: Vec<String> = submitted
        .iter()
        .map(|t| manager.task(t.id).unwrap().assigned_worker.unwrap())
        .collect();
    assert_eq!(assigned, vec![w1.clone(), w2, w1]);
}

#[tokio::test]
async fn dispatch_retries_are_bounded() {
    let options = ManagerOptions {
        dispatch_max_attempts: 3,
        ..Default::default()
    };
    let manager = manager_with(SchedulerKind::RoundRobin, options);
    let dispatch = DispatchLoop::new(manager.clone(), DISPATCH_INTERVAL);

    // A worker address nothing listens on.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let dead_addr = listener.local_addr().unwrap().to_string();
    drop(listener);
    manager.add_worker(dead_addr).await;

    let task = manager.submit(web_spec()).await.unwrap();

    assert_eq!(
        dispatch.dispatch_once().await,
        DispatchOutcome::Retried(task.id)
    );
    assert_eq!(
        dispatch.dispatch_once().await,
        DispatchOutcome::Retried(task.id)
    );
    assert_eq!(
        dispatch.dispatch_once().await,
        DispatchOutcome::Failed(task.id)
    );

    // The exhausted task is durably failed, not silently dropped.
    assert_eq!(manager.pending_count().await, 0);
    let stored = manager.task(task.id).unwrap();
    assert_eq!(stored.state, State::Failed);
    assert!(stored.finish_time.is_some());
}

#[tokio::test]
async fn health_failure_schedules_exactly_one_restart() {
    let manager = manager_with(SchedulerKind::RoundRobin, ManagerOptions::default());
    let dispatch = DispatchLoop::new(manager.clone(), DISPATCH_INTERVAL);
    let mut sync = StatusSyncLoop::new(manager.clone(), SYNC_INTERVAL, 2);
    let health = HealthCheckLoop::new(manager.clone(), Duration::from_millis(100));

    let (addr, executor, runtime) = spawn_worker().await;
    manager.add_worker(addr).await;

    let mut spec = web_spec();
    spec.restart_policy = RestartPolicy::OnFailure;
    let task = manager.submit(spec).await.unwrap();

    dispatch.dispatch_once().await;
    executor.start_queued().await;
    sync.sync_once().await;
    assert_eq!(manager.task(task.id).unwrap().state, State::Running);

    // Crash the container; its health probe now reports unhealthy.
    let container_id = executor.task(task.id).await.unwrap().container_id.unwrap();
    runtime.set_status(&container_id, ContainerStatus::Exited { code: 1 });

    health.check_once().await;

    // The old task is terminally failed...
    assert_eq!(manager.task(task.id).unwrap().state, State::Failed);

    // ...and exactly one successor with restart_count = 1 is pending.
    assert_eq!(manager.pending_count().await, 1);
    let successors: Vec<Task> = manager
        .tasks()
        .unwrap()
        .into_iter()
        .filter(|t| t.id != task.id)
        .collect();
    assert_eq!(successors.len(), 1);
    assert_eq!(successors[0].restart_count, 1);
    assert_eq!(successors[0].state, State::Pending);

    let restart_events: Vec<_> = manager
        .events()
        .unwrap()
        .into_iter()
        .filter(|e| e.state == State::Scheduled && e.task.restart_count == 1)
        .collect();
    assert_eq!(restart_events.len(), 1);

    // A healthy successor is a no-op for the health loop.
    dispatch.dispatch_once().await;
    executor.start_queued().await;
    sync.sync_once().await;
    health.check_once().await;
    assert_eq!(manager.pending_count().await, 0);
    assert_eq!(
        manager.task(successors[0].id).unwrap().state,
        State::Running
    );
}

#[tokio::test]
async fn restart_cap_fails_terminally() {
    let options = ManagerOptions {
        max_restarts: 1,
        ..Default::default()
    };
    let manager = manager_with(SchedulerKind::RoundRobin, options);
    let dispatch = DispatchLoop::new(manager.clone(), DISPATCH_INTERVAL);
    let mut sync = StatusSyncLoop::new(manager.clone(), SYNC_INTERVAL, 2);
    let health = HealthCheckLoop::new(manager.clone(), Duration::from_millis(100));

    let (addr, executor, runtime) = spawn_worker().await;
    manager.add_worker(addr).await;

    let task = manager.submit(web_spec()).await.unwrap();

    // First run fails its health check: one restart is allowed.
    dispatch.dispatch_once().await;
    executor.start_queued().await;
    sync.sync_once().await;
    let container_id = executor.task(task.id).await.unwrap().container_id.unwrap();
    runtime.set_status(&container_id, ContainerStatus::Exited { code: 1 });
    health.check_once().await;
    assert_eq!(manager.pending_count().await, 1);

    // The successor runs and fails too; the cap is reached.
    dispatch.dispatch_once().await;
    executor.start_queued().await;
    sync.sync_once().await;

    let successor = manager
        .tasks()
        .unwrap()
        .into_iter()
        .find(|t| t.restart_count == 1)
        .unwrap();
    assert_eq!(successor.state, State::Running);

    let container_id = executor
        .task(successor.id)
        .await
        .unwrap()
        .container_id
        .unwrap();
    runtime.set_status(&container_id, ContainerStatus::Exited { code: 1 });
    health.check_once().await;

    // Terminal failure: no new event, no pending work.
    assert_eq!(manager.task(successor.id).unwrap().state, State::Failed);
    assert_eq!(manager.pending_count().await, 0);
    assert!(manager
        .events()
        .unwrap()
        .iter()
        .all(|e| e.task.restart_count < 2));
}

#[tokio::test]
async fn unreported_tasks_are_lost_after_the_grace_period() {
    let manager = manager_with(SchedulerKind::RoundRobin, ManagerOptions::default());
    let mut sync = StatusSyncLoop::new(manager.clone(), SYNC_INTERVAL, 2);

    let addr = spawn_amnesiac_worker().await;
    manager.add_worker(addr.clone()).await;

    // The store believes this task is running on the worker.
    let mut task = Task::from_spec(web_spec());
    task.transition_to(State::Scheduled).unwrap();
    task.transition_to(State::Running).unwrap();
    task.assigned_worker = Some(addr);
    manager
        .task_store()
        .put(&task.id.to_string(), &task)
        .unwrap();

    // First miss is within the grace period.
    sync.sync_once().await;
    assert_eq!(manager.task(task.id).unwrap().state, State::Running);

    // Second consecutive miss marks the task failed.
    sync.sync_once().await;
    let stored = manager.task(task.id).unwrap();
    assert_eq!(stored.state, State::Failed);
    assert!(stored.finish_time.is_some());

    let lost_events: Vec<_> = manager
        .events()
        .unwrap()
        .into_iter()
        .filter(|e| e.task.id == task.id && e.state == State::Failed)
        .collect();
    assert_eq!(lost_events.len(), 1);
}

#[tokio::test]
async fn unreachable_worker_is_skipped_not_failed() {
    let manager = manager_with(SchedulerKind::RoundRobin, ManagerOptions::default());
    let mut sync = StatusSyncLoop::new(manager.clone(), SYNC_INTERVAL, 1);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let dead_addr = listener.local_addr().unwrap().to_string();
    drop(listener);
    manager.add_worker(dead_addr.clone()).await;

    let mut task = Task::from_spec(web_spec());
    task.transition_to(State::Scheduled).unwrap();
    task.transition_to(State::Running).unwrap();
    task.assigned_worker = Some(dead_addr);
    manager
        .task_store()
        .put(&task.id.to_string(), &task)
        .unwrap();

    // Even with a grace of one tick, an unreachable worker charges no
    // miss: we could not observe it.
    sync.sync_once().await;
    sync.sync_once().await;
    assert_eq!(manager.task(task.id).unwrap().state, State::Running);
}

#[tokio::test]
async fn stop_task_flows_through_the_worker() {
    let manager = manager_with(SchedulerKind::RoundRobin, ManagerOptions::default());
    let dispatch = DispatchLoop::new(manager.clone(), DISPATCH_INTERVAL);
    let mut sync = StatusSyncLoop::new(manager.clone(), SYNC_INTERVAL, 2);

    let (addr, executor, _) = spawn_worker().await;
    manager.add_worker(addr).await;

    let task = manager.submit(web_spec()).await.unwrap();
    dispatch.dispatch_once().await;
    executor.start_queued().await;
    sync.sync_once().await;

    let stopped = manager.stop_task(task.id).await.unwrap();
    assert_eq!(stopped.state, State::Completed);
    assert_eq!(manager.task(task.id).unwrap().state, State::Completed);

    // Stopping a settled task is rejected without side effects.
    assert!(manager.stop_task(task.id).await.is_err());
}
