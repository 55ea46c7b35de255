//! Integration tests for the worker agent API.
//!
//! Serves the real router on an ephemeral port with the mock runtime and
//! drives it the way the manager's loops do.

use std::sync::Arc;

use drover_task::{RestartPolicy, State, Task, TaskSpec};
use drover_worker::runtime::{ContainerStatus, MockRuntime};
use drover_worker::{api, Executor};

async fn spawn_agent() -> (String, Arc<Executor>, Arc<MockRuntime>) {
    let runtime = Arc::new(MockRuntime::new());
    let executor = Arc::new(Executor::new(runtime.clone()));

    let app = api::router(Arc::clone(&executor));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{addr}"), executor, runtime)
}

fn scheduled_task(name: &str) -> Task {
    let mut task = Task::from_spec(TaskSpec {
        name: name.to_string(),
        image: "nginx:latest".to_string(),
        cpu: 0.5,
        memory: 256 * 1024 * 1024,
        disk: 0,
        exposed_ports: vec![80],
        env: vec![],
        restart_policy: RestartPolicy::Always,
        health_check: Some("/health".to_string()),
    });
    task.transition_to(State::Scheduled).unwrap();
    task
}

#[tokio::test]
async fn accept_run_and_report() {
    let (base, executor, _) = spawn_agent().await;
    let client = reqwest::Client::new();
    let task = scheduled_task("web");

    // The manager assigns a scheduled task.
    let resp = client
        .post(format!("{base}/v1/tasks"))
        .json(&task)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);

    // Re-assigning the same task is a conflict.
    let resp = client
        .post(format!("{base}/v1/tasks"))
        .json(&task)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 409);

    // The executor tick starts it; the status endpoint reports Running.
    executor.start_queued().await;

    let reported: Vec<Task> = client
        .get(format!("{base}/v1/tasks"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(reported.len(), 1);
    assert_eq!(reported[0].id, task.id);
    assert_eq!(reported[0].state, State::Running);
    assert!(reported[0].container_id.is_some());
}

#[tokio::test]
async fn health_endpoint_tracks_the_container() {
    let (base, executor, runtime) = spawn_agent().await;
    let client = reqwest::Client::new();
    let task = scheduled_task("web");

    client
        .post(format!("{base}/v1/tasks"))
        .json(&task)
        .send()
        .await
        .unwrap();
    executor.start_queued().await;

    let health: serde_json::Value = client
        .get(format!("{base}/v1/tasks/{}/health", task.id))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["healthy"], true);

    // Simulate a crash; health flips without waiting for a refresh.
    let container_id = executor.task(task.id).await.unwrap().container_id.unwrap();
    runtime.set_status(&container_id, ContainerStatus::Exited { code: 1 });

    let health: serde_json::Value = client
        .get(format!("{base}/v1/tasks/{}/health", task.id))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["healthy"], false);

    // Health of an unknown task is a 404, not a guess.
    let resp = client
        .get(format!(
            "{base}/v1/tasks/00000000-0000-0000-0000-000000000000/health"
        ))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn stop_endpoint_completes_a_running_task() {
    let (base, executor, _) = spawn_agent().await;
    let client = reqwest::Client::new();
    let task = scheduled_task("web");

    client
        .post(format!("{base}/v1/tasks"))
        .json(&task)
        .send()
        .await
        .unwrap();
    executor.start_queued().await;

    let stopped: Task = client
        .delete(format!("{base}/v1/tasks/{}", task.id))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(stopped.state, State::Completed);

    // Stopping a settled task is rejected without side effects.
    let resp = client
        .delete(format!("{base}/v1/tasks/{}", task.id))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 409);
}

#[tokio::test]
async fn stats_endpoint_reports_load() {
    let (base, executor, _) = spawn_agent().await;
    let client = reqwest::Client::new();

    client
        .post(format!("{base}/v1/tasks"))
        .json(&scheduled_task("a"))
        .send()
        .await
        .unwrap();
    client
        .post(format!("{base}/v1/tasks"))
        .json(&scheduled_task("b"))
        .send()
        .await
        .unwrap();
    executor.start_queued().await;

    let stats: serde_json::Value = client
        .get(format!("{base}/v1/stats"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(stats["task_count"], 2);
    assert!(stats["memory_total"].as_u64().unwrap() > 0);
}
