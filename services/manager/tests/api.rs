//! Integration tests for the manager control API.

use std::time::Duration;

use drover_manager::scheduler::SchedulerKind;
use drover_manager::{api, Manager, ManagerOptions, WorkerClient};
use drover_task::{State, Task};

async fn spawn_manager() -> (String, Manager) {
    let manager = Manager::in_memory(
        SchedulerKind::RoundRobin.build(),
        WorkerClient::new(Duration::from_secs(1)),
        ManagerOptions::default(),
    );

    let app = api::create_router(manager.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{addr}"), manager)
}

#[tokio::test]
async fn invalid_spec_is_rejected_before_any_record_exists() {
    let (base, manager) = spawn_manager().await;
    let client = reqwest::Client::new();

    // Missing image.
    let resp = client
        .post(format!("{base}/v1/tasks"))
        .json(&serde_json::json!({ "name": "web", "image": "" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    // Negative memory is rejected at deserialization.
    let resp = client
        .post(format!("{base}/v1/tasks"))
        .json(&serde_json::json!({ "name": "web", "image": "nginx:latest", "memory": -1 }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 422);

    // No task or event was created.
    assert!(manager.tasks().unwrap().is_empty());
    assert!(manager.events().unwrap().is_empty());
    assert_eq!(manager.pending_count().await, 0);
}

#[tokio::test]
async fn submission_creates_a_pending_task_and_event() {
    let (base, manager) = spawn_manager().await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{base}/v1/tasks"))
        .json(&serde_json::json!({
            "name": "web",
            "image": "nginx:latest",
            "cpu": 0.5,
            "memory": 268435456u64,
            "restart_policy": "always",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);
    let task: Task = resp.json().await.unwrap();
    assert_eq!(task.state, State::Pending);

    let listed: Vec<Task> = client
        .get(format!("{base}/v1/tasks"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, task.id);

    let fetched: Task = client
        .get(format!("{base}/v1/tasks/{}", task.id))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(fetched.id, task.id);

    assert_eq!(manager.events().unwrap().len(), 1);
    assert_eq!(manager.pending_count().await, 1);
}

#[tokio::test]
async fn unknown_task_is_a_404() {
    let (base, _manager) = spawn_manager().await;
    let client = reqwest::Client::new();

    let resp = client
        .get(format!(
            "{base}/v1/tasks/00000000-0000-0000-0000-000000000000"
        ))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn stopping_an_unassigned_task_is_a_conflict() {
    let (base, _manager) = spawn_manager().await;
    let client = reqwest::Client::new();

    let task: Task = client
        .post(format!("{base}/v1/tasks"))
        .json(&serde_json::json!({ "name": "web", "image": "nginx:latest" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    // Still pending: no worker owns it, nothing to stop.
    let resp = client
        .delete(format!("{base}/v1/tasks/{}", task.id))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 409);
}

#[tokio::test]
async fn workers_can_be_added_and_listed() {
    let (base, _manager) = spawn_manager().await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{base}/v1/workers"))
        .json(&serde_json::json!({ "addr": "w1:5556" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);

    // Duplicates are ignored.
    client
        .post(format!("{base}/v1/workers"))
        .json(&serde_json::json!({ "addr": "w1:5556" }))
        .send()
        .await
        .unwrap();

    let workers: Vec<String> = client
        .get(format!("{base}/v1/workers"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(workers, vec!["w1:5556"]);
}
