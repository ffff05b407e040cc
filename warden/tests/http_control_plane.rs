//! Exercises the HTTP control plane end to end: bind a real listener, run
//! axum against it, hit it with `reqwest`.
use std::sync::Arc;

use warden_core::cmd::Cmd;
use warden_core::manager::Manager;
use warden_core::options::Options;
use warden_core::service::Service;

async fn spawn_server(manager: Arc<Manager>) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = warden::daemon::http::router(manager, Options::default());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn add_start_and_scale_a_service_over_http() {
    let manager = Manager::new();
    let base = spawn_server(manager.clone()).await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{base}/services/add"))
        .json(&serde_json::json!({ "name": "echoer", "workers": 1, "program": "sleep", "args": ["30"] }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::CREATED);

    let service = manager.service("echoer").expect("service should be registered");
    // autostart defaults to true, so it's already RUNNING by the time the
    // HTTP call returns.
    assert_eq!(service.state(), warden_core::service::ServiceState::Running);

    let response = client
        .post(format!("{base}/services/echoer/scale"))
        .json(&serde_json::json!({ "workers": 3 }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    assert_eq!(service.replicas(), 3);

    manager.shutdown_and_remove_service("echoer").await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn adding_a_duplicate_service_name_conflicts() {
    let manager = Manager::new();
    let cmd = Cmd::new("true", vec![], Arc::new(Options { autostart: false, ..Options::default() }));
    manager.add_service(Service::new("dup", 1, cmd)).await.unwrap();
    let base = spawn_server(manager).await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{base}/services/add"))
        .json(&serde_json::json!({ "name": "dup", "workers": 1, "program": "true" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::CONFLICT);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn operating_on_an_unknown_service_is_a_404() {
    let manager = Manager::new();
    let base = spawn_server(manager).await;
    let client = reqwest::Client::new();

    let response = client.post(format!("{base}/services/ghost/stop")).send().await.unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::NOT_FOUND);
}
