//! HTTP server behavior through a running App.

use std::sync::Arc;
use std::time::Duration;

use apphost::http::{SharedResources, X_REQUEST_ID};
use apphost::{App, ShutdownStatus};
use axum::extract::{Path, State};
use axum::Json;
use serde_json::{json, Value};
use tokio::sync::Notify;
use tokio::time::Instant;

mod common;
use common::{spawn_app, test_app, test_config};

async fn info(State(resources): State<SharedResources>) -> Json<Value> {
    Json(json!({
        "mode": resources.config().http.mode.to_string(),
        "database": resources.database().is_present(),
    }))
}

async fn greet(Path(name): Path<String>) -> String {
    format!("hello {}", name)
}

/// Register `/slow/{ms}`, which sleeps for `ms` and then answers "done".
/// The returned `Notify` fires as soon as a request enters the handler.
fn slow_route(app: &mut App) -> Arc<Notify> {
    let entered = Arc::new(Notify::new());
    let signal = entered.clone();
    app.get("/slow/{ms}", move |Path(ms): Path<u64>| {
        let signal = signal.clone();
        async move {
            signal.notify_one();
            tokio::time::sleep(Duration::from_millis(ms)).await;
            "done"
        }
    })
    .unwrap();
    entered
}

#[tokio::test]
async fn handlers_see_shared_resources() {
    let mut app = test_app(test_config(5)).await;
    app.get("/info", info).unwrap();
    app.get("/greet/{name}", greet).unwrap();

    let running = spawn_app(app).await;
    let base = format!("http://{}", running.addr.unwrap());

    let body: Value = reqwest::get(format!("{}/info", base)).await.unwrap().json().await.unwrap();
    assert_eq!(body["mode"], "release");
    assert_eq!(body["database"], false);

    let response = reqwest::get(format!("{}/greet/world", base)).await.unwrap();
    assert!(response.headers().contains_key(X_REQUEST_ID.as_str()));
    assert_eq!(response.text().await.unwrap(), "hello world");

    let missing = reqwest::get(format!("{}/nope", base)).await.unwrap();
    assert_eq!(missing.status(), reqwest::StatusCode::NOT_FOUND);

    let report = running.handle.shutdown(Duration::from_secs(2)).await;
    assert!(report.is_clean());
    assert!(running.run.await.unwrap().is_clean());
}

#[tokio::test]
async fn in_flight_requests_finish_before_the_deadline() {
    let mut app = test_app(test_config(5)).await;
    let entered = slow_route(&mut app);
    let running = spawn_app(app).await;
    let url = format!("http://{}/slow/300", running.addr.unwrap());

    let request = tokio::spawn(async move { reqwest::get(url).await?.text().await });
    entered.notified().await;

    let report = running.handle.shutdown(Duration::from_secs(3)).await;
    assert_eq!(report.outcome("http"), Some(&Ok(ShutdownStatus::Clean)));
    assert_eq!(request.await.unwrap().unwrap(), "done");
    running.run.await.unwrap();
}

#[tokio::test]
async fn connections_past_the_deadline_are_force_closed() {
    let mut config = test_config(5);
    config.http.request_timeout_secs = 60;
    let mut app = test_app(config).await;
    let entered = slow_route(&mut app);
    let running = spawn_app(app).await;
    let url = format!("http://{}/slow/10000", running.addr.unwrap());

    let request = tokio::spawn(async move { reqwest::get(url).await?.text().await });
    entered.notified().await;

    let started = Instant::now();
    let report = running.handle.shutdown(Duration::from_millis(200)).await;
    assert!(started.elapsed() < Duration::from_secs(1));
    match report.outcome("http") {
        Some(Ok(ShutdownStatus::Partial(detail))) => assert!(detail.contains("forced close")),
        other => panic!("expected a forced close, got {other:?}"),
    }
    assert!(request.await.unwrap().is_err());

    let summary = running.run.await.unwrap();
    assert!(summary.is_clean());
}

#[tokio::test]
async fn static_directory_is_served() {
    let root = std::env::temp_dir().join(format!("apphost-static-{}", uuid::Uuid::new_v4()));
    std::fs::create_dir_all(&root).unwrap();
    std::fs::write(root.join("hello.txt"), "static hello").unwrap();

    let mut app = test_app(test_config(5)).await;
    app.static_files("/assets", &root).unwrap();
    assert!(app.static_files("/assets", &root).is_err());

    let running = spawn_app(app).await;
    let body = reqwest::get(format!("http://{}/assets/hello.txt", running.addr.unwrap()))
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert_eq!(body, "static hello");

    running.handle.shutdown(Duration::from_secs(2)).await;
    running.run.await.unwrap();
    let _ = std::fs::remove_dir_all(root);
}
