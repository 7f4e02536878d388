//! End-to-end runs against a local axum server standing in for the posts service.

use std::{
    net::SocketAddr,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use axum::{Json, Router, extract::State, http::StatusCode, routing::post};
use reqwest::Url;
use serde_json::{Value, json};
use surge::{StagePlan, plan::Stage};
use surge_posts::{Endpoint, LoadTestConfig, PostPayload, run_load_test};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

#[derive(Clone, Default)]
struct Service {
    delay: Duration,
    created: Arc<AtomicU64>,
}

async fn create_post(
    State(service): State<Service>,
    Json(post): Json<PostPayload>,
) -> (StatusCode, Json<Value>) {
    tokio::time::sleep(service.delay).await;
    service.created.fetch_add(1, Ordering::Relaxed);
    (
        StatusCode::OK,
        Json(json!({ "post": post, "message": "post created" })),
    )
}

async fn serve(service: Service) -> SocketAddr {
    let app = Router::new()
        .route(Endpoint::WithKafka.path(), post(create_post))
        .route(Endpoint::WithoutKafka.path(), post(create_post))
        .with_state(service);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
    addr
}

fn config(base: &str, endpoint: Endpoint, plan: StagePlan) -> LoadTestConfig {
    LoadTestConfig {
        url: Url::parse(base).unwrap().join(endpoint.path()).unwrap(),
        endpoint,
        author: "sounish".to_string(),
        plan,
        latency_threshold: Duration::from_millis(200),
        timeout: Duration::from_secs(5),
        graceful_stop: Duration::from_secs(2),
        tick: Duration::from_millis(10),
        json: false,
    }
}

fn short_plan(vus: u64) -> StagePlan {
    StagePlan::new(vec![
        Stage::new(Duration::ZERO, vus),
        Stage::new(Duration::from_millis(300), vus),
    ])
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn healthy_service_passes_every_check() {
    let service = Service::default();
    let addr = serve(service.clone()).await;

    let report = run_load_test(
        &config(&format!("http://{addr}"), Endpoint::WithKafka, short_plan(2)),
        CancellationToken::new(),
    )
    .await
    .unwrap();

    assert!(report.iterations > 0);
    assert_eq!(report.errors, 0);
    assert_eq!(report.iterations, service.created.load(Ordering::Relaxed));
    assert_eq!(report.status_codes.get(&200), Some(&report.iterations));
    assert_eq!(report.checks["status is 200"].fails, 0);
    assert_eq!(report.checks["status is 200"].passes, report.iterations);
    assert_eq!(report.checks["response time is less than 200ms"].fails, 0);
    assert!(report.all_passed());
    assert!(report.latency.is_some());
    assert!(report.bytes_received > 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn slow_service_fails_only_the_latency_check() {
    let service = Service {
        delay: Duration::from_millis(250),
        ..Default::default()
    };
    let addr = serve(service.clone()).await;

    let report = run_load_test(
        &config(&format!("http://{addr}"), Endpoint::WithoutKafka, short_plan(1)),
        CancellationToken::new(),
    )
    .await
    .unwrap();

    assert!(report.iterations > 0);
    assert_eq!(report.errors, 0);
    assert_eq!(report.checks["status is 200"].fails, 0);
    assert_eq!(
        report.checks["response time is less than 200ms"].passes,
        0
    );
    assert_eq!(
        report.checks["response time is less than 200ms"].fails,
        report.iterations
    );
    assert!(!report.all_passed());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn unreachable_service_is_counted_as_errors() {
    let addr = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap()
    };

    let report = run_load_test(
        &config(&format!("http://{addr}"), Endpoint::WithKafka, short_plan(1)),
        CancellationToken::new(),
    )
    .await
    .unwrap();

    assert!(report.iterations > 0);
    assert_eq!(report.errors, report.iterations);
    assert_eq!(report.responses, 0);
    assert!(report.errors_by_kind.contains_key("connect"));
    assert!(report.checks.is_empty());
    assert!(report.status_codes.is_empty());
    assert!(!report.all_passed());
}

#[tokio::test]
async fn empty_plan_sends_nothing() {
    let service = Service::default();
    let addr = serve(service.clone()).await;

    let report = run_load_test(
        &config(&format!("http://{addr}"), Endpoint::WithKafka, StagePlan::default()),
        CancellationToken::new(),
    )
    .await
    .unwrap();

    assert_eq!(report.iterations, 0);
    assert_eq!(report.errors, 0);
    assert!(report.latency.is_none());
    assert_eq!(service.created.load(Ordering::Relaxed), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn cancelled_run_still_reports() {
    let service = Service::default();
    let addr = serve(service.clone()).await;

    let cancel = CancellationToken::new();
    let stopper = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        stopper.cancel();
    });

    let plan = StagePlan::new(vec![
        Stage::new(Duration::ZERO, 2),
        Stage::new(Duration::from_secs(60), 2),
    ]);
    let started = std::time::Instant::now();
    let report = run_load_test(&config(&format!("http://{addr}"), Endpoint::WithKafka, plan), cancel)
        .await
        .unwrap();

    assert!(started.elapsed() < Duration::from_secs(10));
    assert!(report.iterations > 0);
    assert_eq!(report.errors, 0);
}
