//! End-to-end tests of the HTTP surface over in-memory backends.

use std::sync::Arc;
use std::time::Duration;

use axum::http::header::AUTHORIZATION;
use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum_test::TestServer;
use serde_json::{json, Value};

use relaygate_auth::MockJwtValidator;
use relaygate_control::{CircuitBreaker, ControlConfig, RateLimitPolicy, ScriptedProvider};
use relaygate_core::OwnerId;
use relaygate_gateway::{create_router, GatewayConfig, GatewayMiddleware, GatewayState};
use relaygate_store::{MemoryCounterStore, MemoryStore};

const OWNER: &str = "550e8400-e29b-41d4-a716-446655440000";

fn server_with(control: ControlConfig, provider: Arc<ScriptedProvider>) -> TestServer {
    let middleware = Arc::new(GatewayMiddleware::new(
        Arc::new(MemoryStore::new()),
        Arc::new(MemoryCounterStore::new()),
        provider,
        Arc::new(CircuitBreaker::new(control.circuit)),
        Arc::new(MockJwtValidator::default()),
        &control,
        Duration::from_secs(2),
    ));
    let config = GatewayConfig {
        control,
        ..GatewayConfig::default()
    };
    TestServer::new(create_router(GatewayState::new(middleware, config))).unwrap()
}

fn server() -> TestServer {
    server_with(ControlConfig::default(), Arc::new(ScriptedProvider::new()))
}

fn bearer(tier: &str) -> (HeaderName, HeaderValue) {
    let value = format!("Bearer test-token:{OWNER}:{tier}");
    (AUTHORIZATION, HeaderValue::from_str(&value).unwrap())
}

fn generation(prompt: &str) -> Value {
    json!({ "kind": "content_generation", "payload": { "prompt": prompt } })
}

async fn submit(server: &TestServer, tier: &str, body: &Value) -> axum_test::TestResponse {
    let (name, value) = bearer(tier);
    server.post("/v1/ai/tasks").add_header(name, value).json(body).await
}

async fn poll_until_terminal(server: &TestServer, task_id: &str) -> Value {
    for _ in 0..200 {
        let (name, value) = bearer("basic");
        let body: Value = server
            .get(&format!("/v1/ai/tasks/{task_id}"))
            .add_header(name, value)
            .await
            .json();
        if body["status"] == "completed" || body["status"] == "failed" {
            return body;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("task {task_id} never finished");
}

#[tokio::test]
async fn submit_then_poll_to_completion() {
    let server = server();

    let response = submit(&server, "basic", &generation("spring launch")).await;
    response.assert_status(StatusCode::ACCEPTED);
    let body: Value = response.json();
    assert_eq!(body["status"], "processing");
    let task_id = body["task_id"].as_str().unwrap().to_string();

    let task = poll_until_terminal(&server, &task_id).await;
    assert_eq!(task["status"], "completed");
    assert_eq!(task["result"]["content"], "scripted");
    assert_eq!(task["attempts"], 1);

    let (name, value) = bearer("basic");
    let listed: Value = server
        .get("/v1/ai/tasks")
        .add_header(name, value)
        .await
        .json();
    assert_eq!(listed["tasks"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn missing_token_is_unauthorized() {
    let server = server();

    let response = server.post("/v1/ai/tasks").json(&generation("hi")).await;
    response.assert_status(StatusCode::UNAUTHORIZED);
    let body: Value = response.json();
    assert_eq!(body["error"]["code"], "authentication_error");
}

#[tokio::test]
async fn malformed_requests_are_validation_errors() {
    let server = server();

    let unknown_kind = json!({ "kind": "translation", "payload": { "text": "hola" } });
    let response = submit(&server, "basic", &unknown_kind).await;
    response.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(response.json::<Value>()["error"]["code"], "validation_error");

    let empty_prompt = generation("");
    let response = submit(&server, "basic", &empty_prompt).await;
    response.assert_status(StatusCode::BAD_REQUEST);

    let (name, value) = bearer("basic");
    let response = server
        .post("/v1/ai/tasks")
        .add_header(name, value)
        .text("{\"kind\": ")
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(response.json::<Value>()["error"]["code"], "validation_error");
}

#[tokio::test]
async fn bad_token_wins_over_malformed_body() {
    let server = server();

    let response = server
        .post("/v1/ai/tasks")
        .add_header(AUTHORIZATION, HeaderValue::from_static("Bearer not-a-token"))
        .text("{\"kind\": ")
        .await;
    response.assert_status(StatusCode::UNAUTHORIZED);
    assert_eq!(response.json::<Value>()["error"]["code"], "authentication_error");

    let metrics: Value = server.get("/metrics").await.json();
    assert_eq!(metrics["admit"]["requests"], 1);
    assert_eq!(metrics["admit"]["errors"], 1);
}

#[tokio::test]
async fn rate_limit_returns_retry_after() {
    let mut control = ControlConfig::default();
    control.rate_limits.default = RateLimitPolicy::new(1, Duration::from_secs(60));
    control.rate_limits.overrides.clear();
    let server = server_with(control, Arc::new(ScriptedProvider::new()));

    submit(&server, "enterprise", &generation("one"))
        .await
        .assert_status(StatusCode::ACCEPTED);

    let response = submit(&server, "enterprise", &generation("two")).await;
    response.assert_status(StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(
        response.json::<Value>()["error"]["code"],
        "rate_limit_exceeded"
    );
    let retry_after: u64 = response.headers()["retry-after"]
        .to_str()
        .unwrap()
        .parse()
        .unwrap();
    assert!((1..=60).contains(&retry_after));
}

#[tokio::test]
async fn concurrency_quota_returns_payment_required() {
    let provider = Arc::new(ScriptedProvider::new());
    provider.push_hang();
    provider.push_hang();
    let server = server_with(ControlConfig::default(), provider);

    for prompt in ["a", "b"] {
        submit(&server, "free", &generation(prompt))
            .await
            .assert_status(StatusCode::ACCEPTED);
    }

    let response = submit(&server, "free", &generation("c")).await;
    response.assert_status(StatusCode::PAYMENT_REQUIRED);
    assert_eq!(response.json::<Value>()["error"]["code"], "quota_exceeded");
}

#[tokio::test]
async fn polling_enforces_ownership_and_ids() {
    let server = server();
    let body: Value = submit(&server, "basic", &generation("mine")).await.json();
    let task_id = body["task_id"].as_str().unwrap().to_string();

    let stranger = format!("Bearer test-token:{}", OwnerId::generate());
    server
        .get(&format!("/v1/ai/tasks/{task_id}"))
        .add_header(AUTHORIZATION, HeaderValue::from_str(&stranger).unwrap())
        .await
        .assert_status(StatusCode::FORBIDDEN);

    let (name, value) = bearer("basic");
    server
        .get(&format!("/v1/ai/tasks/{}", "0".repeat(64)))
        .add_header(name, value)
        .await
        .assert_status(StatusCode::NOT_FOUND);

    let (name, value) = bearer("basic");
    server
        .get("/v1/ai/tasks/not-hex")
        .add_header(name, value)
        .await
        .assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn usage_health_and_metrics() {
    let server = server();
    let body: Value = submit(&server, "premium", &generation("x")).await.json();
    poll_until_terminal(&server, body["task_id"].as_str().unwrap()).await;

    let (name, value) = bearer("premium");
    let usage: Value = server
        .get("/v1/ai/usage")
        .add_header(name, value)
        .await
        .json();
    assert_eq!(usage["tier"], "premium");
    assert_eq!(usage["quota"]["daily"], 1);
    assert_eq!(usage["quota"]["concurrent"], 0);
    assert_eq!(usage["usage"]["total_cost"], "0.004");
    assert_eq!(usage["limits"]["daily_requests"], 1000);

    let health: Value = server.get("/health").await.json();
    assert_eq!(health["status"], "healthy");
    assert_eq!(health["circuit"]["state"], "closed");

    let metrics: Value = server.get("/metrics").await.json();
    assert_eq!(metrics["admit"]["requests"], 1);
    assert_eq!(metrics["admit"]["errors"], 0);
}
