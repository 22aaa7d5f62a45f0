// Tests may unwrap freely
#![allow(clippy::unwrap_used, clippy::expect_used)]

//! End-to-end tests over real HTTP.
//!
//! Each test binds a harness on an ephemeral port with an in-process
//! recording sidecar and drives it with reqwest.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use faultline_core::FailureDescription;
use faultline_server::{
    AppState, HarnessConfig, HarnessServer, MethodResponse, Result, ServerError, Sidecar,
};
use parking_lot::Mutex;
use reqwest::StatusCode;
use serde_json::{Value, json};

#[derive(Debug, Clone, PartialEq)]
enum Call {
    Binding(String, FailureDescription),
    Publish(String, String, FailureDescription),
    Method(String, String, Bytes),
    Proxy(String, FailureDescription),
}

#[derive(Default)]
struct RecordingSidecar {
    calls: Mutex<Vec<Call>>,
    unreachable: bool,
    method_response: Option<MethodResponse>,
}

impl RecordingSidecar {
    fn unreachable() -> Self {
        Self {
            unreachable: true,
            ..Self::default()
        }
    }

    fn answering(status: u16, body: &'static str) -> Self {
        Self {
            method_response: Some(MethodResponse {
                status,
                body: Bytes::from_static(body.as_bytes()),
            }),
            ..Self::default()
        }
    }

    fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    fn check(&self) -> Result<()> {
        if self.unreachable {
            Err(ServerError::sidecar("connection refused"))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl Sidecar for RecordingSidecar {
    async fn invoke_binding(&self, binding: &str, description: &FailureDescription) -> Result<()> {
        self.check()?;
        self.calls
            .lock()
            .push(Call::Binding(binding.to_string(), description.clone()));
        Ok(())
    }

    async fn publish_event(
        &self,
        pubsub: &str,
        topic: &str,
        description: &FailureDescription,
    ) -> Result<()> {
        self.check()?;
        self.calls.lock().push(Call::Publish(
            pubsub.to_string(),
            topic.to_string(),
            description.clone(),
        ));
        Ok(())
    }

    async fn invoke_method(
        &self,
        app_id: &str,
        method: &str,
        body: Bytes,
    ) -> Result<MethodResponse> {
        self.check()?;
        self.calls
            .lock()
            .push(Call::Method(app_id.to_string(), method.to_string(), body));
        Ok(self.method_response.clone().unwrap_or(MethodResponse {
            status: 200,
            body: Bytes::new(),
        }))
    }

    async fn proxy_grpc(&self, app_id: &str, description: &FailureDescription) -> Result<()> {
        if self.unreachable {
            return Err(ServerError::proxy("connection refused"));
        }
        self.calls
            .lock()
            .push(Call::Proxy(app_id.to_string(), description.clone()));
        Ok(())
    }

    async fn probe(&self) -> Result<()> {
        self.check()
    }
}

struct TestServer {
    base: String,
    client: reqwest::Client,
    state: Arc<AppState>,
    sidecar: Arc<RecordingSidecar>,
    _shutdown: tokio::sync::oneshot::Sender<()>,
}

impl TestServer {
    async fn start() -> Self {
        Self::with_sidecar(RecordingSidecar::default()).await
    }

    async fn with_sidecar(sidecar: RecordingSidecar) -> Self {
        let sidecar = Arc::new(sidecar);
        let mut config = HarnessConfig::default();
        config.listen_addr = "127.0.0.1:0".parse().unwrap();

        let server = HarnessServer::bind(AppState::new(config, sidecar.clone()))
            .await
            .unwrap();
        let addr = server.local_addr().unwrap();
        let state = server.state();
        let (shutdown, stop) = tokio::sync::oneshot::channel::<()>();
        tokio::spawn(server.serve(async {
            let _ = stop.await;
        }));

        Self {
            base: format!("http://{addr}"),
            client: reqwest::Client::new(),
            state,
            sidecar,
            _shutdown: shutdown,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base)
    }

    async fn post(&self, path: &str, body: impl Into<reqwest::Body>) -> reqwest::Response {
        self.client
            .post(self.url(path))
            .header("content-type", "application/json")
            .body(body)
            .send()
            .await
            .unwrap()
    }

    async fn counts(&self) -> Value {
        self.client
            .get(self.url("/tests/getCallCount"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap()
    }

    async fn sequence(&self, id: &str) -> Vec<u64> {
        self.counts().await[id]
            .as_array()
            .map(|records| {
                records
                    .iter()
                    .map(|r| r["count"].as_u64().unwrap())
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[tokio::test]
async fn scripted_failures_then_success() {
    let server = TestServer::start().await;
    let body = json!({"id": "s1", "maxFailureCount": 2}).to_string();

    let first = server.post("/resiliencyInvocation", body.clone()).await;
    assert_eq!(first.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(server.sequence("s1").await, vec![0]);

    let second = server.post("/resiliencyInvocation", body.clone()).await;
    assert_eq!(second.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(server.sequence("s1").await, vec![0, 1]);

    let third = server.post("/resiliencyInvocation", body).await;
    assert_eq!(third.status(), StatusCode::OK);
    assert!(third.bytes().await.unwrap().is_empty());
    assert_eq!(server.sequence("s1").await, vec![0, 1, 2]);
}

#[tokio::test]
async fn stall_is_recorded_before_it_begins() {
    let server = Arc::new(TestServer::start().await);
    let body = json!({"id": "s2", "maxFailureCount": 1, "timeout": 50_000_000}).to_string();

    let stalled = {
        let server = Arc::clone(&server);
        let body = body.clone();
        tokio::spawn(async move {
            let start = Instant::now();
            let response = server.post("/resiliencyInvocation", body).await;
            (response.status(), start.elapsed())
        })
    };

    // Poll until the attempt shows up; it must appear while the stall runs.
    let mut seen = Vec::new();
    for _ in 0..40 {
        seen = server.sequence("s2").await;
        if !seen.is_empty() || stalled.is_finished() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    assert_eq!(seen, vec![0]);

    let (status, elapsed) = stalled.await.unwrap();
    assert_eq!(status, StatusCode::OK);
    assert!(elapsed >= Duration::from_millis(50), "stalled only {elapsed:?}");

    let second = server.post("/resiliencyInvocation", body).await;
    assert_eq!(second.status(), StatusCode::OK);
    assert_eq!(server.sequence("s2").await, vec![0, 1]);
}

#[tokio::test]
async fn stall_accepts_duration_text() {
    let server = TestServer::start().await;
    let body = json!({"id": "text", "maxFailureCount": 1, "timeout": "30ms"}).to_string();

    let start = Instant::now();
    let response = server.post("/resiliencybinding", body).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(start.elapsed() >= Duration::from_millis(30));
}

#[tokio::test]
async fn event_delivery_acknowledges_success() {
    let server = TestServer::start().await;
    let envelope = json!({
        "specversion": "1.0",
        "type": "com.dapr.event.sent",
        "topic": "resiliency-topic-http",
        "pubsubname": "dapr-resiliency-pubsub",
        "data": {"id": "ev", "maxFailureCount": 1}
    })
    .to_string();

    let first = server.post("/resiliency-topic-http", envelope.clone()).await;
    assert_eq!(first.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let second = server.post("/resiliency-topic-http", envelope).await;
    assert_eq!(second.status(), StatusCode::OK);
    let ack: Value = second.json().await.unwrap();
    assert_eq!(ack["status"], "SUCCESS");

    assert_eq!(server.sequence("ev").await, vec![0, 1]);
}

#[tokio::test]
async fn binding_probe_and_delivery() {
    let server = TestServer::start().await;

    let probe = server
        .client
        .request(reqwest::Method::OPTIONS, server.url("/resiliencybinding"))
        .send()
        .await
        .unwrap();
    assert_eq!(probe.status(), StatusCode::OK);
    assert!(server.state.engine().tracker().is_empty());

    let body = json!({"id": "bind", "maxFailureCount": 1}).to_string();
    let first = server.post("/resiliencybinding", body.clone()).await;
    assert_eq!(first.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let second = server.post("/resiliencybinding", body).await;
    assert_eq!(second.status(), StatusCode::OK);
}

#[tokio::test]
async fn transports_share_one_sequence_per_id() {
    let server = TestServer::start().await;
    let desc = json!({"id": "mixed", "maxFailureCount": 2});

    let invocation = server
        .post("/resiliencyInvocation", desc.to_string())
        .await;
    let event = server
        .post("/resiliency-topic-http", json!({"data": desc}).to_string())
        .await;
    let binding = server.post("/resiliencybinding", desc.to_string()).await;

    assert_eq!(invocation.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(event.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(binding.status(), StatusCode::OK);
    assert_eq!(server.sequence("mixed").await, vec![0, 1, 2]);
}

#[tokio::test]
async fn malformed_bodies_are_rejected_without_recording() {
    let server = TestServer::start().await;
    let cases = [
        ("/resiliencyInvocation", "not json".to_string()),
        ("/resiliencyInvocation", json!({"maxFailureCount": 1}).to_string()),
        ("/resiliencybinding", json!({"id": "m1", "maxFailureCount": -1}).to_string()),
        ("/resiliencybinding", json!({"id": "m1", "timeout": "eventually"}).to_string()),
        ("/resiliency-topic-http", json!({"id": "m1"}).to_string()),
        ("/resiliency-topic-http", json!({"data": "m1"}).to_string()),
        ("/resiliency-topic-http", json!({"data": {"id": ""}}).to_string()),
        ("/tests/invokeBinding/b", "{".to_string()),
        ("/tests/publishMessage/ps/t", json!({"id": 7}).to_string()),
        ("/tests/invokeService/http", String::new()),
        ("/tests/invokeService/grpc_proxy", json!({"id": ""}).to_string()),
    ];

    for (path, body) in cases {
        let response = server.post(path, body.clone()).await;
        assert_eq!(
            response.status(),
            StatusCode::BAD_REQUEST,
            "{path} accepted {body}"
        );
    }

    assert_eq!(server.counts().await, json!({}));
    assert!(server.sidecar.calls().is_empty());
}

#[tokio::test]
async fn query_reports_records_in_order() {
    let server = TestServer::start().await;
    for _ in 0..3 {
        server
            .post("/resiliencyInvocation", json!({"id": "q"}).to_string())
            .await;
    }
    server
        .post("/resiliencyInvocation", json!({"id": "r"}).to_string())
        .await;

    let counts = server.counts().await;
    let records = counts["q"].as_array().unwrap();
    assert_eq!(records.len(), 3);
    let stamps: Vec<DateTime<Utc>> = records
        .iter()
        .map(|r| r["timeSeen"].as_str().unwrap().parse().unwrap())
        .collect();
    assert!(stamps.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(counts["r"].as_array().unwrap().len(), 1);

    // Reading twice changes nothing.
    assert_eq!(server.counts().await, counts);
}

#[tokio::test]
async fn subscriptions_and_index() {
    let server = TestServer::start().await;

    let index = server.client.get(server.url("/")).send().await.unwrap();
    assert_eq!(index.status(), StatusCode::OK);

    let subs: Value = server
        .client
        .get(server.url("/dapr/subscribe"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(
        subs,
        json!([{
            "pubsubname": "dapr-resiliency-pubsub",
            "topic": "resiliency-topic-http",
            "route": "resiliency-topic-http"
        }])
    );
}

#[tokio::test]
async fn unknown_routes_and_methods() {
    let server = TestServer::start().await;
    let missing = server.client.get(server.url("/nope")).send().await.unwrap();
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);

    let wrong = server
        .client
        .get(server.url("/resiliencyInvocation"))
        .send()
        .await
        .unwrap();
    assert_eq!(wrong.status(), StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn triggers_forward_descriptions() {
    let server = TestServer::start().await;
    let desc = json!({"id": "fwd", "maxFailureCount": 3, "timeout": 1_000_000});

    let binding = server
        .post("/tests/invokeBinding/dapr-resiliency-binding", desc.to_string())
        .await;
    assert_eq!(binding.status(), StatusCode::OK);

    let publish = server
        .post(
            "/tests/publishMessage/dapr-resiliency-pubsub/resiliency-topic-http",
            desc.to_string(),
        )
        .await;
    assert_eq!(publish.status(), StatusCode::OK);

    let expected = FailureDescription::new("fwd")
        .with_max_failures(3)
        .with_timeout(Duration::from_millis(1));
    assert_eq!(
        server.sidecar.calls(),
        vec![
            Call::Binding("dapr-resiliency-binding".into(), expected.clone()),
            Call::Publish(
                "dapr-resiliency-pubsub".into(),
                "resiliency-topic-http".into(),
                expected
            ),
        ]
    );
    // Triggers never record attempts themselves.
    assert!(server.state.engine().tracker().is_empty());
}

#[tokio::test]
async fn invoke_service_http_relays_peer_status() {
    let server = TestServer::with_sidecar(RecordingSidecar::answering(503, "")).await;
    let body = json!({"id": "peer", "maxFailureCount": 1}).to_string();

    let response = server.post("/tests/invokeService/http", body.clone()).await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(
        server.sidecar.calls(),
        vec![Call::Method(
            "resiliencyapp".into(),
            "resiliencyInvocation".into(),
            Bytes::from(body)
        )]
    );
}

#[tokio::test]
async fn invoke_service_grpc_maps_failures_to_500() {
    let failing = TestServer::with_sidecar(RecordingSidecar::answering(500, "")).await;
    let body = json!({"id": "g"}).to_string();
    let response = failing.post("/tests/invokeService/grpc", body.clone()).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let healthy = TestServer::start().await;
    let response = healthy.post("/tests/invokeService/grpc", body).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(matches!(
        &healthy.sidecar.calls()[..],
        [Call::Method(app, method, _)] if app == "resiliencyappgrpc" && method == "grpcInvoke"
    ));
}

#[tokio::test]
async fn invoke_service_grpc_proxy_forwards_description() {
    let server = TestServer::start().await;
    let response = server
        .post(
            "/tests/invokeService/grpc_proxy",
            json!({"id": "p", "maxFailureCount": 2, "timeout": "5ms"}).to_string(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        server.sidecar.calls(),
        vec![Call::Proxy(
            "resiliencyappgrpc".into(),
            FailureDescription::new("p")
                .with_max_failures(2)
                .with_timeout(Duration::from_millis(5))
        )]
    );
}

#[tokio::test]
async fn invoke_service_grpc_proxy_failure_is_500() {
    let server = TestServer::with_sidecar(RecordingSidecar::unreachable()).await;
    let response = server
        .post("/tests/invokeService/grpc_proxy", json!({"id": "p"}).to_string())
        .await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        response.text().await.unwrap(),
        "failed to proxy request: connection refused"
    );
}

#[tokio::test]
async fn invoke_service_rejects_unknown_protocol() {
    let server = TestServer::start().await;
    let response = server
        .post("/tests/invokeService/websocket", json!({"id": "p"}).to_string())
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(server.sidecar.calls().is_empty());
}

#[tokio::test]
async fn sidecar_failures_surface_as_500() {
    let server = TestServer::with_sidecar(RecordingSidecar::unreachable()).await;
    let body = json!({"id": "down"}).to_string();

    for path in [
        "/tests/invokeBinding/b",
        "/tests/publishMessage/ps/t",
        "/tests/invokeService/http",
    ] {
        let response = server.post(path, body.clone()).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR, "{path}");
        let text = response.text().await.unwrap();
        assert!(text.contains("connection refused"), "{path}: {text}");
    }

    let grpc_counts = server
        .client
        .get(server.url("/tests/getCallCountGRPC"))
        .send()
        .await
        .unwrap();
    assert_eq!(grpc_counts.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn grpc_call_counts_are_relayed() {
    let server =
        TestServer::with_sidecar(RecordingSidecar::answering(200, r#"{"g1":[{"count":0}]}"#))
            .await;
    let response = server
        .client
        .get(server.url("/tests/getCallCountGRPC"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["g1"][0]["count"], 0);
    assert_eq!(
        server.sidecar.calls(),
        vec![Call::Method(
            "resiliencyappgrpc".into(),
            "GetCallCount".into(),
            Bytes::new()
        )]
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_requests_get_distinct_sequence_numbers() {
    let server = Arc::new(TestServer::start().await);
    let requests = 32;

    let tasks: Vec<_> = (0..requests)
        .map(|i| {
            let server = Arc::clone(&server);
            let path = if i % 2 == 0 {
                "/resiliencyInvocation"
            } else {
                "/resiliencybinding"
            };
            tokio::spawn(async move {
                server
                    .post(path, json!({"id": "race", "maxFailureCount": 10}).to_string())
                    .await
                    .status()
            })
        })
        .collect();

    let mut failures = 0;
    for task in tasks {
        if task.await.unwrap() == StatusCode::INTERNAL_SERVER_ERROR {
            failures += 1;
        }
    }
    assert_eq!(failures, 10);

    let mut seq = server.sequence("race").await;
    let expected: Vec<u64> = (0..requests as u64).collect();
    assert_eq!(seq, expected);
    seq.dedup();
    assert_eq!(seq.len(), requests);
}
