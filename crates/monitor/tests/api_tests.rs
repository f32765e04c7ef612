//! Integration tests for the monitor API endpoints

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    response::Response,
    Router,
};
use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::Utc;
use docker_monitor::{
    api::{create_router, AppState},
    auth::AuthGate,
    settings::{Settings, SettingsStore},
};
use monitor_lib::{
    health::{components, HealthRegistry},
    observability::MonitorMetrics,
    AlertEvent, AlertKind, ContainerSample, HostSample, ImageUsage, LatestSnapshot, Snapshot,
    Store,
};
use tempfile::TempDir;
use tower::ServiceExt;

struct TestApp {
    router: Router,
    state: Arc<AppState>,
    _dir: TempDir,
}

impl TestApp {
    async fn send(&self, request: Request<Body>) -> Response {
        self.router.clone().oneshot(request).await.unwrap()
    }

    async fn get(&self, uri: &str) -> Response {
        self.send(authed(uri).body(Body::empty()).unwrap()).await
    }

    async fn post_json(&self, uri: &str, body: serde_json::Value) -> Response {
        self.send(
            authed(uri)
                .method("POST")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
    }
}

fn basic(user: &str, password: &str) -> String {
    format!("Basic {}", STANDARD.encode(format!("{user}:{password}")))
}

fn authed(uri: &str) -> axum::http::request::Builder {
    Request::builder()
        .uri(uri)
        .header(header::AUTHORIZATION, basic("admin", "secret"))
}

async fn setup_test_app(user: &str, password: &str, max_connections: u32) -> TestApp {
    let dir = TempDir::new().unwrap();
    let store = Store::open(dir.path().join("monitor.db")).unwrap();

    let health_registry = HealthRegistry::new();
    health_registry.register_all().await;

    let state = Arc::new(AppState {
        health_registry,
        latest: LatestSnapshot::new(),
        store,
        auth: AuthGate::new(dir.path().join("auth.json"), user, password),
        settings: SettingsStore::new(
            dir.path().join("settings.json"),
            Settings { max_connections },
        ),
    });

    TestApp {
        router: create_router(state.clone()),
        state,
        _dir: dir,
    }
}

async fn setup_default_app() -> TestApp {
    setup_test_app("admin", "secret", 0).await
}

async fn json_body(response: Response) -> serde_json::Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

#[tokio::test]
async fn test_api_health_is_exempt_from_auth() {
    let app = setup_default_app().await;

    let response = app
        .send(Request::builder().uri("/api/health").body(Body::empty()).unwrap())
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["status"], "ok");
    assert!(body["last_cycle"].is_null());
}

#[tokio::test]
async fn test_missing_credentials_returns_401_with_challenge() {
    let app = setup_default_app().await;

    let response = app
        .send(Request::builder().uri("/api/current").body(Body::empty()).unwrap())
        .await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(
        response.headers().get(header::WWW_AUTHENTICATE).unwrap(),
        r#"Basic realm="Docker Monitor""#
    );
}

#[tokio::test]
async fn test_auth_disabled_without_credentials() {
    let app = setup_test_app("", "", 0).await;

    let response = app
        .send(Request::builder().uri("/api/current").body(Body::empty()).unwrap())
        .await;

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_repeated_failures_are_rate_limited() {
    let app = setup_default_app().await;

    let bad = || {
        Request::builder()
            .uri("/api/current")
            .header("x-forwarded-for", "203.0.113.7, 10.0.0.1")
            .header(header::AUTHORIZATION, basic("admin", "guess"))
            .body(Body::empty())
            .unwrap()
    };

    for _ in 0..5 {
        assert_eq!(app.send(bad()).await.status(), StatusCode::UNAUTHORIZED);
    }
    assert_eq!(app.send(bad()).await.status(), StatusCode::TOO_MANY_REQUESTS);

    // A different client is unaffected
    assert_eq!(app.get("/api/current").await.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_current_returns_skeleton_before_first_cycle() {
    let app = setup_default_app().await;

    let response = app.get("/api/current").await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    assert_eq!(body["containers"], serde_json::json!([]));
    assert_eq!(body["anomalies"], serde_json::json!([]));
    assert!(body["images"].is_null());
}

#[tokio::test]
async fn test_current_returns_latest_snapshot() {
    let app = setup_default_app().await;
    let now = Utc::now();

    app.state
        .latest
        .publish(Snapshot {
            containers: vec![ContainerSample::new("web", 12.0, 30.0, now)],
            host: HostSample::new(now),
            images: Some(ImageUsage {
                image_count: 4,
                image_size: 2_000_000_000,
                ..Default::default()
            }),
            anomalies: vec![AlertEvent::new(
                AlertKind::MemHigh,
                "web",
                95.0,
                now,
                "Container web Memory 95.0% (>90.0%)".to_string(),
            )],
            ts: now,
        })
        .await;

    let body = json_body(app.get("/api/current").await).await;
    assert_eq!(body["containers"][0]["name"], "web");
    assert_eq!(body["anomalies"][0]["type"], "mem_high");
    assert_eq!(body["images"]["image_count"], 4);
    assert!(body["host"]["gpu_temp"].is_null());
}

#[tokio::test]
async fn test_container_history() {
    let app = setup_default_app().await;
    let now = Utc::now();

    app.state
        .store
        .insert_container_samples(&[
            ContainerSample::new("web", 10.0, 20.0, now - chrono::Duration::minutes(20)),
            ContainerSample::new("web", 11.0, 20.0, now - chrono::Duration::hours(3)),
            ContainerSample::new("db", 5.0, 20.0, now),
        ])
        .unwrap();

    let body = json_body(app.get("/api/history/web").await).await;
    assert_eq!(body.as_array().unwrap().len(), 1);

    let body = json_body(app.get("/api/history/web?hours=4").await).await;
    assert_eq!(body.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_host_history_route_is_not_a_container_name() {
    let app = setup_default_app().await;
    let now = Utc::now();

    app.state.store.insert_host_sample(&HostSample::new(now)).unwrap();
    app.state
        .store
        .insert_container_samples(&[ContainerSample::new("host", 1.0, 1.0, now)])
        .unwrap();

    let body = json_body(app.get("/api/history/host").await).await;
    let samples = body.as_array().unwrap();
    assert_eq!(samples.len(), 1);
    assert!(samples[0].get("load_avg").is_some());
}

#[tokio::test]
async fn test_hours_out_of_range_returns_422() {
    let app = setup_default_app().await;

    for uri in [
        "/api/history/host?hours=0.05",
        "/api/history/web?hours=200",
        "/api/alerts?hours=0.5",
        "/api/alerts?hours=169",
    ] {
        let response = app.get(uri).await;
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY, "{uri}");
        assert!(json_body(response).await["error"].is_string());
    }
}

#[tokio::test]
async fn test_alerts_newest_first() {
    let app = setup_default_app().await;
    let now = Utc::now();

    for (kind, minutes) in [(AlertKind::CpuHigh, 30), (AlertKind::Restart, 5)] {
        app.state
            .store
            .insert_alert(&AlertEvent::new(
                kind,
                "web",
                1.0,
                now - chrono::Duration::minutes(minutes),
                kind.to_string(),
            ))
            .unwrap();
    }

    let body = json_body(app.get("/api/alerts").await).await;
    let alerts = body.as_array().unwrap();
    assert_eq!(alerts.len(), 2);
    assert_eq!(alerts[0]["type"], "restart");
    assert_eq!(alerts[1]["type"], "cpu_high");
}

#[tokio::test]
async fn test_change_password_flow() {
    let app = setup_default_app().await;

    let response = app
        .post_json(
            "/api/change-password",
            serde_json::json!({"current_password": "secret", "new_password": "abc"}),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .post_json(
            "/api/change-password",
            serde_json::json!({"current_password": "wrong", "new_password": "longer-pass"}),
        )
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .post_json(
            "/api/change-password",
            serde_json::json!({"current_password": "secret", "new_password": "longer-pass"}),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["ok"], true);

    // Old password no longer works, username kept
    assert_eq!(app.get("/api/current").await.status(), StatusCode::UNAUTHORIZED);
    let response = app
        .send(
            Request::builder()
                .uri("/api/current")
                .header(header::AUTHORIZATION, basic("admin", "longer-pass"))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_change_password_invalid_json() {
    let app = setup_default_app().await;

    let response = app
        .send(
            authed("/api/change-password")
                .method("POST")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from("{oops"))
                .unwrap(),
        )
        .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_settings_roundtrip_and_validation() {
    let app = setup_default_app().await;

    let body = json_body(app.get("/api/settings").await).await;
    assert_eq!(body["max_connections"], 0);

    let response = app
        .post_json("/api/settings", serde_json::json!({"max_connections": 101}))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app.post_json("/api/settings", serde_json::json!({})).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .post_json("/api/settings", serde_json::json!({"max_connections": 3}))
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(app.get("/api/settings").await).await;
    assert_eq!(body["max_connections"], 3);
}

#[tokio::test]
async fn test_settings_accepts_numeric_string() {
    let app = setup_default_app().await;

    let response = app
        .post_json("/api/settings", serde_json::json!({"max_connections": "5"}))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["settings"]["max_connections"], 5);

    let response = app
        .post_json("/api/settings", serde_json::json!({"max_connections": "abc"}))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["error"], "max_connections must be a number");

    let response = app
        .post_json("/api/settings", serde_json::json!({"max_connections": [1]}))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = json_body(app.get("/api/settings").await).await;
    assert_eq!(body["max_connections"], 5);
}

#[tokio::test]
async fn test_session_cap_returns_503_for_new_client() {
    let app = setup_test_app("admin", "secret", 1).await;

    let from = |ip: &str| {
        authed("/api/session")
            .header("x-forwarded-for", ip)
            .body(Body::empty())
            .unwrap()
    };

    let response = app.send(from("198.51.100.1")).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["user"], "admin");
    assert_eq!(body["ip"], "198.51.100.1");
    assert_eq!(body["active_connections"], 1);

    assert_eq!(
        app.send(from("198.51.100.2")).await.status(),
        StatusCode::SERVICE_UNAVAILABLE
    );
    assert_eq!(app.send(from("198.51.100.1")).await.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_healthz_reflects_components() {
    let app = setup_default_app().await;

    let response = app
        .send(Request::builder().uri("/healthz").body(Body::empty()).unwrap())
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let health = json_body(response).await;
    assert_eq!(health["status"], "healthy");
    assert!(health["components"]["collector"].is_object());
    assert!(health["components"]["storage"].is_object());
    assert!(health["components"]["notifier"].is_object());

    app.state
        .health_registry
        .set_degraded(components::STORAGE, "database is locked")
        .await;
    let response = app
        .send(Request::builder().uri("/healthz").body(Body::empty()).unwrap())
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["status"], "degraded");

    app.state
        .health_registry
        .set_unhealthy(components::COLLECTOR, "docker not reachable")
        .await;
    let response = app
        .send(Request::builder().uri("/healthz").body(Body::empty()).unwrap())
        .await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_readyz_follows_first_cycle() {
    let app = setup_default_app().await;

    let response = app
        .send(Request::builder().uri("/readyz").body(Body::empty()).unwrap())
        .await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json_body(response).await["ready"], false);

    app.state.health_registry.set_ready(true).await;
    let response = app
        .send(Request::builder().uri("/readyz").body(Body::empty()).unwrap())
        .await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_metrics_endpoint_requires_auth_and_returns_prometheus_format() {
    let app = setup_default_app().await;

    let metrics = MonitorMetrics::new();
    metrics.observe_cycle_latency(Duration::from_millis(250));
    metrics.set_containers_monitored(3);

    let response = app
        .send(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app.get("/metrics").await;
    assert_eq!(response.status(), StatusCode::OK);

    let content_type = response.headers().get("content-type").unwrap();
    assert!(content_type.to_str().unwrap().contains("text/plain"));

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let metrics_text = String::from_utf8(body.to_vec()).unwrap();

    assert!(metrics_text.contains("docker_monitor_cycle_latency_seconds_bucket"));
    assert!(metrics_text.contains("docker_monitor_containers_monitored"));
}
