//! HTTP API for the dashboard, health checks and Prometheus metrics

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, ConnectInfo, Path, Query, Request, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Extension, Json, Router,
};
use chrono::{Duration, Utc};
use monitor_lib::{
    health::{ComponentStatus, HealthRegistry},
    LatestSnapshot, Store,
};
use prometheus::{Encoder, TextEncoder};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::broadcast;
use tracing::{error, info};

use crate::auth::{AuthError, AuthGate, Credentials};
use crate::config::MAX_CONNECTIONS_LIMIT;
use crate::settings::SettingsStore;

/// Realm announced in `WWW-Authenticate`
const AUTH_REALM: &str = r#"Basic realm="Docker Monitor""#;

const MIN_PASSWORD_LEN: usize = 4;

/// Shared application state
pub struct AppState {
    pub health_registry: HealthRegistry,
    pub latest: LatestSnapshot,
    pub store: Store,
    pub auth: AuthGate,
    pub settings: SettingsStore,
}

/// Client identity attached to authenticated requests
#[derive(Debug, Clone)]
struct ClientInfo {
    ip: String,
    user: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    OutOfRange(String),
    #[error("{0}")]
    Internal(String),
}

impl From<anyhow::Error> for ApiError {
    fn from(e: anyhow::Error) -> Self {
        error!(error = %format!("{e:#}"), "Request failed");
        ApiError::Internal("Internal server error".to_string())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(_: JsonRejection) -> Self {
        ApiError::BadRequest("Invalid JSON".to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::Auth(AuthError::Unauthorized) => StatusCode::UNAUTHORIZED,
            ApiError::Auth(AuthError::RateLimited) => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Auth(AuthError::TooManySessions) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::OutOfRange(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let mut response = (status, Json(json!({ "error": self.to_string() }))).into_response();
        if status == StatusCode::UNAUTHORIZED {
            response.headers_mut().insert(
                header::WWW_AUTHENTICATE,
                HeaderValue::from_static(AUTH_REALM),
            );
        }
        response
    }
}

/// First `X-Forwarded-For` entry, else the peer address
fn client_ip(req: &Request) -> String {
    if let Some(forwarded) = req
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
    {
        if let Some(first) = forwarded.split(',').next().map(str::trim) {
            if !first.is_empty() {
                return first.to_string();
            }
        }
    }

    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Basic-Auth, rate limit and session cap for every protected route
async fn require_auth(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let ip = client_ip(&req);
    let authorization = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());

    let user = state.auth.authenticate(&ip, authorization)?;
    state
        .auth
        .admit(&ip, state.settings.load().max_connections)?;

    req.extensions_mut().insert(ClientInfo { ip, user });
    Ok(next.run(req).await)
}

/// Liveness for load balancers, exempt from auth
async fn api_health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "last_cycle": state.latest.last_cycle().await,
    }))
}

/// Health check response - returns 200 if healthy, 503 if unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health().await;

    let status_code = match health.status {
        ComponentStatus::Healthy | ComponentStatus::Degraded => StatusCode::OK,
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

/// Readiness check response - returns 200 if ready, 503 if not ready
async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health_registry.readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

/// Prometheus metrics endpoint
async fn metrics() -> Result<Response, ApiError> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder
        .encode(&prometheus::gather(), &mut buffer)
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, encoder.format_type().to_string())],
        buffer,
    )
        .into_response())
}

async fn current(State(state): State<Arc<AppState>>) -> Response {
    match state.latest.get().await {
        Some(snapshot) => Json(snapshot).into_response(),
        None => Json(json!({
            "containers": [],
            "host": {},
            "images": null,
            "anomalies": [],
            "ts": null,
        }))
        .into_response(),
    }
}

#[derive(Debug, Deserialize)]
struct HoursQuery {
    hours: Option<f64>,
}

impl HoursQuery {
    /// Look-back start, rejecting values outside `[min, max]`
    fn since(&self, default: f64, min: f64, max: f64) -> Result<chrono::DateTime<Utc>, ApiError> {
        let hours = self.hours.unwrap_or(default);
        if !(min..=max).contains(&hours) {
            return Err(ApiError::OutOfRange(format!(
                "hours must be between {min} and {max}"
            )));
        }
        Ok(Utc::now() - Duration::milliseconds((hours * 3_600_000.0) as i64))
    }

    fn history_since(&self) -> Result<chrono::DateTime<Utc>, ApiError> {
        self.since(1.0, 0.1, 168.0)
    }

    fn alerts_since(&self) -> Result<chrono::DateTime<Utc>, ApiError> {
        self.since(24.0, 1.0, 168.0)
    }
}

async fn host_history(
    State(state): State<Arc<AppState>>,
    Query(query): Query<HoursQuery>,
) -> Result<Response, ApiError> {
    let since = query.history_since()?;
    let samples = state
        .store
        .run_blocking(move |store| store.host_history(since))
        .await?;
    Ok(Json(samples).into_response())
}

async fn container_history(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    Query(query): Query<HoursQuery>,
) -> Result<Response, ApiError> {
    let since = query.history_since()?;
    let samples = state
        .store
        .run_blocking(move |store| store.container_history(&name, since))
        .await?;
    Ok(Json(samples).into_response())
}

async fn alerts(
    State(state): State<Arc<AppState>>,
    Query(query): Query<HoursQuery>,
) -> Result<Response, ApiError> {
    let since = query.alerts_since()?;
    let alerts = state
        .store
        .run_blocking(move |store| store.alerts_since(since))
        .await?;
    Ok(Json(alerts).into_response())
}

#[derive(Debug, Deserialize)]
struct ChangePassword {
    #[serde(default)]
    current_password: String,
    #[serde(default)]
    new_username: String,
    #[serde(default)]
    new_password: String,
}

async fn change_password(
    State(state): State<Arc<AppState>>,
    body: Result<Json<ChangePassword>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(body) = body?;

    if body.new_password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ApiError::BadRequest(format!(
            "New password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }

    let existing = state.auth.credentials();
    if let Some(creds) = &existing {
        if !creds.password_matches(&body.current_password) {
            return Err(ApiError::Forbidden(
                "Current password is incorrect".to_string(),
            ));
        }
    }

    let new_username = body.new_username.trim();
    let username = if !new_username.is_empty() {
        new_username.to_string()
    } else {
        existing
            .map(|c| c.user)
            .unwrap_or_else(|| "admin".to_string())
    };

    state
        .auth
        .save(&Credentials::new(username.as_str(), &body.new_password))?;
    info!(user = %username, "Password changed");

    Ok(Json(json!({ "ok": true, "message": "Password changed. Please re-login." })).into_response())
}

async fn session(
    State(state): State<Arc<AppState>>,
    Extension(client): Extension<ClientInfo>,
    headers: HeaderMap,
) -> impl IntoResponse {
    let active_ips = state.auth.active_ips();
    let user_agent = headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    Json(json!({
        "user": client.user.unwrap_or_else(|| "anonymous".to_string()),
        "ip": client.ip,
        "user_agent": user_agent,
        "active_connections": active_ips.len(),
        "max_connections": state.settings.load().max_connections,
        "active_ips": active_ips,
    }))
}

async fn get_settings(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.settings.load())
}

#[derive(Debug, Deserialize)]
struct SettingsUpdate {
    max_connections: Option<serde_json::Value>,
}

/// Accept integers and integer strings such as `"5"` from form-driven clients
fn integer_value(value: &serde_json::Value) -> Option<i64> {
    match value {
        serde_json::Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

async fn update_settings(
    State(state): State<Arc<AppState>>,
    body: Result<Json<SettingsUpdate>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(body) = body?;

    let Some(value) = body.max_connections else {
        return Err(ApiError::BadRequest("No valid settings provided".to_string()));
    };
    let Some(max_connections) = integer_value(&value) else {
        return Err(ApiError::BadRequest(
            "max_connections must be a number".to_string(),
        ));
    };
    if !(0..=MAX_CONNECTIONS_LIMIT as i64).contains(&max_connections) {
        return Err(ApiError::BadRequest(format!(
            "max_connections must be 0-{MAX_CONNECTIONS_LIMIT} (0=unlimited)"
        )));
    }

    let settings = state.settings.set_max_connections(max_connections as u32)?;
    info!(max_connections = settings.max_connections, "Settings updated");

    Ok(Json(json!({ "ok": true, "settings": settings })).into_response())
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    let protected = Router::new()
        .route("/metrics", get(metrics))
        .route("/api/current", get(current))
        .route("/api/history/host", get(host_history))
        .route("/api/history/:name", get(container_history))
        .route("/api/alerts", get(alerts))
        .route("/api/change-password", post(change_password))
        .route("/api/session", get(session))
        .route("/api/settings", get(get_settings).post(update_settings))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .route("/api/health", get(api_health))
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .merge(protected)
        .with_state(state)
}

/// Start the API server, stopping when the shutdown signal fires
pub async fn serve(
    port: u16,
    state: Arc<AppState>,
    mut shutdown: broadcast::Receiver<()>,
) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        let _ = shutdown.recv().await;
    })
    .await?;

    Ok(())
}
