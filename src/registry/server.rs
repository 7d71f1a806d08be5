//! Minimal HTTP surface for the host registry (spec.md §6): the five
//! routes named in the wire contract and nothing else. The web framework
//! surrounding these routes (auth, routing blueprints, the rest of the
//! server) is out of scope per spec.md §1 — this exists so the registry
//! contract is directly executable, the way `broz-auth`'s `main.rs` stands
//! up just enough `axum::Router` to serve its own contract.

use super::store::Registry;
use super::types::{HostEntry, HostRegistration, PingRequest};
use crate::constants::incident::HOST_STALE_AFTER;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

/// Shared state for the registry's axum handlers.
#[derive(Clone)]
pub struct AppState {
    registry: Arc<Registry>,
}

/// Builds the router exposing `/server/system/{register,unregister,ping,
/// getAllHosts,health}`.
#[must_use]
pub fn router(registry: Arc<Registry>) -> Router {
    let state = AppState { registry };
    Router::new()
        .route("/server/system/register", post(register))
        .route("/server/system/unregister", post(unregister))
        .route("/server/system/ping", post(ping))
        .route("/server/system/getAllHosts", get(get_all_hosts))
        .route("/server/system/health", get(health))
        .with_state(state)
}

/// Serves `router(registry)` on `bind_addr` until the process is signaled
/// to stop. Also spawns the 120s staleness sweep spec.md §4.8 requires
/// independently of any `getAllHosts` poll.
pub async fn serve(registry: Arc<Registry>, bind_addr: &str) -> crate::error::Result<()> {
    let sweep_registry = registry.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(HOST_STALE_AFTER);
        loop {
            interval.tick().await;
            let pruned = sweep_registry.cleanup_stale(HOST_STALE_AFTER);
            if pruned > 0 {
                info!(pruned, "pruned stale hosts");
            }
        }
    });

    let app = router(registry);
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    info!(bind_addr, "host registry listening");
    axum::serve(listener, app)
        .await
        .map_err(|e| crate::error::Error::Internal { message: format!("registry server failed: {e}") })
}

#[derive(Debug, Serialize)]
struct RegisterResponse {
    status: &'static str,
    host_name: String,
    host_data: HostEntry,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    status: &'static str,
    message: String,
}

#[derive(Debug, Serialize)]
struct NotRegisteredResponse {
    status: &'static str,
    action: &'static str,
}

#[derive(Debug, Serialize)]
struct StatusOnlyResponse {
    status: &'static str,
}

#[derive(Debug, Serialize)]
struct AllHostsResponse {
    hosts: Vec<HostEntry>,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    timestamp: chrono::DateTime<Utc>,
    system_stats: serde_json::Value,
}

async fn register(State(state): State<AppState>, Json(req): Json<HostRegistration>) -> Response {
    if req.host_name.trim().is_empty() || req.host_url.trim().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                status: "error",
                message: "host_name and host_url are required".to_string(),
            }),
        )
            .into_response();
    }

    let host_name = req.host_name.clone();
    let host_data = state.registry.register(req);
    info!(host_name = %host_name, devices = host_data.devices.len(), "host registered");
    (
        StatusCode::OK,
        Json(RegisterResponse { status: "ok", host_name, host_data }),
    )
        .into_response()
}

async fn unregister(State(state): State<AppState>, Json(req): Json<PingRequest>) -> Response {
    if state.registry.unregister(&req.host_name) {
        info!(host_name = %req.host_name, "host unregistered");
        (StatusCode::OK, Json(StatusOnlyResponse { status: "ok" })).into_response()
    } else {
        (
            StatusCode::NOT_FOUND,
            Json(NotRegisteredResponse { status: "not_registered", action: "register" }),
        )
            .into_response()
    }
}

async fn ping(State(state): State<AppState>, Json(req): Json<PingRequest>) -> Response {
    match state.registry.ping(&req.host_name, req.system_stats) {
        Some(host_data) => (
            StatusCode::OK,
            Json(RegisterResponse { status: "ok", host_name: req.host_name, host_data }),
        )
            .into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(NotRegisteredResponse { status: "not_registered", action: "register" }),
        )
            .into_response(),
    }
}

async fn get_all_hosts(State(state): State<AppState>) -> Response {
    let hosts = state.registry.get_all_hosts(HOST_STALE_AFTER);
    (StatusCode::OK, Json(AllHostsResponse { hosts })).into_response()
}

async fn health(State(state): State<AppState>) -> Response {
    let registered = state.registry.len();
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "ok",
            timestamp: Utc::now(),
            system_stats: serde_json::json!({ "registered_hosts": registered }),
        }),
    )
        .into_response()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::registry::types::DeviceRegistration;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    fn registration_body(host_name: &str) -> String {
        let req = HostRegistration {
            host_name: host_name.to_string(),
            host_url: "http://127.0.0.1:9000".to_string(),
            host_port: Some(9000),
            devices: vec![DeviceRegistration {
                device_id: "device1".to_string(),
                device_name: "Living Room".to_string(),
                device_model: "stb-x1".to_string(),
                device_capabilities: vec![],
                device_verification_types: vec![],
                device_action_types: vec![],
            }],
            system_stats: None,
        };
        serde_json::to_string(&req).unwrap()
    }

    #[tokio::test]
    async fn test_register_then_ping_roundtrip() {
        let registry = Arc::new(Registry::new());
        let app = router(registry);

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/server/system/register")
                    .header("content-type", "application/json")
                    .body(Body::from(registration_body("host-a")))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/server/system/ping")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"host_name":"host-a"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_ping_unregistered_host_is_404() {
        let registry = Arc::new(Registry::new());
        let app = router(registry);

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/server/system/ping")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"host_name":"ghost"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_register_missing_host_name_is_400() {
        let registry = Arc::new(Registry::new());
        let app = router(registry);

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/server/system/register")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"host_name":"","host_url":"http://x"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_health_ok() {
        let registry = Arc::new(Registry::new());
        let app = router(registry);

        let response = app
            .oneshot(Request::builder().method("GET").uri("/server/system/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
