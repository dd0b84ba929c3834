//! Switchboard server library logic.
//!
//! Wires the signaling relay into an axum router: the two WebSocket
//! endpoints, a health check, and static delivery of the demo pages.

pub mod config;
pub mod relay;
pub mod ws;

use axum::{routing::get, Extension, Json, Router};
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;

/// Application state shared across all request handlers.
pub struct AppState {
    /// The signaling relay.
    pub relay: relay::Relay,
    /// Directory with the demo pages, served as the router fallback.
    pub assets_dir: String,
}

/// Health check handler.
async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Builds the application router with all routes.
pub fn app(state: AppState) -> Router {
    let router = Router::new()
        .route("/health", get(health))
        .route("/client", get(ws::client_ws_handler))
        .route("/operator", get(ws::operator_ws_handler));

    // Serve the demo pages if the directory exists.
    let assets_dir = state.assets_dir.clone();
    let router = if std::path::Path::new(&assets_dir).is_dir() {
        tracing::info!(path = %assets_dir, "serving static assets");
        router.fallback_service(ServeDir::new(&assets_dir))
    } else {
        tracing::info!(path = %assets_dir, "assets directory not found, skipping static file serving");
        router
    };

    router
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(Extension(Arc::new(state)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    #[tokio::test]
    async fn health_check_returns_ok() {
        let app = app(AppState {
            relay: relay::Relay::new(None),
            assets_dir: "does-not-exist".to_string(),
        });

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["status"], "ok");
    }
}
