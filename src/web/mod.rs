//! Read-only HTTP status endpoint. Never mutates state; the
//! router's dispatch (one route match, or the single `fallback`) ensures
//! exactly one response is ever written per request.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::get;
use axum::Router;
use chrono::Utc;
use serde_json::{json, Value};
use tokio::sync::RwLock;
use tower_http::trace::TraceLayer;

use crate::domain::ClusterSnapshot;

pub type SharedSnapshot = Arc<RwLock<ClusterSnapshot>>;

pub fn router(snapshot: SharedSnapshot) -> Router {
    Router::new()
        .route("/status", get(status))
        .route("/heartbeat", get(heartbeat))
        .fallback(not_found)
        .layer(TraceLayer::new_for_http())
        .with_state(snapshot)
}

async fn status(State(snapshot): State<SharedSnapshot>) -> Json<Value> {
    let snapshot = snapshot.read().await;
    Json(json!(&*snapshot))
}

async fn heartbeat() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "timestamp": Utc::now(),
    }))
}

async fn not_found() -> StatusCode {
    StatusCode::NOT_FOUND
}
