//! Handlers for `GET /stats` and `GET /health`.

use axum::{
  Json,
  extract::State,
  http::StatusCode,
  response::IntoResponse,
};
use facegate_core::store::AttendanceStore;
use facegate_engine::{Engine, EngineStats};
use serde_json::json;

use crate::error::ApiError;

/// `GET /stats`
pub async fn stats<S>(State(engine): State<Engine<S>>) -> Result<Json<EngineStats>, ApiError>
where
  S: AttendanceStore + 'static,
{
  Ok(Json(engine.stats().await?))
}

/// `GET /health`: 200 while probes are accepted, 503 otherwise.
pub async fn health<S>(State(engine): State<Engine<S>>) -> impl IntoResponse
where
  S: AttendanceStore + 'static,
{
  if engine.health().await {
    (StatusCode::OK, Json(json!({ "status": "ok" })))
  } else {
    (StatusCode::SERVICE_UNAVAILABLE, Json(json!({ "status": "unavailable" })))
  }
}
