//! Handlers for `/events` endpoints.
//!
//! Events are read-only over HTTP. The only write is a compensating void.

use axum::{
  Json,
  extract::{Path, Query, State},
};
use chrono::{DateTime, Utc};
use facegate_core::{
  event::{EventQuery, EventVoid, ResolvedEvent},
  store::AttendanceStore,
};
use facegate_engine::Engine;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::ApiError;

#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
  pub worker_id:      Option<Uuid>,
  /// Inclusive.
  pub from:           Option<DateTime<Utc>>,
  /// Exclusive.
  pub to:             Option<DateTime<Utc>>,
  #[serde(default)]
  pub include_voided: bool,
}

/// `GET /events[?worker_id=...][&from=...][&to=...][&include_voided=true]`
pub async fn list<S>(
  State(engine): State<Engine<S>>,
  Query(params): Query<ListParams>,
) -> Result<Json<Vec<ResolvedEvent>>, ApiError>
where
  S: AttendanceStore + 'static,
{
  let query = EventQuery {
    worker_id:      params.worker_id,
    from:           params.from,
    to:             params.to,
    include_voided: params.include_voided,
  };
  Ok(Json(engine.events(&query).await?))
}

/// `GET /events/:id`
pub async fn get_one<S>(
  State(engine): State<Engine<S>>,
  Path(id): Path<Uuid>,
) -> Result<Json<ResolvedEvent>, ApiError>
where
  S: AttendanceStore + 'static,
{
  Ok(Json(engine.get_event(id).await?))
}

#[derive(Debug, Default, Deserialize)]
pub struct VoidBody {
  pub reason: Option<String>,
}

/// `POST /events/:id/void`, body: `{"reason":"..."}` (optional).
pub async fn void_one<S>(
  State(engine): State<Engine<S>>,
  Path(id): Path<Uuid>,
  Json(body): Json<VoidBody>,
) -> Result<Json<EventVoid>, ApiError>
where
  S: AttendanceStore + 'static,
{
  Ok(Json(engine.void_event(id, body.reason).await?))
}
