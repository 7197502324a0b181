//! Handlers for `/workers` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/workers` | Optional `?include_inactive=true` |
//! | `POST` | `/workers` | Body: `{"display_name":"..."}`; returns 201 |
//! | `GET`  | `/workers/:id` | Identity, session state and encoding metadata |
//! | `POST` | `/workers/:id/encodings` | Body: [`EnrollBody`]; returns 201 |
//! | `POST` | `/workers/:id/encodings/:encoding_id/deactivate` | Stops matching one vector |
//! | `POST` | `/workers/:id/deactivate` | Removes the worker from matching |
//! | `GET`  | `/workers/:id/sessions` | Optional `from`, `to` |

use axum::{
  Json,
  extract::{Path, Query, State},
  http::StatusCode,
  response::IntoResponse,
};
use chrono::{DateTime, Utc};
use facegate_core::{
  encoding::{EncodingRecord, FeatureVector, NewEncoding},
  store::AttendanceStore,
  summary::WorkSession,
  worker::{NewWorker, WorkerIdentity},
};
use facegate_engine::{Engine, WorkerStatus};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::ApiError;

// ─── List ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ListParams {
  #[serde(default)]
  pub include_inactive: bool,
}

/// `GET /workers[?include_inactive=true]`
pub async fn list<S>(
  State(engine): State<Engine<S>>,
  Query(params): Query<ListParams>,
) -> Result<Json<Vec<WorkerIdentity>>, ApiError>
where
  S: AttendanceStore + 'static,
{
  Ok(Json(engine.list_workers(params.include_inactive).await?))
}

// ─── Create ───────────────────────────────────────────────────────────────────

/// `POST /workers`, body: `{"display_name":"..."}`
pub async fn create<S>(
  State(engine): State<Engine<S>>,
  Json(body): Json<NewWorker>,
) -> Result<impl IntoResponse, ApiError>
where
  S: AttendanceStore + 'static,
{
  let worker = engine.add_worker(body).await?;
  Ok((StatusCode::CREATED, Json(worker)))
}

// ─── Get one ──────────────────────────────────────────────────────────────────

/// `GET /workers/:id`
pub async fn get_one<S>(
  State(engine): State<Engine<S>>,
  Path(id): Path<Uuid>,
) -> Result<Json<WorkerStatus>, ApiError>
where
  S: AttendanceStore + 'static,
{
  Ok(Json(engine.worker_status(id).await?))
}

// ─── Enroll ───────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct EnrollBody {
  pub vector:      FeatureVector,
  pub captured_at: Option<DateTime<Utc>>,
  /// Capture condition, e.g. `"with_glasses"`. Defaults to `"default"`.
  pub variant:     Option<String>,
  pub quality:     Option<f32>,
}

impl From<EnrollBody> for NewEncoding {
  fn from(b: EnrollBody) -> Self {
    NewEncoding {
      vector:      b.vector,
      captured_at: b.captured_at,
      variant:     b.variant,
      quality:     b.quality,
    }
  }
}

/// `POST /workers/:id/encodings`: returns 201 + the [`EncodingRecord`].
pub async fn enroll<S>(
  State(engine): State<Engine<S>>,
  Path(id): Path<Uuid>,
  Json(body): Json<EnrollBody>,
) -> Result<(StatusCode, Json<EncodingRecord>), ApiError>
where
  S: AttendanceStore + 'static,
{
  let record = engine.enroll(id, NewEncoding::from(body)).await?;
  Ok((StatusCode::CREATED, Json(record)))
}

/// `POST /workers/:id/encodings/:encoding_id/deactivate`
pub async fn deactivate_encoding<S>(
  State(engine): State<Engine<S>>,
  Path((id, encoding_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<EncodingRecord>, ApiError>
where
  S: AttendanceStore + 'static,
{
  Ok(Json(engine.deactivate_encoding(id, encoding_id).await?))
}

// ─── Deactivate ───────────────────────────────────────────────────────────────

/// `POST /workers/:id/deactivate`
pub async fn deactivate<S>(
  State(engine): State<Engine<S>>,
  Path(id): Path<Uuid>,
) -> Result<Json<WorkerIdentity>, ApiError>
where
  S: AttendanceStore + 'static,
{
  Ok(Json(engine.deactivate(id).await?))
}

// ─── Sessions ─────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct SessionParams {
  /// Inclusive lower bound on check-in time.
  pub from: Option<DateTime<Utc>>,
  /// Exclusive upper bound on check-in time.
  pub to:   Option<DateTime<Utc>>,
}

/// `GET /workers/:id/sessions[?from=...][&to=...]`
pub async fn sessions<S>(
  State(engine): State<Engine<S>>,
  Path(id): Path<Uuid>,
  Query(params): Query<SessionParams>,
) -> Result<Json<Vec<WorkSession>>, ApiError>
where
  S: AttendanceStore + 'static,
{
  Ok(Json(engine.work_sessions(id, params.from, params.to).await?))
}
