//! Handler for `POST /probes`.
//!
//! The body carries the feature vectors of every face detected in one frame.
//! Matching failures and timeouts are reported per probe inside a 200
//! response; only malformed input, back-pressure and persistence outages are
//! HTTP errors.

use axum::{Json, extract::State};
use chrono::{DateTime, Utc};
use facegate_core::{encoding::FeatureVector, store::AttendanceStore};
use facegate_engine::{Engine, Frame, ProbeOutcome};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct ProbeBody {
  pub encodings:      Vec<FeatureVector>,
  /// Frame capture time. Defaults to the time the request is received.
  pub captured_at:    Option<DateTime<Utc>>,
  /// Reference to a stored snapshot of the frame, kept on resulting events
  /// when evidence photos are enabled.
  pub evidence_photo: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ProbeResponse {
  pub outcomes: Vec<ProbeOutcome>,
}

/// `POST /probes`, body: [`ProbeBody`].
pub async fn submit<S>(
  State(engine): State<Engine<S>>,
  Json(body): Json<ProbeBody>,
) -> Result<Json<ProbeResponse>, ApiError>
where
  S: AttendanceStore + 'static,
{
  let frame = Frame {
    encodings:      body.encodings,
    captured_at:    body.captured_at.unwrap_or_else(Utc::now),
    evidence_photo: body.evidence_photo,
  };
  let outcomes = engine.recognize_frame(frame).await?;
  Ok(Json(ProbeResponse { outcomes }))
}
