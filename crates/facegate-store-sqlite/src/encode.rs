//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are stored as RFC 3339 strings (plus an integer microsecond
//! column where ordering matters). UUIDs are stored as hyphenated lowercase
//! strings. Encryption state is stored as compact JSON.

use chrono::{DateTime, Utc};
use facegate_core::{
  encoding::{EncodingRecord, EncryptionState},
  event::{AttendanceEvent, EventKind, EventOrigin, EventStatus, ResolvedEvent},
  worker::WorkerIdentity,
};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Uuid ─────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

// ─── DateTime<Utc> ────────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── EncryptionState ──────────────────────────────────────────────────────────

pub fn encode_encryption(state: &EncryptionState) -> Result<String> {
  Ok(serde_json::to_string(state)?)
}

pub fn decode_encryption(s: &str) -> Result<EncryptionState> {
  Ok(serde_json::from_str(s)?)
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Columns selected for every worker query.
pub const WORKER_COLUMNS: &str =
  "worker_id, display_name, active, created_at, deactivated_at";

/// Raw values read directly from a `workers` row.
pub struct RawWorker {
  pub worker_id:      String,
  pub display_name:   String,
  pub active:         bool,
  pub created_at:     String,
  pub deactivated_at: Option<String>,
}

impl RawWorker {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      worker_id:      row.get(0)?,
      display_name:   row.get(1)?,
      active:         row.get(2)?,
      created_at:     row.get(3)?,
      deactivated_at: row.get(4)?,
    })
  }

  pub fn into_worker(self) -> Result<WorkerIdentity> {
    Ok(WorkerIdentity {
      worker_id:      decode_uuid(&self.worker_id)?,
      display_name:   self.display_name,
      active:         self.active,
      created_at:     decode_dt(&self.created_at)?,
      deactivated_at: self.deactivated_at.as_deref().map(decode_dt).transpose()?,
    })
  }
}

/// Columns selected for encoding metadata queries.
pub const ENCODING_COLUMNS: &str = "encoding_id, worker_id, dimension, captured_at,
  encryption, variant, quality, active, deactivated_at";

/// Raw values read from an `encodings` row, without the vector.
pub struct RawEncodingRecord {
  pub encoding_id:    String,
  pub worker_id:      String,
  pub dimension:      i64,
  pub captured_at:    String,
  pub encryption:     String,
  pub variant:        String,
  pub quality:        Option<f64>,
  pub active:         bool,
  pub deactivated_at: Option<String>,
}

impl RawEncodingRecord {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      encoding_id:    row.get(0)?,
      worker_id:      row.get(1)?,
      dimension:      row.get(2)?,
      captured_at:    row.get(3)?,
      encryption:     row.get(4)?,
      variant:        row.get(5)?,
      quality:        row.get(6)?,
      active:         row.get(7)?,
      deactivated_at: row.get(8)?,
    })
  }

  pub fn into_record(self) -> Result<EncodingRecord> {
    Ok(EncodingRecord {
      encoding_id:    decode_uuid(&self.encoding_id)?,
      worker_id:      decode_uuid(&self.worker_id)?,
      dimension:      usize::try_from(self.dimension).unwrap_or_default(),
      captured_at:    decode_dt(&self.captured_at)?,
      encryption:     decode_encryption(&self.encryption)?,
      variant:        self.variant,
      quality:        self.quality.map(|q| q as f32),
      active:         self.active,
      deactivated_at: self.deactivated_at.as_deref().map(decode_dt).transpose()?,
    })
  }
}

/// A sealed vector row as read for matcher snapshots.
pub struct RawSealedVector {
  pub encoding_id: String,
  pub worker_id:   String,
  pub encryption:  String,
  pub nonce:       Option<Vec<u8>>,
  pub vector:      Vec<u8>,
}

/// Columns selected for event queries, joined with `event_voids` as `v`.
pub const EVENT_COLUMNS: &str = "e.event_id, e.worker_id, e.kind, e.occurred_at,
  e.confidence, e.origin, e.evidence_photo, e.recorded_at,
  v.reason AS void_reason, v.recorded_at AS voided_at";

/// Raw values read from an `events` row joined with `event_voids`.
pub struct RawEvent {
  // events columns
  pub event_id:       String,
  pub worker_id:      String,
  pub kind:           String,
  pub occurred_at:    String,
  pub confidence:     f64,
  pub origin:         String,
  pub evidence_photo: Option<String>,
  pub recorded_at:    String,
  // event_voids join
  pub void_reason:    Option<String>,
  pub voided_at:      Option<String>,
}

impl RawEvent {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      event_id:       row.get(0)?,
      worker_id:      row.get(1)?,
      kind:           row.get(2)?,
      occurred_at:    row.get(3)?,
      confidence:     row.get(4)?,
      origin:         row.get(5)?,
      evidence_photo: row.get(6)?,
      recorded_at:    row.get(7)?,
      void_reason:    row.get(8)?,
      voided_at:      row.get(9)?,
    })
  }

  pub fn into_resolved(self) -> Result<ResolvedEvent> {
    let event = AttendanceEvent {
      event_id:       decode_uuid(&self.event_id)?,
      worker_id:      decode_uuid(&self.worker_id)?,
      kind:           EventKind::parse(&self.kind)?,
      occurred_at:    decode_dt(&self.occurred_at)?,
      confidence:     self.confidence as f32,
      origin:         EventOrigin::parse(&self.origin)?,
      evidence_photo: self.evidence_photo,
      recorded_at:    decode_dt(&self.recorded_at)?,
    };

    let status = match self.voided_at {
      Some(at) => EventStatus::Voided {
        reason: self.void_reason,
        at:     decode_dt(&at)?,
      },
      None => EventStatus::Valid,
    };

    Ok(ResolvedEvent { event, status })
  }
}
