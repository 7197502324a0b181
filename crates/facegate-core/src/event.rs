//! Attendance events, the append-only source of truth for reporting.
//!
//! Events are immutable. An erroneous event is withdrawn by recording an
//! [`EventVoid`] against it; its status is resolved at query time, the same
//! way for every reader.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result, worker::WorkerId};

/// Stable identifier of a recorded event.
pub type EventId = Uuid;

// ─── Kinds ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
  CheckIn,
  CheckOut,
}

impl EventKind {
  /// The discriminant stored in the `kind` column.
  pub fn as_str(self) -> &'static str {
    match self {
      Self::CheckIn => "check_in",
      Self::CheckOut => "check_out",
    }
  }

  pub fn parse(s: &str) -> Result<Self> {
    match s {
      "check_in" => Ok(Self::CheckIn),
      "check_out" => Ok(Self::CheckOut),
      other => Err(Error::UnknownDiscriminant {
        what:  "event kind",
        value: other.to_owned(),
      }),
    }
  }
}

/// Why an event exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventOrigin {
  /// Produced from an accepted face match.
  Recognized,
  /// Synthetic check-out closing a session that exceeded the maximum
  /// session duration.
  SessionTimeout,
}

impl EventOrigin {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Recognized => "recognized",
      Self::SessionTimeout => "session_timeout",
    }
  }

  pub fn parse(s: &str) -> Result<Self> {
    match s {
      "recognized" => Ok(Self::Recognized),
      "session_timeout" => Ok(Self::SessionTimeout),
      other => Err(Error::UnknownDiscriminant {
        what:  "event origin",
        value: other.to_owned(),
      }),
    }
  }
}

// ─── Event ───────────────────────────────────────────────────────────────────

/// An immutable check-in or check-out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttendanceEvent {
  pub event_id:       EventId,
  pub worker_id:      WorkerId,
  pub kind:           EventKind,
  /// When the worker was seen (frame capture time), not when it was written.
  pub occurred_at:    DateTime<Utc>,
  /// Match confidence in `[0, 1]`; `0` for synthetic events.
  pub confidence:     f32,
  pub origin:         EventOrigin,
  /// Opaque reference to an evidence photo, when that extension is enabled.
  pub evidence_photo: Option<String>,
  pub recorded_at:    DateTime<Utc>,
}

/// Key under which the store deduplicates concurrent submissions of the same
/// event: same worker, same kind, same time bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DedupKey {
  pub worker_id: WorkerId,
  pub kind:      EventKind,
  pub bucket:    i64,
}

impl DedupKey {
  /// Bucket `occurred_at` into windows of `window_secs` (at least one
  /// second).
  pub fn for_event(event: &AttendanceEvent, window_secs: u64) -> Self {
    let width = window_secs.max(1) as i64;
    Self {
      worker_id: event.worker_id,
      kind:      event.kind,
      bucket:    event.occurred_at.timestamp().div_euclid(width),
    }
  }
}

/// Result of an idempotent append.
#[derive(Debug, Clone, PartialEq)]
pub enum Appended {
  /// The event was written.
  Inserted(AttendanceEvent),
  /// An event with the same [`DedupKey`] already existed; it is returned
  /// instead and nothing was written.
  Duplicate(AttendanceEvent),
}

impl Appended {
  pub fn event(&self) -> &AttendanceEvent {
    match self {
      Self::Inserted(e) | Self::Duplicate(e) => e,
    }
  }

  pub fn into_event(self) -> AttendanceEvent {
    match self {
      Self::Inserted(e) | Self::Duplicate(e) => e,
    }
  }

  pub fn is_duplicate(&self) -> bool { matches!(self, Self::Duplicate(_)) }
}

// ─── Compensation ────────────────────────────────────────────────────────────

/// Withdraws an erroneous event. An event can be voided at most once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventVoid {
  pub void_id:     Uuid,
  pub event_id:    EventId,
  pub reason:      Option<String>,
  pub recorded_at: DateTime<Utc>,
}

/// The status of an event, computed at query time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum EventStatus {
  Valid,
  Voided {
    reason: Option<String>,
    at:     DateTime<Utc>,
  },
}

impl EventStatus {
  pub fn is_valid(&self) -> bool { matches!(self, Self::Valid) }
}

/// An event bundled with its current status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedEvent {
  pub event:  AttendanceEvent,
  pub status: EventStatus,
}

// ─── Query ───────────────────────────────────────────────────────────────────

/// Parameters for [`crate::store::AttendanceStore::events_between`].
#[derive(Debug, Clone, Default)]
pub struct EventQuery {
  /// Restrict to one worker; `None` returns every worker's events.
  pub worker_id:      Option<WorkerId>,
  /// Inclusive lower bound on `occurred_at`.
  pub from:           Option<DateTime<Utc>>,
  /// Exclusive upper bound on `occurred_at`.
  pub to:             Option<DateTime<Utc>>,
  /// Also return voided events.
  pub include_voided: bool,
}
