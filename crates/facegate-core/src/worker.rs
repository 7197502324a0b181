//! Worker identity, the envelope that owns encodings and attendance events.
//!
//! Workers are never hard-deleted. Deactivation hides a worker from matching
//! but keeps the row so historical events still join against it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable identifier of an enrolled worker.
pub type WorkerId = Uuid;

/// An enrolled worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerIdentity {
  pub worker_id:      WorkerId,
  pub display_name:   String,
  pub active:         bool,
  pub created_at:     DateTime<Utc>,
  pub deactivated_at: Option<DateTime<Utc>>,
}

/// Input to [`crate::store::AttendanceStore::add_worker`].
#[derive(Debug, Clone, Deserialize)]
pub struct NewWorker {
  pub display_name: String,
}

impl NewWorker {
  pub fn new(display_name: impl Into<String>) -> Self {
    Self { display_name: display_name.into() }
  }
}

/// Enrollment totals, as reported on the admin dashboard.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrollmentStats {
  pub total_workers:          u64,
  pub active_workers:         u64,
  /// Active workers with at least one active encoding.
  pub workers_with_encodings: u64,
  /// Encodings that have not been deactivated individually.
  pub total_encodings:        u64,
}

impl EnrollmentStats {
  /// Share of active workers that can currently be recognised, in percent.
  pub fn registration_rate(&self) -> f64 {
    if self.active_workers == 0 {
      return 0.0;
    }
    self.workers_with_encodings as f64 / self.active_workers as f64 * 100.0
  }
}
