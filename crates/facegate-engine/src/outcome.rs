//! What happened to a probe.

use facegate_core::{
  event::AttendanceEvent,
  matcher::{MatchDecision, MatchResult},
  session::SuppressReason,
};
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeStatus {
  /// An event was written, or an identical one already existed.
  Recorded,
  /// Accepted, but the session state machine emitted nothing.
  Suppressed,
  Rejected,
  Ambiguous,
  /// The probe missed its deadline before commit. Nothing was written.
  TimedOut,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProbeOutcome {
  pub probe_id:       Uuid,
  pub status:         ProbeStatus,
  /// Absent when the probe timed out before matching finished.
  pub match_result:   Option<MatchResult>,
  pub event:          Option<AttendanceEvent>,
  /// Synthetic check-out that closed a stale session before `event`.
  pub closed_session: Option<AttendanceEvent>,
  pub suppressed:     Option<SuppressReason>,
  /// `event` was already in the store; this probe wrote nothing.
  pub deduplicated:   bool,
  pub latency_ms:     u64,
}

impl ProbeOutcome {
  pub(crate) fn new(probe_id: Uuid, status: ProbeStatus) -> Self {
    Self {
      probe_id,
      status,
      match_result: None,
      event: None,
      closed_session: None,
      suppressed: None,
      deduplicated: false,
      latency_ms: 0,
    }
  }

  pub(crate) fn unmatched(probe_id: Uuid, result: MatchResult) -> Self {
    let status = match result.decision {
      MatchDecision::Ambiguous => ProbeStatus::Ambiguous,
      _ => ProbeStatus::Rejected,
    };
    Self { match_result: Some(result), ..Self::new(probe_id, status) }
  }

  pub fn is_recorded(&self) -> bool { self.status == ProbeStatus::Recorded }
}
