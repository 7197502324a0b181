//! Work sessions: check-ins paired with the check-out that follows them.
//!
//! A read model for reporting; computed from events on every request and
//! never stored.

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
  event::{EventKind, EventOrigin, ResolvedEvent},
  worker::WorkerId,
};

// ─── Shift schedule ──────────────────────────────────────────────────────────

/// A daily shift in the site's local time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShiftSchedule {
  pub start:  NaiveTime,
  /// Falls on the next day when not after `start`.
  pub end:    NaiveTime,
  /// Allowed lateness on arrival and earliness on departure.
  pub grace:  Duration,
  pub offset: FixedOffset,
}

/// How a session compares with the scheduled shift.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
  #[default]
  Present,
  /// Checked in after the shift start plus grace. Takes precedence over an
  /// early leave.
  Late,
  /// Checked out before the shift end minus grace.
  EarlyLeave,
}

impl ShiftSchedule {
  /// Classify a session against the shift of the local day it started on.
  pub fn classify(
    &self,
    check_in: DateTime<Utc>,
    check_out: Option<DateTime<Utc>>,
  ) -> SessionStatus {
    let day = check_in.with_timezone(&self.offset).date_naive();
    let start = self.instant(day, self.start);
    if check_in > start + self.grace {
      return SessionStatus::Late;
    }

    let end_day = if self.end > self.start { day } else { day.succ_opt().unwrap_or(day) };
    let end = self.instant(end_day, self.end);
    match check_out {
      Some(out) if out < end - self.grace => SessionStatus::EarlyLeave,
      _ => SessionStatus::Present,
    }
  }

  fn instant(&self, day: NaiveDate, time: NaiveTime) -> DateTime<Utc> {
    (day.and_time(time) - Duration::seconds(i64::from(self.offset.local_minus_utc()))).and_utc()
  }
}

// ─── Sessions ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkSession {
  pub worker_id:         WorkerId,
  pub check_in:          DateTime<Utc>,
  /// `None` while the session is still open.
  pub check_out:         Option<DateTime<Utc>>,
  /// Seconds between check-in and check-out.
  pub duration_secs:     Option<i64>,
  /// Seconds beyond the standard working day.
  pub overtime_secs:     Option<i64>,
  /// The check-out was synthesised by the session timeout.
  pub closed_by_timeout: bool,
  /// `present` when no shift is configured.
  pub status:            SessionStatus,
}

/// Pair the valid events of one worker into sessions.
///
/// `events` must be ordered by `occurred_at`. Voided events and events of
/// other workers are ignored. A check-out with no preceding check-in is
/// skipped; a trailing check-in yields an open session. With a `shift`,
/// each session is also classified as late or early.
pub fn work_sessions(
  worker_id: WorkerId,
  events: &[ResolvedEvent],
  standard_day: Duration,
  shift: Option<&ShiftSchedule>,
) -> Vec<WorkSession> {
  let status = |check_in: DateTime<Utc>, check_out: Option<DateTime<Utc>>| {
    shift.map_or(SessionStatus::Present, |s| s.classify(check_in, check_out))
  };
  let mut sessions = Vec::new();
  let mut open: Option<DateTime<Utc>> = None;

  for rf in events {
    if !rf.status.is_valid() || rf.event.worker_id != worker_id {
      continue;
    }
    match rf.event.kind {
      EventKind::CheckIn => {
        // Unpaired check-ins are reported as open sessions.
        if let Some(check_in) = open.replace(rf.event.occurred_at) {
          sessions.push(open_session(worker_id, check_in, status(check_in, None)));
        }
      }
      EventKind::CheckOut => {
        let Some(check_in) = open.take() else {
          continue;
        };
        let duration = rf.event.occurred_at - check_in;
        let overtime = (duration - standard_day).max(Duration::zero());
        sessions.push(WorkSession {
          worker_id,
          check_in,
          check_out: Some(rf.event.occurred_at),
          duration_secs: Some(duration.num_seconds()),
          overtime_secs: Some(overtime.num_seconds()),
          closed_by_timeout: rf.event.origin == EventOrigin::SessionTimeout,
          status: status(check_in, Some(rf.event.occurred_at)),
        });
      }
    }
  }

  if let Some(check_in) = open {
    sessions.push(open_session(worker_id, check_in, status(check_in, None)));
  }
  sessions
}

fn open_session(
  worker_id: WorkerId,
  check_in: DateTime<Utc>,
  status: SessionStatus,
) -> WorkSession {
  WorkSession {
    worker_id,
    check_in,
    check_out: None,
    duration_secs: None,
    overtime_secs: None,
    closed_by_timeout: false,
    status,
  }
}
