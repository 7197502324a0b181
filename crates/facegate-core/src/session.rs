//! Per-worker attendance state machine.
//!
//! The state of a worker is derived from their latest valid event; it is
//! never stored on its own. [`WorkerSessionState::decide`] maps a new
//! accepted match to the events that must be appended, and
//! [`WorkerSessionState::apply`] folds a persisted event back into the state.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::event::{AttendanceEvent, EventKind};

/// Timing rules for turning matches into events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionPolicy {
  /// A repeat match this soon after a check-in is a re-scan, not a
  /// check-out.
  pub debounce_window:      Duration,
  /// An open session older than this is closed automatically.
  pub max_session_duration: Duration,
}

impl Default for SessionPolicy {
  fn default() -> Self {
    Self {
      debounce_window:      Duration::seconds(30),
      max_session_duration: Duration::hours(16),
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Presence {
  #[default]
  Out,
  In,
}

/// Derived state of one worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct WorkerSessionState {
  pub presence:      Presence,
  pub last_event_at: Option<DateTime<Utc>>,
}

/// Why a match produced no event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuppressReason {
  /// Seen again within the debounce window after checking in.
  Debounced,
  /// The frame predates the worker's latest event.
  OutOfOrder,
}

/// What to append for an accepted match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
  CheckIn,
  CheckOut,
  /// Close the stale session with a synthetic check-out at `close_at`, then
  /// check in.
  CloseStaleThenCheckIn { close_at: DateTime<Utc> },
  Suppress(SuppressReason),
}

impl WorkerSessionState {
  /// State after the given latest valid event; `None` means no history.
  pub fn from_latest(event: Option<&AttendanceEvent>) -> Self {
    let mut state = Self::default();
    if let Some(event) = event {
      state.apply(event);
    }
    state
  }

  pub fn is_in(&self) -> bool { self.presence == Presence::In }

  /// Decide the transition for an accepted match at `at`.
  pub fn decide(&self, at: DateTime<Utc>, policy: &SessionPolicy) -> Transition {
    let Some(last) = self.last_event_at else {
      return Transition::CheckIn;
    };
    if at < last {
      return Transition::Suppress(SuppressReason::OutOfOrder);
    }
    match self.presence {
      Presence::Out => Transition::CheckIn,
      Presence::In => {
        let elapsed = at - last;
        if elapsed < policy.debounce_window {
          Transition::Suppress(SuppressReason::Debounced)
        } else if elapsed > policy.max_session_duration {
          Transition::CloseStaleThenCheckIn {
            close_at: last + policy.max_session_duration,
          }
        } else {
          Transition::CheckOut
        }
      }
    }
  }

  /// Fold a persisted event into the state.
  pub fn apply(&mut self, event: &AttendanceEvent) {
    self.presence = match event.kind {
      EventKind::CheckIn => Presence::In,
      EventKind::CheckOut => Presence::Out,
    };
    self.last_event_at = Some(event.occurred_at);
  }
}
