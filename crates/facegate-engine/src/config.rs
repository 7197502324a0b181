//! Engine configuration.
//!
//! Every field has a default and can be overridden from the server's
//! configuration file or environment without a code change.

use std::time::Duration;

use chrono::{FixedOffset, NaiveTime};
use facegate_core::{
  matcher::{DistanceMetric, MatchThresholds},
  session::SessionPolicy,
  summary::ShiftSchedule,
};
use serde::Deserialize;

use crate::EngineError;

/// Longest accepted debounce window or session timeout.
const MAX_WINDOW_SECS: u64 = 366 * 24 * 60 * 60;

/// Tunables for matching, session tracking and probe scheduling.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
  /// Length of the vectors produced by the external encoder.
  pub dimension:             usize,
  pub metric:                DistanceMetric,
  pub accept_threshold:      f32,
  pub reject_threshold:      f32,
  pub ambiguity_margin:      f32,
  /// Re-scans this soon after a check-in are ignored.
  pub debounce_window_secs:  u64,
  /// Open sessions older than this are closed automatically.
  pub max_session_secs:      u64,
  /// Probes matched at the same time.
  pub max_concurrent_probes: usize,
  /// Probes allowed to wait for a slot before new ones are refused.
  pub queue_depth:           usize,
  /// Budget for one probe, from submission to commit.
  pub probe_timeout_ms:      u64,
  /// Store caller-supplied evidence photo references on events.
  pub evidence_photos:       bool,
  /// Working hours per day before time counts as overtime.
  pub standard_work_hours:   u32,
  /// Scheduled shift used to flag late arrivals and early departures.
  pub shift:                 Option<ShiftConfig>,
}

/// Scheduled working hours, in the site's local time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct ShiftConfig {
  /// e.g. `"09:00:00"`.
  pub start:              NaiveTime,
  /// Earlier than `start` for overnight shifts.
  pub end:                NaiveTime,
  #[serde(default = "default_grace_minutes")]
  pub grace_minutes:      u32,
  #[serde(default)]
  pub utc_offset_minutes: i32,
}

fn default_grace_minutes() -> u32 { 15 }

impl Default for EngineConfig {
  fn default() -> Self {
    let thresholds = MatchThresholds::default();
    Self {
      dimension:             128,
      metric:                thresholds.metric,
      accept_threshold:      thresholds.accept_threshold,
      reject_threshold:      thresholds.reject_threshold,
      ambiguity_margin:      thresholds.ambiguity_margin,
      debounce_window_secs:  30,
      max_session_secs:      16 * 60 * 60,
      max_concurrent_probes: 5,
      queue_depth:           10,
      probe_timeout_ms:      3_000,
      evidence_photos:       false,
      standard_work_hours:   8,
      shift:                 None,
    }
  }
}

impl EngineConfig {
  pub fn validate(&self) -> Result<(), EngineError> {
    self.thresholds().validate().map_err(EngineError::Validation)?;
    if self.dimension == 0 {
      return Err(EngineError::Config("dimension must be positive".into()));
    }
    if self.max_concurrent_probes == 0 {
      return Err(EngineError::Config("max_concurrent_probes must be positive".into()));
    }
    if self.max_session_secs <= self.debounce_window_secs {
      return Err(EngineError::Config(format!(
        "max_session_secs ({}) must exceed debounce_window_secs ({})",
        self.max_session_secs, self.debounce_window_secs
      )));
    }
    self.session_policy()?;
    self.shift_schedule()?;
    Ok(())
  }

  pub fn thresholds(&self) -> MatchThresholds {
    MatchThresholds {
      metric:           self.metric,
      accept_threshold: self.accept_threshold,
      reject_threshold: self.reject_threshold,
      ambiguity_margin: self.ambiguity_margin,
    }
  }

  pub fn session_policy(&self) -> Result<SessionPolicy, EngineError> {
    Ok(SessionPolicy {
      debounce_window:      window("debounce_window_secs", self.debounce_window_secs)?,
      max_session_duration: window("max_session_secs", self.max_session_secs)?,
    })
  }

  /// The configured shift, if any, resolved against its UTC offset.
  pub fn shift_schedule(&self) -> Result<Option<ShiftSchedule>, EngineError> {
    let Some(shift) = self.shift else {
      return Ok(None);
    };
    if shift.start == shift.end {
      return Err(EngineError::Config("shift start and end must differ".into()));
    }
    if shift.grace_minutes >= 12 * 60 {
      return Err(EngineError::Config(format!(
        "shift grace_minutes ({}) must be under 720",
        shift.grace_minutes
      )));
    }
    let offset = shift
      .utc_offset_minutes
      .checked_mul(60)
      .and_then(FixedOffset::east_opt)
      .ok_or_else(|| {
        EngineError::Config(format!(
          "shift utc_offset_minutes ({}) is out of range",
          shift.utc_offset_minutes
        ))
      })?;
    Ok(Some(ShiftSchedule {
      start: shift.start,
      end: shift.end,
      grace: chrono::Duration::minutes(i64::from(shift.grace_minutes)),
      offset,
    }))
  }

  pub fn probe_timeout(&self) -> Duration { Duration::from_millis(self.probe_timeout_ms) }

  /// Total probes admitted at once: running plus queued.
  pub fn admission_capacity(&self) -> usize { self.max_concurrent_probes + self.queue_depth }

  pub fn standard_day(&self) -> chrono::Duration {
    chrono::Duration::hours(i64::from(self.standard_work_hours))
  }
}

fn window(name: &str, secs: u64) -> Result<chrono::Duration, EngineError> {
  if secs > MAX_WINDOW_SECS {
    return Err(EngineError::Config(format!(
      "{name} ({secs}) must be at most {MAX_WINDOW_SECS}"
    )));
  }
  i64::try_from(secs)
    .ok()
    .and_then(chrono::TimeDelta::try_seconds)
    .ok_or_else(|| EngineError::Config(format!("{name} ({secs}) is out of range")))
}
