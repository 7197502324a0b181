//! Persistence health gate.
//!
//! Tripped by any failed event write. While tripped, probes are refused with
//! [`EngineError::Unavailable`]; every new request pings the store and the
//! gate closes again once a ping succeeds.

use std::sync::atomic::{AtomicBool, Ordering};

use facegate_core::store::AttendanceStore;
use tracing::{info, warn};

use crate::EngineError;

#[derive(Debug)]
pub struct PersistenceGate {
  healthy: AtomicBool,
}

impl Default for PersistenceGate {
  fn default() -> Self { Self { healthy: AtomicBool::new(true) } }
}

impl PersistenceGate {
  pub fn is_healthy(&self) -> bool { self.healthy.load(Ordering::Acquire) }

  pub fn trip(&self, reason: &str) {
    if self.healthy.swap(false, Ordering::AcqRel) {
      warn!(reason, "persistence unavailable, refusing probes");
    }
  }

  /// Fail fast without touching the store.
  pub fn check(&self) -> Result<(), EngineError> {
    if self.is_healthy() {
      Ok(())
    } else {
      Err(EngineError::Unavailable("event store is recovering".into()))
    }
  }

  /// Like [`check`](Self::check), but attempts recovery first.
  pub async fn ensure<S: AttendanceStore>(&self, store: &S) -> Result<(), EngineError> {
    if self.is_healthy() {
      return Ok(());
    }
    match store.ping().await {
      Ok(()) => {
        if !self.healthy.swap(true, Ordering::AcqRel) {
          info!("persistence recovered, accepting probes");
        }
        Ok(())
      }
      Err(e) => Err(EngineError::Unavailable(e.to_string())),
    }
  }
}
