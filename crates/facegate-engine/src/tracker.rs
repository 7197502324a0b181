//! Per-worker session state, held in memory and guarded per worker.
//!
//! Every decision for a worker and the write that follows it happen under
//! that worker's lock, so two probes of the same person are serialised while
//! probes of different people proceed in parallel.

use std::{
  collections::HashMap,
  sync::{Arc, Mutex, PoisonError},
};

use facegate_core::{
  event::AttendanceEvent,
  session::WorkerSessionState,
  worker::WorkerId,
};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

type Slot = Arc<AsyncMutex<WorkerSessionState>>;

#[derive(Debug, Default)]
pub struct SessionTracker {
  slots: Mutex<HashMap<WorkerId, Slot>>,
}

impl SessionTracker {
  /// Build the tracker from the latest valid event of each worker.
  pub fn rebuild(latest: &[AttendanceEvent]) -> Self {
    let slots = latest
      .iter()
      .map(|e| {
        let state = WorkerSessionState::from_latest(Some(e));
        (e.worker_id, Arc::new(AsyncMutex::new(state)))
      })
      .collect();
    Self { slots: Mutex::new(slots) }
  }

  fn slot(&self, worker_id: WorkerId) -> Slot {
    let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
    slots.entry(worker_id).or_default().clone()
  }

  /// Wait for exclusive access to a worker's state.
  pub async fn lock(&self, worker_id: WorkerId) -> OwnedMutexGuard<WorkerSessionState> {
    self.slot(worker_id).lock_owned().await
  }

  /// Current state without taking the lock for long; for status reads.
  pub async fn state(&self, worker_id: WorkerId) -> WorkerSessionState {
    *self.lock(worker_id).await
  }

  pub fn tracked(&self) -> usize {
    self.slots.lock().unwrap_or_else(PoisonError::into_inner).len()
  }
}
