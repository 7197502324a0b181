//! Event recorder: the only path by which attendance events reach the store.

use std::sync::Arc;

use facegate_core::{
  event::{Appended, AttendanceEvent, DedupKey},
  session::WorkerSessionState,
  store::AttendanceStore,
};
use tracing::{debug, info};

pub struct EventRecorder<S> {
  store:       Arc<S>,
  window_secs: u64,
}

impl<S: AttendanceStore> EventRecorder<S> {
  pub fn new(store: Arc<S>, window_secs: u64) -> Self { Self { store, window_secs } }

  /// Append `event` idempotently and fold the persisted result into
  /// `state`. On a store error `state` is left untouched.
  ///
  /// The caller must hold the lock of `event.worker_id`.
  pub async fn record(
    &self,
    state: &mut WorkerSessionState,
    event: AttendanceEvent,
  ) -> Result<Appended, S::Error> {
    let key = DedupKey::for_event(&event, self.window_secs);
    let appended = self.store.append_event(event, key).await?;
    let stored = appended.event();

    if appended.is_duplicate() {
      debug!(
        event_id = %stored.event_id,
        worker_id = %stored.worker_id,
        kind = stored.kind.as_str(),
        "duplicate event, existing record kept"
      );
    } else {
      info!(
        event_id = %stored.event_id,
        worker_id = %stored.worker_id,
        kind = stored.kind.as_str(),
        origin = stored.origin.as_str(),
        occurred_at = %stored.occurred_at,
        "attendance event recorded"
      );
    }

    state.apply(stored);
    Ok(appended)
  }
}
