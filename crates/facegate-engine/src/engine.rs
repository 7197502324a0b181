//! The recognition orchestrator.
//!
//! A probe flows through admission, a matcher slot, the matcher, the
//! worker's session lock, the state machine and finally the event recorder.
//! The probe's deadline covers everything up to the worker lock. Once the
//! lock is held and the deadline has not passed, the commit runs to
//! completion even if the caller stops waiting, so a timed-out probe never
//! leaves a write behind.

use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use facegate_core::{
  encoding::{EncodingRecord, FeatureVector, NewEncoding, ProbeEncoding},
  event::{
    Appended, AttendanceEvent, EventId, EventKind, EventOrigin, EventQuery,
    EventVoid, ResolvedEvent,
  },
  matcher::{EncodingSnapshot, MatchDecision, MatchThresholds, match_probe},
  session::{SessionPolicy, Transition, WorkerSessionState},
  store::AttendanceStore,
  summary::{ShiftSchedule, WorkSession, work_sessions},
  worker::{EnrollmentStats, NewWorker, WorkerId, WorkerIdentity},
};
use serde::Serialize;
use tokio::{
  sync::{Mutex as AsyncMutex, OwnedSemaphorePermit, Semaphore},
  task::JoinHandle,
  time::{Instant, timeout_at},
};
use tracing::{Instrument, debug, error, info, info_span, warn};
use uuid::Uuid;

use crate::{
  EngineConfig, EngineError, PersistenceGate, ProbeOutcome, ProbeStatus,
  EventRecorder, SessionTracker,
};

// ─── Public types ────────────────────────────────────────────────────────────

/// One camera frame, already reduced to feature vectors by the encoder.
#[derive(Debug, Clone)]
pub struct Frame {
  /// One vector per detected face.
  pub encodings:      Vec<FeatureVector>,
  pub captured_at:    DateTime<Utc>,
  pub evidence_photo: Option<String>,
}

/// A submitted probe. Dropping the handle does not cancel the probe.
#[derive(Debug)]
pub struct ProbeHandle {
  probe_id: Uuid,
  task:     JoinHandle<Result<ProbeOutcome, EngineError>>,
}

impl ProbeHandle {
  pub fn probe_id(&self) -> Uuid { self.probe_id }

  pub async fn outcome(self) -> Result<ProbeOutcome, EngineError> {
    self
      .task
      .await
      .map_err(|e| EngineError::Internal(format!("probe task failed: {e}")))?
  }
}

/// A worker together with the state the engine tracks for them.
#[derive(Debug, Clone, Serialize)]
pub struct WorkerStatus {
  #[serde(flatten)]
  pub identity:  WorkerIdentity,
  pub session:   WorkerSessionState,
  pub encodings: Vec<EncodingRecord>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EngineStats {
  pub enrollment:        EnrollmentStats,
  /// Percentage of active workers with at least one encoding.
  pub registration_rate: f64,
  pub snapshot_workers:  usize,
  pub snapshot_vectors:  usize,
  /// Stored vectors left out of the snapshot for having the wrong length.
  pub skipped_vectors:   usize,
  pub probes_in_flight:  usize,
  pub accepting_probes:  bool,
}

// ─── Engine ──────────────────────────────────────────────────────────────────

/// Cheap to clone; clones share all state.
pub struct Engine<S> {
  inner: Arc<Inner<S>>,
}

impl<S> Clone for Engine<S> {
  fn clone(&self) -> Self { Self { inner: self.inner.clone() } }
}

struct Inner<S> {
  store:      Arc<S>,
  config:     EngineConfig,
  thresholds: MatchThresholds,
  policy:     SessionPolicy,
  shift:      Option<ShiftSchedule>,
  snapshot:   RwLock<Arc<EncodingSnapshot>>,
  refresh:    AsyncMutex<()>,
  tracker:    SessionTracker,
  recorder:   EventRecorder<S>,
  admission:  Arc<Semaphore>,
  execution:  Arc<Semaphore>,
  gate:       PersistenceGate,
}

impl<S: AttendanceStore + 'static> Engine<S> {
  /// Validate `config`, load the encoding snapshot and rebuild session state
  /// from the store.
  pub async fn start(store: Arc<S>, config: EngineConfig) -> Result<Self, EngineError> {
    config.validate()?;

    let latest = store.latest_events().await.map_err(EngineError::store)?;
    let open = latest.iter().filter(|e| e.kind == EventKind::CheckIn).count();
    let tracker = SessionTracker::rebuild(&latest);
    let snapshot = load_snapshot(&*store, config.dimension).await?;

    info!(
      workers = snapshot.worker_count(),
      vectors = snapshot.encoding_count(),
      open_sessions = open,
      "engine started"
    );

    let inner = Inner {
      thresholds: config.thresholds(),
      policy: config.session_policy()?,
      shift: config.shift_schedule()?,
      snapshot: RwLock::new(Arc::new(snapshot)),
      refresh: AsyncMutex::new(()),
      tracker,
      recorder: EventRecorder::new(store.clone(), config.debounce_window_secs),
      admission: Arc::new(Semaphore::new(config.admission_capacity())),
      execution: Arc::new(Semaphore::new(config.max_concurrent_probes)),
      gate: PersistenceGate::default(),
      store,
      config,
    };
    Ok(Self { inner: Arc::new(inner) })
  }

  pub fn config(&self) -> &EngineConfig { &self.inner.config }

  // ── Recognition ─────────────────────────────────────────────────────────

  /// Admit a probe and start processing it in the background.
  ///
  /// Fails immediately with [`EngineError::Busy`] when the admission queue
  /// is full, and with [`EngineError::Unavailable`] while the store is
  /// recovering.
  pub fn submit(
    &self,
    probe: ProbeEncoding,
    evidence_photo: Option<String>,
  ) -> Result<ProbeHandle, EngineError> {
    self.inner.gate.check()?;
    probe
      .vector
      .validate(self.inner.config.dimension)
      .map_err(EngineError::Validation)?;
    let permit = self.admit()?;
    Ok(self.spawn(permit, probe, evidence_photo))
  }

  /// Submit one probe and wait for its outcome.
  pub async fn recognize(
    &self,
    probe: ProbeEncoding,
    evidence_photo: Option<String>,
  ) -> Result<ProbeOutcome, EngineError> {
    self.inner.gate.ensure(&*self.inner.store).await?;
    self.submit(probe, evidence_photo)?.outcome().await
  }

  /// Process every face of a frame concurrently.
  ///
  /// The frame is admitted as a whole or refused as a whole. An empty frame
  /// yields no outcomes and touches nothing.
  pub async fn recognize_frame(&self, frame: Frame) -> Result<Vec<ProbeOutcome>, EngineError> {
    if frame.encodings.is_empty() {
      return Ok(Vec::new());
    }
    self.inner.gate.ensure(&*self.inner.store).await?;
    for vector in &frame.encodings {
      vector
        .validate(self.inner.config.dimension)
        .map_err(EngineError::Validation)?;
    }

    let permits = frame
      .encodings
      .iter()
      .map(|_| self.admit())
      .collect::<Result<Vec<_>, _>>()?;

    let handles: Vec<_> = frame
      .encodings
      .into_iter()
      .zip(permits)
      .map(|(vector, permit)| {
        let probe = ProbeEncoding::new(vector, frame.captured_at);
        self.spawn(permit, probe, frame.evidence_photo.clone())
      })
      .collect();

    let mut outcomes = Vec::with_capacity(handles.len());
    for handle in handles {
      outcomes.push(handle.outcome().await?);
    }
    Ok(outcomes)
  }

  fn admit(&self) -> Result<OwnedSemaphorePermit, EngineError> {
    self.inner.admission.clone().try_acquire_owned().map_err(|_| {
      warn!("admission queue full, refusing probe");
      EngineError::Busy
    })
  }

  fn spawn(
    &self,
    admitted: OwnedSemaphorePermit,
    probe: ProbeEncoding,
    evidence_photo: Option<String>,
  ) -> ProbeHandle {
    let probe_id = Uuid::new_v4();
    let inner = self.inner.clone();
    let submitted = Instant::now();
    let deadline = submitted + inner.config.probe_timeout();

    let task = tokio::spawn(
      async move {
        let _admitted = admitted;
        let mut outcome = inner.run(probe_id, probe, evidence_photo, deadline).await?;
        outcome.latency_ms = u64::try_from(submitted.elapsed().as_millis()).unwrap_or(u64::MAX);
        let committed = matches!(outcome.status, ProbeStatus::Recorded | ProbeStatus::Suppressed);
        if committed && outcome.latency_ms > inner.config.probe_timeout_ms {
          warn!(
            status = ?outcome.status,
            latency_ms = outcome.latency_ms,
            budget_ms = inner.config.probe_timeout_ms,
            "probe committed past its deadline"
          );
        }
        debug!(status = ?outcome.status, latency_ms = outcome.latency_ms, "probe finished");
        Ok(outcome)
      }
      .instrument(info_span!("probe", %probe_id)),
    );

    ProbeHandle { probe_id, task }
  }

  // ── Administration ──────────────────────────────────────────────────────

  pub async fn add_worker(&self, input: NewWorker) -> Result<WorkerIdentity, EngineError> {
    let name = input.display_name.trim();
    if name.is_empty() {
      return Err(EngineError::InvalidInput("display_name must not be empty".into()));
    }
    let worker = self
      .inner
      .store
      .add_worker(NewWorker::new(name))
      .await
      .map_err(EngineError::store)?;
    info!(worker_id = %worker.worker_id, "worker added");
    Ok(worker)
  }

  pub async fn get_worker(&self, worker_id: WorkerId) -> Result<WorkerIdentity, EngineError> {
    self
      .inner
      .store
      .get_worker(worker_id)
      .await
      .map_err(EngineError::store)?
      .ok_or_else(|| EngineError::NotFound(format!("worker {worker_id}")))
  }

  pub async fn list_workers(&self, include_inactive: bool) -> Result<Vec<WorkerIdentity>, EngineError> {
    self
      .inner
      .store
      .list_workers(include_inactive)
      .await
      .map_err(EngineError::store)
  }

  pub async fn worker_status(&self, worker_id: WorkerId) -> Result<WorkerStatus, EngineError> {
    let identity = self.get_worker(worker_id).await?;
    let encodings = self
      .inner
      .store
      .list_encodings(worker_id)
      .await
      .map_err(EngineError::store)?;
    let session = self.inner.tracker.state(worker_id).await;
    Ok(WorkerStatus { identity, session, encodings })
  }

  /// Store an encoding for an active worker and refresh the snapshot.
  pub async fn enroll(
    &self,
    worker_id: WorkerId,
    input: NewEncoding,
  ) -> Result<EncodingRecord, EngineError> {
    input
      .vector
      .validate(self.inner.config.dimension)
      .map_err(EngineError::Validation)?;
    if let Some(q) = input.quality.filter(|q| !(0.0..=1.0).contains(q)) {
      return Err(EngineError::InvalidInput(format!("quality {q} is outside [0, 1]")));
    }

    let worker = self.get_worker(worker_id).await?;
    if !worker.active {
      return Err(EngineError::Conflict(format!("worker {worker_id} is inactive")));
    }

    let record = self
      .inner
      .store
      .enroll(worker_id, input)
      .await
      .map_err(EngineError::store)?;
    info!(
      %worker_id,
      encoding_id = %record.encoding_id,
      variant = %record.variant,
      encrypted = record.encryption.is_encrypted(),
      "encoding enrolled"
    );

    self.refresh_snapshot().await?;
    Ok(record)
  }

  /// Take one encoding of a worker out of matching, e.g. a vector enrolled
  /// for the wrong person. The record is kept.
  pub async fn deactivate_encoding(
    &self,
    worker_id: WorkerId,
    encoding_id: Uuid,
  ) -> Result<EncodingRecord, EngineError> {
    self.get_worker(worker_id).await?;
    let owned = self
      .inner
      .store
      .list_encodings(worker_id)
      .await
      .map_err(EngineError::store)?
      .iter()
      .any(|r| r.encoding_id == encoding_id);
    if !owned {
      return Err(EngineError::NotFound(format!(
        "encoding {encoding_id} of worker {worker_id}"
      )));
    }

    let record = self
      .inner
      .store
      .deactivate_encoding(worker_id, encoding_id)
      .await
      .map_err(EngineError::store)?;
    info!(%worker_id, %encoding_id, "encoding deactivated");
    self.refresh_snapshot().await?;
    Ok(record)
  }

  /// Remove a worker from matching. Their events are kept.
  pub async fn deactivate(&self, worker_id: WorkerId) -> Result<WorkerIdentity, EngineError> {
    self.get_worker(worker_id).await?;
    let worker = self
      .inner
      .store
      .deactivate(worker_id)
      .await
      .map_err(EngineError::store)?;
    info!(%worker_id, "worker deactivated");
    self.refresh_snapshot().await?;
    Ok(worker)
  }

  /// Reload the matcher snapshot from the store. Probes already matching
  /// keep the snapshot they started with.
  pub async fn refresh_snapshot(&self) -> Result<(), EngineError> {
    let _serial = self.inner.refresh.lock().await;
    let snapshot = load_snapshot(&*self.inner.store, self.inner.config.dimension).await?;
    debug!(
      workers = snapshot.worker_count(),
      vectors = snapshot.encoding_count(),
      "snapshot refreshed"
    );
    *self.inner.snapshot.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(snapshot);
    Ok(())
  }

  // ── Events ──────────────────────────────────────────────────────────────

  /// Void the worker's latest valid event and recompute their session state
  /// from what remains valid.
  ///
  /// Only the latest valid event can be voided, so the valid history keeps
  /// alternating. Older events are corrected by voiding back to them one at
  /// a time.
  pub async fn void_event(
    &self,
    event_id: EventId,
    reason: Option<String>,
  ) -> Result<EventVoid, EngineError> {
    let resolved = self
      .inner
      .store
      .get_event(event_id)
      .await
      .map_err(EngineError::store)?
      .ok_or_else(|| EngineError::NotFound(format!("event {event_id}")))?;
    if !resolved.status.is_valid() {
      return Err(EngineError::Conflict(format!("event {event_id} is already voided")));
    }

    let worker_id = resolved.event.worker_id;
    let mut state = self.inner.tracker.lock(worker_id).await;

    let latest = self
      .inner
      .store
      .latest_event(worker_id)
      .await
      .map_err(EngineError::store)?;
    if latest.is_none_or(|e| e.event_id != event_id) {
      return Err(EngineError::Conflict(format!(
        "event {event_id} is not the latest valid event of worker {worker_id}"
      )));
    }

    let void = self
      .inner
      .store
      .void_event(event_id, reason)
      .await
      .map_err(EngineError::store)?;
    let latest = self
      .inner
      .store
      .latest_event(worker_id)
      .await
      .map_err(EngineError::store)?;
    *state = WorkerSessionState::from_latest(latest.as_ref());

    info!(%event_id, %worker_id, presence = ?state.presence, "event voided");
    Ok(void)
  }

  pub async fn get_event(&self, event_id: EventId) -> Result<ResolvedEvent, EngineError> {
    self
      .inner
      .store
      .get_event(event_id)
      .await
      .map_err(EngineError::store)?
      .ok_or_else(|| EngineError::NotFound(format!("event {event_id}")))
  }

  pub async fn events(&self, query: &EventQuery) -> Result<Vec<ResolvedEvent>, EngineError> {
    if query.from.zip(query.to).is_some_and(|(from, to)| to < from) {
      return Err(EngineError::InvalidInput("range end precedes its start".into()));
    }
    self
      .inner
      .store
      .events_between(query)
      .await
      .map_err(EngineError::store)
  }

  /// Check-in/check-out pairs of one worker whose check-in falls in the
  /// range.
  pub async fn work_sessions(
    &self,
    worker_id: WorkerId,
    from: Option<DateTime<Utc>>,
    to: Option<DateTime<Utc>>,
  ) -> Result<Vec<WorkSession>, EngineError> {
    self.get_worker(worker_id).await?;
    let query = EventQuery {
      worker_id: Some(worker_id),
      from,
      to: None,
      include_voided: false,
    };
    let events = self.events(&query).await?;
    let sessions = work_sessions(
      worker_id,
      &events,
      self.inner.config.standard_day(),
      self.inner.shift.as_ref(),
    );
    Ok(
      sessions
        .into_iter()
        .filter(|s| to.is_none_or(|to| s.check_in < to))
        .collect(),
    )
  }

  // ── Status ──────────────────────────────────────────────────────────────

  pub async fn stats(&self) -> Result<EngineStats, EngineError> {
    let enrollment = self
      .inner
      .store
      .encoding_stats()
      .await
      .map_err(EngineError::store)?;
    let snapshot = self.inner.current_snapshot();
    Ok(EngineStats {
      enrollment,
      registration_rate: enrollment.registration_rate(),
      snapshot_workers: snapshot.worker_count(),
      snapshot_vectors: snapshot.encoding_count(),
      skipped_vectors: snapshot.skipped(),
      probes_in_flight: self.inner.config.admission_capacity()
        - self.inner.admission.available_permits(),
      accepting_probes: self.inner.gate.is_healthy(),
    })
  }

  /// `true` when the store answers and probes are being accepted.
  pub async fn health(&self) -> bool {
    let store = &*self.inner.store;
    self.inner.gate.ensure(store).await.is_ok() && store.ping().await.is_ok()
  }

  #[cfg(test)]
  pub(crate) async fn lock_worker(
    &self,
    worker_id: WorkerId,
  ) -> tokio::sync::OwnedMutexGuard<WorkerSessionState> {
    self.inner.tracker.lock(worker_id).await
  }
}

// ─── Probe pipeline ──────────────────────────────────────────────────────────

impl<S: AttendanceStore> Inner<S> {
  fn current_snapshot(&self) -> Arc<EncodingSnapshot> {
    self.snapshot.read().unwrap_or_else(PoisonError::into_inner).clone()
  }

  async fn run(
    &self,
    probe_id: Uuid,
    probe: ProbeEncoding,
    evidence_photo: Option<String>,
    deadline: Instant,
  ) -> Result<ProbeOutcome, EngineError> {
    let timed_out = || ProbeOutcome::new(probe_id, ProbeStatus::TimedOut);

    let Ok(slot) = timeout_at(deadline, self.execution.clone().acquire_owned()).await else {
      warn!("probe timed out waiting for a matcher slot");
      return Ok(timed_out());
    };
    let _slot = slot.map_err(|_| EngineError::Internal("matcher pool closed".into()))?;

    let snapshot = self.current_snapshot();
    let result =
      match_probe(&probe.vector, &snapshot, &self.thresholds).map_err(EngineError::Validation)?;

    let worker_id = match (result.decision, result.candidate) {
      (MatchDecision::Accepted, Some(worker_id)) => worker_id,
      (MatchDecision::Ambiguous, _) => {
        warn!(
          nearest = ?result.nearest,
          distance = ?result.distance,
          runner_up = ?result.runner_up_distance,
          "ambiguous match, nothing recorded"
        );
        return Ok(ProbeOutcome::unmatched(probe_id, result));
      }
      _ => {
        debug!(distance = ?result.distance, "no match");
        return Ok(ProbeOutcome::unmatched(probe_id, result));
      }
    };

    let Ok(mut state) = timeout_at(deadline, self.tracker.lock(worker_id)).await else {
      warn!(%worker_id, "probe timed out waiting for the worker lock");
      return Ok(ProbeOutcome { match_result: Some(result), ..timed_out() });
    };
    if Instant::now() >= deadline {
      warn!(%worker_id, "probe deadline passed before commit");
      return Ok(ProbeOutcome { match_result: Some(result), ..timed_out() });
    }

    // Committed from here on, whatever the deadline says.
    let at = probe.captured_at;
    let confidence = result.confidence;
    let evidence_photo = evidence_photo.filter(|_| self.config.evidence_photos);
    let mut outcome = ProbeOutcome {
      match_result: Some(result),
      ..ProbeOutcome::new(probe_id, ProbeStatus::Recorded)
    };

    match state.decide(at, &self.policy) {
      Transition::Suppress(reason) => {
        debug!(%worker_id, ?reason, "transition suppressed");
        outcome.status = ProbeStatus::Suppressed;
        outcome.suppressed = Some(reason);
      }
      Transition::CheckIn => {
        let event = new_event(worker_id, EventKind::CheckIn, at, confidence, evidence_photo);
        self.commit(&mut state, &mut outcome, event).await?;
      }
      Transition::CheckOut => {
        let event = new_event(worker_id, EventKind::CheckOut, at, confidence, evidence_photo);
        self.commit(&mut state, &mut outcome, event).await?;
      }
      Transition::CloseStaleThenCheckIn { close_at } => {
        info!(%worker_id, %close_at, "closing stale session");
        let close = AttendanceEvent {
          origin: EventOrigin::SessionTimeout,
          ..new_event(worker_id, EventKind::CheckOut, close_at, 0.0, None)
        };
        let closed = self.append(&mut state, close).await?;
        outcome.closed_session = Some(closed.into_event());

        let event = new_event(worker_id, EventKind::CheckIn, at, confidence, evidence_photo);
        self.commit(&mut state, &mut outcome, event).await?;
      }
    }

    Ok(outcome)
  }

  async fn commit(
    &self,
    state: &mut WorkerSessionState,
    outcome: &mut ProbeOutcome,
    event: AttendanceEvent,
  ) -> Result<(), EngineError> {
    let appended = self.append(state, event).await?;
    outcome.deduplicated = appended.is_duplicate();
    outcome.event = Some(appended.into_event());
    Ok(())
  }

  async fn append(
    &self,
    state: &mut WorkerSessionState,
    event: AttendanceEvent,
  ) -> Result<Appended, EngineError> {
    self.recorder.record(state, event).await.map_err(|e| {
      let reason = e.to_string();
      error!(error = %reason, "event write failed");
      self.gate.trip(&reason);
      EngineError::Unavailable(reason)
    })
  }
}

fn new_event(
  worker_id: WorkerId,
  kind: EventKind,
  occurred_at: DateTime<Utc>,
  confidence: f32,
  evidence_photo: Option<String>,
) -> AttendanceEvent {
  AttendanceEvent {
    event_id: Uuid::new_v4(),
    worker_id,
    kind,
    occurred_at,
    confidence,
    origin: EventOrigin::Recognized,
    evidence_photo,
    recorded_at: Utc::now(),
  }
}

async fn load_snapshot<S: AttendanceStore>(
  store: &S,
  dimension: usize,
) -> Result<EncodingSnapshot, EngineError> {
  let active = store.list_active().await.map_err(EngineError::store)?;
  let snapshot = EncodingSnapshot::new(dimension, active);
  if snapshot.skipped() > 0 {
    warn!(
      skipped = snapshot.skipped(),
      dimension, "stored vectors with the wrong dimension left out of the snapshot"
    );
  }
  Ok(snapshot)
}
