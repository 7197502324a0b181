//! End-to-end engine tests against an in-memory `SqliteStore`.

use std::sync::{
  Arc,
  atomic::{AtomicBool, AtomicU64, Ordering},
};

use chrono::{DateTime, Duration, TimeZone, Utc};
use facegate_core::{
  encoding::{
    ActiveEncoding, EncodingRecord, FeatureVector, NewEncoding, ProbeEncoding,
  },
  event::{
    Appended, AttendanceEvent, DedupKey, EventId, EventKind, EventOrigin,
    EventQuery, EventVoid, ResolvedEvent,
  },
  matcher::MatchDecision,
  session::{Presence, SuppressReason},
  summary::SessionStatus,
  store::AttendanceStore,
  worker::{EnrollmentStats, NewWorker, WorkerId, WorkerIdentity},
};
use facegate_store_sqlite::SqliteStore;

use crate::{Engine, EngineConfig, EngineError, Frame, ProbeStatus, ShiftConfig};

// ─── Helpers ─────────────────────────────────────────────────────────────────

const DIM: usize = 4;

fn config() -> EngineConfig {
  EngineConfig { dimension: DIM, ..EngineConfig::default() }
}

/// A unit vector along axis `i`; distinct axes are `sqrt(2)` apart.
fn axis(i: usize) -> FeatureVector {
  let mut v = vec![0.0; DIM];
  v[i] = 1.0;
  FeatureVector::new(v)
}

fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
  Utc.with_ymd_and_hms(2024, 3, 4, h, m, s).unwrap()
}

async fn store() -> Arc<SqliteStore> {
  Arc::new(SqliteStore::open_in_memory().await.expect("in-memory store"))
}

async fn engine_with(store: Arc<SqliteStore>, config: EngineConfig) -> Engine<SqliteStore> {
  Engine::start(store, config).await.expect("engine start")
}

/// Add a worker enrolled with the vector along `axis(i)`.
async fn enrolled<S: AttendanceStore + 'static>(engine: &Engine<S>, name: &str, i: usize) -> WorkerId {
  let worker = engine.add_worker(NewWorker::new(name)).await.unwrap();
  engine
    .enroll(worker.worker_id, NewEncoding::new(axis(i)))
    .await
    .unwrap();
  worker.worker_id
}

fn probe(i: usize, when: DateTime<Utc>) -> ProbeEncoding { ProbeEncoding::new(axis(i), when) }

async fn valid_events(engine: &Engine<SqliteStore>, worker_id: WorkerId) -> Vec<AttendanceEvent> {
  let query = EventQuery { worker_id: Some(worker_id), ..EventQuery::default() };
  engine
    .events(&query)
    .await
    .unwrap()
    .into_iter()
    .map(|r| r.event)
    .collect()
}

// ─── Scenarios ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn check_in_debounce_check_out() {
  let engine = engine_with(store().await, config()).await;
  let w = enrolled(&engine, "Ana", 0).await;

  let first = engine.recognize(probe(0, at(9, 0, 0)), None).await.unwrap();
  assert_eq!(first.status, ProbeStatus::Recorded);
  let event = first.event.unwrap();
  assert_eq!(event.kind, EventKind::CheckIn);
  assert_eq!(event.worker_id, w);
  assert_eq!(event.occurred_at, at(9, 0, 0));

  let rescan = engine.recognize(probe(0, at(9, 0, 5)), None).await.unwrap();
  assert_eq!(rescan.status, ProbeStatus::Suppressed);
  assert_eq!(rescan.suppressed, Some(SuppressReason::Debounced));
  assert!(rescan.event.is_none());

  let leave = engine.recognize(probe(0, at(17, 0, 0)), None).await.unwrap();
  assert_eq!(leave.event.unwrap().kind, EventKind::CheckOut);

  let events = valid_events(&engine, w).await;
  let kinds: Vec<_> = events.iter().map(|e| e.kind).collect();
  assert_eq!(kinds, vec![EventKind::CheckIn, EventKind::CheckOut]);

  let sessions = engine.work_sessions(w, None, None).await.unwrap();
  assert_eq!(sessions.len(), 1);
  assert_eq!(sessions[0].duration_secs, Some(8 * 3600));
  assert_eq!(sessions[0].overtime_secs, Some(0));
}

#[tokio::test]
async fn empty_store_rejects_everything() {
  let engine = engine_with(store().await, config()).await;

  let outcome = engine.recognize(probe(0, at(9, 0, 0)), None).await.unwrap();
  assert_eq!(outcome.status, ProbeStatus::Rejected);
  let result = outcome.match_result.unwrap();
  assert_eq!(result.decision, MatchDecision::RejectedLowConfidence);
  assert!(result.candidate.is_none());

  let all = engine.events(&EventQuery::default()).await.unwrap();
  assert!(all.is_empty());
}

#[tokio::test]
async fn unknown_face_is_rejected() {
  let engine = engine_with(store().await, config()).await;
  enrolled(&engine, "Ana", 0).await;

  let outcome = engine.recognize(probe(1, at(9, 0, 0)), None).await.unwrap();
  assert_eq!(outcome.status, ProbeStatus::Rejected);
  assert!(outcome.event.is_none());
}

#[tokio::test]
async fn ambiguous_match_records_nothing() {
  let engine = engine_with(store().await, config()).await;
  let a = engine.add_worker(NewWorker::new("Twin A")).await.unwrap();
  let b = engine.add_worker(NewWorker::new("Twin B")).await.unwrap();
  engine
    .enroll(a.worker_id, NewEncoding::new(vec![1.0, 0.0, 0.0, 0.0]))
    .await
    .unwrap();
  engine
    .enroll(b.worker_id, NewEncoding::new(vec![1.0, 0.05, 0.0, 0.0]))
    .await
    .unwrap();

  let outcome = engine.recognize(probe(0, at(9, 0, 0)), None).await.unwrap();
  assert_eq!(outcome.status, ProbeStatus::Ambiguous);
  assert!(engine.events(&EventQuery::default()).await.unwrap().is_empty());
}

#[tokio::test]
async fn wrong_dimension_probe_is_a_validation_error() {
  let engine = engine_with(store().await, config()).await;
  enrolled(&engine, "Ana", 0).await;

  let bad = ProbeEncoding::new(vec![1.0, 0.0], at(9, 0, 0));
  let err = engine.recognize(bad, None).await.unwrap_err();
  assert!(matches!(err, EngineError::Validation(_)));

  let nan = ProbeEncoding::new(vec![f32::NAN, 0.0, 0.0, 0.0], at(9, 0, 0));
  let err = engine.recognize(nan, None).await.unwrap_err();
  assert!(matches!(err, EngineError::Validation(_)));
}

#[tokio::test]
async fn repeated_probe_records_once() {
  let engine = engine_with(store().await, config()).await;
  let w = enrolled(&engine, "Ana", 0).await;

  let (a, b) = tokio::join!(
    engine.recognize(probe(0, at(9, 0, 0)), None),
    engine.recognize(probe(0, at(9, 0, 0)), None),
  );
  let statuses = [a.unwrap().status, b.unwrap().status];
  assert!(statuses.contains(&ProbeStatus::Recorded));
  assert!(statuses.contains(&ProbeStatus::Suppressed));

  assert_eq!(valid_events(&engine, w).await.len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn distinct_workers_in_one_frame() {
  let engine = engine_with(store().await, config()).await;
  let mut workers = Vec::new();
  for i in 0..DIM {
    workers.push(enrolled(&engine, &format!("worker {i}"), i).await);
  }

  let frame = Frame {
    encodings:      (0..DIM).map(axis).collect(),
    captured_at:    at(8, 30, 0),
    evidence_photo: None,
  };
  let outcomes = engine.recognize_frame(frame).await.unwrap();
  assert_eq!(outcomes.len(), DIM);
  assert!(outcomes.iter().all(|o| o.is_recorded()));

  for w in workers {
    let events = valid_events(&engine, w).await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].kind, EventKind::CheckIn);
  }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_probes_for_five_workers() {
  let config = EngineConfig { dimension: 5, ..EngineConfig::default() };
  let engine = engine_with(store().await, config).await;

  let mut workers = Vec::new();
  for i in 0..5 {
    let worker = engine.add_worker(NewWorker::new(format!("w{i}"))).await.unwrap();
    let mut v = vec![0.0; 5];
    v[i] = 1.0;
    engine.enroll(worker.worker_id, NewEncoding::new(v)).await.unwrap();
    workers.push(worker.worker_id);
  }

  let handles: Vec<_> = (0..5)
    .map(|i| {
      let mut v = vec![0.0; 5];
      v[i] = 1.0;
      engine
        .submit(ProbeEncoding::new(v, at(9, 0, 0)), None)
        .unwrap()
    })
    .collect();
  for h in handles {
    assert_eq!(h.outcome().await.unwrap().status, ProbeStatus::Recorded);
  }

  let all = engine.events(&EventQuery::default()).await.unwrap();
  assert_eq!(all.len(), 5);
  for w in workers {
    assert_eq!(all.iter().filter(|r| r.event.worker_id == w).count(), 1);
  }
}

#[tokio::test]
async fn events_alternate_per_worker() {
  let engine = engine_with(store().await, config()).await;
  let w = enrolled(&engine, "Ana", 0).await;

  let mut when = at(6, 0, 0);
  for _ in 0..6 {
    engine.recognize(probe(0, when), None).await.unwrap();
    when += Duration::minutes(45);
  }

  let events = valid_events(&engine, w).await;
  assert_eq!(events.len(), 6);
  for pair in events.windows(2) {
    assert_ne!(pair[0].kind, pair[1].kind);
  }
  assert_eq!(events[0].kind, EventKind::CheckIn);
}

#[tokio::test]
async fn out_of_order_probe_is_suppressed() {
  let engine = engine_with(store().await, config()).await;
  enrolled(&engine, "Ana", 0).await;

  engine.recognize(probe(0, at(9, 0, 0)), None).await.unwrap();
  let late = engine.recognize(probe(0, at(8, 0, 0)), None).await.unwrap();
  assert_eq!(late.status, ProbeStatus::Suppressed);
  assert_eq!(late.suppressed, Some(SuppressReason::OutOfOrder));
}

#[tokio::test]
async fn stale_session_is_closed_before_check_in() {
  let engine = engine_with(store().await, config()).await;
  let w = enrolled(&engine, "Ana", 0).await;

  engine.recognize(probe(0, at(7, 0, 0)), None).await.unwrap();
  let next_day = at(7, 0, 0) + Duration::hours(24);
  let outcome = engine.recognize(probe(0, next_day), None).await.unwrap();

  let closed = outcome.closed_session.unwrap();
  assert_eq!(closed.kind, EventKind::CheckOut);
  assert_eq!(closed.origin, EventOrigin::SessionTimeout);
  assert_eq!(closed.occurred_at, at(7, 0, 0) + Duration::hours(16));
  assert_eq!(outcome.event.unwrap().kind, EventKind::CheckIn);

  let sessions = engine.work_sessions(w, None, None).await.unwrap();
  assert_eq!(sessions.len(), 2);
  assert!(sessions[0].closed_by_timeout);
  assert_eq!(sessions[0].overtime_secs, Some(8 * 3600));
  assert!(sessions[1].check_out.is_none());
}

#[tokio::test]
async fn deactivated_worker_is_not_matched() {
  let engine = engine_with(store().await, config()).await;
  let w = enrolled(&engine, "Ana", 0).await;

  engine.deactivate(w).await.unwrap();
  let outcome = engine.recognize(probe(0, at(9, 0, 0)), None).await.unwrap();
  assert_eq!(outcome.status, ProbeStatus::Rejected);

  let err = engine.enroll(w, NewEncoding::new(axis(0))).await.unwrap_err();
  assert!(matches!(err, EngineError::Conflict(_)));
}

#[tokio::test]
async fn deactivated_encoding_is_not_matched() {
  let engine = engine_with(store().await, config()).await;
  let w = enrolled(&engine, "Ana", 0).await;
  // A second vector enrolled by mistake from someone else's face.
  let wrong = engine
    .enroll(w, NewEncoding::new(axis(1)))
    .await
    .unwrap();

  let record = engine.deactivate_encoding(w, wrong.encoding_id).await.unwrap();
  assert!(!record.active);
  assert_eq!(engine.stats().await.unwrap().snapshot_vectors, 1);

  let stranger = engine.recognize(probe(1, at(9, 0, 0)), None).await.unwrap();
  assert_eq!(stranger.status, ProbeStatus::Rejected);
  let owner = engine.recognize(probe(0, at(9, 0, 0)), None).await.unwrap();
  assert_eq!(owner.status, ProbeStatus::Recorded);

  let status = engine.worker_status(w).await.unwrap();
  assert_eq!(status.encodings.len(), 2);
}

#[tokio::test]
async fn deactivate_encoding_of_another_worker_is_not_found() {
  let engine = engine_with(store().await, config()).await;
  let a = enrolled(&engine, "Ana", 0).await;
  let b = enrolled(&engine, "Bruno", 1).await;
  let of_a = engine.worker_status(a).await.unwrap().encodings[0].encoding_id;

  let err = engine.deactivate_encoding(b, of_a).await.unwrap_err();
  assert!(matches!(err, EngineError::NotFound(_)));
  assert_eq!(engine.stats().await.unwrap().snapshot_vectors, 2);
}

#[tokio::test]
async fn sessions_are_classified_against_the_shift() {
  let shift = ShiftConfig {
    start:              chrono::NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
    end:                chrono::NaiveTime::from_hms_opt(17, 0, 0).unwrap(),
    grace_minutes:      15,
    utc_offset_minutes: 0,
  };
  let engine = engine_with(store().await, EngineConfig { shift: Some(shift), ..config() }).await;
  let w = enrolled(&engine, "Ana", 0).await;

  let next_day = Duration::days(1);
  for when in [
    at(9, 10, 0),
    at(17, 0, 0),
    at(9, 40, 0) + next_day,
    at(17, 0, 0) + next_day,
    at(8, 55, 0) + next_day * 2,
    at(15, 0, 0) + next_day * 2,
  ] {
    assert!(engine.recognize(probe(0, when), None).await.unwrap().is_recorded());
  }

  let statuses: Vec<_> = engine
    .work_sessions(w, None, None)
    .await
    .unwrap()
    .into_iter()
    .map(|s| s.status)
    .collect();
  assert_eq!(
    statuses,
    vec![SessionStatus::Present, SessionStatus::Late, SessionStatus::EarlyLeave]
  );
}

#[tokio::test]
async fn out_of_range_config_fails_start() {
  let config = EngineConfig {
    debounce_window_secs: 100_000_000_000_000_000,
    max_session_secs: u64::MAX,
    ..config()
  };
  let err = Engine::start(store().await, config).await.err().unwrap();
  assert!(matches!(err, EngineError::Config(_)));
}

#[tokio::test]
async fn evidence_photo_is_kept_only_when_enabled() {
  let off = engine_with(store().await, config()).await;
  enrolled(&off, "Ana", 0).await;
  let outcome = off
    .recognize(probe(0, at(9, 0, 0)), Some("photos/1.jpg".into()))
    .await
    .unwrap();
  assert!(outcome.event.unwrap().evidence_photo.is_none());

  let on = engine_with(
    store().await,
    EngineConfig { evidence_photos: true, ..config() },
  )
  .await;
  enrolled(&on, "Ana", 0).await;
  let outcome = on
    .recognize(probe(0, at(9, 0, 0)), Some("photos/1.jpg".into()))
    .await
    .unwrap();
  assert_eq!(outcome.event.unwrap().evidence_photo.as_deref(), Some("photos/1.jpg"));
}

#[tokio::test]
async fn empty_frame_does_nothing() {
  let engine = engine_with(store().await, config()).await;
  let frame = Frame {
    encodings:      Vec::new(),
    captured_at:    at(9, 0, 0),
    evidence_photo: None,
  };
  assert!(engine.recognize_frame(frame).await.unwrap().is_empty());
}

// ─── Back-pressure and deadlines ─────────────────────────────────────────────

#[tokio::test]
async fn full_queue_is_busy() {
  let config = EngineConfig {
    max_concurrent_probes: 1,
    queue_depth: 0,
    ..config()
  };
  let engine = engine_with(store().await, config).await;
  let w = enrolled(&engine, "Ana", 0).await;

  let guard = engine.lock_worker(w).await;
  let first = engine.submit(probe(0, at(9, 0, 0)), None).unwrap();
  let second = engine.submit(probe(0, at(9, 0, 1)), None);
  assert!(matches!(second, Err(EngineError::Busy)));

  drop(guard);
  assert!(first.outcome().await.unwrap().is_recorded());
  assert!(engine.submit(probe(0, at(17, 0, 0)), None).is_ok());
}

#[tokio::test]
async fn expired_deadline_writes_nothing() {
  let config = EngineConfig { probe_timeout_ms: 0, ..config() };
  let engine = engine_with(store().await, config).await;
  let w = enrolled(&engine, "Ana", 0).await;

  let outcome = engine.recognize(probe(0, at(9, 0, 0)), None).await.unwrap();
  assert_eq!(outcome.status, ProbeStatus::TimedOut);
  assert!(outcome.event.is_none());
  assert!(valid_events(&engine, w).await.is_empty());
  assert_eq!(engine.worker_status(w).await.unwrap().session.presence, Presence::Out);
}

#[tokio::test]
async fn lock_wait_past_deadline_times_out() {
  let config = EngineConfig { probe_timeout_ms: 50, ..config() };
  let engine = engine_with(store().await, config).await;
  let w = enrolled(&engine, "Ana", 0).await;

  let guard = engine.lock_worker(w).await;
  let handle = engine.submit(probe(0, at(9, 0, 0)), None).unwrap();
  tokio::time::sleep(std::time::Duration::from_millis(150)).await;
  drop(guard);

  let outcome = handle.outcome().await.unwrap();
  assert_eq!(outcome.status, ProbeStatus::TimedOut);
  assert!(outcome.match_result.unwrap().is_accepted());
  assert!(valid_events(&engine, w).await.is_empty());
}

// ─── Restart and corrections ─────────────────────────────────────────────────

#[tokio::test]
async fn state_survives_restart() {
  let store = store().await;
  let w = {
    let engine = engine_with(store.clone(), config()).await;
    let w = enrolled(&engine, "Ana", 0).await;
    engine.recognize(probe(0, at(9, 0, 0)), None).await.unwrap();
    w
  };

  let engine = engine_with(store, config()).await;
  let status = engine.worker_status(w).await.unwrap();
  assert_eq!(status.session.presence, Presence::In);
  assert_eq!(status.encodings.len(), 1);

  let outcome = engine.recognize(probe(0, at(17, 0, 0)), None).await.unwrap();
  assert_eq!(outcome.event.unwrap().kind, EventKind::CheckOut);
}

#[tokio::test]
async fn void_rebuilds_session_state() {
  let engine = engine_with(store().await, config()).await;
  let w = enrolled(&engine, "Ana", 0).await;

  let check_in = engine
    .recognize(probe(0, at(9, 0, 0)), None)
    .await
    .unwrap()
    .event
    .unwrap();

  engine
    .void_event(check_in.event_id, Some("wrong person".into()))
    .await
    .unwrap();
  assert_eq!(engine.worker_status(w).await.unwrap().session.presence, Presence::Out);

  // Without the void this would be a check-out.
  let next = engine.recognize(probe(0, at(9, 30, 0)), None).await.unwrap();
  assert_eq!(next.event.unwrap().kind, EventKind::CheckIn);

  let err = engine.void_event(check_in.event_id, None).await.unwrap_err();
  assert!(matches!(err, EngineError::Conflict(_)));

  let history = engine
    .events(&EventQuery {
      worker_id: Some(w),
      include_voided: true,
      ..EventQuery::default()
    })
    .await
    .unwrap();
  assert_eq!(history.len(), 2);
  assert!(!history[0].status.is_valid());
}

#[tokio::test]
async fn only_the_latest_event_can_be_voided() {
  let engine = engine_with(store().await, config()).await;
  let w = enrolled(&engine, "Ana", 0).await;

  let mut recorded = Vec::new();
  for when in [at(9, 0, 0), at(12, 0, 0), at(13, 0, 0)] {
    let outcome = engine.recognize(probe(0, when), None).await.unwrap();
    recorded.push(outcome.event.unwrap());
  }
  let (check_out, afternoon) = (&recorded[1], &recorded[2]);
  assert_eq!(check_out.kind, EventKind::CheckOut);

  let err = engine.void_event(check_out.event_id, None).await.unwrap_err();
  assert!(matches!(err, EngineError::Conflict(_)));
  assert_eq!(valid_events(&engine, w).await.len(), 3);

  // Peeling back from the end keeps the history alternating.
  engine.void_event(afternoon.event_id, None).await.unwrap();
  engine.void_event(check_out.event_id, None).await.unwrap();

  let events = valid_events(&engine, w).await;
  let kinds: Vec<_> = events.iter().map(|e| e.kind).collect();
  assert_eq!(kinds, vec![EventKind::CheckIn]);
  assert_eq!(engine.worker_status(w).await.unwrap().session.presence, Presence::In);
}

#[tokio::test]
async fn unknown_ids_are_not_found() {
  let engine = engine_with(store().await, config()).await;
  let missing = uuid::Uuid::new_v4();

  assert!(matches!(engine.get_worker(missing).await, Err(EngineError::NotFound(_))));
  assert!(matches!(
    engine.enroll(missing, NewEncoding::new(axis(0))).await,
    Err(EngineError::NotFound(_))
  ));
  assert!(matches!(engine.void_event(missing, None).await, Err(EngineError::NotFound(_))));
}

#[tokio::test]
async fn stats_reflect_enrollment() {
  let engine = engine_with(store().await, config()).await;
  enrolled(&engine, "Ana", 0).await;
  engine.add_worker(NewWorker::new("Bruno")).await.unwrap();

  let stats = engine.stats().await.unwrap();
  assert_eq!(stats.enrollment.active_workers, 2);
  assert_eq!(stats.enrollment.workers_with_encodings, 1);
  assert_eq!(stats.snapshot_workers, 1);
  assert!((stats.registration_rate - 50.0).abs() < f64::EPSILON);
  assert!(stats.accepting_probes);
}

// ─── Persistence failure ─────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
enum FlakyError {
  #[error("disk unplugged")]
  Injected,
  #[error(transparent)]
  Store(#[from] facegate_store_sqlite::Error),
}

/// Delegates to a real store; event writes and pings fail while `down`,
/// and event writes take `write_delay_ms` longer.
struct FlakyStore {
  inner:          SqliteStore,
  down:           AtomicBool,
  write_delay_ms: AtomicU64,
}

impl FlakyStore {
  async fn new() -> Arc<Self> {
    Arc::new(Self {
      inner:          SqliteStore::open_in_memory().await.unwrap(),
      down:           AtomicBool::new(false),
      write_delay_ms: AtomicU64::new(0),
    })
  }
}

impl FlakyStore {
  fn check(&self) -> Result<(), FlakyError> {
    if self.down.load(Ordering::SeqCst) { Err(FlakyError::Injected) } else { Ok(()) }
  }
}

impl AttendanceStore for FlakyStore {
  type Error = FlakyError;

  async fn add_worker(&self, input: NewWorker) -> Result<WorkerIdentity, FlakyError> {
    Ok(self.inner.add_worker(input).await?)
  }

  async fn get_worker(&self, id: WorkerId) -> Result<Option<WorkerIdentity>, FlakyError> {
    Ok(self.inner.get_worker(id).await?)
  }

  async fn list_workers(&self, include_inactive: bool) -> Result<Vec<WorkerIdentity>, FlakyError> {
    Ok(self.inner.list_workers(include_inactive).await?)
  }

  async fn deactivate(&self, id: WorkerId) -> Result<WorkerIdentity, FlakyError> {
    Ok(self.inner.deactivate(id).await?)
  }

  async fn enroll(&self, worker_id: WorkerId, input: NewEncoding) -> Result<EncodingRecord, FlakyError> {
    Ok(self.inner.enroll(worker_id, input).await?)
  }

  async fn deactivate_encoding(&self, worker_id: WorkerId, encoding_id: uuid::Uuid) -> Result<EncodingRecord, FlakyError> {
    Ok(self.inner.deactivate_encoding(worker_id, encoding_id).await?)
  }

  async fn list_encodings(&self, worker_id: WorkerId) -> Result<Vec<EncodingRecord>, FlakyError> {
    Ok(self.inner.list_encodings(worker_id).await?)
  }

  async fn list_active(&self) -> Result<Vec<ActiveEncoding>, FlakyError> {
    Ok(self.inner.list_active().await?)
  }

  async fn encoding_stats(&self) -> Result<EnrollmentStats, FlakyError> {
    Ok(self.inner.encoding_stats().await?)
  }

  async fn append_event(&self, event: AttendanceEvent, key: DedupKey) -> Result<Appended, FlakyError> {
    self.check()?;
    let delay = self.write_delay_ms.load(Ordering::SeqCst);
    tokio::time::sleep(std::time::Duration::from_millis(delay)).await;
    Ok(self.inner.append_event(event, key).await?)
  }

  async fn void_event(&self, event_id: EventId, reason: Option<String>) -> Result<EventVoid, FlakyError> {
    Ok(self.inner.void_event(event_id, reason).await?)
  }

  async fn get_event(&self, event_id: EventId) -> Result<Option<ResolvedEvent>, FlakyError> {
    Ok(self.inner.get_event(event_id).await?)
  }

  async fn events_between(&self, query: &EventQuery) -> Result<Vec<ResolvedEvent>, FlakyError> {
    Ok(self.inner.events_between(query).await?)
  }

  async fn latest_events(&self) -> Result<Vec<AttendanceEvent>, FlakyError> {
    Ok(self.inner.latest_events().await?)
  }

  async fn latest_event(&self, worker_id: WorkerId) -> Result<Option<AttendanceEvent>, FlakyError> {
    Ok(self.inner.latest_event(worker_id).await?)
  }

  async fn ping(&self) -> Result<(), FlakyError> {
    self.check()?;
    Ok(self.inner.ping().await?)
  }
}

#[tokio::test]
async fn failed_write_refuses_probes_until_recovery() {
  let flaky = FlakyStore::new().await;
  let engine = Engine::start(flaky.clone(), config()).await.unwrap();
  let w = enrolled(&engine, "Ana", 0).await;

  flaky.down.store(true, Ordering::SeqCst);
  let err = engine.recognize(probe(0, at(9, 0, 0)), None).await.unwrap_err();
  assert!(matches!(err, EngineError::Unavailable(_)));
  assert_eq!(engine.worker_status(w).await.unwrap().session.presence, Presence::Out);

  // Refused up front while the store stays down.
  let err = engine.recognize(probe(0, at(9, 1, 0)), None).await.unwrap_err();
  assert!(matches!(err, EngineError::Unavailable(_)));
  assert!(matches!(
    engine.submit(probe(0, at(9, 1, 0)), None),
    Err(EngineError::Unavailable(_))
  ));
  assert!(!engine.health().await);

  flaky.down.store(false, Ordering::SeqCst);
  let outcome = engine.recognize(probe(0, at(9, 2, 0)), None).await.unwrap();
  assert_eq!(outcome.event.unwrap().kind, EventKind::CheckIn);
  assert!(engine.health().await);
}

#[tokio::test]
async fn slow_commit_still_records_past_the_budget() {
  let flaky = FlakyStore::new().await;
  let config = EngineConfig { probe_timeout_ms: 50, ..config() };
  let engine = Engine::start(flaky.clone(), config).await.unwrap();
  let w = enrolled(&engine, "Ana", 0).await;

  flaky.write_delay_ms.store(150, Ordering::SeqCst);
  let outcome = engine.recognize(probe(0, at(9, 0, 0)), None).await.unwrap();
  assert_eq!(outcome.status, ProbeStatus::Recorded);
  assert!(outcome.latency_ms >= 150);
  assert_eq!(engine.worker_status(w).await.unwrap().session.presence, Presence::In);
}
