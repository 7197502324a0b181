//! The `AttendanceStore` trait.
//!
//! Implemented by storage backends (e.g. `facegate-store-sqlite`). The engine
//! and the HTTP layer depend on this abstraction, not on any concrete backend.

use std::future::Future;

use uuid::Uuid;

use crate::{
  encoding::{ActiveEncoding, EncodingRecord, NewEncoding},
  event::{
    Appended, AttendanceEvent, DedupKey, EventId, EventQuery, EventVoid,
    ResolvedEvent,
  },
  worker::{EnrollmentStats, NewWorker, WorkerId, WorkerIdentity},
};

/// Abstraction over a Facegate persistence backend.
///
/// Attendance events are append-only. Corrections are expressed as
/// [`EventVoid`] records, which are themselves append-only. Feature vectors
/// are encrypted by the backend before they are written and only returned,
/// decrypted, by [`AttendanceStore::list_active`].
///
/// All methods return `Send` futures so the trait can be used from spawned
/// tokio tasks.
pub trait AttendanceStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Workers ───────────────────────────────────────────────────────────

  /// Create and persist a new, active worker.
  fn add_worker(
    &self,
    input: NewWorker,
  ) -> impl Future<Output = Result<WorkerIdentity, Self::Error>> + Send + '_;

  /// Retrieve a worker by id, active or not. Returns `None` if unknown.
  fn get_worker(
    &self,
    id: WorkerId,
  ) -> impl Future<Output = Result<Option<WorkerIdentity>, Self::Error>> + Send + '_;

  /// List workers, optionally including deactivated ones.
  fn list_workers(
    &self,
    include_inactive: bool,
  ) -> impl Future<Output = Result<Vec<WorkerIdentity>, Self::Error>> + Send + '_;

  /// Mark a worker inactive. Rows are kept for audit joins; deactivating an
  /// inactive worker is a no-op.
  fn deactivate(
    &self,
    id: WorkerId,
  ) -> impl Future<Output = Result<WorkerIdentity, Self::Error>> + Send + '_;

  // ── Encodings ─────────────────────────────────────────────────────────

  /// Encrypt and store a vector for an active worker.
  fn enroll(
    &self,
    worker_id: WorkerId,
    input: NewEncoding,
  ) -> impl Future<Output = Result<EncodingRecord, Self::Error>> + Send + '_;

  /// Take one encoding of `worker_id` out of matching. The row is kept;
  /// deactivating an inactive encoding is a no-op.
  ///
  /// Returns an error if no such encoding belongs to the worker.
  fn deactivate_encoding(
    &self,
    worker_id: WorkerId,
    encoding_id: Uuid,
  ) -> impl Future<Output = Result<EncodingRecord, Self::Error>> + Send + '_;

  /// Metadata of every encoding owned by `worker_id`, active or not.
  fn list_encodings(
    &self,
    worker_id: WorkerId,
  ) -> impl Future<Output = Result<Vec<EncodingRecord>, Self::Error>> + Send + '_;

  /// Decrypted active encodings of all active workers, for a matcher
  /// snapshot.
  fn list_active(
    &self,
  ) -> impl Future<Output = Result<Vec<ActiveEncoding>, Self::Error>> + Send + '_;

  fn encoding_stats(
    &self,
  ) -> impl Future<Output = Result<EnrollmentStats, Self::Error>> + Send + '_;

  // ── Events: append-only writes ──────────────────────────────────────

  /// Append `event` unless an event with the same `key` already exists, in
  /// which case the existing event is returned as [`Appended::Duplicate`].
  fn append_event(
    &self,
    event: AttendanceEvent,
    key: DedupKey,
  ) -> impl Future<Output = Result<Appended, Self::Error>> + Send + '_;

  /// Record a compensating void against an event.
  ///
  /// Returns an error if the event is unknown or already voided.
  fn void_event(
    &self,
    event_id: EventId,
    reason: Option<String>,
  ) -> impl Future<Output = Result<EventVoid, Self::Error>> + Send + '_;

  // ── Reads ─────────────────────────────────────────────────────────────

  fn get_event(
    &self,
    event_id: EventId,
  ) -> impl Future<Output = Result<Option<ResolvedEvent>, Self::Error>> + Send + '_;

  /// Events ordered by `occurred_at`, then `recorded_at`.
  fn events_between<'a>(
    &'a self,
    query: &'a EventQuery,
  ) -> impl Future<Output = Result<Vec<ResolvedEvent>, Self::Error>> + Send + 'a;

  /// The latest valid (non-voided) event of every worker that has one.
  fn latest_events(
    &self,
  ) -> impl Future<Output = Result<Vec<AttendanceEvent>, Self::Error>> + Send + '_;

  /// The latest valid event of one worker.
  fn latest_event(
    &self,
    worker_id: WorkerId,
  ) -> impl Future<Output = Result<Option<AttendanceEvent>, Self::Error>> + Send + '_;

  // ── Health ────────────────────────────────────────────────────────────

  /// Cheap round trip proving the backend accepts writes.
  fn ping(&self) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;
}
