//! [`SqliteStore`], the SQLite implementation of [`AttendanceStore`].

use std::{path::Path, sync::Arc};

use chrono::Utc;
use rusqlite::{OptionalExtension as _, TransactionBehavior};
use uuid::Uuid;

use facegate_core::{
  encoding::{ActiveEncoding, EncodingRecord, NewEncoding},
  event::{
    Appended, AttendanceEvent, DedupKey, EventId, EventQuery, EventVoid,
    ResolvedEvent,
  },
  store::AttendanceStore,
  worker::{EnrollmentStats, NewWorker, WorkerId, WorkerIdentity},
};

use crate::{
  Error, Result,
  cipher::VectorCipher,
  encode::{
    ENCODING_COLUMNS, EVENT_COLUMNS, RawEncodingRecord, RawEvent, RawSealedVector,
    RawWorker, WORKER_COLUMNS, decode_encryption, decode_uuid, encode_dt,
    encode_encryption, encode_uuid,
  },
  schema::{MIGRATE_V1, SCHEMA},
};

/// Outcome of a guarded write whose precondition is checked inside the
/// database call.
enum Guarded<T> {
  Done(T),
  Missing,
  Rejected,
}

// ─── Store ───────────────────────────────────────────────────────────────────

/// A Facegate store backed by a single SQLite file.
///
/// Cloning is cheap; the connection and the cipher are reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  pub(crate) conn: tokio_rusqlite::Connection,
  cipher:          Arc<VectorCipher>,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>, cipher: VectorCipher) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn, cipher: Arc::new(cipher) };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store under an ephemeral key, for tests.
  pub async fn open_in_memory() -> Result<Self> {
    Self::open_in_memory_with(VectorCipher::ephemeral()).await
  }

  pub async fn open_in_memory_with(cipher: VectorCipher) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn, cipher: Arc::new(cipher) };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        let version: i64 = conn.query_row("PRAGMA user_version", [], |r| r.get(0))?;
        if version == 1 {
          conn.execute_batch(MIGRATE_V1)?;
        }
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}

// ─── AttendanceStore impl ────────────────────────────────────────────────────

impl AttendanceStore for SqliteStore {
  type Error = Error;

  // ── Workers ───────────────────────────────────────────────────────────────

  async fn add_worker(&self, input: NewWorker) -> Result<WorkerIdentity> {
    let worker = WorkerIdentity {
      worker_id:      Uuid::new_v4(),
      display_name:   input.display_name,
      active:         true,
      created_at:     Utc::now(),
      deactivated_at: None,
    };

    let id_str = encode_uuid(worker.worker_id);
    let name   = worker.display_name.clone();
    let at_str = encode_dt(worker.created_at);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO workers (worker_id, display_name, active, created_at)
           VALUES (?1, ?2, 1, ?3)",
          rusqlite::params![id_str, name, at_str],
        )?;
        Ok(())
      })
      .await?;

    Ok(worker)
  }

  async fn get_worker(&self, id: WorkerId) -> Result<Option<WorkerIdentity>> {
    let id_str = encode_uuid(id);

    let raw: Option<RawWorker> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            &format!("SELECT {WORKER_COLUMNS} FROM workers WHERE worker_id = ?1"),
            rusqlite::params![id_str],
            RawWorker::from_row,
          )
          .optional()?)
      })
      .await?;

    raw.map(RawWorker::into_worker).transpose()
  }

  async fn list_workers(&self, include_inactive: bool) -> Result<Vec<WorkerIdentity>> {
    let raws: Vec<RawWorker> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {WORKER_COLUMNS} FROM workers
           WHERE (?1 OR active = 1)
           ORDER BY rowid"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![include_inactive], RawWorker::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawWorker::into_worker).collect()
  }

  async fn deactivate(&self, id: WorkerId) -> Result<WorkerIdentity> {
    let id_str = encode_uuid(id);
    let at_str = encode_dt(Utc::now());

    let raw: Option<RawWorker> = self
      .conn
      .call(move |conn| {
        conn.execute(
          "UPDATE workers SET active = 0, deactivated_at = ?2
           WHERE worker_id = ?1 AND active = 1",
          rusqlite::params![id_str, at_str],
        )?;
        Ok(conn
          .query_row(
            &format!("SELECT {WORKER_COLUMNS} FROM workers WHERE worker_id = ?1"),
            rusqlite::params![id_str],
            RawWorker::from_row,
          )
          .optional()?)
      })
      .await?;

    raw
      .ok_or(Error::WorkerNotFound(id))
      .and_then(RawWorker::into_worker)
  }

  // ── Encodings ─────────────────────────────────────────────────────────────

  async fn enroll(&self, worker_id: WorkerId, input: NewEncoding) -> Result<EncodingRecord> {
    input.vector.validate(input.vector.dimension())?;

    let encoding_id = Uuid::new_v4();
    let sealed = self.cipher.seal(&input.vector, encoding_id, worker_id)?;
    let record = EncodingRecord {
      encoding_id,
      worker_id,
      dimension: input.vector.dimension(),
      captured_at: input.captured_at.unwrap_or_else(Utc::now),
      encryption: sealed.state,
      variant: input.variant.unwrap_or_else(|| "default".to_owned()),
      quality: input.quality,
      active: true,
      deactivated_at: None,
    };

    let enc_id_str     = encode_uuid(record.encoding_id);
    let worker_id_str  = encode_uuid(worker_id);
    let dimension      = record.dimension as i64;
    let captured_str   = encode_dt(record.captured_at);
    let encryption_str = encode_encryption(&record.encryption)?;
    let variant        = record.variant.clone();
    let quality        = record.quality.map(f64::from);
    let nonce          = sealed.nonce;
    let blob           = sealed.blob;

    let outcome = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let active: Option<bool> = tx
          .query_row(
            "SELECT active FROM workers WHERE worker_id = ?1",
            rusqlite::params![worker_id_str],
            |r| r.get(0),
          )
          .optional()?;
        let outcome = match active {
          None => Guarded::Missing,
          Some(false) => Guarded::Rejected,
          Some(true) => {
            tx.execute(
              "INSERT INTO encodings (
                 encoding_id, worker_id, dimension, captured_at,
                 encryption, nonce, vector, variant, quality
               ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
              rusqlite::params![
                enc_id_str,
                worker_id_str,
                dimension,
                captured_str,
                encryption_str,
                nonce,
                blob,
                variant,
                quality,
              ],
            )?;
            Guarded::Done(())
          }
        };
        tx.commit()?;
        Ok(outcome)
      })
      .await?;

    match outcome {
      Guarded::Done(()) => Ok(record),
      Guarded::Missing => Err(Error::WorkerNotFound(worker_id)),
      Guarded::Rejected => Err(Error::WorkerInactive(worker_id)),
    }
  }

  async fn deactivate_encoding(
    &self,
    worker_id: WorkerId,
    encoding_id: Uuid,
  ) -> Result<EncodingRecord> {
    let worker_str   = encode_uuid(worker_id);
    let encoding_str = encode_uuid(encoding_id);
    let at_str       = encode_dt(Utc::now());

    let raw: Option<RawEncodingRecord> = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        tx.execute(
          "UPDATE encodings SET active = 0, deactivated_at = ?3
           WHERE encoding_id = ?1 AND worker_id = ?2 AND active = 1",
          rusqlite::params![encoding_str, worker_str, at_str],
        )?;
        let raw = tx
          .query_row(
            &format!(
              "SELECT {ENCODING_COLUMNS} FROM encodings
               WHERE encoding_id = ?1 AND worker_id = ?2"
            ),
            rusqlite::params![encoding_str, worker_str],
            RawEncodingRecord::from_row,
          )
          .optional()?;
        tx.commit()?;
        Ok(raw)
      })
      .await?;

    raw
      .ok_or(Error::EncodingNotFound { worker_id, encoding_id })
      .and_then(RawEncodingRecord::into_record)
  }

  async fn list_encodings(&self, worker_id: WorkerId) -> Result<Vec<EncodingRecord>> {
    let id_str = encode_uuid(worker_id);

    let raws: Vec<RawEncodingRecord> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {ENCODING_COLUMNS} FROM encodings WHERE worker_id = ?1 ORDER BY rowid"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![id_str], RawEncodingRecord::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawEncodingRecord::into_record).collect()
  }

  async fn list_active(&self) -> Result<Vec<ActiveEncoding>> {
    let raws: Vec<RawSealedVector> = self
      .conn
      .call(|conn| {
        let mut stmt = conn.prepare(
          "SELECT e.encoding_id, e.worker_id, e.encryption, e.nonce, e.vector
           FROM encodings e
           JOIN workers w ON w.worker_id = e.worker_id
           WHERE w.active = 1 AND e.active = 1
           ORDER BY e.rowid",
        )?;
        let rows = stmt
          .query_map([], |row| {
            Ok(RawSealedVector {
              encoding_id: row.get(0)?,
              worker_id:   row.get(1)?,
              encryption:  row.get(2)?,
              nonce:       row.get(3)?,
              vector:      row.get(4)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws
      .into_iter()
      .map(|raw| {
        let encoding_id = decode_uuid(&raw.encoding_id)?;
        let worker_id = decode_uuid(&raw.worker_id)?;
        let state = decode_encryption(&raw.encryption)?;
        let vector = self.cipher.open(
          &state,
          raw.nonce.as_deref(),
          &raw.vector,
          encoding_id,
          worker_id,
        )?;
        Ok(ActiveEncoding { encoding_id, worker_id, vector })
      })
      .collect()
  }

  async fn encoding_stats(&self) -> Result<EnrollmentStats> {
    let (total, active, with_enc, encodings): (i64, i64, i64, i64) = self
      .conn
      .call(|conn| {
        Ok(conn.query_row(
          "SELECT
             (SELECT COUNT(*) FROM workers),
             (SELECT COUNT(*) FROM workers WHERE active = 1),
             (SELECT COUNT(DISTINCT e.worker_id)
                FROM encodings e JOIN workers w ON w.worker_id = e.worker_id
                WHERE w.active = 1 AND e.active = 1),
             (SELECT COUNT(*) FROM encodings WHERE active = 1)",
          [],
          |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?)),
        )?)
      })
      .await?;

    Ok(EnrollmentStats {
      total_workers:          total as u64,
      active_workers:         active as u64,
      workers_with_encodings: with_enc as u64,
      total_encodings:        encodings as u64,
    })
  }

  // ── Events: append-only writes ──────────────────────────────────────────

  async fn append_event(&self, event: AttendanceEvent, key: DedupKey) -> Result<Appended> {
    let event_id_str   = encode_uuid(event.event_id);
    let worker_id_str  = encode_uuid(event.worker_id);
    let kind_str       = event.kind.as_str();
    let occurred_str   = encode_dt(event.occurred_at);
    let occurred_us    = event.occurred_at.timestamp_micros();
    let confidence     = f64::from(event.confidence);
    let origin_str     = event.origin.as_str();
    let evidence_photo = event.evidence_photo.clone();
    let recorded_str   = encode_dt(event.recorded_at);
    let bucket         = key.bucket;

    // The lookup and the insert share one IMMEDIATE transaction, so two
    // writers racing on the same key are serialised and the loser sees the
    // winner's row.
    let existing: Option<RawEvent> = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let existing = tx
          .query_row(
            &format!(
              "SELECT {EVENT_COLUMNS}
               FROM events e
               LEFT JOIN event_voids v ON v.event_id = e.event_id
               WHERE e.worker_id = ?1 AND e.kind = ?2 AND e.dedup_bucket = ?3
                 AND v.void_id IS NULL
               ORDER BY e.rowid
               LIMIT 1"
            ),
            rusqlite::params![worker_id_str, kind_str, bucket],
            RawEvent::from_row,
          )
          .optional()?;

        if existing.is_none() {
          tx.execute(
            "INSERT INTO events (
               event_id, worker_id, kind, occurred_at, occurred_at_us,
               confidence, origin, evidence_photo, recorded_at, dedup_bucket
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            rusqlite::params![
              event_id_str,
              worker_id_str,
              kind_str,
              occurred_str,
              occurred_us,
              confidence,
              origin_str,
              evidence_photo,
              recorded_str,
              bucket,
            ],
          )?;
        }
        tx.commit()?;
        Ok(existing)
      })
      .await?;

    match existing {
      Some(raw) => Ok(Appended::Duplicate(raw.into_resolved()?.event)),
      None => Ok(Appended::Inserted(event)),
    }
  }

  async fn void_event(&self, event_id: EventId, reason: Option<String>) -> Result<EventVoid> {
    let void = EventVoid {
      void_id: Uuid::new_v4(),
      event_id,
      reason: reason.clone(),
      recorded_at: Utc::now(),
    };

    let void_id_str  = encode_uuid(void.void_id);
    let event_id_str = encode_uuid(event_id);
    let at_str       = encode_dt(void.recorded_at);

    let outcome = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let voided: Option<bool> = tx
          .query_row(
            "SELECT v.void_id IS NOT NULL
             FROM events e
             LEFT JOIN event_voids v ON v.event_id = e.event_id
             WHERE e.event_id = ?1",
            rusqlite::params![event_id_str],
            |r| r.get(0),
          )
          .optional()?;
        let outcome = match voided {
          None => Guarded::Missing,
          Some(true) => Guarded::Rejected,
          Some(false) => {
            tx.execute(
              "INSERT INTO event_voids (void_id, event_id, reason, recorded_at)
               VALUES (?1, ?2, ?3, ?4)",
              rusqlite::params![void_id_str, event_id_str, reason, at_str],
            )?;
            Guarded::Done(())
          }
        };
        tx.commit()?;
        Ok(outcome)
      })
      .await?;

    match outcome {
      Guarded::Done(()) => Ok(void),
      Guarded::Missing => Err(Error::EventNotFound(event_id)),
      Guarded::Rejected => Err(Error::AlreadyVoided(event_id)),
    }
  }

  // ── Reads ─────────────────────────────────────────────────────────────────

  async fn get_event(&self, event_id: EventId) -> Result<Option<ResolvedEvent>> {
    let id_str = encode_uuid(event_id);

    let raw: Option<RawEvent> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            &format!(
              "SELECT {EVENT_COLUMNS}
               FROM events e
               LEFT JOIN event_voids v ON v.event_id = e.event_id
               WHERE e.event_id = ?1"
            ),
            rusqlite::params![id_str],
            RawEvent::from_row,
          )
          .optional()?)
      })
      .await?;

    raw.map(RawEvent::into_resolved).transpose()
  }

  async fn events_between(&self, query: &EventQuery) -> Result<Vec<ResolvedEvent>> {
    let worker_str     = query.worker_id.map(encode_uuid);
    let from_us        = query.from.map(|t| t.timestamp_micros());
    let to_us          = query.to.map(|t| t.timestamp_micros());
    let include_voided = query.include_voided;

    let raws: Vec<RawEvent> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {EVENT_COLUMNS}
           FROM events e
           LEFT JOIN event_voids v ON v.event_id = e.event_id
           WHERE (?1 IS NULL OR e.worker_id = ?1)
             AND (?2 IS NULL OR e.occurred_at_us >= ?2)
             AND (?3 IS NULL OR e.occurred_at_us < ?3)
             AND (?4 OR v.void_id IS NULL)
           ORDER BY e.occurred_at_us, e.rowid"
        ))?;
        let rows = stmt
          .query_map(
            rusqlite::params![worker_str, from_us, to_us, include_voided],
            RawEvent::from_row,
          )?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawEvent::into_resolved).collect()
  }

  async fn latest_events(&self) -> Result<Vec<AttendanceEvent>> {
    let raws: Vec<RawEvent> = self
      .conn
      .call(|conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {EVENT_COLUMNS}
           FROM events e
           LEFT JOIN event_voids v ON v.event_id = e.event_id
           WHERE e.rowid = (
             SELECT e2.rowid
             FROM events e2
             LEFT JOIN event_voids v2 ON v2.event_id = e2.event_id
             WHERE e2.worker_id = e.worker_id AND v2.void_id IS NULL
             ORDER BY e2.occurred_at_us DESC, e2.rowid DESC
             LIMIT 1
           )"
        ))?;
        let rows = stmt
          .query_map([], RawEvent::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws
      .into_iter()
      .map(|raw| raw.into_resolved().map(|rf| rf.event))
      .collect()
  }

  async fn latest_event(&self, worker_id: WorkerId) -> Result<Option<AttendanceEvent>> {
    let id_str = encode_uuid(worker_id);

    let raw: Option<RawEvent> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            &format!(
              "SELECT {EVENT_COLUMNS}
               FROM events e
               LEFT JOIN event_voids v ON v.event_id = e.event_id
               WHERE e.worker_id = ?1 AND v.void_id IS NULL
               ORDER BY e.occurred_at_us DESC, e.rowid DESC
               LIMIT 1"
            ),
            rusqlite::params![id_str],
            RawEvent::from_row,
          )
          .optional()?)
      })
      .await?;

    raw.map(|r| r.into_resolved().map(|rf| rf.event)).transpose()
  }

  // ── Health ────────────────────────────────────────────────────────────────

  /// Rewrites the heartbeat row, so a file that still reads but no longer
  /// accepts writes fails the check.
  async fn ping(&self) -> Result<()> {
    let at_str = encode_dt(Utc::now());
    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO heartbeat (id, checked_at) VALUES (1, ?1)
           ON CONFLICT (id) DO UPDATE SET checked_at = excluded.checked_at",
          rusqlite::params![at_str],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}
