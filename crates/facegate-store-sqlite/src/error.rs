//! Error type for `facegate-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] facegate_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  #[error("invalid encryption key: {0}")]
  InvalidKey(String),

  #[error("encryption failed")]
  Encryption,

  /// Authentication of a sealed vector failed: tampered row or wrong AAD.
  #[error("decryption of encoding {0} failed")]
  Decryption(uuid::Uuid),

  #[error("encoding {encoding_id} was sealed with key {stored}, configured key is {configured}")]
  KeyMismatch {
    encoding_id: uuid::Uuid,
    stored:      String,
    configured:  String,
  },

  #[error("encoding {0} is encrypted but no key is configured")]
  KeyUnavailable(uuid::Uuid),

  #[error("stored vector of encoding {0} is malformed")]
  CorruptVector(uuid::Uuid),

  #[error("worker not found: {0}")]
  WorkerNotFound(uuid::Uuid),

  #[error("worker {0} is inactive")]
  WorkerInactive(uuid::Uuid),

  #[error("encoding {encoding_id} not found for worker {worker_id}")]
  EncodingNotFound {
    worker_id:   uuid::Uuid,
    encoding_id: uuid::Uuid,
  },

  #[error("event not found: {0}")]
  EventNotFound(uuid::Uuid),

  #[error("event {0} is already voided")]
  AlreadyVoided(uuid::Uuid),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
