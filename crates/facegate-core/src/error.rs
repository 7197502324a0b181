//! Error types for `facegate-core`.

use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum Error {
  #[error("vector has {actual} components, expected {expected}")]
  DimensionMismatch { expected: usize, actual: usize },

  #[error("vector component {index} is not a finite number")]
  NonFiniteComponent { index: usize },

  #[error("vector is empty")]
  EmptyVector,

  #[error("invalid thresholds: {0}")]
  InvalidThresholds(String),

  #[error("worker not found: {0}")]
  WorkerNotFound(Uuid),

  #[error("worker {0} is inactive")]
  WorkerInactive(Uuid),

  #[error("event not found: {0}")]
  EventNotFound(Uuid),

  #[error("event {0} is already voided")]
  AlreadyVoided(Uuid),

  #[error("unknown {what} discriminant: {value:?}")]
  UnknownDiscriminant { what: &'static str, value: String },

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

impl Error {
  /// `true` for errors caused by malformed caller input rather than by the
  /// state of the store.
  pub fn is_validation(&self) -> bool {
    matches!(
      self,
      Self::DimensionMismatch { .. }
        | Self::NonFiniteComponent { .. }
        | Self::EmptyVector
        | Self::InvalidThresholds(_)
    )
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
