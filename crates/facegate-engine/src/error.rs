//! Error type for `facegate-engine`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
  /// Malformed probe or enrollment input. Raised before any matching or
  /// writing happens.
  #[error("validation error: {0}")]
  Validation(#[source] facegate_core::Error),

  #[error("invalid input: {0}")]
  InvalidInput(String),

  #[error("invalid configuration: {0}")]
  Config(String),

  #[error("not found: {0}")]
  NotFound(String),

  #[error("conflict: {0}")]
  Conflict(String),

  /// Admission queue is full; the frame was refused, not dropped silently.
  #[error("system busy")]
  Busy,

  /// The event store failed; probes are refused until it recovers.
  #[error("persistence unavailable: {0}")]
  Unavailable(String),

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),

  #[error("internal error: {0}")]
  Internal(String),
}

impl EngineError {
  pub(crate) fn store<E>(e: E) -> Self
  where
    E: std::error::Error + Send + Sync + 'static,
  {
    Self::Store(Box::new(e))
  }
}
