//! The Facegate recognition engine.
//!
//! Ties the pure matcher and session state machine of `facegate-core` to an
//! [`AttendanceStore`](facegate_core::store::AttendanceStore): bounded
//! concurrent probe processing, per-worker serialisation, idempotent event
//! recording and a fail-closed persistence gate.

mod config;
mod engine;
mod error;
mod health;
mod outcome;
mod recorder;
mod tracker;

pub use config::{EngineConfig, ShiftConfig};
pub use engine::{Engine, EngineStats, Frame, ProbeHandle, WorkerStatus};
pub use error::EngineError;
pub use health::PersistenceGate;
pub use outcome::{ProbeOutcome, ProbeStatus};
pub use recorder::EventRecorder;
pub use tracker::SessionTracker;

#[cfg(test)]
mod tests;
