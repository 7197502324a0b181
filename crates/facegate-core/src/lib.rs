//! Core types and trait definitions for the Facegate attendance engine.
//!
//! No HTTP, database or runtime dependencies. The matcher and the session
//! state machine are pure functions.

pub mod encoding;
pub mod error;
pub mod event;
pub mod matcher;
pub mod session;
pub mod store;
pub mod summary;
pub mod worker;

pub use error::{Error, Result};
