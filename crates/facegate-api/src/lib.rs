//! JSON REST API for Facegate.
//!
//! Exposes an axum [`Router`] backed by an [`Engine`] over any
//! [`facegate_core::store::AttendanceStore`]. Auth, TLS, and transport
//! concerns are the caller's responsibility.
//!
//! # Mounting
//!
//! ```rust,ignore
//! .nest("/api", facegate_api::api_router(engine.clone()))
//! ```

pub mod error;
pub mod events;
pub mod probes;
pub mod status;
pub mod workers;

use axum::{
  Router,
  routing::{get, post},
};
use facegate_core::store::AttendanceStore;
use facegate_engine::Engine;

pub use error::ApiError;

/// Build a fully-materialised API router for `engine`.
///
/// There is no route that writes attendance events directly; events are
/// only produced by `POST /probes`.
pub fn api_router<S>(engine: Engine<S>) -> Router<()>
where
  S: AttendanceStore + 'static,
{
  Router::new()
    // Recognition
    .route("/probes", post(probes::submit::<S>))
    // Workers
    .route("/workers", get(workers::list::<S>).post(workers::create::<S>))
    .route("/workers/{id}", get(workers::get_one::<S>))
    .route("/workers/{id}/encodings", post(workers::enroll::<S>))
    .route(
      "/workers/{id}/encodings/{encoding_id}/deactivate",
      post(workers::deactivate_encoding::<S>),
    )
    .route("/workers/{id}/deactivate", post(workers::deactivate::<S>))
    .route("/workers/{id}/sessions", get(workers::sessions::<S>))
    // Events
    .route("/events", get(events::list::<S>))
    .route("/events/{id}", get(events::get_one::<S>))
    .route("/events/{id}/void", post(events::void_one::<S>))
    // Status
    .route("/stats", get(status::stats::<S>))
    .route("/health", get(status::health::<S>))
    .with_state(engine)
}
