//! SQLite backend for the Facegate attendance store.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated thread
//! without blocking the async runtime. Feature vectors are sealed with
//! AES-256-GCM by [`VectorCipher`] before they reach the database.

mod encode;
mod schema;
mod store;

pub mod cipher;
pub mod error;

pub use cipher::{EncryptionMode, VectorCipher};
pub use error::{Error, Result};
pub use store::SqliteStore;
