//! Biometric encodings: the only representation of a face the system keeps.
//!
//! An encoding is a fixed-length feature vector produced by an external
//! encoder. It cannot be turned back into an image, and the store keeps it
//! encrypted at rest. Decrypted vectors exist only inside matcher snapshots.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result, worker::WorkerId};

// ─── FeatureVector ───────────────────────────────────────────────────────────

/// A face feature vector.
///
/// `Debug` prints only the dimension so vectors never end up in logs.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeatureVector(Vec<f32>);

impl FeatureVector {
  pub fn new(components: Vec<f32>) -> Self { Self(components) }

  pub fn dimension(&self) -> usize { self.0.len() }

  pub fn as_slice(&self) -> &[f32] { &self.0 }

  /// Check the vector against the deployment's encoder dimension.
  ///
  /// Rejects empty vectors, a wrong length, and NaN or infinite components.
  pub fn validate(&self, expected_dimension: usize) -> Result<()> {
    if self.0.is_empty() {
      return Err(Error::EmptyVector);
    }
    if self.0.len() != expected_dimension {
      return Err(Error::DimensionMismatch {
        expected: expected_dimension,
        actual:   self.0.len(),
      });
    }
    if let Some(index) = self.0.iter().position(|c| !c.is_finite()) {
      return Err(Error::NonFiniteComponent { index });
    }
    Ok(())
  }

  /// Little-endian `f32` bytes, the plaintext form handed to the cipher.
  pub fn to_le_bytes(&self) -> Vec<u8> {
    self.0.iter().flat_map(|c| c.to_le_bytes()).collect()
  }

  /// Inverse of [`Self::to_le_bytes`]. Returns `None` if the length is not a
  /// multiple of four.
  pub fn from_le_bytes(bytes: &[u8]) -> Option<Self> {
    if bytes.len() % 4 != 0 {
      return None;
    }
    let components = bytes
      .chunks_exact(4)
      .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
      .collect();
    Some(Self(components))
  }
}

impl fmt::Debug for FeatureVector {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "FeatureVector(<{} components>)", self.0.len())
  }
}

impl From<Vec<f32>> for FeatureVector {
  fn from(components: Vec<f32>) -> Self { Self(components) }
}

// ─── Stored encodings ────────────────────────────────────────────────────────

/// How a stored vector is protected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EncryptionState {
  /// AES-256-GCM; `key_fingerprint` identifies the key that sealed it.
  Encrypted { key_fingerprint: String },
  /// Stored in the clear. Only produced when encryption is disabled.
  Plaintext,
}

impl EncryptionState {
  pub fn is_encrypted(&self) -> bool { matches!(self, Self::Encrypted { .. }) }
}

/// Metadata of a stored encoding. The vector itself is never part of it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncodingRecord {
  pub encoding_id:    Uuid,
  pub worker_id:      WorkerId,
  pub dimension:      usize,
  pub captured_at:    DateTime<Utc>,
  pub encryption:     EncryptionState,
  /// Capture condition, e.g. `"default"`, `"with_glasses"`, `"low_light"`.
  pub variant:        String,
  /// Encoder-reported face quality in `[0, 1]`, if known.
  pub quality:        Option<f32>,
  /// Inactive encodings are kept for audit but never matched against.
  pub active:         bool,
  pub deactivated_at: Option<DateTime<Utc>>,
}

/// Input to [`crate::store::AttendanceStore::enroll`].
#[derive(Debug, Clone)]
pub struct NewEncoding {
  pub vector:      FeatureVector,
  pub captured_at: Option<DateTime<Utc>>,
  pub variant:     Option<String>,
  pub quality:     Option<f32>,
}

impl NewEncoding {
  pub fn new(vector: impl Into<FeatureVector>) -> Self {
    Self {
      vector:      vector.into(),
      captured_at: None,
      variant:     None,
      quality:     None,
    }
  }
}

/// A decrypted encoding of an active worker, as loaded into a matcher
/// snapshot.
#[derive(Debug, Clone)]
pub struct ActiveEncoding {
  pub encoding_id: Uuid,
  pub worker_id:   WorkerId,
  pub vector:      FeatureVector,
}

// ─── Probes ──────────────────────────────────────────────────────────────────

/// A vector extracted from one live frame. Never persisted.
#[derive(Debug, Clone)]
pub struct ProbeEncoding {
  pub vector:      FeatureVector,
  /// When the frame was captured; defaults to submission time.
  pub captured_at: DateTime<Utc>,
}

impl ProbeEncoding {
  pub fn new(vector: impl Into<FeatureVector>, captured_at: DateTime<Utc>) -> Self {
    Self { vector: vector.into(), captured_at }
  }
}
