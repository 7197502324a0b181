//! Encryption of feature vectors at rest.
//!
//! Vectors are sealed with AES-256-GCM under a random 96-bit nonce. The
//! additional authenticated data binds the ciphertext to its encoding and
//! worker ids, so a sealed vector copied onto another row fails to open.

use aes_gcm::{
  Aes256Gcm, Nonce,
  aead::{Aead, AeadCore, KeyInit, Payload},
};
use facegate_core::encoding::{EncryptionState, FeatureVector};
use rand_core::{OsRng, RngCore};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::{Error, Result};

/// GCM nonce length in bytes.
pub const NONCE_SIZE: usize = 12;

/// AES-256 key length in bytes.
pub const KEY_SIZE: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EncryptionMode {
  /// Every new vector is encrypted; a key is mandatory.
  #[default]
  Required,
  /// Vectors are stored in the clear. Development only.
  Disabled,
}

/// A sealed vector ready for the `encodings` table.
pub(crate) struct Sealed {
  pub state: EncryptionState,
  pub nonce: Option<Vec<u8>>,
  pub blob:  Vec<u8>,
}

struct Keyed {
  aead:        Aes256Gcm,
  fingerprint: String,
}

/// Seals and opens feature vectors.
pub struct VectorCipher {
  keyed: Option<Keyed>,
}

impl VectorCipher {
  pub fn new(key: &[u8; KEY_SIZE]) -> Self {
    Self {
      keyed: Some(Keyed {
        aead:        Aes256Gcm::new(key.into()),
        fingerprint: fingerprint(key),
      }),
    }
  }

  /// Parse a 64-character hex key.
  pub fn from_hex(key_hex: &str) -> Result<Self> {
    let bytes = hex::decode(key_hex.trim()).map_err(|e| Error::InvalidKey(e.to_string()))?;
    let key: [u8; KEY_SIZE] = bytes.try_into().map_err(|b: Vec<u8>| {
      Error::InvalidKey(format!("expected {KEY_SIZE} bytes, got {}", b.len()))
    })?;
    Ok(Self::new(&key))
  }

  /// Build a cipher for `mode`; `key_hex` is required unless encryption is
  /// disabled.
  pub fn from_config(mode: EncryptionMode, key_hex: Option<&str>) -> Result<Self> {
    match (mode, key_hex) {
      (EncryptionMode::Disabled, _) => Ok(Self::disabled()),
      (EncryptionMode::Required, Some(key)) => Self::from_hex(key),
      (EncryptionMode::Required, None) => Err(Error::InvalidKey(
        "an encryption key is required unless encryption mode is `disabled`".into(),
      )),
    }
  }

  /// A cipher under a fresh random key. Vectors it seals are unreadable
  /// after the process exits.
  pub fn ephemeral() -> Self { Self::new(&generate_key()) }

  pub fn disabled() -> Self { Self { keyed: None } }

  pub fn is_enabled(&self) -> bool { self.keyed.is_some() }

  /// Fingerprint of the configured key, if any.
  pub fn fingerprint(&self) -> Option<&str> {
    self.keyed.as_ref().map(|k| k.fingerprint.as_str())
  }

  pub(crate) fn seal(
    &self,
    vector: &FeatureVector,
    encoding_id: Uuid,
    worker_id: Uuid,
  ) -> Result<Sealed> {
    let plaintext = vector.to_le_bytes();
    let Some(keyed) = &self.keyed else {
      return Ok(Sealed {
        state: EncryptionState::Plaintext,
        nonce: None,
        blob:  plaintext,
      });
    };

    let aad = associated_data(encoding_id, worker_id);
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
    let blob = keyed
      .aead
      .encrypt(&nonce, Payload { msg: &plaintext, aad: &aad })
      .map_err(|_| Error::Encryption)?;

    Ok(Sealed {
      state: EncryptionState::Encrypted {
        key_fingerprint: keyed.fingerprint.clone(),
      },
      nonce: Some(nonce.to_vec()),
      blob,
    })
  }

  pub(crate) fn open(
    &self,
    state: &EncryptionState,
    nonce: Option<&[u8]>,
    blob: &[u8],
    encoding_id: Uuid,
    worker_id: Uuid,
  ) -> Result<FeatureVector> {
    let plaintext = match state {
      EncryptionState::Plaintext => blob.to_vec(),
      EncryptionState::Encrypted { key_fingerprint } => {
        let keyed = self
          .keyed
          .as_ref()
          .ok_or(Error::KeyUnavailable(encoding_id))?;
        if *key_fingerprint != keyed.fingerprint {
          return Err(Error::KeyMismatch {
            encoding_id,
            stored: key_fingerprint.clone(),
            configured: keyed.fingerprint.clone(),
          });
        }
        let nonce = nonce
          .filter(|n| n.len() == NONCE_SIZE)
          .ok_or(Error::CorruptVector(encoding_id))?;
        let aad = associated_data(encoding_id, worker_id);
        keyed
          .aead
          .decrypt(Nonce::from_slice(nonce), Payload { msg: blob, aad: &aad })
          .map_err(|_| Error::Decryption(encoding_id))?
      }
    };
    FeatureVector::from_le_bytes(&plaintext).ok_or(Error::CorruptVector(encoding_id))
  }
}

/// A fresh random AES-256 key.
pub fn generate_key() -> [u8; KEY_SIZE] {
  let mut key = [0u8; KEY_SIZE];
  OsRng.fill_bytes(&mut key);
  key
}

/// First 8 bytes of SHA-256 over the key, hex encoded.
fn fingerprint(key: &[u8; KEY_SIZE]) -> String {
  let digest = Sha256::digest(key);
  hex::encode(&digest[..8])
}

fn associated_data(encoding_id: Uuid, worker_id: Uuid) -> [u8; 32] {
  let mut aad = [0u8; 32];
  aad[..16].copy_from_slice(encoding_id.as_bytes());
  aad[16..].copy_from_slice(worker_id.as_bytes());
  aad
}
