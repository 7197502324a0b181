//! Facegate server: configuration and HTTP application assembly.

use std::path::{Path, PathBuf};

use axum::Router;
use facegate_core::store::AttendanceStore;
use facegate_engine::{Engine, EngineConfig};
use facegate_store_sqlite::{EncryptionMode, VectorCipher};
use serde::Deserialize;
use tower_http::trace::TraceLayer;

// ─── Configuration ────────────────────────────────────────────────────────────

/// Runtime server configuration, deserialised from `facegate.toml` and
/// `FACEGATE_*` environment variables.
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
  #[serde(default = "default_host")]
  pub host:       String,
  #[serde(default = "default_port")]
  pub port:       u16,
  #[serde(default = "default_store_path")]
  pub store_path: PathBuf,
  #[serde(default)]
  pub encryption: EncryptionConfig,
  #[serde(default)]
  pub engine:     EngineConfig,
}

/// How stored feature vectors are protected.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct EncryptionConfig {
  /// `required` (default) or `disabled`.
  #[serde(default)]
  pub mode: EncryptionMode,
  /// 256-bit key as 64 hex characters. Required unless `mode = "disabled"`.
  pub key:  Option<String>,
}

fn default_host() -> String { "127.0.0.1".to_string() }

fn default_port() -> u16 { 8080 }

fn default_store_path() -> PathBuf { PathBuf::from("facegate.db") }

impl ServerConfig {
  pub fn cipher(&self) -> facegate_store_sqlite::Result<VectorCipher> {
    VectorCipher::from_config(self.encryption.mode, self.encryption.key.as_deref())
  }

  pub fn address(&self) -> String { format!("{}:{}", self.host, self.port) }
}

/// Load configuration from an optional TOML file, overridden by
/// `FACEGATE_*` environment variables (`__` separates nested keys, e.g.
/// `FACEGATE_ENGINE__ACCEPT_THRESHOLD=0.35`).
pub fn load_config(path: &Path) -> Result<ServerConfig, config::ConfigError> {
  config::Config::builder()
    .add_source(config::File::from(path).required(false))
    .add_source(
      config::Environment::with_prefix("FACEGATE")
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true),
    )
    .build()?
    .try_deserialize()
}

// ─── Application ──────────────────────────────────────────────────────────────

/// The HTTP application: the JSON API with request tracing.
pub fn app<S>(engine: Engine<S>) -> Router
where
  S: AttendanceStore + 'static,
{
  facegate_api::api_router(engine).layer(TraceLayer::new_for_http())
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}

#[cfg(test)]
mod tests {
  use std::{io::Write as _, sync::Arc};

  use axum::{body::Body, http::Request};
  use facegate_store_sqlite::SqliteStore;
  use tower::ServiceExt as _;

  use super::*;

  fn write_config(contents: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!(
      "facegate-test-{}-{}.toml",
      std::process::id(),
      contents.len()
    ));
    let mut f = std::fs::File::create(&path).unwrap();
    f.write_all(contents.as_bytes()).unwrap();
    path
  }

  #[test]
  fn missing_file_yields_defaults() {
    let cfg = load_config(Path::new("/nonexistent/facegate.toml")).unwrap();
    assert_eq!(cfg.port, 8080);
    assert_eq!(cfg.encryption.mode, EncryptionMode::Required);
    assert_eq!(cfg.engine.dimension, 128);
    // Encryption is required and no key is configured.
    assert!(cfg.cipher().is_err());
  }

  #[test]
  fn file_values_override_defaults() {
    let path = write_config(
      r#"
        port = 9100
        store_path = "/var/lib/facegate/att.db"

        [encryption]
        mode = "disabled"

        [engine]
        accept_threshold = 0.35
        debounce_window_secs = 60
        metric = "cosine"
      "#,
    );
    let cfg = load_config(&path).unwrap();
    std::fs::remove_file(&path).ok();

    assert_eq!(cfg.port, 9100);
    assert_eq!(cfg.store_path, PathBuf::from("/var/lib/facegate/att.db"));
    assert!((cfg.engine.accept_threshold - 0.35).abs() < f32::EPSILON);
    assert_eq!(cfg.engine.debounce_window_secs, 60);
    assert_eq!(cfg.engine.reject_threshold, 0.6);
    assert!(!cfg.cipher().unwrap().is_enabled());
  }

  #[test]
  fn shift_is_read_from_file() {
    let path = write_config(
      r#"
        [engine.shift]
        start = "08:30:00"
        end = "17:30:00"
        utc_offset_minutes = 420
      "#,
    );
    let cfg = load_config(&path).unwrap();
    std::fs::remove_file(&path).ok();

    let shift = cfg.engine.shift.unwrap();
    assert_eq!(shift.start, chrono::NaiveTime::from_hms_opt(8, 30, 0).unwrap());
    assert_eq!(shift.grace_minutes, 15);
    assert!(cfg.engine.validate().is_ok());
  }

  #[test]
  fn keyed_config_builds_a_cipher() {
    let key = hex::encode([7u8; 32]);
    let path = write_config(&format!("[encryption]\nkey = \"{key}\"\n"));
    let cfg = load_config(&path).unwrap();
    std::fs::remove_file(&path).ok();

    let cipher = cfg.cipher().unwrap();
    assert!(cipher.is_enabled());
    assert!(cipher.fingerprint().is_some());
  }

  #[tokio::test]
  async fn app_serves_health() {
    let store = Arc::new(SqliteStore::open_in_memory().await.unwrap());
    let engine = Engine::start(store, EngineConfig::default()).await.unwrap();

    let resp = app(engine)
      .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
      .await
      .unwrap();
    assert!(resp.status().is_success());
  }
}
