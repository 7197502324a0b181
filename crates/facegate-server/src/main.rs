//! facegate server binary.
//!
//! Reads `facegate.toml` (or the path specified with `--config`), opens the
//! SQLite store, starts the recognition engine and serves the JSON API over
//! HTTP.
//!
//! # Key generation
//!
//! To generate a value for `encryption.key` in facegate.toml:
//!
//! ```
//! cargo run -p facegate-server -- --generate-key
//! ```

use std::{path::PathBuf, sync::Arc};

use anyhow::Context as _;
use clap::Parser;
use facegate_engine::Engine;
use facegate_server::{ServerConfig, app, expand_tilde, load_config};
use facegate_store_sqlite::{SqliteStore, cipher::generate_key};
use tokio::net::TcpListener;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "Facegate attendance server")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "facegate.toml")]
  config: PathBuf,

  /// Print a fresh random vector encryption key and exit.
  #[arg(long)]
  generate_key: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  // Initialise tracing.
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  // Helper mode: print a key and exit.
  if cli.generate_key {
    println!("{}", hex::encode(generate_key()));
    return Ok(());
  }

  // Load configuration.
  let server_cfg: ServerConfig = load_config(&cli.config)
    .with_context(|| format!("failed to load configuration from {:?}", cli.config))?;

  let cipher = server_cfg
    .cipher()
    .context("invalid encryption settings")?;
  if !cipher.is_enabled() {
    tracing::warn!("vector encryption is disabled; biometric data is stored in plaintext");
  }

  // Expand `~` in store path.
  let store_path = expand_tilde(&server_cfg.store_path);

  // Open SQLite store.
  let store = SqliteStore::open(&store_path, cipher)
    .await
    .with_context(|| format!("failed to open store at {store_path:?}"))?;

  let engine = Engine::start(Arc::new(store), server_cfg.engine.clone())
    .await
    .context("failed to start engine")?;

  let app = app(engine);
  let address = server_cfg.address();

  tracing::info!("Listening on http://{address}");
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;

  axum::serve(listener, app).await.context("server error")?;

  Ok(())
}
