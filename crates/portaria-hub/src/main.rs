//! portaria hub server binary.
//!
//! Reads `config.toml` (or the path given with `--config`) layered under
//! `PORTARIA_*` environment variables, opens the SQLite record store, starts
//! the heartbeat, and serves the REST API and `/ws` over HTTP.
//!
//! # Issuing a dashboard token
//!
//! ```
//! cargo run -p portaria-hub --bin server -- --issue-token 17 --role porteiro
//! ```

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use clap::Parser;
use portaria_hub::{
  AppState, ServerConfig,
  auth::{Authenticator, Claims},
};
use portaria_store_sqlite::SqliteStore;
use tokio::net::TcpListener;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "Portaria realtime hub")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "config.toml")]
  config: PathBuf,

  /// Print a signed dashboard token for this user id and exit.
  #[arg(long, value_name = "USER_ID")]
  issue_token: Option<String>,

  /// Role carried by the issued token.
  #[arg(long, default_value = "porteiro", requires = "issue_token")]
  role: String,

  /// Token lifetime in hours.
  #[arg(long, default_value_t = 12, requires = "issue_token")]
  hours: i64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  let settings = config::Config::builder()
    .add_source(config::File::from(cli.config.clone()).required(false))
    .add_source(config::Environment::with_prefix("PORTARIA"))
    .build()
    .context("failed to read config file")?;

  let server_cfg: ServerConfig = settings
    .try_deserialize()
    .context("failed to deserialise ServerConfig")?;

  // Helper mode: sign a token and exit.
  if let Some(user_id) = cli.issue_token {
    let auth = Authenticator::new(server_cfg.jwt_secret.clone(), server_cfg.auth_policy);
    let claims = Claims {
      user_id:    user_id.into(),
      role:       cli.role,
      identifier: None,
      exp:        Some(chrono::Utc::now().timestamp() + cli.hours * 3600),
    };
    let token = auth.issue(&claims).map_err(|e| anyhow::anyhow!("signing failed: {e}"))?;
    println!("{token}");
    return Ok(());
  }

  let store_path = expand_tilde(&server_cfg.store_path);
  let store = SqliteStore::open(&store_path)
    .await
    .with_context(|| format!("failed to open store at {store_path:?}"))?;

  let state = AppState::new(store, server_cfg.clone()).context("failed to build app state")?;
  let _heartbeat = state.hub.spawn_heartbeat(server_cfg.heartbeat_interval());

  let app = portaria_hub::router(state);
  let address = format!("{}:{}", server_cfg.host, server_cfg.port);

  tracing::info!(
    policy = ?server_cfg.auth_policy,
    heartbeat_secs = server_cfg.heartbeat_secs,
    "Listening on http://{address} (ws://{address}/ws)"
  );
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;

  axum::serve(listener, app)
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("server error")?;

  tracing::info!("server stopped");
  Ok(())
}

async fn shutdown_signal() {
  if let Err(e) = tokio::signal::ctrl_c().await {
    tracing::error!(error = %e, "failed to listen for ctrl-c");
    std::future::pending::<()>().await;
  }
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}
