//! `portaria-enroll`: enroll a fingerprint from the terminal.
//!
//! # Usage
//!
//! ```
//! portaria-enroll --url http://localhost:5001 visitor-42 V-42 --name "Ana Souza"
//! portaria-enroll --config ~/.config/portaria/enroll.toml 17 P-17
//! ```
//!
//! Ctrl-C cancels the session. The exit status is non-zero unless the
//! enrollment succeeded.

use std::{path::PathBuf, process::ExitCode, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use clap::Parser;
use portaria_tracker::{
  EnrollmentTracker, Outcome, Progress, TrackerConfig, api::Subject, client::HttpEnrollmentClient,
};
use serde::Deserialize;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

/// Per-request timeout for the hub client.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

// ─── CLI args ─────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "portaria-enroll", about = "Enroll a fingerprint through the Portaria hub")]
struct Args {
  /// Id of the person being enrolled.
  user_id: String,

  /// Document identifier of the person being enrolled.
  identifier: String,

  /// Display name sent to the device.
  #[arg(long)]
  name: Option<String>,

  /// Path to a TOML config file (`url` and a `[tracker]` table).
  #[arg(short, long, value_name = "FILE")]
  config: Option<PathBuf>,

  /// Base URL of the hub (default: http://localhost:5001).
  #[arg(long, env = "PORTARIA_URL")]
  url: Option<String>,

  /// Milliseconds between polls.
  #[arg(long)]
  poll_ms: Option<u64>,

  /// Status requests issued before giving up.
  #[arg(long)]
  max_attempts: Option<u32>,

  /// Webhook address handed to the device.
  #[arg(long)]
  callback_url: Option<String>,
}

// ─── Config file ──────────────────────────────────────────────────────────────

#[derive(Deserialize, Default)]
struct ConfigFile {
  #[serde(default)]
  url:     String,
  #[serde(default)]
  tracker: TrackerConfig,
}

// ─── Entry point ──────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<ExitCode> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .with_writer(std::io::stderr)
    .init();

  let args = Args::parse();

  let file_cfg: ConfigFile = if let Some(path) = &args.config {
    let raw = std::fs::read_to_string(path)
      .with_context(|| format!("reading config file {}", path.display()))?;
    toml::from_str(&raw).context("parsing config file")?
  } else {
    ConfigFile::default()
  };

  // CLI flags override config file, which overrides defaults.
  let base_url = args
    .url
    .or_else(|| (!file_cfg.url.is_empty()).then(|| file_cfg.url.clone()))
    .unwrap_or_else(|| "http://localhost:5001".to_string());
  let mut config = file_cfg.tracker;
  if let Some(ms) = args.poll_ms {
    config.poll_interval = Duration::from_millis(ms);
  }
  if let Some(n) = args.max_attempts {
    config.max_attempts = n;
  }
  if args.callback_url.is_some() {
    config.callback_url = args.callback_url;
  }

  let client = Arc::new(HttpEnrollmentClient::new(&base_url, REQUEST_TIMEOUT)?);
  let tracker = EnrollmentTracker::new(Arc::clone(&client), client, config);

  let subject = Subject { user_id: args.user_id, identifier: args.identifier, name: args.name };
  println!("Enrolling {} ({}) via {base_url}", subject.user_id, subject.identifier);

  let mut session = tracker.start(subject);
  let mut progress = session.progress();

  let printer = tokio::spawn(async move {
    let mut shown = Some(progress.borrow_and_update().phase);
    print_phase(&progress.borrow());
    while progress.changed().await.is_ok() {
      let current = progress.borrow_and_update().clone();
      if shown != Some(current.phase) {
        shown = Some(current.phase);
        print_phase(&current);
      }
    }
  });

  let cancel = session.cancel_handle();
  let interrupt = tokio::spawn(async move {
    if tokio::signal::ctrl_c().await.is_ok() {
      println!("Cancelling...");
      cancel.cancel();
    }
  });

  let outcome = session.finished().await;
  interrupt.abort();
  printer.abort();

  match outcome {
    Some(Outcome::Succeeded) => {
      println!("Done: {}", Outcome::Succeeded);
      Ok(ExitCode::SUCCESS)
    }
    Some(other) => {
      eprintln!("Failed: {other}");
      Ok(ExitCode::FAILURE)
    }
    None => {
      eprintln!("Session ended without an outcome");
      Ok(ExitCode::FAILURE)
    }
  }
}

fn print_phase(progress: &Progress) {
  let phase = progress.phase;
  println!("[{}/5] {:>3}%  {}", phase.number(), phase.percent(), phase.title());
}
