//! The enrollment tracker.
//!
//! [`EnrollmentTracker::start`] spawns one task per enrollment session. The
//! task asks the device to start, then polls the status endpoint on a fixed
//! cadence until a terminal step label arrives or the attempt budget runs
//! out. At most one request is outstanding at a time.
//!
//! Two tokens stop a session early. A user cancellation ends it in
//! [`SessionState::Cancelled`] and is finalised like any other outcome. A
//! tear-down (dropping the [`EnrollmentSession`]) ends it silently: no audit
//! record, no completion. Both tokens are raced against every await point and
//! checked again before a response is applied, so an in-flight request is
//! aborted and a response that arrives after either never changes state.

use std::{fmt, future::Future, sync::Arc, time::Duration};

use portaria_core::{
  action_log::{ENROLL_BIOMETRY, LogStatus, NewActionLog},
  step::{FailureReason, Phase, StepClass, classify},
};
use serde::Deserialize;
use tokio::{
  sync::{oneshot, watch},
  time::Instant,
};
use tokio_util::sync::{CancellationToken, DropGuard};

use crate::api::{AuditSink, EnrollmentApi, Subject};

// ─── Configuration ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
  /// Delay before each poll.
  #[serde(with = "millis")]
  pub poll_interval:    Duration,
  /// Delay before a poll that follows a transport failure.
  #[serde(with = "millis")]
  pub error_interval:   Duration,
  /// Status requests issued before giving up, failed ones included.
  pub max_attempts:     u32,
  /// How long a success stays on screen before completion is reported.
  #[serde(with = "millis")]
  pub completion_delay: Duration,
  /// Webhook address handed to the device; the server picks its own when
  /// unset.
  pub callback_url:     Option<String>,
}

impl Default for TrackerConfig {
  fn default() -> Self {
    Self {
      poll_interval:    Duration::from_millis(300),
      error_interval:   Duration::from_millis(1000),
      max_attempts:     300,
      completion_delay: Duration::from_secs(3),
      callback_url:     None,
    }
  }
}

mod millis {
  use std::time::Duration;

  use serde::{Deserialize, Deserializer};

  pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
    Ok(Duration::from_millis(u64::deserialize(d)?))
  }
}

// ─── Observable state ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
  Idle,
  Starting,
  Polling,
  Succeeded,
  Failed,
  TimedOut,
  Cancelled,
}

impl SessionState {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Idle => "idle",
      Self::Starting => "starting",
      Self::Polling => "polling",
      Self::Succeeded => "succeeded",
      Self::Failed => "failed",
      Self::TimedOut => "timed_out",
      Self::Cancelled => "cancelled",
    }
  }
}

/// What the progress indicator shows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Progress {
  pub state:   SessionState,
  pub phase:   Phase,
  /// The last step label reported by the device.
  pub step:    Option<String>,
  pub message: Option<String>,
  /// Status requests issued so far.
  pub attempt: u32,
}

impl Progress {
  fn idle() -> Self {
    Self {
      state:   SessionState::Idle,
      phase:   Phase::Connecting,
      step:    None,
      message: None,
      attempt: 0,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Failure {
  /// The start request was refused or never got an answer.
  Rejected(String),
  /// The device reported an error label.
  Device(FailureReason),
  /// Every status request of the attempt budget failed in transport.
  Connection,
}

/// How a session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
  Succeeded,
  Failed(Failure),
  TimedOut,
  Cancelled,
}

impl Outcome {
  pub fn state(&self) -> SessionState {
    match self {
      Self::Succeeded => SessionState::Succeeded,
      Self::Failed(_) => SessionState::Failed,
      Self::TimedOut => SessionState::TimedOut,
      Self::Cancelled => SessionState::Cancelled,
    }
  }

  fn audit_status(&self) -> LogStatus {
    match self {
      Self::Succeeded => LogStatus::Success,
      _ => LogStatus::Error,
    }
  }
}

impl fmt::Display for Outcome {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Succeeded => f.write_str("biometry enrolled"),
      Self::Failed(Failure::Rejected(reason)) => write!(f, "enrollment not started: {reason}"),
      Self::Failed(Failure::Device(reason)) => f.write_str(reason.message()),
      Self::Failed(Failure::Connection) => f.write_str("lost contact with the enrollment service"),
      Self::TimedOut => f.write_str("no result from the sensor in time"),
      Self::Cancelled => f.write_str("enrollment cancelled by the user"),
    }
  }
}

// ─── Tracker ──────────────────────────────────────────────────────────────────

pub struct EnrollmentTracker<A, L> {
  api:    Arc<A>,
  audit:  Arc<L>,
  config: TrackerConfig,
}

impl<A, L> EnrollmentTracker<A, L>
where
  A: EnrollmentApi + 'static,
  L: AuditSink + 'static,
{
  pub fn new(api: Arc<A>, audit: Arc<L>, config: TrackerConfig) -> Self {
    Self { api, audit, config }
  }

  /// Begin a session for `subject` on the current tokio runtime. Sessions
  /// share nothing with each other.
  pub fn start(&self, subject: Subject) -> EnrollmentSession {
    let (progress_tx, progress_rx) = watch::channel(Progress::idle());
    let (outcome_tx, outcome_rx) = oneshot::channel();
    let cancel = CancellationToken::new();
    let teardown = CancellationToken::new();

    let runner = Runner {
      api: Arc::clone(&self.api),
      audit: Arc::clone(&self.audit),
      config: self.config.clone(),
      subject,
      progress: progress_tx,
      cancel: cancel.clone(),
      teardown: teardown.clone(),
    };
    tokio::spawn(runner.run(outcome_tx));

    EnrollmentSession {
      progress: progress_rx,
      outcome: Some(outcome_rx),
      cancel,
      _teardown: teardown.drop_guard(),
    }
  }
}

/// Handle to a running session. Dropping it tears the session down.
pub struct EnrollmentSession {
  progress:  watch::Receiver<Progress>,
  outcome:   Option<oneshot::Receiver<Outcome>>,
  cancel:    CancellationToken,
  _teardown: DropGuard,
}

impl EnrollmentSession {
  pub fn progress(&self) -> watch::Receiver<Progress> { self.progress.clone() }

  pub fn state(&self) -> SessionState { self.progress.borrow().state }

  /// Cancel on behalf of the user. Takes effect locally at once; the device
  /// is notified on a best-effort basis.
  pub fn cancel(&self) { self.cancel.cancel() }

  /// A handle that cancels this session while [`Self::finished`] is pending.
  pub fn cancel_handle(&self) -> CancelHandle { CancelHandle(self.cancel.clone()) }

  /// Wait for the terminal outcome. A success resolves only after the
  /// completion delay. Returns `None` if the outcome was already taken.
  pub async fn finished(&mut self) -> Option<Outcome> { self.outcome.take()?.await.ok() }

  /// Stop the session without finalising it.
  pub fn teardown(self) {}
}

#[derive(Clone)]
pub struct CancelHandle(CancellationToken);

impl CancelHandle {
  pub fn cancel(&self) { self.0.cancel() }
}

// ─── Session task ─────────────────────────────────────────────────────────────

enum Interrupt {
  Cancelled,
  TornDown,
}

struct Runner<A, L> {
  api:      Arc<A>,
  audit:    Arc<L>,
  config:   TrackerConfig,
  subject:  Subject,
  progress: watch::Sender<Progress>,
  cancel:   CancellationToken,
  teardown: CancellationToken,
}

impl<A, L> Runner<A, L>
where
  A: EnrollmentApi + 'static,
  L: AuditSink + 'static,
{
  async fn run(self, outcome_tx: oneshot::Sender<Outcome>) {
    let outcome = match self.drive().await {
      Ok(outcome) => outcome,
      Err(Interrupt::Cancelled) => {
        self.notify_device_of_cancel();
        Outcome::Cancelled
      }
      Err(Interrupt::TornDown) => {
        tracing::debug!(subject = %self.subject.user_id, "session torn down");
        return;
      }
    };
    self.finalize(outcome, outcome_tx).await;
  }

  async fn drive(&self) -> Result<Outcome, Interrupt> {
    self.update(|p| p.state = SessionState::Starting);

    let callback_url = self.config.callback_url.as_deref();
    let ack = self.interruptible(self.api.start(&self.subject, callback_url)).await?;
    let session_id = match ack {
      Ok(ack) if ack.success => ack.session_id,
      Ok(ack) => {
        let reason = ack.error.unwrap_or_else(|| "start refused".to_owned());
        return Ok(Outcome::Failed(Failure::Rejected(reason)));
      }
      Err(e) => return Ok(Outcome::Failed(Failure::Rejected(e.to_string()))),
    };

    tracing::info!(
      subject = %self.subject.user_id,
      session = session_id.as_deref().unwrap_or("-"),
      "enrollment started"
    );
    self.update(|p| p.state = SessionState::Polling);

    let mut attempts = 0;
    let mut transport_failures = 0;
    let mut delay = self.config.poll_interval;

    while attempts < self.config.max_attempts {
      self.interruptible(tokio::time::sleep(delay)).await?;
      let response = self.interruptible(self.api.status(session_id.as_deref())).await?;
      attempts += 1;
      self.update(|p| p.attempt = attempts);

      let report = match response {
        Ok(report) => report,
        Err(e) => {
          transport_failures += 1;
          tracing::warn!(
            attempt = attempts,
            failures = transport_failures,
            error = %e,
            "status poll failed"
          );
          if transport_failures >= self.config.max_attempts {
            return Ok(Outcome::Failed(Failure::Connection));
          }
          delay = self.config.error_interval;
          continue;
        }
      };
      transport_failures = 0;
      delay = self.config.poll_interval;

      match classify(&report.step) {
        StepClass::Success => return Ok(Outcome::Succeeded),
        StepClass::Failure(reason) => {
          self.update(|p| {
            p.step = Some(report.step.clone());
            p.message = report.message.clone();
          });
          return Ok(Outcome::Failed(Failure::Device(reason)));
        }
        StepClass::Progress(phase) => {
          tracing::debug!(attempt = attempts, step = %report.step, phase = phase.number(), "poll");
          self.update(|p| {
            p.phase = phase;
            p.step = Some(report.step.clone());
            p.message = report.message.clone();
          });
        }
      }
    }
    Ok(Outcome::TimedOut)
  }

  /// Record the terminal state, write the audit entry, and deliver the
  /// outcome. On success delivery waits for the completion delay, counted
  /// from the moment the success was seen. A tear-down at any point skips
  /// whatever is left.
  async fn finalize(&self, outcome: Outcome, outcome_tx: oneshot::Sender<Outcome>) {
    if self.teardown.is_cancelled() {
      return;
    }
    let display_until = Instant::now() + self.config.completion_delay;
    self.update(|p| {
      p.state = outcome.state();
      if outcome == Outcome::Succeeded {
        p.phase = Phase::Completed;
      }
    });
    tracing::info!(
      subject = %self.subject.user_id,
      state = outcome.state().as_str(),
      "enrollment finished: {outcome}"
    );

    let entry = NewActionLog {
      subject_id:   Some(self.subject.user_id.clone()),
      identifier:   Some(self.subject.identifier.clone()),
      action:       ENROLL_BIOMETRY.to_owned(),
      status:       outcome.audit_status(),
      details:      Some(outcome.to_string()),
      subject_name: self.subject.name.clone(),
    };
    tokio::select! {
      biased;
      _ = self.teardown.cancelled() => return,
      written = self.audit.record(entry) => {
        if let Err(e) = written {
          tracing::warn!(error = %e, subject = %self.subject.user_id, "audit record not written");
        }
      }
    }

    if outcome == Outcome::Succeeded {
      tokio::select! {
        biased;
        _ = self.teardown.cancelled() => return,
        _ = tokio::time::sleep_until(display_until) => {}
      }
    }
    let _ = outcome_tx.send(outcome);
  }

  /// Run `fut` unless the session is cancelled or torn down first.
  async fn interruptible<T>(&self, fut: impl Future<Output = T>) -> Result<T, Interrupt> {
    let value = tokio::select! {
      biased;
      _ = self.teardown.cancelled() => return Err(Interrupt::TornDown),
      _ = self.cancel.cancelled() => return Err(Interrupt::Cancelled),
      value = fut => value,
    };
    // A result that raced an interruption is discarded.
    if self.teardown.is_cancelled() {
      return Err(Interrupt::TornDown);
    }
    if self.cancel.is_cancelled() {
      return Err(Interrupt::Cancelled);
    }
    Ok(value)
  }

  fn notify_device_of_cancel(&self) {
    let api = Arc::clone(&self.api);
    tokio::spawn(async move {
      if let Err(e) = api.cancel().await {
        tracing::warn!(error = %e, "device cancel not delivered");
      }
    });
  }

  fn update(&self, f: impl FnOnce(&mut Progress)) { self.progress.send_modify(f) }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
