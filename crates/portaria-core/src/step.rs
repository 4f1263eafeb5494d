//! Classification of the free-form step labels reported by the turnstile's
//! biometric sensor.
//!
//! The device vocabulary is open: new firmware may report labels this crate
//! has never seen. [`classify`] is total: unknown labels fall back to
//! [`Phase::Connecting`] rather than being treated as errors.

use serde::{Deserialize, Serialize};

/// The five ordered display phases of an enrollment, numbered 1..=5.
/// Second-reading labels such as `segunda_capturada` show as [`Phase::Validating`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
  Connecting = 1,
  FirstReading = 2,
  Validating = 3,
  Saving = 4,
  Completed = 5,
}

impl Phase {
  pub fn number(self) -> u8 { self as u8 }

  /// Title shown on the progress indicator.
  pub fn title(self) -> &'static str {
    match self {
      Self::Connecting => "Connecting",
      Self::FirstReading => "First reading",
      Self::Validating => "Validating",
      Self::Saving => "Saving",
      Self::Completed => "Completed",
    }
  }

  /// Progress bar fill, 0 at the first phase and 100 at the last.
  pub fn percent(self) -> u8 { (self.number() - 1) * 25 }
}

/// Why the device reported a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
  /// The sensor gave up waiting for a finger.
  Timeout,
  /// Cancelled on the device side.
  Cancelled,
  /// The device could not talk to the sensor or turnstile.
  Connection,
  Generic,
}

impl FailureReason {
  pub fn message(self) -> &'static str {
    match self {
      Self::Timeout => "sensor timed out, try again",
      Self::Cancelled => "enrollment cancelled on the device",
      Self::Connection => "could not reach the turnstile",
      Self::Generic => "enrollment failed",
    }
  }
}

/// The meaning of one step label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepClass {
  /// Still in progress; show this phase.
  Progress(Phase),
  Success,
  Failure(FailureReason),
}

const SUCCESS_LABELS: &[&str] =
  &["finalizado", "sucesso", "biometria_cadastrada", "concluido", "completo"];

const FAILURE_LABELS: &[&str] = &[
  "erro",
  "erro_inicial",
  "erro_conexao",
  "timeout",
  "cancelado",
  "error",
  "failed",
  "erro_catraca",
];

/// Classify a device step label. Matching is case-insensitive.
pub fn classify(label: &str) -> StepClass {
  let label = label.to_lowercase();

  if SUCCESS_LABELS.contains(&label.as_str()) {
    return StepClass::Success;
  }
  if FAILURE_LABELS.contains(&label.as_str()) {
    return StepClass::Failure(failure_reason(&label));
  }
  StepClass::Progress(progress_phase(&label).unwrap_or(Phase::Connecting))
}

fn progress_phase(label: &str) -> Option<Phase> {
  let phase = match label {
    "iniciando" | "conectado" | "conectando" | "aguardando_primeira" | "inicial" => {
      Phase::Connecting
    }
    "primeira_capturada" | "verificando_existente" | "aguardando_segunda" | "primeira_ok" => {
      Phase::FirstReading
    }
    "segunda_capturada" | "validando" | "validacao_ok" | "comparando_digitais" => {
      Phase::Validating
    }
    "salvando" | "armazenando" | "gravando_template" => Phase::Saving,
    _ => return None,
  };
  Some(phase)
}

fn failure_reason(label: &str) -> FailureReason {
  if label.contains("timeout") {
    FailureReason::Timeout
  } else if label.contains("cancelado") {
    FailureReason::Cancelled
  } else if label.contains("conexao") {
    FailureReason::Connection
  } else {
    FailureReason::Generic
  }
}
