//! Client-side tracking of biometric enrollment sessions.
//!
//! An [`EnrollmentTracker`] starts an enrollment through an
//! [`api::EnrollmentApi`], polls it until the device reports a terminal step,
//! and writes one audit entry per finished session to an [`api::AuditSink`].
//! [`client::HttpEnrollmentClient`] implements both against the hub's REST
//! API.

pub mod api;
pub mod client;
pub mod error;
pub mod tracker;

pub use error::{Error, Result};
pub use tracker::{
  CancelHandle, EnrollmentSession, EnrollmentTracker, Failure, Outcome, Progress, SessionState, TrackerConfig,
};
