//! Core types and trait definitions for the Portaria access-control system.
//!
//! This crate is deliberately free of HTTP and database dependencies. The
//! server, the SQLite store, and the enrollment tracker all depend on it.

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod action_log;
pub mod error;
pub mod event;
pub mod record;
pub mod step;
pub mod store;

pub use error::{Error, Result};
