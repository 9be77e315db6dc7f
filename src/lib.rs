//! Learning verification and update engine for non-fungible agents.
//!
//! The [`learning`] module is the engine itself; [`api`] exposes it over HTTP
//! and [`config`] and [`telemetry`] bootstrap the `nfa-learning` binary.

pub mod api;
pub mod config;
pub mod error;
pub mod learning;
pub mod telemetry;

pub use error::{Error, Result};
