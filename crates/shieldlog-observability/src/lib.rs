//! # shieldlog-observability
//!
//! Structured logging for shieldlog binaries and embedders.
//!
//! Diagnostics always go to stderr so stdout carries nothing but decrypted
//! records. Output is human-readable text or JSON (for Loki, CloudWatch and
//! similar); levels are configurable per component.

pub mod tracing_setup;

pub use tracing_setup::{init_tracing, try_init_tracing, LogConfig};
