//! Integration Tests for the Herald reporting and alerting engine
//!
//! This crate contains various test modules:
//!
//! - `scheduler_tests`: Scheduler ticks, the concurrency bound, failure isolation, synthetic
//!   fallback and per-channel distribution
//! - `alert_tests`: Rule evaluation, suppression, escalation and the alert instance lifecycle
//! - `retention_tests`: Artifact expiry, retried payload deletes and resolved alert pruning
//! - `runtime_tests`: Real tick loops, `SQLite` persistence across restarts and live
//!   reconfiguration
//! - `mock_infrastructure`: Reusable data sources, channels and stores with injected behavior
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test --package tests
//! ```
//!
//! Most tests drive ticks by hand with fixed timestamps. Only `runtime_tests` starts the
//! background loops, using short intervals.

#[cfg(test)]
mod scheduler_tests;

#[cfg(test)]
mod alert_tests;

#[cfg(test)]
mod retention_tests;

#[cfg(test)]
mod runtime_tests;

/// Mock infrastructure for testing
pub mod mock_infrastructure;
