//! Common test utilities and fixtures for integration tests.
//!
//! # Modules
//!
//! - `fixtures`: catalog, ledger and request factories shared by the scenario tests
//! - `log_capture`: thread-local tracing capture with assertion helpers

pub mod fixtures;
pub mod log_capture;
