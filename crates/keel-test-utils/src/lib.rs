#![deny(unsafe_code)]

//! Shared test utilities for the keel workspace.
//!
//! Provides a scriptable fake engine, config builders, and tracing helpers
//! so that individual crate tests stay concise and consistent.
//!
//! Add this crate as a `[dev-dependency]` in any workspace member:
//!
//! ```toml
//! [dev-dependencies]
//! keel-test-utils = { workspace = true }
//! ```

pub mod config;
pub mod engine;
pub mod tracing_setup;
