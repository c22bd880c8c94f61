//! ferry library crate — re-exports for integration tests.
//!
//! The primary interface is the `ferry` binary. This lib.rs exposes the
//! engine modules so integration tests can exercise the sync, mirror,
//! and reverse flows directly without going through the CLI.

pub mod commit;
pub mod config;
pub mod cursor;
pub mod dest;
pub mod doctor;
pub mod error;
pub mod mirror;
pub mod model;
pub mod pathmap;
pub mod reverse;
pub mod source;
pub mod sync;
pub mod telemetry;
