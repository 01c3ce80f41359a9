//! Shared domain types for the modelforge worker.
//!
//! Everything in this crate is pure: no database, network or subprocess
//! access. The other crates build their I/O on top of these types.

pub mod config;
pub mod error;
pub mod job;
pub mod naming;
pub mod paths;
pub mod types;
