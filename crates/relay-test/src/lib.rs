//! Relay Test Harness - whole-race scenarios and event verification
//!
//! This crate provides:
//! - Scenario configuration and a harness that runs a complete experiment
//! - An event recorder that checks ring traversal and lap bookkeeping

pub mod recorder;
pub mod scenario;

pub use recorder::*;
pub use scenario::*;
