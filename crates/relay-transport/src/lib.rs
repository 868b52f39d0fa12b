//! Relay Transport Layer - the collaborators a runner relies on
//!
//! This crate provides:
//! - Per-runner mailboxes with selective (template) receipt
//! - The directory that resolves logical names to live handles
//! - Simulated relocation between locations
//! - Latency models for the simulation

pub mod mailbox;
pub mod directory;
pub mod latency;
pub mod relocation;

pub use mailbox::*;
pub use directory::*;
pub use latency::*;
pub use relocation::*;
